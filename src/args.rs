//! Coercion of command arguments to byte strings (spec.md §3: the Command
//! record's `args: sequence of (text | bytes | i64)`).
//!
//! Grounded on `lunatic-redis::types::ToRedisArgs`/`write_redis_args`,
//! narrowed to the argument shapes the spec actually names instead of the
//! teacher's much larger blanket-impl surface (floats, maps, etc).

/// Anything that can be turned into one or more RESP bulk-string
/// arguments. Implemented for the three shapes named by spec.md's
/// Command record plus the slice/owned/reference variants a caller
/// naturally reaches for.
pub trait ToRedisArgs {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>);

    fn to_redis_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_redis_args(&mut out);
        out
    }
}

impl ToRedisArgs for str {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToRedisArgs for String {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec());
    }
}

impl ToRedisArgs for [u8] {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.to_vec());
    }
}

impl ToRedisArgs for Vec<u8> {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.clone());
    }
}

macro_rules! impl_integer_args {
    ($($ty:ty),*) => {
        $(
            impl ToRedisArgs for $ty {
                fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
                    let mut buf = itoa::Buffer::new();
                    out.push(buf.format(*self).as_bytes().to_vec());
                }
            }
        )*
    };
}

impl_integer_args!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl ToRedisArgs for f64 {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        let mut buf = ryu::Buffer::new();
        out.push(buf.format(*self).as_bytes().to_vec());
    }
}

impl<'a, T: ToRedisArgs + ?Sized> ToRedisArgs for &'a T {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        (*self).write_redis_args(out)
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Vec<T> {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self {
            item.write_redis_args(out);
        }
    }
}

impl<T: ToRedisArgs> ToRedisArgs for [T] {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self {
            item.write_redis_args(out);
        }
    }
}

impl<T: ToRedisArgs> ToRedisArgs for Option<T> {
    fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
        if let Some(value) = self {
            value.write_redis_args(out);
        }
    }
}

/// Flattens a tuple of arguments, each of which may itself expand to
/// multiple bulk strings (e.g. a key followed by a slice of values).
macro_rules! impl_tuple_args {
    ($($name:ident),+) => {
        impl<$($name: ToRedisArgs),+> ToRedisArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_redis_args(&self, out: &mut Vec<Vec<u8>>) {
                let ($(ref $name,)+) = *self;
                $($name.write_redis_args(out);)+
            }
        }
    };
}

impl_tuple_args!(A);
impl_tuple_args!(A, B);
impl_tuple_args!(A, B, C);
impl_tuple_args!(A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_become_single_bulk_arg() {
        assert_eq!("bar".to_redis_args(), vec![b"bar".to_vec()]);
    }

    #[test]
    fn slices_expand_to_multiple_args() {
        let keys = ["a", "b", "c"];
        assert_eq!(
            keys.as_slice().to_redis_args(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn integers_format_as_decimal() {
        assert_eq!(42i64.to_redis_args(), vec![b"42".to_vec()]);
        assert_eq!((-7i32).to_redis_args(), vec![b"-7".to_vec()]);
    }
}
