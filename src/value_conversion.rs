//! Decoding a [`Value`] into Rust types (the facade's reply-shaping layer,
//! spec.md §4.8). Grounded on `lunatic-redis::types::FromRedisValue` and
//! `glide-core::client::value_conversion`.

use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::resp::Value;
use std::collections::HashMap;

pub trait FromRedisValue: Sized {
    fn from_redis_value(value: &Value) -> RedisResult<Self>;
}

fn type_error(value: &Value, expected: &str) -> RedisError {
    RedisError::new(
        ErrorKind::TypeError,
        format!("expected {expected}, got {value:?}"),
    )
}

impl FromRedisValue for Value {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        Ok(value.clone())
    }
}

impl FromRedisValue for String {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::SimpleString(s) => Ok(s.clone()),
            Value::BulkString(Some(bytes)) => Ok(std::str::from_utf8(bytes)?.to_owned()),
            _ => Err(type_error(value, "string")),
        }
    }
}

impl FromRedisValue for Vec<u8> {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::BulkString(Some(bytes)) => Ok(bytes.clone()),
            Value::SimpleString(s) => Ok(s.clone().into_bytes()),
            _ => Err(type_error(value, "bulk string")),
        }
    }
}

impl FromRedisValue for i64 {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::Integer(n) => Ok(*n),
            Value::BulkString(Some(bytes)) => Ok(std::str::from_utf8(bytes)?.trim().parse()?),
            Value::SimpleString(s) => Ok(s.trim().parse()?),
            _ => Err(type_error(value, "integer")),
        }
    }
}

impl FromRedisValue for usize {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        Ok(i64::from_redis_value(value)? as usize)
    }
}

impl FromRedisValue for bool {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::Integer(n) => Ok(*n != 0),
            Value::SimpleString(s) if s == "OK" => Ok(true),
            Value::BulkString(Some(bytes)) => Ok(bytes.as_slice() == b"1"),
            _ => Err(type_error(value, "bool")),
        }
    }
}

impl FromRedisValue for f64 {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::BulkString(Some(bytes)) => Ok(std::str::from_utf8(bytes)?
                .parse()
                .map_err(|_| type_error(value, "float"))?),
            Value::SimpleString(s) => s.parse().map_err(|_| type_error(value, "float")),
            Value::Integer(n) => Ok(*n as f64),
            _ => Err(type_error(value, "float")),
        }
    }
}

/// Asserts an `OK`/status reply and discards it — used for commands whose
/// only interesting outcome is success or an `Err`.
impl FromRedisValue for () {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::SimpleString(_) | Value::Integer(_) => Ok(()),
            Value::BulkString(_) | Value::Array(_) => Ok(()),
            Value::Error(msg) => Err(RedisError::from_error_line(msg)),
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Option<T> {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        if value.is_nil() {
            Ok(None)
        } else {
            Ok(Some(T::from_redis_value(value)?))
        }
    }
}

impl<T: FromRedisValue> FromRedisValue for Vec<T> {
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::Array(Some(items)) => items.iter().map(T::from_redis_value).collect(),
            Value::Array(None) => Ok(Vec::new()),
            _ => Err(type_error(value, "array")),
        }
    }
}

impl<K, V> FromRedisValue for HashMap<K, V>
where
    K: FromRedisValue + std::hash::Hash + Eq,
    V: FromRedisValue,
{
    fn from_redis_value(value: &Value) -> RedisResult<Self> {
        match value {
            Value::Array(Some(items)) => {
                if items.len() % 2 != 0 {
                    return Err(type_error(value, "map (even-length array)"));
                }
                let mut map = HashMap::with_capacity(items.len() / 2);
                let mut iter = items.iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    map.insert(K::from_redis_value(k)?, V::from_redis_value(v)?);
                }
                Ok(map)
            }
            Value::Array(None) => Ok(HashMap::new()),
            _ => Err(type_error(value, "map")),
        }
    }
}

macro_rules! impl_tuple_from_value {
    ($len:expr, $($name:ident : $idx:tt),+) => {
        impl<$($name: FromRedisValue),+> FromRedisValue for ($($name,)+) {
            fn from_redis_value(value: &Value) -> RedisResult<Self> {
                match value {
                    Value::Array(Some(items)) if items.len() == $len => {
                        Ok(($($name::from_redis_value(&items[$idx])?,)+))
                    }
                    _ => Err(type_error(value, concat!("array of length ", $len))),
                }
            }
        }
    };
}

impl_tuple_from_value!(1, A: 0);
impl_tuple_from_value!(2, A: 0, B: 1);
impl_tuple_from_value!(3, A: 0, B: 1, C: 2);
impl_tuple_from_value!(4, A: 0, B: 1, C: 2, D: 3);
impl_tuple_from_value!(5, A: 0, B: 1, C: 2, D: 3, E: 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bulk_string() {
        let v = Value::BulkString(Some(b"value1".to_vec()));
        assert_eq!(String::from_redis_value(&v).unwrap(), "value1");
    }

    #[test]
    fn decodes_array_of_strings() {
        let v = Value::Array(Some(vec![
            Value::BulkString(Some(b"value1".to_vec())),
            Value::BulkString(Some(b"value2".to_vec())),
        ]));
        let decoded: Vec<String> = FromRedisValue::from_redis_value(&v).unwrap();
        assert_eq!(decoded, vec!["value1".to_string(), "value2".to_string()]);
    }

    #[test]
    fn nil_bulk_string_is_none() {
        let v = Value::BulkString(None);
        let decoded: Option<String> = FromRedisValue::from_redis_value(&v).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn five_tuple_decodes_positionally() {
        let v = Value::Array(Some(vec![
            Value::BulkString(Some(b"a".to_vec())),
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::BulkString(Some(b"a".to_vec())),
        ]));
        let (g1, _i1, _i2, _i3, g2): (String, i64, i64, i64, String) =
            FromRedisValue::from_redis_value(&v).unwrap();
        assert_eq!(g1, g2);
    }
}
