//! CRC16 slot computation and hash-tag extraction (spec.md §4.7 step 1).
//! Grounded on `glide-core/redis-rs/redis/src/cluster_topology.rs`'s
//! `slot`/`get_hashtag`/`get_slot` functions — same CRC16/XMODEM table and
//! hash-tag rule, same 16384-slot space, computed with the same `crc16`
//! crate that file, the teacher's `cluster` feature, and `rustis` all use
//! for this.

use crc16::{State, XMODEM};

pub const SLOT_COUNT: u16 = 16384;

/// Extracts the `{...}` hash-tag substring from a key, per spec.md §4.7
/// and the GLOSSARY: "substring inside `{…}` used as the hashing input
/// when non-empty".
fn hash_tag(key: &[u8]) -> &[u8] {
    if let Some(open) = key.iter().position(|&b| b == b'{') {
        if let Some(close_rel) = key[open + 1..].iter().position(|&b| b == b'}') {
            let close = open + 1 + close_rel;
            if close > open + 1 {
                return &key[open + 1..close];
            }
        }
    }
    key
}

/// Computes the cluster slot (0..16383) for a key, honoring hash tags so
/// multi-key commands sharing a `{tag}` always land on the same slot
/// (spec.md §8 P4).
pub fn slot_for_key(key: &[u8]) -> u16 {
    State::<XMODEM>::calculate(hash_tag(key)) % SLOT_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_within_range() {
        for key in ["foo", "bar", "{user1000}.following", "", "a"] {
            assert!(slot_for_key(key.as_bytes()) < SLOT_COUNT);
        }
    }

    #[test]
    fn p4_equal_hash_tags_share_a_slot() {
        let a = slot_for_key(b"{user1000}.following");
        let b = slot_for_key(b"{user1000}.followers");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_hash_tag_falls_back_to_whole_key() {
        let a = slot_for_key(b"foo{}bar");
        let b = slot_for_key(b"foo{}bar");
        assert_eq!(a, b);
        assert_ne!(slot_for_key(b"foo{}bar"), slot_for_key(b"foo{}baz"));
    }

    #[test]
    fn known_vector_matches_redis_cluster() {
        // Published Redis Cluster test vector: CRC16("123456789") = 0x31C3.
        assert_eq!(State::<XMODEM>::calculate(b"123456789"), 0x31C3);
    }
}
