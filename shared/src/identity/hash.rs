//! Platform-independent string and integer hashing shared by every peer.
//!
//! Strings are folded over their UTF-16 code units so that peers written against
//! different string encodings agree on the result.

pub const DEFAULT_HASH_SEED: i64 = 19;

/// `hash * 31 + unit` over the UTF-16 code units of `value`, seeded by `initial`.
pub fn hash_str(initial: i64, value: &str) -> i64 {
    value.encode_utf16().fold(initial, |hash, unit| {
        hash.wrapping_mul(31).wrapping_add(i64::from(unit))
    })
}

/// `initial * 31 + (value + 1)`.
pub fn hash_i64(initial: i64, value: i64) -> i64 {
    initial.wrapping_mul(31).wrapping_add(value.wrapping_add(1))
}
