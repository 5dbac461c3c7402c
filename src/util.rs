macro_rules! time_debug {
    ($name:expr, $f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();
        log::debug!("{} (took {:?})", $name, end.duration_since(start));
        result
    }};
}

macro_rules! time {
    ($f:block) => {{
        let start = std::time::Instant::now();
        let result = $f;
        let end = std::time::Instant::now();

        (result, end.duration_since(start))
    }};
}

/// Multiplier shared by all structural hashes so persisted hashes stay
/// stable across runs and builds.
pub const MAGIC_HASH_CONSTANT: u32 = 39;

/// Hashes a string the same way on every platform.
pub fn hash_str(s: &str) -> u32 {
    s.bytes().fold(0u32, |res, b| {
        res.wrapping_mul(MAGIC_HASH_CONSTANT)
            .wrapping_add(u32::from(b))
    })
}

/// Folds a sequence of structural hashes into one wide lookup hash
/// (`h = 31 * h + x`).
pub fn polynomial_hash<I>(hashes: I) -> u64
where
    I: IntoIterator<Item = u32>,
{
    hashes.into_iter().fold(1u64, |hash, h| {
        hash.wrapping_mul(31).wrapping_add(u64::from(h))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_hash_is_order_sensitive() {
        assert_ne!(hash_str("ab"), hash_str("ba"));
        assert_eq!(hash_str(""), 0);
        assert_eq!(hash_str("a"), 97);
    }

    #[test]
    fn polynomial_hash_of_empty_sequence_is_one() {
        assert_eq!(polynomial_hash(Vec::new()), 1);
        assert_eq!(polynomial_hash(vec![2]), 33);
    }
}
