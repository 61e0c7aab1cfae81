//! Key parsing

/// Parse a decimal key string into its numeric key.
///
/// Keys are expected to be ASCII digits that fit in 64 bits. Nothing is
/// validated: other bytes contribute `byte - b'0'` and overflow wraps, so
/// malformed input maps to some key instead of failing.
///
/// ```
/// use slotkv_client::parse_key;
///
/// assert_eq!(parse_key("0"), 0);
/// assert_eq!(parse_key("18446744073709551614"), u64::MAX - 1);
/// ```
pub fn parse_key(key: &str) -> u64 {
    key.bytes().fold(0u64, |sum, b| {
        sum.wrapping_mul(10)
            .wrapping_add(u64::from(b).wrapping_sub(u64::from(b'0')))
    })
}
