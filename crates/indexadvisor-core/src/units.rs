//! Byte/megabyte conversions shared by configuration and the selection algorithm
//!
//! The advisor uses decimal megabytes (1 MB = 1_000_000 bytes) throughout, matching
//! the published constant in the system this advisor is modeled on.

/// Bytes per megabyte, decimal
pub const BYTES_PER_MB: u64 = 1_000_000;

/// Convert a megabyte budget to bytes
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb * BYTES_PER_MB
}

/// Convert a byte quantity to megabytes for ratio computations
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_whole_megabytes() {
        assert_eq!(mb_to_bytes(20), 20_000_000);
        assert_eq!(bytes_to_mb(20_000_000), 20.0);
    }

    #[test]
    fn fractional_megabytes() {
        assert!((bytes_to_mb(1) - 0.000_001).abs() < 1e-12);
    }
}
