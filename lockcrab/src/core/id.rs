//! Random identifiers and jitter

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::time::Duration;

const DEFAULT_ID_BYTES: usize = 32;

/// Generate `<prefix>_<hex>` from `size` bytes of OS randomness.
///
/// Sizes outside `1..100` fall back to 32 bytes. The result only contains
/// `[0-9a-z_]` characters plus the prefix, so it is safe to carry in headers
/// and URLs without escaping.
pub fn generate_id(prefix: &str, size: usize) -> String {
    let size = if size == 0 || size >= 100 {
        DEFAULT_ID_BYTES
    } else {
        size
    };
    let mut bytes = vec![0u8; size];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}_{}", hex::encode(bytes))
}

/// Uniformly random duration in `[0, max)` with millisecond granularity
pub fn random_duration(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id("tok", 32);
        assert!(id.starts_with("tok_"));
        assert_eq!(id.len(), 4 + 64);
        assert_ne!(id, generate_id("tok", 32));
    }

    #[test]
    fn test_generate_id_size_fallback() {
        assert_eq!(generate_id("lok", 0).len(), 4 + 64);
        assert_eq!(generate_id("lok", 500).len(), 4 + 64);
        assert_eq!(generate_id("lok", 8).len(), 4 + 16);
    }

    #[test]
    fn test_random_duration_bounds() {
        let max = Duration::from_millis(50);
        for _ in 0..1000 {
            assert!(random_duration(max) < max);
        }
        assert_eq!(random_duration(Duration::ZERO), Duration::ZERO);
        assert_eq!(random_duration(Duration::from_micros(500)), Duration::ZERO);
    }
}
