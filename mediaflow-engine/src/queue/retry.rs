//! Retry backoff arithmetic

use std::time::Duration;

/// Ceiling applied to retry backoff, in seconds.
pub const MAX_BACKOFF_SECS: u64 = 60;

/// Backoff before retry attempt `retry_count`: `min(2^retry_count, 60)`
/// seconds.
///
/// `retry_count` is the job's counter after the failed attempt, so the first
/// retry waits 2s, the second 4s, and from the sixth on the cap holds.
pub fn backoff_delay(retry_count: u32) -> Duration {
    let secs = 1u64
        .checked_shl(retry_count)
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_caps_at_sixty_seconds() {
        assert_eq!(backoff_delay(6), Duration::from_secs(60));
        assert_eq!(backoff_delay(10), Duration::from_secs(60));
        assert_eq!(backoff_delay(100), Duration::from_secs(60));
    }
}
