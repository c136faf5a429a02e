//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base_ms` per attempt, never exceeds `max_ms`, and shaves up
/// to 10% off so concurrent retries do not line up.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 || base_ms == 0 {
        return Duration::ZERO;
    }

    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped - jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let first = calculate_backoff(1, 500, 5000);
        assert!((450..=500).contains(&first.as_millis()));

        let third = calculate_backoff(3, 500, 5000);
        assert!((1800..=2000).contains(&third.as_millis()));
    }

    #[test]
    fn never_exceeds_cap() {
        for attempt in 1..64 {
            assert!(calculate_backoff(attempt, 500, 5000) <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn zero_attempt_or_base_means_no_delay() {
        assert_eq!(calculate_backoff(0, 500, 5000), Duration::ZERO);
        assert_eq!(calculate_backoff(4, 0, 5000), Duration::ZERO);
    }
}
