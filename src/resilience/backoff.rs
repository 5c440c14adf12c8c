//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before the `retry`-th retry: `base_ms * 2^(retry-1)`, capped at
/// `max_ms`. With `jitter`, up to 10% of the delay is added on top.
pub fn calculate_backoff(retry: u32, base_ms: u64, max_ms: u64, jitter: bool) -> Duration {
    if retry == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(retry - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let extra = if jitter && jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        assert_eq!(calculate_backoff(0, 150, 2000, false), Duration::ZERO);
        assert_eq!(calculate_backoff(1, 150, 2000, false), Duration::from_millis(150));
        assert_eq!(calculate_backoff(2, 150, 2000, false), Duration::from_millis(300));
        assert_eq!(calculate_backoff(10, 150, 1000, false), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        for _ in 0..50 {
            let d = calculate_backoff(2, 100, 2000, true).as_millis();
            assert!((200..220).contains(&d));
        }
    }
}
