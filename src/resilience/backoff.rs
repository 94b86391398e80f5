//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay to wait after the `attempt`-th failure (1-based).
///
/// The schedule is `base * 2^(attempt-1)` plus up to 10% jitter, capped at
/// `max_ms`. Because each uncapped step at least doubles, the jittered
/// schedule never decreases.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);

    let jitter_range = delay_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 200, 2000);
        assert!(b1.as_millis() >= 200 && b1.as_millis() < 220);

        let b2 = calculate_backoff(2, 200, 2000);
        assert!(b2.as_millis() >= 400);

        let max = calculate_backoff(10, 200, 2000);
        assert_eq!(max.as_millis(), 2000);
    }

    #[test]
    fn schedule_never_decreases() {
        for _ in 0..100 {
            let mut previous = Duration::ZERO;
            for attempt in 1..12 {
                let delay = calculate_backoff(attempt, 150, 2000);
                assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
                previous = delay;
            }
        }
    }

    #[test]
    fn huge_attempts_saturate_at_cap() {
        assert_eq!(calculate_backoff(200, 200, 2000), Duration::from_millis(2000));
    }
}
