use std::time::Duration;

/// Backoff before retry `n` (0-based) of a failed mini-batch. Rate limits
/// get the minute-scale schedule; everything else the second-scale one.
pub fn retry_delay(rate_limited: bool, attempt: u32) -> Duration {
    let base = if rate_limited { 60 } else { 5 };
    let shift = attempt.min(16);
    Duration::from_secs(base << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_use_the_minute_schedule() {
        assert_eq!(retry_delay(true, 0), Duration::from_secs(60));
        assert_eq!(retry_delay(true, 1), Duration::from_secs(120));
        assert_eq!(retry_delay(true, 2), Duration::from_secs(240));
    }

    #[test]
    fn other_failures_use_the_second_schedule() {
        assert_eq!(retry_delay(false, 0), Duration::from_secs(5));
        assert_eq!(retry_delay(false, 1), Duration::from_secs(10));
        assert_eq!(retry_delay(false, 2), Duration::from_secs(20));
    }
}
