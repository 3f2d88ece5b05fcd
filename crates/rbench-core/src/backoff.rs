use std::time::Duration;

/// Backoff between attempts of the same benchmark job.
///
/// Attempt 1: immediate
/// Attempt 2: 30s
/// Attempt 3: 2m
/// Attempt 4+: 10m
pub fn default_backoff(attempt_number: u32) -> Duration {
    let secs = match attempt_number {
        0 | 1 => 0,
        2 => 30,
        3 => 2 * 60,
        _ => 10 * 60,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule() {
        assert_eq!(default_backoff(1), Duration::ZERO);
        assert_eq!(default_backoff(2).as_secs(), 30);
        assert_eq!(default_backoff(3).as_secs(), 120);
        assert_eq!(default_backoff(4).as_secs(), 600);
        assert_eq!(default_backoff(12).as_secs(), 600);
    }
}
