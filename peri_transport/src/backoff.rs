use std::time::Duration;

/// `base * 2^(attempt-1)`, capped at `cap`. `attempt` is 1-based (the delay
/// before the *first* retry, i.e. the second overall attempt, is `base`).
pub fn delay_for_attempt(base: Duration, attempt: u32, cap: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let scaled = base.saturating_mul(1u32 << shift);
    scaled.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_each_attempt_until_capped() {
        let base = Duration::from_millis(500);
        let cap = Duration::from_secs(5);
        assert_eq!(delay_for_attempt(base, 1, cap), Duration::from_millis(500));
        assert_eq!(delay_for_attempt(base, 2, cap), Duration::from_millis(1000));
        assert_eq!(delay_for_attempt(base, 3, cap), Duration::from_millis(2000));
        assert_eq!(delay_for_attempt(base, 4, cap), Duration::from_millis(4000));
        assert_eq!(delay_for_attempt(base, 5, cap), cap);
        assert_eq!(delay_for_attempt(base, 20, cap), cap);
    }
}
