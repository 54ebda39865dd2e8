//! Circuit breaker around a printer's transport, grounded directly on the
//! teacher-adjacent printer daemon's `circuit_breaker` module. Trips after a
//! run of failures within a tracking window, fails fast while open, and
//! probes a single attempt in the half-open state before fully recovering.
//!
//! This is the mechanism behind §4.7's "retry with backoff": it decides
//! whether the per-printer worker even attempts a send, and feeds the
//! status monitor's `error` state when it trips.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub tracking_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(5 * 60),
            tracking_window: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStatus {
    pub printer_id: String,
    pub state: CircuitState,
    pub total_failures: u64,
    pub circuit_open_count: u64,
    pub recovery_count: u64,
}

struct State {
    current_state: CircuitState,
    failure_timestamps: Vec<Instant>,
    opened_at: Option<Instant>,
    total_failures: u64,
    circuit_open_count: u64,
    recovery_count: u64,
}

pub struct CircuitBreaker {
    printer_id: String,
    config: CircuitBreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(printer_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            printer_id: printer_id.into(),
            config,
            state: Mutex::new(State {
                current_state: CircuitState::Closed,
                failure_timestamps: Vec::new(),
                opened_at: None,
                total_failures: 0,
                circuit_open_count: 0,
                recovery_count: 0,
            }),
        }
    }

    /// Runs `operation` unless the circuit is open and its timeout hasn't
    /// elapsed yet, in which case it fails fast without calling `operation`
    /// at all. Success in `HalfOpen` closes the circuit; failure anywhere
    /// records a timestamp and may (re)open it.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.lock().unwrap();
            if state.current_state == CircuitState::Open {
                let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed < self.config.timeout {
                    return Err(CircuitBreakerError::Open);
                }
                log::info!("circuit breaker for {} entering half-open probe", self.printer_id);
                state.current_state = CircuitState::HalfOpen;
            }
        }

        match operation().await {
            Ok(value) => {
                let mut state = self.state.lock().unwrap();
                if state.current_state == CircuitState::HalfOpen {
                    state.current_state = CircuitState::Closed;
                    state.failure_timestamps.clear();
                    state.recovery_count += 1;
                    log::info!("circuit breaker for {} recovered", self.printer_id);
                }
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(e))
            }
        }
    }

    fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.total_failures += 1;
        state.failure_timestamps.push(now);
        let window = self.config.tracking_window;
        state
            .failure_timestamps
            .retain(|t| now.duration_since(*t) <= window);

        if state.current_state == CircuitState::HalfOpen
            || state.failure_timestamps.len() as u32 >= self.config.failure_threshold
        {
            if state.current_state != CircuitState::Open {
                state.circuit_open_count += 1;
                log::warn!(
                    "circuit breaker for {} tripped after {} failures",
                    self.printer_id,
                    state.failure_timestamps.len()
                );
            }
            state.current_state = CircuitState::Open;
            state.opened_at = Some(now);
        }
    }

    pub fn get_status(&self) -> CircuitBreakerStatus {
        let state = self.state.lock().unwrap();
        CircuitBreakerStatus {
            printer_id: self.printer_id.clone(),
            state: state.current_state,
            total_failures: state.total_failures,
            circuit_open_count: state.circuit_open_count,
            recovery_count: state.recovery_count,
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.current_state = CircuitState::Closed;
        state.failure_timestamps.clear();
        state.opened_at = None;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Operation(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new(
            "p1",
            CircuitBreakerConfig {
                failure_threshold: 3,
                timeout: Duration::from_secs(60),
                tracking_window: Duration::from_secs(60),
            },
        );

        for _ in 0..3 {
            let _ = cb.execute(|| async { Err::<(), _>("send failed") }).await;
        }

        assert_eq!(cb.get_status().state, CircuitState::Open);
        let result = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_success_recovers_to_closed() {
        let cb = CircuitBreaker::new(
            "p1",
            CircuitBreakerConfig {
                failure_threshold: 1,
                timeout: Duration::from_millis(10),
                tracking_window: Duration::from_secs(60),
            },
        );

        let _ = cb.execute(|| async { Err::<(), _>("send failed") }).await;
        assert_eq!(cb.get_status().state, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = cb.execute(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.get_status().state, CircuitState::Closed);
        assert_eq!(cb.get_status().recovery_count, 1);
    }
}
