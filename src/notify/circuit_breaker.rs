use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls go through.
    Closed,
    /// Too many consecutive failures; calls are refused until the timeout passes.
    Open,
    /// Timeout passed; the next call is a trial.
    HalfOpen,
}

/// Guards an unreliable downstream so a dead endpoint is not hammered on
/// every settlement.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self::with_timeout(failure_threshold, Duration::from_secs(timeout_seconds))
    }

    pub fn with_timeout(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn can_execute(&self) -> bool {
        let current = self.state();
        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock().unwrap_or_else(|p| p.into_inner());
                match opened_at.map(|at| at.elapsed()) {
                    Some(elapsed) if elapsed >= self.timeout => {
                        *self.state.write().unwrap_or_else(|p| p.into_inner()) = CircuitState::HalfOpen;
                        info!("Circuit breaker transitioning to HalfOpen state");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());

        match *state {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *state = CircuitState::Open;
                self.mark_opened();
                error!(
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    failures, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                self.mark_opened();
                warn!("Circuit breaker trial call failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn mark_opened(&self) {
        *self.opened_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
    }
}
