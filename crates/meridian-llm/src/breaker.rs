use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use meridian_core::config::CircuitBreakerConfig;

use crate::error::{LlmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    /// One probe call is in flight; success closes, failure re-opens.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Stateful gate in front of one logical LLM operation.
///
/// After `failure_threshold` consecutive failures the breaker opens and
/// calls fail fast for `reset_timeout_seconds`, after which a single probe
/// is allowed through.
pub struct CircuitBreaker {
    operation: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    enabled: bool,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(operation: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            operation: operation.into(),
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_secs_f64(config.reset_timeout_seconds),
            enabled: config.enabled,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Gate a call. `Err(CircuitOpen)` means fail fast without calling out.
    pub fn check(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.reset_timeout {
                    info!(operation = %self.operation, "circuit half-open; allowing probe");
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(LlmError::CircuitOpen {
                        operation: self.operation.clone(),
                    })
                }
            }
        }
    }

    pub fn record_success(&self) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!(operation = %self.operation, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        if !self.enabled {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        let should_open = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.failure_threshold;
        if should_open && inner.state != BreakerState::Open {
            warn!(
                operation = %self.operation,
                failures = inner.consecutive_failures,
                "circuit opened"
            );
        }
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.enabled && self.inner.lock().unwrap().state == BreakerState::Open
    }
}
