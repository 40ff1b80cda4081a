//! Circuit breaker guarding calls to an out-of-process engine.

use instagate_sdk::{EngineError, EngineResult};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    open: bool,
    failures: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            service: service.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(Inner {
                open: false,
                failures: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if !inner.open {
            return CircuitState::Closed;
        }
        match inner.last_failure {
            Some(at) if at.elapsed() >= self.recovery_timeout => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }

    /// Fails fast with `CircuitBreakerOpen` while the circuit is open.
    pub fn check(&self) -> EngineResult<()> {
        if self.state() == CircuitState::Open {
            return Err(EngineError::CircuitBreakerOpen {
                service: self.service.clone(),
            });
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.open {
            tracing::info!(service = %self.service, "Circuit breaker closed");
        }
        inner.open = false;
        inner.failures = 0;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        if inner.failures >= self.failure_threshold && !inner.open {
            inner.open = true;
            tracing::warn!(
                service = %self.service,
                failures = inner.failures,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
        }
    }

    /// Count the outcome of a call. Only transport-level failures trip the
    /// breaker; an engine answering with a domain error is healthy.
    pub fn record<T>(&self, result: &EngineResult<T>) {
        match result {
            Err(e) if e.is_unavailable() => self.record_failure(),
            _ => self.record_success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new("engine", 3, Duration::from_secs(30));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
    }

    #[test]
    fn opens_after_threshold() {
        let cb = CircuitBreaker::new("engine", 3, Duration::from_secs(30));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(
            cb.check(),
            Err(EngineError::CircuitBreakerOpen { service }) if service == "engine"
        ));
    }

    #[test]
    fn success_resets_failures() {
        let cb = CircuitBreaker::new("engine", 2, Duration::from_secs(30));

        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn domain_errors_do_not_trip() {
        let cb = CircuitBreaker::new("engine", 1, Duration::from_secs(30));

        cb.record::<()>(&Err(EngineError::MediaNotFound("1".into())));
        cb.record::<()>(&Err(EngineError::RateLimited("slow down".into())));
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record::<()>(&Err(EngineError::timeout(Duration::from_secs(5))));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn unreachable_engine_trips() {
        let cb = CircuitBreaker::new("engine", 1, Duration::from_secs(30));
        cb.record::<()>(&Err(EngineError::backend_unavailable("down")));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new("engine", 1, Duration::from_millis(10));

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.check().is_ok());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
