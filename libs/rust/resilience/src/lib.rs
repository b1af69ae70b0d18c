//! Retry with exponential backoff and a circuit breaker for outbound calls.
use std::time::{Duration, Instant};
use thiserror::Error;
use parking_lot::Mutex;
use futures::Future;
use rand::Rng;
use tracing::{warn, debug};
use opentelemetry::{global, metrics::Counter};
use once_cell::sync::Lazy;

static RETRY_ATTEMPTS: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("registry-resilience")
        .u64_counter("registry_resilience_retry_attempts_total")
        .with_description("Total retry attempts executed")
        .build()
});

static CIRCUIT_OPEN: Lazy<Counter<u64>> = Lazy::new(|| {
    global::meter("registry-resilience")
        .u64_counter("registry_resilience_circuit_open_total")
        .with_description("Number of times circuit transitioned to open")
        .build()
});

#[derive(Debug, Error, PartialEq)]
pub enum ResilienceError<E> {
    #[error("circuit open")]
    CircuitOpen,
    #[error("{0}")]
    Inner(E),
}

/// Backoff schedule: `base_delay * 2^attempt`, capped at `max_delay`, with up
/// to `jitter` (fraction of the delay) added at random.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self { Self { attempts: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5), jitter: 0.2 } }
}

impl RetryPolicy {
    pub fn new(attempts: usize, base_delay: Duration) -> Self { Self { attempts, base_delay, ..Self::default() } }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.min(16)));
        let capped = exp.min(self.max_delay);
        if self.jitter <= 0.0 { return capped; }
        let extra = capped.as_secs_f64() * self.jitter * rand::thread_rng().gen_range(0.0..=1.0);
        capped + Duration::from_secs_f64(extra)
    }
}

/// Runs `f` until it succeeds, `policy.attempts` are used up, or `retryable`
/// rejects the error. At least one attempt is always made.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, mut retryable: impl FnMut(&E) -> bool, mut f: F) -> Result<T, E>
where F: FnMut() -> Fut, Fut: Future<Output = Result<T, E>> {
    let attempts = policy.attempts.max(1);
    let mut i = 0;
    loop {
        RETRY_ATTEMPTS.add(1, &[]);
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if i + 1 < attempts && retryable(&e) => {
                let delay = policy.delay_for(i as u32);
                debug!(attempt = i + 1, delay_ms = delay.as_millis() as u64, "retrying");
                tokio::time::sleep(delay).await;
                i += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState { Closed, Open, HalfOpen }

pub struct CircuitBreaker {
    state: Mutex<State>,
    half_open_after: Duration,
    failure_threshold: u32,
}

/// `trial` holds the start of the one call admitted while half-open.
struct State { failures: u32, opened_at: Option<Instant>, trial: Option<Instant> }

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, half_open_after: Duration) -> Self {
        Self { state: Mutex::new(State { failures: 0, opened_at: None, trial: None }), half_open_after, failure_threshold: failure_threshold.max(1) }
    }

    pub fn state(&self) -> BreakerState {
        let st = self.state.lock();
        match st.opened_at {
            None if st.trial.is_some() => BreakerState::HalfOpen,
            None => BreakerState::Closed,
            Some(opened) if opened.elapsed() >= self.half_open_after => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Whether a call may proceed. After the cool-down exactly one trial call is
    /// let through; others are refused until it reports. A trial that never
    /// reports is replaced after another cool-down.
    pub fn allow(&self) -> bool {
        let mut st = self.state.lock();
        let now = Instant::now();
        if let Some(started) = st.trial {
            if now.duration_since(started) < self.half_open_after { return false; }
            debug!("replacing abandoned half-open trial");
            st.trial = Some(now);
            return true;
        }
        if let Some(opened) = st.opened_at {
            if now.duration_since(opened) < self.half_open_after { return false; }
            debug!("half-open trial");
            st.opened_at = None;
            st.trial = Some(now);
        }
        true
    }

    pub fn record_success(&self) { let mut st = self.state.lock(); st.failures = 0; st.trial = None; }

    pub fn record_failure(&self) {
        let mut st = self.state.lock();
        st.failures += 1;
        if (st.trial.is_some() || st.failures >= self.failure_threshold) && st.opened_at.is_none() {
            st.opened_at = Some(Instant::now());
            st.trial = None;
            CIRCUIT_OPEN.add(1, &[]);
            warn!(failures = st.failures, "circuit opened");
        }
    }

    /// Guards one call. `counts_as_failure` decides which errors trip the breaker.
    pub async fn call<Fut, T, E>(&self, counts_as_failure: impl Fn(&E) -> bool, fut: Fut) -> Result<T, ResilienceError<E>>
    where Fut: Future<Output = Result<T, E>> {
        if !self.allow() { return Err(ResilienceError::CircuitOpen); }
        match fut.await {
            Ok(v) => { self.record_success(); Ok(v) }
            Err(e) => {
                if counts_as_failure(&e) { self.record_failure(); } else { self.record_success(); }
                Err(ResilienceError::Inner(e))
            }
        }
    }
}
