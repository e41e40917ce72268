//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast to the fallback
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: rolling error rate >= threshold with min samples
//! Open → Half-Open: after reset timeout
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Design Decisions
//! - Per-backend breaker (not global)
//! - Fail fast in Open state: no network call is issued
//! - Single probe in Half-Open (prevents hammering a recovering backend)
//! - A completed call is a breaker success even if the envelope carries a
//!   business error; only transport failure and timeout count against the
//!   backend
//! - Transitions are published on a broadcast channel and logged

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::BreakerSettings;
use crate::envelope::Envelope;
use crate::observability::metrics;
use crate::resilience::TransportError;

/// Breaker state, reported on /health and carried by transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

/// State-change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerEvent {
    Opened,
    HalfOpened,
    Closed,
}

/// Rolling success/failure counts over the window, for health reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingStats {
    pub success_count: u64,
    pub failure_count: u64,
    /// Unix timestamp (seconds) at which the current window began.
    pub window_start: u64,
}

/// Point-in-time view of one breaker, for /health and /status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub rolling_stats: RollingStats,
    /// Unix timestamp (seconds) of the most recent open transition.
    pub last_opened_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    success: u64,
    failure: u64,
}

struct Inner {
    state: BreakerState,
    buckets: Vec<Bucket>,
    cursor: usize,
    last_rotate: Instant,
    window_start: SystemTime,
    opened_at: Option<Instant>,
    last_opened_unix: Option<u64>,
    probe_in_flight: bool,
}

/// Outcome of admission control for one call.
enum Permit<'a> {
    /// Normal pass-through while Closed.
    Pass,
    /// The single Half-Open trial call.
    Probe(ProbeGuard<'a>),
}

/// Releases the half-open probe slot if the call is abandoned.
///
/// Hyper drops a handler future when the client disconnects; without this
/// guard such a drop would leave `probe_in_flight` set and the breaker
/// short-circuiting forever. Reverting to Open restarts the cooldown.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.breaker.lock();
        if inner.state == BreakerState::HalfOpen && inner.probe_in_flight {
            inner.probe_in_flight = false;
            self.breaker.open(&mut inner);
            drop(inner);
            tracing::warn!(backend = %self.breaker.name, "Half-open probe abandoned");
            self.breaker
                .transition(BreakerState::Open, BreakerEvent::Opened);
        }
    }
}

/// Failure-isolating proxy around calls to one backend.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    bucket_width: Duration,
    inner: Mutex<Inner>,
    events: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        let buckets = settings.window_buckets.max(1);
        let bucket_width = settings.rolling_window() / buckets as u32;
        let (events, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            settings,
            bucket_width,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                buckets: vec![Bucket::default(); buckets],
                cursor: 0,
                last_rotate: Instant::now(),
                window_start: SystemTime::now(),
                opened_at: None,
                last_opened_unix: None,
                probe_in_flight: false,
            }),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Invoke a backend call through the breaker.
    ///
    /// Never returns a raw transport error: failures and timeouts yield the
    /// fixed SERVICE_UNAVAILABLE fallback envelope.
    pub async fn invoke<F, Fut>(&self, call: F) -> Envelope
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Envelope, TransportError>>,
    {
        let permit = match self.admit() {
            Some(p) => p,
            None => {
                tracing::debug!(backend = %self.name, "Breaker open, short-circuiting");
                metrics::record_short_circuit(&self.name);
                return Envelope::service_unavailable(&self.name);
            }
        };

        match tokio::time::timeout(self.settings.call_timeout(), call()).await {
            Ok(Ok(envelope)) => {
                // Business failure inside the envelope is still a completed
                // call: the backend is up.
                self.on_success(permit);
                envelope
            }
            Ok(Err(err)) => {
                tracing::warn!(backend = %self.name, error = %err, "Backend call failed");
                self.on_failure(permit);
                Envelope::service_unavailable(&self.name)
            }
            Err(_) => {
                tracing::warn!(
                    backend = %self.name,
                    timeout_ms = self.settings.call_timeout_ms,
                    "Backend call timed out"
                );
                self.on_failure(permit);
                Envelope::service_unavailable(&self.name)
            }
        }
    }

    /// Current state, stats and last-open time.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        rotate(&mut inner, self.bucket_width, self.settings.rolling_window());
        let (success, failure) = totals(&inner);
        BreakerSnapshot {
            state: inner.state,
            rolling_stats: RollingStats {
                success_count: success,
                failure_count: failure,
                window_start: unix_secs(inner.window_start),
            },
            last_opened_at: inner.last_opened_unix,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Counter updates never panic while the lock is held.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Decide whether a call may proceed. `None` means short-circuit.
    fn admit(&self) -> Option<Permit<'_>> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                rotate(&mut inner, self.bucket_width, self.settings.rolling_window());
                Some(Permit::Pass)
            }
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.settings.reset_timeout())
                    .unwrap_or(true);
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    drop(inner);
                    self.transition(BreakerState::HalfOpen, BreakerEvent::HalfOpened);
                    Some(Permit::Probe(ProbeGuard {
                        breaker: self,
                        armed: true,
                    }))
                } else {
                    None
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Permit::Probe(ProbeGuard {
                        breaker: self,
                        armed: true,
                    }))
                }
            }
        }
    }

    fn on_success(&self, permit: Permit<'_>) {
        match permit {
            Permit::Probe(mut guard) => {
                guard.armed = false;
                let mut inner = self.lock();
                inner.probe_in_flight = false;
                inner.state = BreakerState::Closed;
                reset_window(&mut inner);
                drop(inner);
                self.transition(BreakerState::Closed, BreakerEvent::Closed);
            }
            Permit::Pass => {
                let mut inner = self.lock();
                rotate(&mut inner, self.bucket_width, self.settings.rolling_window());
                let cursor = inner.cursor;
                inner.buckets[cursor].success += 1;
            }
        }
    }

    fn on_failure(&self, permit: Permit<'_>) {
        match permit {
            Permit::Probe(mut guard) => {
                guard.armed = false;
                let mut inner = self.lock();
                inner.probe_in_flight = false;
                self.open(&mut inner);
                drop(inner);
                self.transition(BreakerState::Open, BreakerEvent::Opened);
            }
            Permit::Pass => {
                let mut inner = self.lock();
                rotate(&mut inner, self.bucket_width, self.settings.rolling_window());
                let cursor = inner.cursor;
                inner.buckets[cursor].failure += 1;

                let (success, failure) = totals(&inner);
                let total = success + failure;
                let over_threshold = total >= u64::from(self.settings.min_samples)
                    && failure * 100 >= u64::from(self.settings.error_threshold_pct) * total;

                if inner.state == BreakerState::Closed && over_threshold {
                    self.open(&mut inner);
                    drop(inner);
                    self.transition(BreakerState::Open, BreakerEvent::Opened);
                }
            }
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.last_opened_unix = Some(unix_secs(SystemTime::now()));
    }

    fn transition(&self, to: BreakerState, event: BreakerEvent) {
        tracing::info!(backend = %self.name, state = to.as_str(), "Breaker state changed");
        metrics::record_breaker_state(&self.name, to.as_str());
        let _ = self.events.send(event);
    }
}

fn rotate(inner: &mut Inner, bucket_width: Duration, rolling_window: Duration) {
    let elapsed = inner.last_rotate.elapsed();
    if elapsed < bucket_width {
        return;
    }
    let steps = (elapsed.as_nanos() / bucket_width.as_nanos().max(1)) as usize;
    let count = inner.buckets.len();
    if steps >= count {
        reset_window(inner);
        return;
    }
    for _ in 0..steps {
        inner.cursor = (inner.cursor + 1) % count;
        inner.buckets[inner.cursor] = Bucket::default();
    }
    inner.last_rotate += bucket_width * steps as u32;
    // The reported window trails the present by the configured length.
    inner.window_start = SystemTime::now()
        .checked_sub(rolling_window)
        .unwrap_or(SystemTime::UNIX_EPOCH);
}

fn reset_window(inner: &mut Inner) {
    for bucket in &mut inner.buckets {
        *bucket = Bucket::default();
    }
    inner.cursor = 0;
    inner.last_rotate = Instant::now();
    inner.window_start = SystemTime::now();
}

fn totals(inner: &Inner) -> (u64, u64) {
    inner
        .buckets
        .iter()
        .fold((0, 0), |(s, f), b| (s + b.success, f + b.failure))
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
