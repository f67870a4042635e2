//! Lock-free kiosk metrics and periodic reporting
//!
//! Counters are plain atomics so the kiosk loop, the worker tasks and the
//! Prometheus endpoint can all touch them without locking.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::session::KioskState;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Backend call latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];
pub const METRICS_NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    std::array::from_fn(|i| buckets[i].load(Ordering::Relaxed))
}

/// State gauge values for Prometheus
pub fn state_gauge(state: KioskState) -> u64 {
    match state {
        KioskState::Scan => 0,
        KioskState::Payment => 1,
        KioskState::StatusSuccess => 2,
        KioskState::StatusFail => 3,
        KioskState::Assistance => 4,
    }
}

/// Which backend collaborator a latency sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendCall {
    Validation,
    Settlement,
}

pub struct Metrics {
    /// Tickets submitted for validation
    validations_total: AtomicU64,
    validations_failed: AtomicU64,
    /// Settlement attempts and their outcomes
    settlements_total: AtomicU64,
    settlements_succeeded: AtomicU64,
    settlements_failed: AtomicU64,
    /// Card forms rejected locally (never sent)
    card_forms_rejected: AtomicU64,
    /// Countdown expiries
    payment_timeouts: AtomicU64,
    /// Attendant calls, any reason
    assistance_requests: AtomicU64,
    /// Backend responses dropped because their session was gone
    stale_responses: AtomicU64,
    /// Side-effect commands dropped because a worker queue was full
    side_effects_dropped: AtomicU64,
    /// Barrier open commands the relay accepted
    barrier_opens: AtomicU64,
    barrier_open_failures: AtomicU64,
    current_state: AtomicU64,
    validation_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    validation_latency_sum_ms: AtomicU64,
    settlement_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    settlement_latency_sum_ms: AtomicU64,
    backend_latency_max_ms: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            validations_total: AtomicU64::new(0),
            validations_failed: AtomicU64::new(0),
            settlements_total: AtomicU64::new(0),
            settlements_succeeded: AtomicU64::new(0),
            settlements_failed: AtomicU64::new(0),
            card_forms_rejected: AtomicU64::new(0),
            payment_timeouts: AtomicU64::new(0),
            assistance_requests: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            side_effects_dropped: AtomicU64::new(0),
            barrier_opens: AtomicU64::new(0),
            barrier_open_failures: AtomicU64::new(0),
            current_state: AtomicU64::new(state_gauge(KioskState::Scan)),
            validation_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            validation_latency_sum_ms: AtomicU64::new(0),
            settlement_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            settlement_latency_sum_ms: AtomicU64::new(0),
            backend_latency_max_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_validation(&self, ok: bool) {
        self.validations_total.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.validations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_settlement(&self, ok: bool) {
        self.settlements_total.fetch_add(1, Ordering::Relaxed);
        if ok {
            self.settlements_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.settlements_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_card_form_rejected(&self) {
        self.card_forms_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_payment_timeout(&self) {
        self.payment_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_assistance(&self) {
        self.assistance_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_side_effect_dropped(&self) {
        self.side_effects_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_barrier_open(&self, ok: bool) {
        if ok {
            self.barrier_opens.fetch_add(1, Ordering::Relaxed);
        } else {
            self.barrier_open_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn set_state(&self, state: KioskState) {
        self.current_state.store(state_gauge(state), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backend_latency(&self, call: BackendCall, latency_ms: u64) {
        let (buckets, sum) = match call {
            BackendCall::Validation => {
                (&self.validation_latency_buckets, &self.validation_latency_sum_ms)
            }
            BackendCall::Settlement => {
                (&self.settlement_latency_buckets, &self.settlement_latency_sum_ms)
            }
        };
        buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        sum.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.backend_latency_max_ms, latency_ms);
    }

    /// Snapshot all counters (monotonic, nothing is reset)
    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            validations_total: self.validations_total.load(Ordering::Relaxed),
            validations_failed: self.validations_failed.load(Ordering::Relaxed),
            settlements_total: self.settlements_total.load(Ordering::Relaxed),
            settlements_succeeded: self.settlements_succeeded.load(Ordering::Relaxed),
            settlements_failed: self.settlements_failed.load(Ordering::Relaxed),
            card_forms_rejected: self.card_forms_rejected.load(Ordering::Relaxed),
            payment_timeouts: self.payment_timeouts.load(Ordering::Relaxed),
            assistance_requests: self.assistance_requests.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            side_effects_dropped: self.side_effects_dropped.load(Ordering::Relaxed),
            barrier_opens: self.barrier_opens.load(Ordering::Relaxed),
            barrier_open_failures: self.barrier_open_failures.load(Ordering::Relaxed),
            current_state: self.current_state.load(Ordering::Relaxed),
            validation_latency_buckets: load_buckets(&self.validation_latency_buckets),
            validation_latency_sum_ms: self.validation_latency_sum_ms.load(Ordering::Relaxed),
            settlement_latency_buckets: load_buckets(&self.settlement_latency_buckets),
            settlement_latency_sum_ms: self.settlement_latency_sum_ms.load(Ordering::Relaxed),
            backend_latency_max_ms: self.backend_latency_max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub validations_total: u64,
    pub validations_failed: u64,
    pub settlements_total: u64,
    pub settlements_succeeded: u64,
    pub settlements_failed: u64,
    pub card_forms_rejected: u64,
    pub payment_timeouts: u64,
    pub assistance_requests: u64,
    pub stale_responses: u64,
    pub side_effects_dropped: u64,
    pub barrier_opens: u64,
    pub barrier_open_failures: u64,
    pub current_state: u64,
    pub validation_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub validation_latency_sum_ms: u64,
    pub settlement_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub settlement_latency_sum_ms: u64,
    pub backend_latency_max_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            validations = %self.validations_total,
            validations_failed = %self.validations_failed,
            settlements = %self.settlements_total,
            settlements_ok = %self.settlements_succeeded,
            settlements_failed = %self.settlements_failed,
            card_rejected = %self.card_forms_rejected,
            timeouts = %self.payment_timeouts,
            assistance = %self.assistance_requests,
            stale = %self.stale_responses,
            barrier_failed = %self.barrier_open_failures,
            backend_max_ms = %self.backend_latency_max_ms,
            "metrics"
        );
    }
}
