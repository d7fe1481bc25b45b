use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use http::StatusCode;

use crate::error::Error;
use crate::util::{lock_unpoisoned, saturating_millis};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpClientMetricsSnapshot {
    pub requests_started: u64,
    pub requests_accepted: u64,
    pub requests_rejected: u64,
    pub attempts: u64,
    pub retries: u64,
    pub transport_faults: u64,
    pub unacceptable_statuses: u64,
    pub cancellations: u64,
    pub in_flight: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct HttpClientMetrics {
    inner: Arc<HttpClientMetricsInner>,
}

#[derive(Debug, Default)]
struct HttpClientMetricsInner {
    requests_started: AtomicU64,
    requests_accepted: AtomicU64,
    requests_rejected: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    transport_faults: AtomicU64,
    unacceptable_statuses: AtomicU64,
    cancellations: AtomicU64,
    in_flight: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    metrics: HttpClientMetrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl HttpClientMetrics {
    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// One attempt that produced a response, acceptable or not.
    pub(crate) fn record_status(&self, status: StatusCode, acceptable: bool) {
        self.add_status_count(status.as_u16());
        if !acceptable {
            self.inner
                .unacceptable_statuses
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// One attempt that ended without a response.
    pub(crate) fn record_fault(&self, error: &Error) {
        if error.is_cancelled() {
            self.inner.cancellations.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.transport_faults.fetch_add(1, Ordering::Relaxed);
        }
        self.add_error_count(error.code().as_str().to_owned());
    }

    pub(crate) fn record_request_completed(&self, accepted: bool, latency: Duration) {
        if accepted {
            self.inner.requests_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.requests_rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(latency);
    }

    pub(crate) fn snapshot(&self) -> HttpClientMetricsSnapshot {
        let latency_samples = self.inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = self.inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        HttpClientMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_accepted: self.inner.requests_accepted.load(Ordering::Relaxed),
            requests_rejected: self.inner.requests_rejected.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            transport_faults: self.inner.transport_faults.load(Ordering::Relaxed),
            unacceptable_statuses: self.inner.unacceptable_statuses.load(Ordering::Relaxed),
            cancellations: self.inner.cancellations.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&self.inner.error_counts).clone(),
        }
    }

    fn record_latency(&self, latency: Duration) {
        let latency_ms = saturating_millis(latency);
        self.inner
            .latency_total_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.inner.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn add_status_count(&self, status: u16) {
        let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    fn add_error_count(&self, key: String) {
        let mut error_counts = lock_unpoisoned(&self.inner.error_counts);
        *error_counts.entry(key).or_insert(0) += 1;
    }
}
