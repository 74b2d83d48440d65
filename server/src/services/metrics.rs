//! Outcome counters for registration and response submission.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::models::StatusCode;

#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    registrations_succeeded: AtomicU64,
    registrations_failed: AtomicU64,
    requests_received: AtomicU64,
    requests_unmatched: AtomicU64,
    submissions_accepted: AtomicU64,
    submissions_failed: AtomicU64,
    status_codes: [AtomicU64; 6],
}

/// Point-in-time copy of [`CoordinatorMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub registrations_succeeded: u64,
    pub registrations_failed: u64,
    pub requests_received: u64,
    pub requests_unmatched: u64,
    pub submissions_accepted: u64,
    pub submissions_failed: u64,
    /// Submitted status codes, keyed by code value.
    pub status_codes: Vec<(u8, u64)>,
}

impl CoordinatorMetrics {
    pub fn record_registration(&self, succeeded: bool) {
        let counter = if succeeded {
            &self.registrations_succeeded
        } else {
            &self.registrations_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self, matched: bool) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
        if !matched {
            self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_submission(&self, status_code: StatusCode, accepted: bool) {
        self.status_codes[status_code.ordinal()].fetch_add(1, Ordering::Relaxed);
        let counter = if accepted {
            &self.submissions_accepted
        } else {
            &self.submissions_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registrations_succeeded: self.registrations_succeeded.load(Ordering::Relaxed),
            registrations_failed: self.registrations_failed.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_unmatched: self.requests_unmatched.load(Ordering::Relaxed),
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            status_codes: StatusCode::ALL
                .iter()
                .map(|code| (code.code(), self.status_codes[code.ordinal()].load(Ordering::Relaxed)))
                .collect(),
        }
    }
}
