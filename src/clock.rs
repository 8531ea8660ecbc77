//! High-resolution clock readings for transaction ids and suffixes.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Nanoseconds since the Unix epoch.
pub fn now_nanos() -> i64 {
    let now = Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// Hands out clock readings that never repeat or go backwards.
#[derive(Debug, Default)]
pub struct TickSource {
    last: AtomicI64,
}

impl TickSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = now_nanos();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
