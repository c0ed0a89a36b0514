use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight, allocation-free counters for operational visibility.
///
/// Mirrors the shape of a typical admission-path metrics struct: one
/// counter per outcome, cheap to clone and share across tasks.
#[derive(Clone, Default)]
pub struct Counters {
    pub reservation_accepted: Arc<AtomicU64>,
    pub reservation_rejected: Arc<AtomicU64>,
    pub on_demand_accepted: Arc<AtomicU64>,
    pub on_demand_rejected: Arc<AtomicU64>,
    pub store_errors: Arc<AtomicU64>,
    pub chain_refresh_ok: Arc<AtomicU64>,
    pub chain_refresh_failed: Arc<AtomicU64>,
}

impl Counters {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
