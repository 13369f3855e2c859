//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only when the registry is created
//! - Atomic, so a snapshot can be taken from another thread

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one tree.
///
/// Relaxed ordering throughout; counters are independent.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    records_inserted: AtomicU64,
    records_updated: AtomicU64,
    records_removed: AtomicU64,
    records_read: AtomicU64,
    bytes_written: AtomicU64,
    splits: AtomicU64,
    groups_created: AtomicU64,
    promotions: AtomicU64,
    collapses: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Container traffic

    pub fn record_inserted(&self, bytes: usize) {
        self.records_inserted.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_updated(&self, bytes: usize) {
        self.records_updated.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_removed(&self) {
        self.records_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    // Page fitting

    pub fn increment_splits(&self) {
        self.splits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_groups(&self) {
        self.groups_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_collapses(&self) {
        self.collapses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            records_updated: self.records_updated.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            splits: self.splits.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            collapses: self.collapses.load(Ordering::Relaxed),
        }
    }

    /// Current values as a JSON object with a fixed key order
    pub fn to_json(&self) -> String {
        // MetricsSnapshot only holds integers
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_inserted: u64,
    pub records_updated: u64,
    pub records_removed: u64,
    pub records_read: u64,
    pub bytes_written: u64,
    pub splits: u64,
    pub groups_created: u64,
    pub promotions: u64,
    pub collapses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_bytes_accumulate() {
        let registry = MetricsRegistry::new();
        registry.record_inserted(100);
        registry.record_updated(50);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.records_inserted, 1);
        assert_eq!(snapshot.records_updated, 1);
        assert_eq!(snapshot.bytes_written, 150);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.increment_splits();
        registry.increment_groups();
        registry.increment_groups();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["splits"], 1);
        assert_eq!(parsed["groups_created"], 2);
        assert_eq!(parsed["promotions"], 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.record_read();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.snapshot().records_read, 800);
    }
}
