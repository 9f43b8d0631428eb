//! Counters and gauges the services report in their logs

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic count shared by all clones
#[derive(Clone)]
pub struct Counter {
    name: Arc<str>,
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Last observed level, e.g. orders still open at a provider
#[derive(Clone)]
pub struct Gauge {
    name: Arc<str>,
    value: Arc<AtomicI64>,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            value: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
