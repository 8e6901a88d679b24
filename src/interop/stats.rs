//! Boundary crossing counters

use super::registry::RegistryStats;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct CallCounters {
    host_to_guest: AtomicU64,
    guest_to_host: AtomicU64,
    translated_errors: AtomicU64,
}

impl CallCounters {
    pub fn record_host_to_guest(&self) {
        self.host_to_guest.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_guest_to_host(&self) {
        self.guest_to_host.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_translated_error(&self) {
        self.translated_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Process-wide counters
pub fn counters() -> &'static CallCounters {
    static COUNTERS: Lazy<CallCounters> = Lazy::new(CallCounters::default);
    &COUNTERS
}

/// Snapshot reported by `Bridge::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub host_to_guest_calls: u64,
    pub guest_to_host_calls: u64,
    pub translated_errors: u64,
    pub registry: RegistryStats,
}

impl BridgeStats {
    pub fn capture(registry: RegistryStats) -> Self {
        let c = counters();
        Self {
            host_to_guest_calls: c.host_to_guest.load(Ordering::Relaxed),
            guest_to_host_calls: c.guest_to_host.load(Ordering::Relaxed),
            translated_errors: c.translated_errors.load(Ordering::Relaxed),
            registry,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| String::from("{}"))
    }
}
