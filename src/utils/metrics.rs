//! Observability and Metrics
//!
//! Atomic counters for connection handling, event dispatch, interoperability
//! calls and migrations. One [`Metrics`] instance is owned by each process
//! context and shared by handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for one server process
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted
    pub connections_total: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Frames handed to the dispatcher
    pub packets_received: AtomicU64,
    /// Frames written to clients
    pub packets_sent: AtomicU64,
    /// Events whose validate stage returned Drop
    pub packets_dropped: AtomicU64,
    /// Events whose validate stage returned Deny
    pub packets_denied: AtomicU64,
    /// Events that faulted in validate or apply
    pub packets_faulted: AtomicU64,
    /// Interoperability calls issued
    pub rpc_calls: AtomicU64,
    /// Interoperability calls that failed (timeout, disconnect, reset)
    pub rpc_failures: AtomicU64,
    /// Interoperability requests served
    pub rpc_served: AtomicU64,
    /// Tickets handed to clients
    pub migrations_granted: AtomicU64,
    /// Migration attempts that ended denied
    pub migrations_denied: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            packets_denied: AtomicU64::new(0),
            packets_faulted: AtomicU64::new(0),
            rpc_calls: AtomicU64::new(0),
            rpc_failures: AtomicU64::new(0),
            rpc_served: AtomicU64::new(0),
            migrations_granted: AtomicU64::new(0),
            migrations_denied: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_denied(&self) {
        self.packets_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_faulted(&self) {
        self.packets_faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_call(&self) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_failure(&self) {
        self.rpc_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rpc_served(&self) {
        self.rpc_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migration_granted(&self) {
        self.migrations_granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn migration_denied(&self) {
        self.migrations_denied.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_denied: self.packets_denied.load(Ordering::Relaxed),
            packets_faulted: self.packets_faulted.load(Ordering::Relaxed),
            rpc_calls: self.rpc_calls.load(Ordering::Relaxed),
            rpc_failures: self.rpc_failures.load(Ordering::Relaxed),
            rpc_served: self.rpc_served.load(Ordering::Relaxed),
            migrations_granted: self.migrations_granted.load(Ordering::Relaxed),
            migrations_denied: self.migrations_denied.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            packets_dropped = snapshot.packets_dropped,
            packets_denied = snapshot.packets_denied,
            packets_faulted = snapshot.packets_faulted,
            rpc_calls = snapshot.rpc_calls,
            rpc_failures = snapshot.rpc_failures,
            rpc_served = snapshot.rpc_served,
            migrations_granted = snapshot.migrations_granted,
            migrations_denied = snapshot.migrations_denied,
            uptime_seconds = snapshot.uptime_seconds,
            "Process metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub packets_denied: u64,
    pub packets_faulted: u64,
    pub rpc_calls: u64,
    pub rpc_failures: u64,
    pub rpc_served: u64,
    pub migrations_granted: u64,
    pub migrations_denied: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
