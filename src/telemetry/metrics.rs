//! Glitch activity counters
//!
//! Lock-free counters shared between the scheduler handle, the tick loop
//! and the host. Read them with [`GlitchStats::counters`].

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::glitch::RestoreReport;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlitchCounters {
    /// Probability checks performed
    pub ticks: u64,
    /// Checks that started a glitch
    pub triggers: u64,
    /// Glitches that ran their full duration
    pub completed: u64,
    /// Glitches cut short by a shutdown
    pub cancelled: u64,
    /// Glitch tasks that panicked
    pub panicked: u64,
    /// Per-surface restore failures
    pub restore_failures: u64,
    /// Glitches currently applied or waiting
    pub in_flight: usize,
}

impl GlitchCounters {
    /// Fraction of checks that triggered a glitch
    pub fn trigger_rate(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.triggers as f64 / self.ticks as f64
        }
    }
}

/// Shared glitch counters
#[derive(Debug, Default)]
pub struct GlitchStats {
    ticks: AtomicU64,
    triggers: AtomicU64,
    completed: AtomicU64,
    cancelled: AtomicU64,
    panicked: AtomicU64,
    restore_failures: AtomicU64,
    in_flight: AtomicUsize,
}

impl GlitchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trigger(&self) {
        self.triggers.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished(&self, cancelled: bool, report: &RestoreReport) {
        if cancelled {
            self.cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.record_restore(report);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restore(&self, report: &RestoreReport) {
        self.restore_failures
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
    }

    /// Read all counters
    pub fn counters(&self) -> GlitchCounters {
        GlitchCounters {
            ticks: self.ticks.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            restore_failures: self.restore_failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}
