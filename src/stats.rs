//! Per-forwarder statistics.
//!
//! Counters are relaxed atomics written only by the owning relay loop and
//! read by `snapshot()`/`report()` callers; a reader may see a slightly
//! stale value, never a corrupted one. Derived rates are computed on the
//! snapshot side.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::forwarder::ForwarderState;

#[derive(Default)]
pub struct ForwarderStats {
    packets_received: AtomicU64,
    packets_forwarded: AtomicU64,
    packets_filtered: AtomicU64,
    bytes_forwarded: AtomicU64,
    send_errors: AtomicU64,
    silence_warnings: AtomicU64,
    start_time: Mutex<Option<Instant>>,
    system_ids_seen: Mutex<BTreeSet<u8>>,
}

impl ForwarderStats {
    pub fn mark_started(&self) {
        let mut start = self.start_time.lock();
        if start.is_none() {
            *start = Some(Instant::now());
        }
    }

    pub fn note_system_id(&self, system_id: u8) {
        self.system_ids_seen.lock().insert(system_id);
    }

    /// A matching frame was relayed downstream.
    ///
    /// `packets_received` is bumped before the outcome counter so a
    /// concurrent snapshot never sees received lag behind
    /// forwarded + filtered.
    pub fn record_forwarded(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// A non-matching frame was dropped.
    pub fn record_filtered(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.packets_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// A matching frame could not be sent; it is dropped, so it counts as
    /// filtered to keep received == forwarded + filtered.
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        self.record_filtered();
    }

    pub fn record_silence_warning(&self) {
        self.silence_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        vehicle_id: u32,
        expected_system_id: u8,
        state: ForwarderState,
    ) -> StatsSnapshot {
        let elapsed = (*self.start_time.lock())
            .map(|start| start.elapsed())
            .unwrap_or_default();

        // Read the outcome counters before the received counter, mirroring
        // the write order in record_forwarded/record_filtered.
        let packets_forwarded = self.packets_forwarded.load(Ordering::Relaxed);
        let packets_filtered = self.packets_filtered.load(Ordering::Relaxed);
        let packets_received = self.packets_received.load(Ordering::Relaxed);

        StatsSnapshot {
            vehicle_id,
            expected_system_id,
            state,
            elapsed,
            packets_received,
            packets_forwarded,
            packets_filtered,
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            silence_warnings: self.silence_warnings.load(Ordering::Relaxed),
            system_ids_seen: self.system_ids_seen.lock().iter().copied().collect(),
        }
    }
}

/// Point-in-time view of one forwarder's counters plus derived metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub vehicle_id: u32,
    pub expected_system_id: u8,
    pub state: ForwarderState,
    pub elapsed: Duration,
    pub packets_received: u64,
    pub packets_forwarded: u64,
    pub packets_filtered: u64,
    pub bytes_forwarded: u64,
    pub send_errors: u64,
    pub silence_warnings: u64,
    /// Sorted, for deterministic output.
    pub system_ids_seen: Vec<u8>,
}

impl StatsSnapshot {
    pub fn forward_rate_hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.packets_forwarded as f64 / secs
    }

    pub fn filter_percentage(&self) -> f64 {
        if self.packets_received == 0 {
            return 0.0;
        }
        self.packets_filtered as f64 / self.packets_received as f64 * 100.0
    }

    pub fn bandwidth_kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        (self.bytes_forwarded as f64 * 8.0 / 1024.0) / secs
    }

    /// One-line form used for the periodic stats log.
    pub fn log_line(&self) -> String {
        format!(
            "Vehicle {}: Fwd={} ({:.1} Hz), Filtered={} ({:.1}%), SysIDs seen={:?}",
            self.vehicle_id,
            self.packets_forwarded,
            self.forward_rate_hz(),
            self.packets_filtered,
            self.filter_percentage(),
            self.system_ids_seen,
        )
    }
}
