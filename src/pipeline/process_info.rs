//! Per-stream counter block. Hot counters are plain atomics updated
//! lock-free on the processing thread; the published snapshot is exchanged
//! under a mutex once per loop iteration, not on every packet.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::error::{CalReject, DecodeReject};

macro_rules! counters {
    ($($field:ident),+ $(,)?) => {
        #[derive(Debug, Default)]
        struct Counters {
            $($field: AtomicI64,)+
        }

        /// A point-in-time copy of every counter, safe to read without
        /// touching the live atomics.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct ProcessInfoSnapshot {
            $(pub $field: i64,)+
        }

        impl Counters {
            fn snapshot(&self) -> ProcessInfoSnapshot {
                ProcessInfoSnapshot {
                    $($field: self.$field.load(Ordering::Relaxed),)+
                }
            }

            fn reset(&self) {
                $(self.$field.store(0, Ordering::Relaxed);)+
            }
        }
    };
}

counters!(
    bytes_received,
    bytes_transferred,
    bytes_processed,
    recv_calls_normal,
    recv_calls_zero,
    recv_calls_error,
    accepted_decode,
    dropped_empty,
    dropped_start_stop,
    dropped_trigger_code,
    dropped_packet_size,
    dropped_address_byte,
    decoded_events_processed,
    accepted_calibrate,
    dropped_threshold,
    dropped_double_trigger,
    dropped_crystal_id,
    dropped_crystal_invalid,
    dropped_energy_gate,
    written_raw_bytes,
    written_decoded_events,
    written_calibrated_events,
);

/// Counter record for one stream. `bump_*` methods are lock-free; call
/// [`ProcessInfo::publish`] periodically and [`ProcessInfo::snapshot`] to
/// read a consistent point-in-time copy.
#[derive(Debug, Default)]
pub struct ProcessInfo {
    live: Counters,
    published: Mutex<ProcessInfoSnapshot>,
}

impl ProcessInfo {
    pub fn new() -> Self {
        ProcessInfo::default()
    }

    pub fn add_bytes_received(&self, n: i64) {
        self.live.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_transferred(&self, n: i64) {
        self.live.bytes_transferred.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_processed(&self, n: i64) {
        self.live.bytes_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_recv_normal(&self) {
        self.live.recv_calls_normal.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_recv_zero(&self) {
        self.live.recv_calls_zero.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_recv_error(&self) {
        self.live.recv_calls_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_accepted_decode(&self) {
        self.live.accepted_decode.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_decode_reject(&self, reject: DecodeReject) {
        let counter = match reject {
            DecodeReject::EmptyBytes => &self.live.dropped_empty,
            DecodeReject::BadFraming => &self.live.dropped_start_stop,
            DecodeReject::EmptyTrigger => &self.live.dropped_trigger_code,
            DecodeReject::BadSize => &self.live.dropped_packet_size,
            DecodeReject::InvalidAddress => &self.live.dropped_address_byte,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_decoded_events_processed(&self, n: i64) {
        self.live.decoded_events_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bump_accepted_calibrate(&self) {
        self.live.accepted_calibrate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_calibrate_reject(&self, reject: CalReject) {
        let counter = match reject {
            CalReject::TopologyError => &self.live.dropped_crystal_id,
            CalReject::BelowThreshold => &self.live.dropped_threshold,
            CalReject::DoubleTrigger => &self.live.dropped_double_trigger,
            CalReject::OutOfBounds => &self.live.dropped_crystal_id,
            CalReject::InvalidCrystal => &self.live.dropped_crystal_invalid,
            CalReject::EnergyGate => &self.live.dropped_energy_gate,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_written_raw_bytes(&self, n: i64) {
        self.live.written_raw_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_written_decoded_events(&self, n: i64) {
        self.live.written_decoded_events.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_written_calibrated_events(&self, n: i64) {
        self.live.written_calibrated_events.fetch_add(n, Ordering::Relaxed);
    }

    /// Exchanges the published snapshot for the current live counters.
    /// Always takes the lock: this runs once per loop iteration, not once
    /// per packet, so correctness matters more than avoiding a brief stall.
    pub fn publish(&self) {
        let snap = self.live.snapshot();
        *self.published.lock().unwrap() = snap;
    }

    pub fn snapshot(&self) -> ProcessInfoSnapshot {
        *self.published.lock().unwrap()
    }

    pub fn reset(&self) {
        self.live.reset();
        *self.published.lock().unwrap() = ProcessInfoSnapshot::default();
    }
}

impl std::fmt::Display for ProcessInfoSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "bytes received: {}", self.bytes_received)?;
        writeln!(f, "bytes processed: {}", self.bytes_processed)?;
        writeln!(f, "Accepted Packets: {}", self.accepted_decode)?;
        writeln!(f, "Dropped (Empty) : {}", self.dropped_empty)?;
        writeln!(f, "Dropped (Start) : {}", self.dropped_start_stop)?;
        writeln!(f, "Dropped (Trigg) : {}", self.dropped_trigger_code)?;
        writeln!(f, "Dropped (Size)  : {}", self.dropped_packet_size)?;
        writeln!(f, "Dropped (Addr)  : {}", self.dropped_address_byte)?;
        writeln!(f)?;
        writeln!(f, "Events Processed: {}", self.decoded_events_processed)?;
        writeln!(f, "Accepted Events        : {}", self.accepted_calibrate)?;
        writeln!(f, "Dropped (Threshold)    : {}", self.dropped_threshold)?;
        writeln!(f, "Dropped (Dbl Trigger)  : {}", self.dropped_double_trigger)?;
        writeln!(f, "Dropped (Crystal Ident): {}", self.dropped_crystal_id)?;
        writeln!(f, "Dropped (Crystal Valid): {}", self.dropped_crystal_invalid)?;
        writeln!(f, "Dropped (Energy Gate)  : {}", self.dropped_energy_gate)?;
        writeln!(f)?;
        writeln!(f, "Wrote (raw bytes)        : {}", self.written_raw_bytes)?;
        writeln!(f, "Wrote (decoded events)   : {}", self.written_decoded_events)?;
        writeln!(f, "Wrote (calibrated events): {}", self.written_calibrated_events)?;
        writeln!(f)?;
        writeln!(f, "Receive Calls (Data) : {}", self.recv_calls_normal)?;
        writeln!(f, "Receive Calls (Zero) : {}", self.recv_calls_zero)?;
        writeln!(f, "Receive Calls (Error): {}", self.recv_calls_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_snapshot_reflects_updates() {
        let info = ProcessInfo::new();
        info.add_bytes_received(100);
        info.bump_accepted_decode();
        info.publish();
        let snap = info.snapshot();
        assert_eq!(snap.bytes_received, 100);
        assert_eq!(snap.accepted_decode, 1);
    }

    #[test]
    fn snapshot_before_publish_is_zero() {
        let info = ProcessInfo::new();
        info.add_bytes_received(100);
        assert_eq!(info.snapshot().bytes_received, 0);
    }

    #[test]
    fn reset_zeros_everything() {
        let info = ProcessInfo::new();
        info.add_bytes_received(100);
        info.publish();
        info.reset();
        assert_eq!(info.snapshot().bytes_received, 0);
    }
}
