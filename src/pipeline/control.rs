//! Shared cooperative-shutdown flags for one [`super::PipelineController`].

use std::sync::atomic::{AtomicBool, Ordering};

/// Three flags shared between a controller and every stream's receive and
/// process threads. No thread is ever killed; each loop observes these
/// flags at its own natural suspension points (socket timeout, buffer
/// wait timeout).
#[derive(Debug, Default)]
pub struct PipelineControl {
    read_sockets: AtomicBool,
    process_data: AtomicBool,
    end_of_acquisition: AtomicBool,
}

impl PipelineControl {
    pub fn new() -> Self {
        PipelineControl::default()
    }

    /// Arms both loops for a fresh run.
    pub fn activate(&self) {
        self.end_of_acquisition.store(false, Ordering::SeqCst);
        self.read_sockets.store(true, Ordering::SeqCst);
        self.process_data.store(true, Ordering::SeqCst);
    }

    pub fn stop_reading(&self) {
        self.read_sockets.store(false, Ordering::SeqCst);
    }

    /// Tells process threads no more bytes are coming. `end_of_acquisition`
    /// controls whether they flush every retained event regardless of the
    /// release horizon before exiting.
    pub fn begin_finishing(&self, end_of_acquisition: bool) {
        self.end_of_acquisition.store(end_of_acquisition, Ordering::SeqCst);
        self.process_data.store(false, Ordering::SeqCst);
    }

    pub fn reading(&self) -> bool {
        self.read_sockets.load(Ordering::SeqCst)
    }

    pub fn processing(&self) -> bool {
        self.process_data.load(Ordering::SeqCst)
    }

    pub fn end_of_acquisition(&self) -> bool {
        self.end_of_acquisition.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_sets_reading_and_processing() {
        let control = PipelineControl::new();
        control.activate();
        assert!(control.reading());
        assert!(control.processing());
        assert!(!control.end_of_acquisition());
    }

    #[test]
    fn begin_finishing_clears_processing_and_records_flag() {
        let control = PipelineControl::new();
        control.activate();
        control.begin_finishing(true);
        assert!(!control.processing());
        assert!(control.end_of_acquisition());
    }
}
