//! Per-stream acquisition pipeline: receive thread, process thread, three
//! monitoring buffers, three output files, and the controller that owns a
//! vector of streams plus the shared shutdown flags and rotation barrier.

pub mod barrier;
pub mod control;
pub mod process_info;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub use barrier::FileRotationBarrier;
pub use control::PipelineControl;
pub use process_info::{ProcessInfo, ProcessInfoSnapshot};

use crate::calibrate::{raw_to_cal, raw_to_xy_energy};
use crate::decode::{decode, new_scratch};
use crate::error::PipelineError;
use crate::event::{CalEvent, RawEvent};
use crate::model::SystemModel;
use crate::sort::{insertion_sort, partition_releasable};
use crate::socket::DaqSocket;
use crate::buffer::BoundedBuffer;

/// Per-stream tuning. Defaults follow spec.md §5's suggested timeouts.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub recv_buffer_size: usize,
    pub transfer_buffer_capacity: usize,
    pub monitor_buffer_capacity: usize,
    pub pull_timeout: Duration,
    pub write_data: bool,
    pub split_files: bool,
    pub file_size_max: u64,
    pub sort_calibrated_events: bool,
    pub assumed_max_delay_ticks: i64,
    pub energy_gate: Option<(f32, f32)>,
    pub pedestal_only: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            recv_buffer_size: 8192,
            transfer_buffer_capacity: 1 << 20,
            monitor_buffer_capacity: 4096,
            pull_timeout: Duration::from_millis(500),
            write_data: true,
            split_files: false,
            file_size_max: u64::MAX,
            sort_calibrated_events: true,
            assumed_max_delay_ticks: 0,
            energy_gate: None,
            pedestal_only: false,
        }
    }
}

#[derive(Clone, Copy)]
enum OutputKind {
    Raw,
    Decoded,
    Calibrated,
}

impl OutputKind {
    fn open_error(self, path: PathBuf, source: std::io::Error) -> PipelineError {
        match self {
            OutputKind::Raw => PipelineError::RawFileOpen { path, source },
            OutputKind::Decoded => PipelineError::DecodedFileOpen { path, source },
            OutputKind::Calibrated => PipelineError::CalibratedFileOpen { path, source },
        }
    }
}

/// Given base `name.ext` and split index `k`, returns `name_<k>.ext` with
/// `k` zero-padded to at least 3 digits.
fn split_path(base: &Path, index: u32) -> PathBuf {
    let stem = base.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}_{index:03}.{ext}", ext = ext.to_string_lossy()),
        None => format!("{stem}_{index:03}"),
    };
    base.with_file_name(name)
}

struct OutputFile {
    kind: OutputKind,
    base_path: PathBuf,
    file: std::fs::File,
    bytes_written: u64,
    split_index: u32,
}

impl OutputFile {
    fn open(kind: OutputKind, base_path: PathBuf, split_files: bool) -> Result<Self, PipelineError> {
        let path = if split_files { split_path(&base_path, 0) } else { base_path.clone() };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| kind.open_error(path, source))?;
        Ok(OutputFile { kind, base_path, file, bytes_written: 0, split_index: 0 })
    }

    fn rotate(&mut self) -> Result<(), PipelineError> {
        self.split_index += 1;
        let path = split_path(&self.base_path, self.split_index);
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| self.kind.open_error(path, source))?;
        self.bytes_written = 0;
        Ok(())
    }

    fn set_path(&mut self, path: PathBuf) -> Result<(), PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| self.kind.open_error(path.clone(), source))?;
        self.file = file;
        self.base_path = path;
        self.split_index = 0;
        self.bytes_written = 0;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), PipelineError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.file
            .write_all(bytes)
            .map_err(|source| PipelineError::Write { path: self.base_path.clone(), source })?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }
}

/// One socket's worth of receive/decode/calibrate/write pipeline. Everything
/// here is read through `&self`: the mutable working state of the process
/// loop (partial-packet buffer, retained calibrated events, decoder
/// scratch) lives on that thread's stack, never in the struct, since there
/// is exactly one process thread per stream.
pub struct PipelineStream {
    index: usize,
    socket: Arc<dyn DaqSocket>,
    model: Arc<SystemModel>,
    config: StreamConfig,
    transfer_buffer: BoundedBuffer<u8>,
    raw_storage: BoundedBuffer<u8>,
    decoded_storage: BoundedBuffer<RawEvent>,
    calibrated_storage: BoundedBuffer<CalEvent>,
    process_info: ProcessInfo,
    raw_file: Mutex<OutputFile>,
    decoded_file: Mutex<OutputFile>,
    calibrated_file: Mutex<OutputFile>,
}

impl PipelineStream {
    pub fn new(
        index: usize,
        socket: Arc<dyn DaqSocket>,
        model: Arc<SystemModel>,
        config: StreamConfig,
        raw_path: PathBuf,
        decoded_path: PathBuf,
        calibrated_path: PathBuf,
    ) -> Result<Self, PipelineError> {
        let raw_file = OutputFile::open(OutputKind::Raw, raw_path, config.split_files)?;
        let decoded_file = OutputFile::open(OutputKind::Decoded, decoded_path, config.split_files)?;
        let calibrated_file = OutputFile::open(OutputKind::Calibrated, calibrated_path, config.split_files)?;
        Ok(PipelineStream {
            index,
            socket,
            model,
            transfer_buffer: BoundedBuffer::new(config.transfer_buffer_capacity),
            raw_storage: BoundedBuffer::new(config.monitor_buffer_capacity),
            decoded_storage: BoundedBuffer::new(config.monitor_buffer_capacity),
            calibrated_storage: BoundedBuffer::new(config.monitor_buffer_capacity),
            process_info: ProcessInfo::new(),
            raw_file: Mutex::new(raw_file),
            decoded_file: Mutex::new(decoded_file),
            calibrated_file: Mutex::new(calibrated_file),
            config,
        })
    }

    pub fn process_info(&self) -> ProcessInfoSnapshot {
        self.process_info.snapshot()
    }

    pub fn reset_process_info(&self) {
        self.process_info.reset();
    }

    fn run_receiver(&self, control: &PipelineControl) {
        let mut scratch_recv = vec![0u8; self.config.recv_buffer_size];
        while control.reading() {
            self.recv_once(&mut scratch_recv, false);
        }
        // Final flush past the shutdown flag: whatever the last recv handed
        // back goes in with a blocking insert, so bytes read right at
        // shutdown aren't lost to a contested try_insert.
        self.recv_once(&mut scratch_recv, true);
    }

    fn recv_once(&self, scratch_recv: &mut [u8], blocking: bool) {
        match self.socket.recv(scratch_recv) {
            Ok(0) => self.process_info.bump_recv_zero(),
            Ok(n) => {
                self.process_info.bump_recv_normal();
                self.process_info.add_bytes_received(n as i64);
                if blocking {
                    self.transfer_buffer.insert(scratch_recv[..n].iter().copied());
                } else {
                    self.transfer_buffer.try_insert(scratch_recv[..n].iter().copied());
                }
                self.process_info.add_bytes_transferred(n as i64);
            }
            Err(e) => {
                self.process_info.bump_recv_error();
                log::warn!("stream {}: recv error: {e}", self.index);
            }
        }
    }

    fn run_processor(&self, control: &PipelineControl, barrier: &FileRotationBarrier, total_streams: usize) {
        let mut process_buf: Vec<u8> = Vec::new();
        let mut calibrated_data: Vec<CalEvent> = Vec::new();
        let mut scratch = new_scratch();

        loop {
            let still_processing = control.processing();
            let has_pending = !process_buf.is_empty() || !calibrated_data.is_empty();
            if !still_processing && !(control.end_of_acquisition() && has_pending) {
                break;
            }

            let mut pulled = Vec::new();
            self.transfer_buffer.wait_for_pull_all(&mut pulled, self.config.pull_timeout);
            if pulled.is_empty() && !(control.end_of_acquisition() && has_pending) {
                continue;
            }

            if !pulled.is_empty() {
                self.raw_storage.try_insert(pulled.iter().copied());
                self.process_info.add_bytes_processed(pulled.len() as i64);
                process_buf.extend_from_slice(&pulled);
            }

            let mut decoded_this_round = Vec::new();
            let mut start: Option<usize> = None;
            for i in 0..process_buf.len() {
                match process_buf[i] {
                    0x80 => start = Some(i),
                    0x81 => {
                        if let Some(s) = start.take() {
                            let slice = &process_buf[s..=i];
                            match decode(slice, &self.model, &mut scratch, &mut decoded_this_round) {
                                Ok(()) => self.process_info.bump_accepted_decode(),
                                Err(e) => self.process_info.bump_decode_reject(e),
                            }
                        }
                    }
                    _ => {}
                }
            }
            let keep_from = start.unwrap_or(process_buf.len());
            process_buf.drain(..keep_from);

            self.decoded_storage.try_insert(decoded_this_round.iter().copied());
            self.process_info.add_decoded_events_processed(decoded_this_round.len() as i64);

            for raw in &decoded_this_round {
                let result = if self.config.pedestal_only {
                    raw_to_xy_energy(raw, &self.model)
                } else {
                    raw_to_cal(raw, &self.model)
                };
                match result {
                    Ok(cal) => {
                        if let Some((lo, hi)) = self.config.energy_gate {
                            if cal.energy < lo || cal.energy > hi {
                                self.process_info.bump_calibrate_reject(crate::error::CalReject::EnergyGate);
                                continue;
                            }
                        }
                        self.process_info.bump_accepted_calibrate();
                        calibrated_data.push(cal);
                    }
                    Err(e) => self.process_info.bump_calibrate_reject(e),
                }
            }

            let predicted_split = self.config.split_files
                && {
                    let guard = self.raw_file.lock().unwrap();
                    guard.bytes_written + pulled.len() as u64 > self.config.file_size_max
                };
            let flush_all = control.end_of_acquisition() || predicted_split;

            let to_write = if self.config.sort_calibrated_events {
                insertion_sort(&mut calibrated_data, |a, b| {
                    (a.ct, a.ft.to_bits()) < (b.ct, b.ft.to_bits())
                });
                if flush_all {
                    std::mem::take(&mut calibrated_data)
                } else if let Some(last) = calibrated_data.last() {
                    let horizon = last.ct - self.config.assumed_max_delay_ticks;
                    partition_releasable(&mut calibrated_data, horizon)
                } else {
                    Vec::new()
                }
            } else {
                std::mem::take(&mut calibrated_data)
            };

            self.calibrated_storage.try_insert(to_write.iter().copied());

            if self.config.write_data {
                if let Err(err) = self.write_round(&pulled, &decoded_this_round, &to_write, barrier, total_streams) {
                    log::error!("stream {}: {err}", self.index);
                }
            }
        }
    }

    fn write_round(
        &self,
        raw_bytes: &[u8],
        decoded_events: &[RawEvent],
        cal_events: &[CalEvent],
        barrier: &FileRotationBarrier,
        total_streams: usize,
    ) -> Result<(), PipelineError> {
        let rotated = self.write_raw(raw_bytes, barrier, total_streams)?;
        self.write_decoded(decoded_events, rotated)?;
        self.write_calibrated(cal_events, rotated)?;
        Ok(())
    }

    fn write_raw(&self, bytes: &[u8], barrier: &FileRotationBarrier, total_streams: usize) -> Result<bool, PipelineError> {
        if bytes.is_empty() {
            return Ok(false);
        }
        let mut guard = self.raw_file.lock().unwrap();
        let would_exceed = self.config.split_files && guard.bytes_written + bytes.len() as u64 > self.config.file_size_max;
        if !would_exceed {
            guard.write(bytes)?;
            self.process_info.add_written_raw_bytes(bytes.len() as i64);
            return Ok(false);
        }

        let room = (self.config.file_size_max.saturating_sub(guard.bytes_written)) as usize;
        let split_at = room.min(bytes.len());
        let (head, tail) = bytes.split_at(split_at);
        guard.write(head)?;
        self.process_info.add_written_raw_bytes(head.len() as i64);
        drop(guard);

        log::debug!("stream {}: arriving at file-rotation barrier", self.index);
        barrier.arrive_and_wait(total_streams);

        let mut guard = self.raw_file.lock().unwrap();
        guard.rotate()?;
        guard.write(tail)?;
        self.process_info.add_written_raw_bytes(tail.len() as i64);
        Ok(true)
    }

    fn write_decoded(&self, events: &[RawEvent], rotate: bool) -> Result<(), PipelineError> {
        let mut guard = self.decoded_file.lock().unwrap();
        if rotate {
            guard.rotate()?;
        }
        if events.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(events.len() * crate::event::RAW_EVENT_SIZE);
        for event in events {
            event
                .write_to(&mut buf)
                .map_err(|source| PipelineError::Write { path: guard.base_path.clone(), source })?;
        }
        guard.write(&buf)?;
        self.process_info.add_written_decoded_events(events.len() as i64);
        Ok(())
    }

    fn write_calibrated(&self, events: &[CalEvent], rotate: bool) -> Result<(), PipelineError> {
        let mut guard = self.calibrated_file.lock().unwrap();
        if rotate {
            guard.rotate()?;
        }
        if events.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(events.len() * crate::event::CAL_EVENT_SIZE);
        for event in events {
            event
                .write_to(&mut buf)
                .map_err(|source| PipelineError::Write { path: guard.base_path.clone(), source })?;
        }
        guard.write(&buf)?;
        self.process_info.add_written_calibrated_events(events.len() as i64);
        Ok(())
    }
}

/// Owns every stream plus the flags and barrier they share. `start`/`stop`
/// are the only entry points that touch threads; everything else reads
/// through to the owned streams.
pub struct PipelineController {
    streams: Vec<Arc<PipelineStream>>,
    control: Arc<PipelineControl>,
    barrier: Arc<FileRotationBarrier>,
    receiver_handles: Mutex<Vec<JoinHandle<()>>>,
    processor_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PipelineController {
    pub fn new(streams: Vec<PipelineStream>) -> Self {
        PipelineController {
            streams: streams.into_iter().map(Arc::new).collect(),
            control: Arc::new(PipelineControl::new()),
            barrier: Arc::new(FileRotationBarrier::new()),
            receiver_handles: Mutex::new(Vec::new()),
            processor_handles: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        self.control.activate();
        let total = self.streams.len();
        let mut receiver_handles = Vec::with_capacity(total);
        let mut processor_handles = Vec::with_capacity(total);

        for stream in &self.streams {
            let recv_stream = Arc::clone(stream);
            let recv_control = Arc::clone(&self.control);
            receiver_handles.push(thread::spawn(move || recv_stream.run_receiver(&recv_control)));

            let proc_stream = Arc::clone(stream);
            let proc_control = Arc::clone(&self.control);
            let proc_barrier = Arc::clone(&self.barrier);
            processor_handles.push(thread::spawn(move || {
                proc_stream.run_processor(&proc_control, &proc_barrier, total)
            }));
        }

        *self.receiver_handles.lock().unwrap() = receiver_handles;
        *self.processor_handles.lock().unwrap() = processor_handles;
    }

    pub fn stop(&self, end_of_acquisition: bool) {
        self.control.stop_reading();
        for handle in self.receiver_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        self.control.begin_finishing(end_of_acquisition);
        for handle in self.processor_handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }

    pub fn set_raw_filename(&self, stream_idx: usize, path: PathBuf) -> Result<(), PipelineError> {
        self.streams[stream_idx].raw_file.lock().unwrap().set_path(path)
    }

    pub fn set_decoded_filename(&self, stream_idx: usize, path: PathBuf) -> Result<(), PipelineError> {
        self.streams[stream_idx].decoded_file.lock().unwrap().set_path(path)
    }

    pub fn set_calibrated_filename(&self, stream_idx: usize, path: PathBuf) -> Result<(), PipelineError> {
        self.streams[stream_idx].calibrated_file.lock().unwrap().set_path(path)
    }

    pub fn process_info(&self, stream_idx: usize) -> ProcessInfoSnapshot {
        self.streams[stream_idx].process_info()
    }

    pub fn reset_process_info(&self, stream_idx: usize) {
        self.streams[stream_idx].reset_process_info();
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}
