// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Tracker session: state machine and concurrency coordinator.
//!
//! ```text
//! Idle --connect()--> Connected --initialize()--> Initialized
//!                                                     |
//!                      orthogonal flags, valid here:  v
//!                  Tracking -> { Streaming | Paused | Recording }
//! ```
//!
//! A session owns the connection, the port-handle registry, the latest
//! tracking snapshot, and the background polling thread. Two critical
//! sections coordinate everything:
//!
//! - the **communication lock** serializes complete request/response
//!   exchanges on the single connection (foreground calls and the poll
//!   loop mutually exclude, one in-flight command at most);
//! - the **snapshot** is published by atomic whole-value replacement, so
//!   readers always see a complete frame of data.

pub mod events;
mod poll;
pub mod recording;
pub mod registry;
pub mod snapshot;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::{DataRequest, TrackerConfig};
use crate::error::{Error, Result};
use crate::protocol::commands::{self, search_mode, Command, SROM_CHUNK};
use crate::protocol::frame::FrameKind;
use crate::protocol::reply::{Reply, ReplyPayload, Status};
use crate::protocol::FrameReader;
use crate::transport::Connection;

use events::{DataCallback, EventCallback, EventHub, EventKind, TrackerEvent};
use poll::{PollContext, SessionFlags};
use recording::{CsvPoseSink, RecordingSink};
use registry::PortHandleRegistry;
use snapshot::TrackingSnapshot;

/// Pushed frames tolerated between sending USTREAM and seeing its ASCII
/// acknowledgement.
const STREAM_DRAIN_LIMIT: usize = 32;

/// Connection-level session state. The tracking/streaming/paused/recording
/// flags are orthogonal and only meaningful once `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Initialized,
}

/// A live session with one tracking device.
pub struct Tracker {
    config: TrackerConfig,
    reader: FrameReader,
    /// Communication lock: at most one request/response exchange in flight.
    conn: Arc<Mutex<Box<dyn Connection>>>,
    connected: AtomicBool,
    initialized: AtomicBool,
    flags: Arc<SessionFlags>,
    registry: Mutex<PortHandleRegistry>,
    snapshot: Arc<ArcSwap<TrackingSnapshot>>,
    events: Arc<EventHub>,
    data_listeners: Arc<Mutex<Vec<DataCallback>>>,
    sink: Arc<Mutex<Option<Box<dyn RecordingSink>>>>,
    status: Arc<Mutex<Status>>,
    poll_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Tracker {
    /// Create a session over the given transport.
    pub fn new(connection: Box<dyn Connection>, config: TrackerConfig) -> Self {
        let reader = FrameReader::new(config.verify_checksums);
        Self {
            reader,
            config,
            conn: Arc::new(Mutex::new(connection)),
            connected: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            flags: Arc::new(SessionFlags::default()),
            registry: Mutex::new(PortHandleRegistry::new()),
            snapshot: Arc::new(ArcSwap::from_pointee(TrackingSnapshot::default())),
            events: Arc::new(EventHub::new()),
            data_listeners: Arc::new(Mutex::new(Vec::new())),
            sink: Arc::new(Mutex::new(None)),
            status: Arc::new(Mutex::new(Status::Ok)),
            poll_thread: Mutex::new(None),
        }
    }

    /// Create a session with default configuration.
    pub fn with_defaults(connection: Box<dyn Connection>) -> Self {
        Self::new(connection, TrackerConfig::default())
    }

    // ========================================================================
    // State access
    // ========================================================================

    pub fn state(&self) -> SessionState {
        if self.initialized.load(Ordering::SeqCst) {
            SessionState::Initialized
        } else if self.connected.load(Ordering::SeqCst) {
            SessionState::Connected
        } else {
            SessionState::Idle
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_tracking(&self) -> bool {
        self.flags.is_tracking()
    }

    pub fn is_streaming(&self) -> bool {
        self.flags.is_streaming()
    }

    pub fn is_recording(&self) -> bool {
        self.flags.is_recording()
    }

    pub fn is_paused(&self) -> bool {
        self.flags.is_paused()
    }

    /// The latest tracking snapshot. Cheap to call; the returned value is
    /// immutable and complete.
    pub fn snapshot(&self) -> Arc<TrackingSnapshot> {
        self.snapshot.load_full()
    }

    /// Session-level status. Errors raised inside the poll loop land here.
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    pub fn tool_count(&self) -> usize {
        self.snapshot.load().tools.len()
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a callback for session events. Callbacks run on whichever
    /// thread publishes the event and must not block.
    pub fn add_event_listener(&self, callback: EventCallback) {
        self.events.add_listener(callback);
    }

    /// Subscribe to session events over a bounded channel (lossy when the
    /// receiver falls behind).
    pub fn subscribe_events(&self, capacity: usize) -> crossbeam::channel::Receiver<TrackerEvent> {
        self.events.subscribe(capacity)
    }

    /// Register a callback invoked after every published snapshot.
    pub fn add_data_listener(&self, callback: DataCallback) {
        self.data_listeners.lock().push(callback);
    }

    // ========================================================================
    // Command exchange
    // ========================================================================

    /// One complete request/response exchange under the communication lock.
    fn exchange(&self, command: &Command) -> Result<Reply> {
        if !self.is_connected() {
            return Err(Error::InvalidState("device is not connected".into()));
        }
        let mut conn = self.conn.lock();
        log::debug!("[session] > {}", command.line);
        conn.send(&command.wire_bytes())?;
        let frame = self.reader.read_frame(conn.as_mut())?;
        drop(conn);
        let reply = Reply::decode(&frame, command)?;
        log::debug!("[session] < {}", reply.status);
        Ok(reply)
    }

    /// Exchange and turn a device ERROR status into a typed error.
    fn exchange_checked(&self, command: &Command) -> Result<Reply> {
        self.exchange(command)?.into_checked(command)
    }

    /// Send a command on behalf of the caller.
    ///
    /// Refused while streaming: pushed frames own the byte stream, so new
    /// requests and streaming are mutually exclusive.
    pub fn send_command(&self, command: &Command) -> Result<Reply> {
        if self.flags.is_streaming() {
            return Err(Error::InvalidState(
                "cannot issue requests while streaming".into(),
            ));
        }
        self.exchange(command)
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Open the connection, retrying transport failures up to the
    /// configured attempt count.
    pub fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let target = self.conn.lock().describe();
        self.events.publish(
            EventKind::Connecting,
            format!("{} connecting to {}", self.config.name, target),
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.conn.lock().connect() {
                Ok(()) => break,
                Err(e) if attempt < self.config.connect_retries => {
                    log::warn!(
                        "[session] connect attempt {}/{} failed: {}",
                        attempt,
                        self.config.connect_retries,
                        e
                    );
                }
                Err(e) => {
                    log::error!("[session] giving up connecting to {}: {}", target, e);
                    return Err(Error::ConnectFailed {
                        target,
                        attempts: attempt,
                    });
                }
            }
        }

        self.connected.store(true, Ordering::SeqCst);
        self.events.publish(
            EventKind::Connected,
            format!("{} connected", self.config.name),
        );
        Ok(())
    }

    /// Initialize the device and provision port handles: free stale
    /// handles, load configured tool definitions, initialize and enable
    /// everything found, then create one tracked-tool entry per enabled
    /// device. On failure the session stays `Connected`.
    pub fn initialize(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::InvalidState("device is not connected".into()));
        }
        if self.flags.is_tracking() {
            return Err(Error::InvalidState("cannot initialize while tracking".into()));
        }

        self.exchange_checked(&commands::init())?;

        // Free handles the device wants released.
        for (id, _) in self.search_handles(search_mode::STALE)? {
            self.exchange_checked(&commands::phf(id))?;
            self.registry.lock().remove(id);
        }

        // Load wireless tool definitions onto freshly requested handles.
        let srom_files = self.config.srom_files.clone();
        for file in &srom_files {
            self.load_srom(file)?;
        }

        // Initialize occupied handles.
        for (id, status) in self.search_handles(search_mode::UNINITIALIZED)? {
            self.registry.lock().record_search(id, status);
            self.exchange_checked(&commands::pinit(id))?;
            self.registry.lock().mark_initialized(id);
        }

        // Enable initialized handles and pick up their tool information.
        for (id, status) in self.search_handles(search_mode::UNENABLED)? {
            self.registry.lock().record_search(id, status);
            self.exchange_checked(&commands::pena(id, self.config.enable_mode))?;
            self.registry.lock().mark_enabled(id);
            let info = self.exchange_checked(&commands::phinf(id, 0x0001))?;
            if let ReplyPayload::Text(text) = info.payload {
                self.registry.lock().set_info(id, text.trim().to_string());
            }
        }

        // One tracked-tool entry per enabled device.
        let enabled = self.registry.lock().enabled();
        self.snapshot.store(Arc::new(TrackingSnapshot::from_handles(
            enabled.iter().map(|&id| u16::from(id)),
        )));

        self.initialized.store(true, Ordering::SeqCst);
        self.events.publish(
            EventKind::Initialized,
            format!("{} initialized ({} tools)", self.config.name, enabled.len()),
        );
        Ok(())
    }

    /// Put the device in tracking mode and spawn the polling thread.
    pub fn start_tracking(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::InvalidState("session is not initialized".into()));
        }
        if self.flags.is_tracking() {
            return Ok(());
        }

        self.exchange_checked(&commands::tstart())?;

        SessionFlags::set(&self.flags.paused, false);
        SessionFlags::set(&self.flags.tracking, true);
        let ctx = PollContext {
            name: self.config.name.clone(),
            conn: self.conn.clone(),
            reader: self.reader.clone(),
            data_request: self.config.data_request.clone(),
            flags: self.flags.clone(),
            snapshot: self.snapshot.clone(),
            events: self.events.clone(),
            data_listeners: self.data_listeners.clone(),
            sink: self.sink.clone(),
            status: self.status.clone(),
            pause_backoff: self.config.pause_backoff,
            error_backoff: self.config.error_backoff,
        };
        let handle = std::thread::Builder::new()
            .name(format!("{}-poll", self.config.name))
            .spawn(move || poll::run(ctx))
            .map_err(Error::Io)?;
        *self.poll_thread.lock() = Some(handle);

        self.events.publish(
            EventKind::TrackingStarted,
            format!("{} tracking started", self.config.name),
        );
        Ok(())
    }

    /// Stop tracking: recording and streaming wind down first, the poll
    /// thread is joined, then the device leaves tracking mode. Idempotent.
    pub fn stop_tracking(&self) -> Result<()> {
        if !self.flags.is_tracking() {
            return Ok(());
        }

        self.stop_recording()?;
        self.stop_streaming()?;

        SessionFlags::set(&self.flags.paused, false);
        SessionFlags::set(&self.flags.tracking, false);
        if let Some(handle) = self.poll_thread.lock().take() {
            if handle.join().is_err() {
                log::error!("[session] poll thread panicked");
            }
        }

        self.exchange_checked(&commands::tstop())?;
        self.events.publish(
            EventKind::TrackingStopped,
            format!("{} tracking stopped", self.config.name),
        );
        Ok(())
    }

    /// Pause data acquisition without leaving tracking mode.
    pub fn pause_tracking(&self) {
        SessionFlags::set(&self.flags.paused, true);
    }

    pub fn unpause_tracking(&self) {
        SessionFlags::set(&self.flags.paused, false);
    }

    /// Switch the poll loop from request/response to consuming frames the
    /// device pushes on its own.
    pub fn start_streaming(&self) -> Result<()> {
        if !self.flags.is_tracking() {
            return Err(Error::InvalidState("streaming requires tracking".into()));
        }
        if self.flags.is_streaming() {
            return Ok(());
        }
        let filter = match &self.config.data_request {
            DataRequest::Gbf { filter } => filter.clone(),
            DataRequest::Legacy { .. } => {
                return Err(Error::InvalidState(
                    "streaming requires the GBF data command".into(),
                ))
            }
        };

        // Raise the flag first so the poll loop stops issuing requests;
        // the communication lock keeps this exchange atomic regardless.
        SessionFlags::set(&self.flags.streaming, true);
        let command = commands::stream(&filter);
        match self.exchange(&command).and_then(|r| r.into_checked(&command)) {
            Ok(_) => Ok(()),
            Err(e) => {
                SessionFlags::set(&self.flags.streaming, false);
                Err(e)
            }
        }
    }

    /// Return the poll loop to request/response acquisition. Pushed frames
    /// still in flight are drained until the acknowledgement arrives.
    pub fn stop_streaming(&self) -> Result<()> {
        if !self.flags.is_streaming() {
            return Ok(());
        }
        let filter = match &self.config.data_request {
            DataRequest::Gbf { filter } => filter.clone(),
            DataRequest::Legacy { .. } => unreachable!("streaming only starts in GBF mode"),
        };

        SessionFlags::set(&self.flags.streaming, false);
        let command = commands::ustream(&filter);
        let mut conn = self.conn.lock();
        conn.send(&command.wire_bytes())?;
        for _ in 0..STREAM_DRAIN_LIMIT {
            let frame = self.reader.read_frame(conn.as_mut())?;
            if frame.kind == FrameKind::Ascii {
                drop(conn);
                Reply::decode(&frame, &command)?.into_checked(&command)?;
                return Ok(());
            }
            // Pushed frame that crossed the stop request; discard.
        }
        Err(Error::MalformedReply(
            "no acknowledgement after leaving streaming mode".into(),
        ))
    }

    /// Start recording to a CSV pose file at `path`.
    pub fn start_recording(&self, path: impl AsRef<Path>) -> Result<()> {
        self.start_recording_with(Box::new(CsvPoseSink::new(path)))
    }

    /// Start recording into a caller-provided sink. Requires tracking and
    /// at least one tracked tool.
    pub fn start_recording_with(&self, mut sink: Box<dyn RecordingSink>) -> Result<()> {
        if !self.flags.is_tracking() {
            return Err(Error::InvalidState("recording requires tracking".into()));
        }
        if self.flags.is_recording() {
            return Ok(());
        }
        let snapshot = self.snapshot.load_full();
        if snapshot.tools.is_empty() {
            return Err(Error::NoTools);
        }

        let handles: Vec<u16> = snapshot.tools.iter().map(|t| t.handle).collect();
        sink.start(&handles)?;
        *self.sink.lock() = Some(sink);
        SessionFlags::set(&self.flags.recording, true);
        self.events.publish(
            EventKind::RecordingStarted,
            format!("{} recording started", self.config.name),
        );
        Ok(())
    }

    /// Close the recording sink. Idempotent.
    pub fn stop_recording(&self) -> Result<()> {
        if !self.flags.is_recording() {
            return Ok(());
        }
        SessionFlags::set(&self.flags.recording, false);
        if let Some(mut sink) = self.sink.lock().take() {
            sink.finish()?;
        }
        self.events.publish(
            EventKind::RecordingStopped,
            format!("{} recording stopped", self.config.name),
        );
        Ok(())
    }

    /// Hard-reset the device, re-initializing afterwards when the session
    /// had been initialized.
    pub fn reset(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::InvalidState("device is not connected".into()));
        }
        let was_initialized = self.is_initialized();

        self.stop_recording()?;
        self.stop_tracking()?;

        // Serial transports reset through the hardware break and answer
        // with the reset banner; everything else takes the command.
        let command = commands::reset();
        let used_break = {
            let mut conn = self.conn.lock();
            match conn.send_break() {
                Ok(()) => true,
                Err(Error::Unsupported(_)) => false,
                Err(e) => return Err(e),
            }
        };
        if used_break {
            let mut conn = self.conn.lock();
            let frame = self.reader.read_frame(conn.as_mut())?;
            drop(conn);
            Reply::decode(&frame, &command)?.into_checked(&command)?;
        } else {
            self.exchange_checked(&command)?;
        }

        self.initialized.store(false, Ordering::SeqCst);
        self.registry.lock().clear();
        self.events.publish(
            EventKind::Reset,
            format!("{} reset complete", self.config.name),
        );

        if was_initialized {
            self.initialize()?;
        }
        Ok(())
    }

    /// Stop tracking if active, close the connection, return to `Idle`.
    pub fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        self.stop_tracking()?;

        self.initialized.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.events.publish(
            EventKind::Disconnected,
            format!("{} disconnected", self.config.name),
        );
        self.conn.lock().close()
    }

    // ========================================================================
    // Initialization helpers
    // ========================================================================

    fn search_handles(&self, mode: u8) -> Result<Vec<(u8, u16)>> {
        let command = commands::phsr(mode);
        let reply = self.exchange_checked(&command)?;
        match reply.payload {
            ReplyPayload::PortHandles(handles) => Ok(handles),
            _ => Err(Error::MalformedReply(
                "handle search reply carried no handle list".into(),
            )),
        }
    }

    /// Request a handle and flash a tool definition file onto it in
    /// 64-byte chunks.
    fn load_srom(&self, path: &Path) -> Result<()> {
        let command = commands::phrq();
        let reply = self.exchange_checked(&command)?;
        let id = match reply.payload {
            ReplyPayload::PortHandle(id) => id,
            _ => {
                return Err(Error::MalformedReply(
                    "handle request reply carried no handle".into(),
                ))
            }
        };
        self.registry.lock().record_assigned(id);

        let data = std::fs::read(path)?;
        let mut addr = 0u16;
        for chunk in data.chunks(SROM_CHUNK) {
            self.exchange_checked(&commands::pvwr(id, addr, chunk))?;
            addr = addr.wrapping_add(SROM_CHUNK as u16);
        }
        log::info!(
            "[session] loaded tool definition {} onto handle {:02X}",
            path.display(),
            id
        );
        Ok(())
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // Best effort: make sure the poll thread is not left running.
        SessionFlags::set(&self.flags.tracking, false);
        if let Some(handle) = self.poll_thread.lock().take() {
            let _ = handle.join();
        }
    }
}
