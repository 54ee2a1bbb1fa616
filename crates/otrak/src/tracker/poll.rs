// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Background polling loop.
//!
//! One dedicated thread per session requests (or, while streaming, reads)
//! frames, decodes them, and publishes a fresh snapshot. It is the only
//! writer of the snapshot. Failures inside the loop become a session error
//! status plus a published error event, never a panic: no caller is
//! synchronously waiting on this thread.
//!
//! Cancellation is cooperative: `stop_tracking` clears the tracking flag
//! and joins the thread; an in-progress byte read is never interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::events::{DataCallback, EventHub, EventKind};
use super::recording::RecordingSink;
use super::snapshot::TrackingSnapshot;
use crate::config::DataRequest;
use crate::error::{Error, Result};
use crate::protocol::commands::{self, Command};
use crate::protocol::reply::{Reply, ReplyPayload, Status};
use crate::protocol::FrameReader;
use crate::transport::Connection;

/// Orthogonal session mode flags, shared with the poll thread.
#[derive(Debug, Default)]
pub(crate) struct SessionFlags {
    pub tracking: AtomicBool,
    pub paused: AtomicBool,
    pub streaming: AtomicBool,
    pub recording: AtomicBool,
}

impl SessionFlags {
    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

/// Everything the poll thread needs, cloned out of the session.
pub(crate) struct PollContext {
    pub name: String,
    pub conn: Arc<Mutex<Box<dyn Connection>>>,
    pub reader: FrameReader,
    pub data_request: DataRequest,
    pub flags: Arc<SessionFlags>,
    pub snapshot: Arc<ArcSwap<TrackingSnapshot>>,
    pub events: Arc<EventHub>,
    pub data_listeners: Arc<Mutex<Vec<DataCallback>>>,
    pub sink: Arc<Mutex<Option<Box<dyn RecordingSink>>>>,
    pub status: Arc<Mutex<Status>>,
    pub pause_backoff: Duration,
    pub error_backoff: Duration,
}

/// The data command for the configured acquisition mode.
pub(crate) fn data_command(request: &DataRequest) -> Command {
    match request {
        DataRequest::Gbf { filter } => commands::bx2(filter),
        DataRequest::Legacy { options } => commands::bx(*options),
    }
}

/// Poll-thread entry point.
pub(crate) fn run(ctx: PollContext) {
    log::debug!("[poll] {} thread started", ctx.name);

    while ctx.flags.is_tracking() {
        if ctx.flags.is_paused() {
            std::thread::sleep(ctx.pause_backoff);
            continue;
        }

        match poll_once(&ctx) {
            Ok(Some(snapshot)) => {
                for listener in ctx.data_listeners.lock().iter() {
                    listener(&snapshot);
                }
            }
            // No pushed frame available yet; check the flags again.
            Ok(None) => {}
            Err(e) => {
                let message = e.to_string();
                *ctx.status.lock() = Status::Error {
                    code: 0,
                    message: message.clone(),
                };
                ctx.events
                    .publish(EventKind::Error, format!("{}: {}", ctx.name, message));
                // Keep a dead device from turning this loop into a busy
                // error storm.
                std::thread::sleep(ctx.error_backoff);
            }
        }
    }

    log::debug!("[poll] {} thread exiting", ctx.name);
}

/// Fetch, decode, and publish one frame of tracking data.
fn poll_once(ctx: &PollContext) -> Result<Option<Arc<TrackingSnapshot>>> {
    let command = data_command(&ctx.data_request);

    let reply = if ctx.flags.is_streaming() {
        // Streaming: the device pushes frames on its own; no new request
        // may be issued.
        let mut conn = ctx.conn.lock();
        let frame = match ctx.reader.try_read_frame(conn.as_mut())? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        drop(conn);
        Reply::decode(&frame, &command)?
    } else {
        let mut conn = ctx.conn.lock();
        conn.send(&command.wire_bytes())?;
        let frame = ctx.reader.read_frame(conn.as_mut())?;
        drop(conn);
        Reply::decode(&frame, &command)?
    };

    let reply = reply.into_checked(&command)?;
    let mut next = (*ctx.snapshot.load_full()).clone();
    match &reply.payload {
        ReplyPayload::Gbf(payload) => next.apply_gbf(payload),
        ReplyPayload::Bx(frame) => next.apply_bx(frame),
        _ => {
            return Err(Error::MalformedReply(
                "data reply carried no tracking payload".into(),
            ))
        }
    }

    let published = Arc::new(next);
    ctx.snapshot.store(published.clone());

    if ctx.flags.is_recording() {
        if let Some(sink) = ctx.sink.lock().as_mut() {
            sink.record(&published)?;
        }
    }

    Ok(Some(published))
}
