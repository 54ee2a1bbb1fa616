// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! # otrak - optical/EM motion tracker client
//!
//! A pure Rust client for the family of optical and electromagnetic motion
//! tracking systems that speak a combined ASCII/binary command protocol
//! over a serial line or TCP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use otrak::{TcpConnection, Tracker, TrackerConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let connection = TcpConnection::new("P9-00123.local");
//!     let tracker = Tracker::new(Box::new(connection), TrackerConfig::default());
//!
//!     tracker.connect()?;
//!     tracker.initialize()?;
//!     tracker.start_tracking()?;
//!
//!     let snapshot = tracker.snapshot();
//!     for tool in &snapshot.tools {
//!         println!("tool {:02X}: {:?}", tool.handle, tool.pose);
//!     }
//!
//!     tracker.stop_tracking()?;
//!     tracker.disconnect()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                         Tracker Session                            |
//! |   state machine | port-handle registry | snapshot | poll thread    |
//! +--------------------------------------------------------------------+
//! |                         Protocol Engine                            |
//! |   Reply Decoder -> { ASCII parsing | GBF codec | BX codec }        |
//! |   Frame Reader  -> ASCII / binary / extended / stream wrapper      |
//! +--------------------------------------------------------------------+
//! |                           Transport                                |
//! |               Serial (hardware break) | TCP (8765)                 |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Tracker`] | Session state machine, entry point for everything |
//! | [`TrackerConfig`] | Runtime knobs (retries, data command, checksums) |
//! | [`TrackingSnapshot`] | Latest frame of tool poses and markers |
//! | [`protocol::Reply`] | One decoded reply with its [`protocol::Status`] |
//! | [`Connection`] | Transport abstraction (serial or TCP) |
//!
//! ## Concurrency
//!
//! The polling thread is the only writer of the tracking snapshot and
//! publishes complete snapshots atomically; any number of readers observe
//! consistent frames. All command/response exchanges on the single
//! connection serialize behind one communication lock.

pub mod config;
/// Byte cursor and the value types carried through decoded replies.
pub mod core;
mod error;
/// Protocol engine: framing, checksums, codecs, reply decoding.
pub mod protocol;
/// Tracker session: state machine, registry, snapshot, events, recording.
pub mod tracker;
/// Transport abstraction and the serial/TCP connections.
pub mod transport;

pub use self::core::{MarkerStatus, Pose, Position};
pub use config::{DataRequest, TrackerConfig};
pub use error::{Error, Result};
pub use protocol::{Frame, FrameKind, FrameReader, Reply, ReplyPayload, Status};
pub use tracker::events::{EventKind, TrackerEvent};
pub use tracker::recording::{CsvPoseSink, RecordingSink};
pub use tracker::snapshot::{MarkerState, StrayMarker, TrackedTool, TrackingSnapshot};
pub use tracker::{SessionState, Tracker};
pub use transport::Connection;
pub use transport::TcpConnection;

#[cfg(feature = "serial")]
pub use transport::SerialConnection;
