// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Transport abstraction and concrete connections.
//!
//! The device family speaks one request/response byte stream over either a
//! serial line or a TCP socket. Both are wrapped behind the [`Connection`]
//! trait so the protocol engine and session never care which one is in use.
//!
//! # Timeout semantics
//!
//! `recv` blocks for at most the configured read timeout and returns
//! `Ok(0)` when it expires. "No data yet" is an ordinary condition here:
//! the frame reader retries mid-frame, and the poll loop retries while
//! idle. Only transport-level failures return `Err`.

pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

pub use tcp::TcpConnection;

#[cfg(feature = "serial")]
pub use serial::SerialConnection;

use crate::error::{Error, Result};

/// A byte-stream connection to a tracking device.
///
/// Implementations are used from both the session thread and the polling
/// thread (serialized by the session's communication lock), so they must be
/// `Send`.
pub trait Connection: Send {
    /// Open the connection. Idempotent when already connected.
    fn connect(&mut self) -> Result<()>;

    /// Indicates whether the connection is open.
    fn is_connected(&self) -> bool;

    /// Send all of `data`.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive up to `buf.len()` bytes. Returns `Ok(0)` on read timeout.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the connection. Idempotent when already closed.
    fn close(&mut self) -> Result<()>;

    /// Assert the hardware line-break signal used for device reset.
    ///
    /// Only meaningful on serial transports; the default refuses.
    fn send_break(&mut self) -> Result<()> {
        Err(Error::Unsupported("hardware break"))
    }

    /// Human-readable target description for logs and events.
    fn describe(&self) -> String;
}
