// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Public error type for the crate.
//!
//! Variants are grouped by layer: transport, framing, decode, device
//! protocol, and API misuse. Device `ERROR`/`WARNING` statuses are *not*
//! errors — they are recoverable results carried on [`crate::protocol::Status`];
//! the `Device` variant here is used only when a caller asked for a reply's
//! payload and the device refused the command outright.

use crate::core::CursorError;

/// Error type returned by all fallible operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection could not be established after the configured retries.
    ConnectFailed {
        /// Connection target description (port path or host:port)
        target: String,
        /// Number of attempts made
        attempts: u32,
    },
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Serial port layer failure.
    Serial(String),
    /// Send operation failed.
    SendFailed(String),
    /// Operation requires a transport capability this connection lacks
    /// (e.g. a hardware break on a TCP socket).
    Unsupported(&'static str),

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// First two bytes of a reply match no known start sequence and no ASCII
    /// terminator arrived within the size bound.
    BadStartSequence([u8; 2]),
    /// Declared frame length exceeds the configured maximum.
    OversizeFrame(usize),

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// Cursor read past the available bytes (decode bug or truncated frame).
    Underrun {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Reply bytes do not match the expected shape for the issued command.
    MalformedReply(String),
    /// Checksum verification was enabled and the transmitted checksum does
    /// not match the computed one.
    ChecksumMismatch { expected: u16, actual: u16 },

    // ========================================================================
    // Device Protocol Errors
    // ========================================================================
    /// Device answered the command with an explicit ERROR status.
    Device { code: u8, message: String },

    // ========================================================================
    // Use Errors
    // ========================================================================
    /// Operation invoked in the wrong session state.
    InvalidState(String),
    /// Recording requires at least one tracked tool.
    NoTools,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Transport
            Error::ConnectFailed { target, attempts } => {
                write!(f, "unable to connect to {} after {} attempts", target, attempts)
            }
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Serial(msg) => write!(f, "serial port error: {}", msg),
            Error::SendFailed(msg) => write!(f, "send failed: {}", msg),
            Error::Unsupported(what) => write!(f, "unsupported on this transport: {}", what),
            // Framing
            Error::BadStartSequence(bytes) => write!(
                f,
                "unrecognized reply start sequence {:02X} {:02X}",
                bytes[0], bytes[1]
            ),
            Error::OversizeFrame(len) => write!(f, "frame too large: {} bytes", len),
            // Decode
            Error::Underrun {
                offset,
                needed,
                available,
            } => write!(
                f,
                "reply truncated at offset {}: needed {} bytes, {} available",
                offset, needed, available
            ),
            Error::MalformedReply(msg) => write!(f, "malformed reply: {}", msg),
            Error::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:04X}, got {:04X}",
                expected, actual
            ),
            // Device
            Error::Device { code, message } => write!(f, "ERROR {:02X}: {}", code, message),
            // Use
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::NoTools => write!(f, "no tools are being tracked"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<CursorError> for Error {
    fn from(e: CursorError) -> Self {
        match e {
            CursorError::Underrun {
                offset,
                needed,
                available,
            } => Error::Underrun {
                offset,
                needed,
                available,
            },
        }
    }
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for Error {
    fn from(e: serialport::Error) -> Self {
        Error::Serial(e.to_string())
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_error_converts_to_underrun() {
        let err: Error = CursorError::Underrun {
            offset: 3,
            needed: 4,
            available: 1,
        }
        .into();
        match err {
            Error::Underrun {
                offset,
                needed,
                available,
            } => {
                assert_eq!((offset, needed, available), (3, 4, 1));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = Error::Device {
            code: 0x0E,
            message: "selected port handle not initialized".into(),
        };
        assert_eq!(
            err.to_string(),
            "ERROR 0E: selected port handle not initialized"
        );
    }
}
