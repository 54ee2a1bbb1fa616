// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Core building blocks shared by every decoder: the byte cursor and the
//! plain value types carried through reply payloads and snapshots.

pub mod cursor;
pub mod types;

pub use cursor::Cursor;
pub use types::{MarkerStatus, Pose, Position, MISSING_VALUE};

/// Error raised when a cursor read requests more bytes than remain.
///
/// Always a decode bug or a truncated frame; converted into the public
/// `Error::Underrun` at the protocol layer and never silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    Underrun {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Bytes the read needed
        needed: usize,
        /// Bytes actually remaining
        available: usize,
    },
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorError::Underrun {
                offset,
                needed,
                available,
            } => write!(
                f,
                "buffer underrun at offset {}: needed {} bytes, {} available",
                offset, needed, available
            ),
        }
    }
}

impl std::error::Error for CursorError {}

pub type CursorResult<T> = std::result::Result<T, CursorError>;
