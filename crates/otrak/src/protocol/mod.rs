// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Protocol engine: framing, checksums, codecs, and reply decoding.
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        Reply Decoder                          |
//! |    ASCII parsing | GBF codec | BX codec  -> Reply + Status    |
//! +--------------------------------------------------------------+
//! |                        Frame Reader                           |
//! |    ASCII / binary / extended binary / stream wrapper          |
//! +--------------------------------------------------------------+
//! |                        Byte stream                            |
//! |                  (serial or TCP Connection)                   |
//! +--------------------------------------------------------------+
//! ```

pub mod bx;
pub mod commands;
pub mod constants;
pub mod crc;
pub mod frame;
pub mod gbf;
pub mod reply;

pub use commands::{Command, ReplyFormat};
pub use frame::{Frame, FrameKind, FrameReader};
pub use reply::{Reply, ReplyPayload, Status};
