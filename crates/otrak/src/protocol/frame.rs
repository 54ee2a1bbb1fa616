// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Reply framing over the raw byte stream.
//!
//! The device multiplexes four incompatible frame shapes on one stream:
//!
//! ```text
//! ASCII:    <payload><4 hex CRC chars><CR>
//! Binary:   C4 A5 <u16 len> <u16 header CRC> <payload:len> <u16 data CRC>
//! Extended: C8 A5 <u32 len> <payload:len>
//! Stream:   D4 B5 <u16 id len> <id bytes> <u16 header CRC>   (wrapper only;
//!           a binary frame follows immediately)
//! ```
//!
//! The reader accumulates one byte at a time until it can classify the
//! reply: a trailing CR completes an ASCII frame; otherwise the first two
//! bytes are matched against the binary start sequences and the declared
//! length is read in full. A recv timeout mid-frame is retried — a reply in
//! progress is never abandoned.
//!
//! Checksums are captured on the frame; verification is advisory and gated
//! by configuration, because devices are observed to emit spurious bytes and
//! robustness takes precedence over strict validation.

use crate::error::{Error, Result};
use crate::protocol::constants::{
    ASCII_CRC_CHARS, ASCII_TERMINATOR, BIN_START, BIN_START_EXT, MAX_ASCII_REPLY,
    MAX_BINARY_PAYLOAD, STREAM_START,
};
use crate::protocol::crc::{crc16, crc16_ascii};
use crate::transport::Connection;

/// Frame discriminant assigned by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Ascii,
    Binary,
    ExtendedBinary,
}

/// One complete protocol reply as delimited on the wire.
///
/// Created by [`FrameReader`] per request/response or per streamed push and
/// consumed immediately by the reply decoder; never persisted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: FrameKind,
    /// Complete frame bytes as received, headers and checksums included.
    pub bytes: Vec<u8>,
    payload_start: usize,
    payload_len: usize,
    /// Header checksum, when the frame shape carries one.
    pub header_crc: Option<u16>,
    /// Data checksum, when the frame shape carries one.
    pub data_crc: Option<u16>,
}

impl Frame {
    /// The frame body: ASCII text without CRC/CR, or the binary payload
    /// without headers and checksums.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.payload_start..self.payload_start + self.payload_len]
    }

    /// ASCII frames: the payload as text (bytes are mapped as Latin-1, the
    /// way device text is observed on the wire).
    pub fn ascii_text(&self) -> String {
        self.payload().iter().map(|&b| b as char).collect()
    }

    /// Verify the transmitted checksums against the payload.
    ///
    /// Extended binary frames carry no checksum and always verify.
    pub fn verify(&self) -> Result<()> {
        match self.kind {
            FrameKind::Ascii => {
                if self.bytes.len() < ASCII_CRC_CHARS + 1 {
                    // Too short to carry a checksum; nothing to check.
                    return Ok(());
                }
                let crc_text: String = self.bytes
                    [self.payload_start + self.payload_len..self.bytes.len() - 1]
                    .iter()
                    .map(|&b| b as char)
                    .collect();
                let actual = u16::from_str_radix(&crc_text, 16)
                    .map_err(|_| Error::MalformedReply(format!("bad CRC field '{}'", crc_text)))?;
                let expected = crc16(self.payload());
                if expected != actual {
                    return Err(Error::ChecksumMismatch { expected, actual });
                }
                Ok(())
            }
            FrameKind::Binary => {
                if let Some(actual) = self.header_crc {
                    let expected = crc16(&self.bytes[..4]);
                    if expected != actual {
                        return Err(Error::ChecksumMismatch { expected, actual });
                    }
                }
                if let Some(actual) = self.data_crc {
                    let expected = crc16(self.payload());
                    if expected != actual {
                        return Err(Error::ChecksumMismatch { expected, actual });
                    }
                }
                Ok(())
            }
            FrameKind::ExtendedBinary => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Encoders. The client itself only sends ASCII command lines; these
    // exist for device simulators and the golden-vector tests.
    // ------------------------------------------------------------------

    /// Encode an ASCII reply frame: payload + CRC16 hex + CR.
    pub fn encode_ascii(payload: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + ASCII_CRC_CHARS + 1);
        out.extend_from_slice(payload.as_bytes());
        out.extend_from_slice(crc16_ascii(payload.as_bytes()).as_bytes());
        out.push(ASCII_TERMINATOR);
        out
    }

    /// Encode a standard binary reply frame around `payload`.
    pub fn encode_binary(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + payload.len());
        out.extend_from_slice(&BIN_START.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        let header_crc = crc16(&out[..4]);
        out.extend_from_slice(&header_crc.to_le_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&crc16(payload).to_le_bytes());
        out
    }

    /// Encode an extended binary reply frame around `payload`.
    pub fn encode_extended(payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + payload.len());
        out.extend_from_slice(&BIN_START_EXT.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Encode a stream wrapper announcing a pushed binary frame.
    pub fn encode_stream_wrapper(stream_id: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + stream_id.len());
        out.extend_from_slice(&STREAM_START.to_le_bytes());
        out.extend_from_slice(&(stream_id.len() as u16).to_le_bytes());
        out.extend_from_slice(stream_id);
        let header_crc = crc16(&out[..out.len()]);
        out.extend_from_slice(&header_crc.to_le_bytes());
        out
    }
}

/// Incremental reader that classifies and accumulates complete frames.
#[derive(Debug, Clone)]
pub struct FrameReader {
    max_ascii: usize,
    max_payload: usize,
    verify_checksums: bool,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            max_ascii: MAX_ASCII_REPLY,
            max_payload: MAX_BINARY_PAYLOAD,
            verify_checksums: false,
        }
    }
}

impl FrameReader {
    pub fn new(verify_checksums: bool) -> Self {
        Self {
            verify_checksums,
            ..Self::default()
        }
    }

    /// Read one complete frame, blocking until it arrives.
    ///
    /// Timeouts are retried both before and during a frame: a command has
    /// been issued, so a reply is expected.
    pub fn read_frame(&self, conn: &mut dyn Connection) -> Result<Frame> {
        match self.read_internal(conn, true)? {
            Some(frame) => Ok(frame),
            None => unreachable!("blocking read returned without a frame"),
        }
    }

    /// Read one complete frame if the device has started sending one.
    ///
    /// Returns `Ok(None)` when the read times out before the first byte
    /// ("no data yet"). Once a first byte has arrived the frame is read to
    /// completion exactly like [`FrameReader::read_frame`].
    pub fn try_read_frame(&self, conn: &mut dyn Connection) -> Result<Option<Frame>> {
        self.read_internal(conn, false)
    }

    fn read_internal(&self, conn: &mut dyn Connection, block: bool) -> Result<Option<Frame>> {
        let mut buf: Vec<u8> = Vec::new();

        loop {
            let mut byte = [0u8; 1];
            let n = conn.recv(&mut byte)?;
            if n == 0 {
                if buf.is_empty() && !block {
                    return Ok(None);
                }
                // Timeout with a reply in progress (or a blocking caller):
                // retry, never abandon the partial frame.
                continue;
            }
            buf.push(byte[0]);

            if buf.len() < 2 {
                continue;
            }

            // A trailing CR completes an ASCII reply.
            if buf[buf.len() - 1] == ASCII_TERMINATOR {
                let payload_len = buf.len().saturating_sub(ASCII_CRC_CHARS + 1);
                let frame = Frame {
                    kind: FrameKind::Ascii,
                    payload_start: 0,
                    payload_len,
                    header_crc: None,
                    data_crc: None,
                    bytes: buf,
                };
                if self.verify_checksums {
                    frame.verify()?;
                }
                return Ok(Some(frame));
            }

            // The first two bytes decide the binary frame shape. They never
            // change after this point, so the match runs once.
            if buf.len() == 2 {
                match u16::from_le_bytes([buf[0], buf[1]]) {
                    BIN_START => return self.read_binary(conn, buf).map(Some),
                    BIN_START_EXT => return self.read_extended(conn, buf).map(Some),
                    STREAM_START => {
                        self.consume_stream_wrapper(conn, &mut buf)?;
                        // The wrapper only announces that a binary frame
                        // follows; restart accumulation from empty.
                        buf.clear();
                        continue;
                    }
                    _ => {}
                }
            }

            if buf.len() > self.max_ascii {
                return Err(Error::BadStartSequence([buf[0], buf[1]]));
            }
        }
    }

    /// Standard binary: u16 length + u16 header CRC, payload, u16 data CRC.
    fn read_binary(&self, conn: &mut dyn Connection, mut buf: Vec<u8>) -> Result<Frame> {
        fill(conn, &mut buf, 4)?;
        let len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let header_crc = u16::from_le_bytes([buf[4], buf[5]]);
        if len > self.max_payload {
            return Err(Error::OversizeFrame(len));
        }

        fill(conn, &mut buf, len + 2)?;
        let data_crc = u16::from_le_bytes([buf[6 + len], buf[7 + len]]);

        let frame = Frame {
            kind: FrameKind::Binary,
            payload_start: 6,
            payload_len: len,
            header_crc: Some(header_crc),
            data_crc: Some(data_crc),
            bytes: buf,
        };
        if self.verify_checksums {
            frame.verify()?;
        }
        log::trace!("[frame] binary reply, {} payload bytes", len);
        Ok(frame)
    }

    /// Extended binary: u32 length, payload, no trailing checksum.
    fn read_extended(&self, conn: &mut dyn Connection, mut buf: Vec<u8>) -> Result<Frame> {
        fill(conn, &mut buf, 4)?;
        let len = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
        if len > self.max_payload {
            return Err(Error::OversizeFrame(len));
        }

        fill(conn, &mut buf, len)?;
        log::trace!("[frame] extended binary reply, {} payload bytes", len);
        Ok(Frame {
            kind: FrameKind::ExtendedBinary,
            payload_start: 6,
            payload_len: len,
            header_crc: None,
            data_crc: None,
            bytes: buf,
        })
    }

    /// Stream wrapper: u16 id length, id bytes, u16 header CRC. The wrapper
    /// carries no payload of its own and is discarded after reading.
    fn consume_stream_wrapper(&self, conn: &mut dyn Connection, buf: &mut Vec<u8>) -> Result<()> {
        fill(conn, buf, 2)?;
        let id_len = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        if id_len > self.max_ascii {
            return Err(Error::OversizeFrame(id_len));
        }
        fill(conn, buf, id_len + 2)?;
        let id: String = buf[4..4 + id_len].iter().map(|&b| b as char).collect();
        log::trace!("[frame] stream wrapper for id '{}'", id);
        Ok(())
    }
}

/// Append exactly `n` more bytes from the connection, retrying timeouts.
fn fill(conn: &mut dyn Connection, buf: &mut Vec<u8>, n: usize) -> Result<()> {
    let start = buf.len();
    buf.resize(start + n, 0);
    let mut read = 0;
    while read < n {
        let r = conn.recv(&mut buf[start + read..start + n])?;
        read += r;
    }
    Ok(())
}
