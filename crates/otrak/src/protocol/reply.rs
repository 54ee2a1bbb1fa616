// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Reply decoding: from a delimited frame to a typed result.
//!
//! Given the frame and the command that produced it, the decoder dispatches
//! to ASCII parsing, the GBF codec, or the legacy BX codec and produces a
//! [`Reply`] carrying exactly one [`Status`]. Device `ERRORxx`/`WARNINGxx`
//! statuses are recoverable results mapped through a fixed code table, not
//! decode failures.

use crate::core::Cursor;
use crate::error::{Error, Result};
use crate::protocol::bx::BxFrame;
use crate::protocol::commands::{Command, ReplyFormat};
use crate::protocol::frame::{Frame, FrameKind};
use crate::protocol::gbf::GbfPayload;

/// Outcome status carried by every reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning { code: u8, message: String },
    Error { code: u8, message: String },
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Status::Warning { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "[OK]"),
            Status::Warning { code, message } => write!(f, "[WRN {:02X}] {}", code, message),
            Status::Error { code, message } => write!(f, "[ERR {:02X}] {}", code, message),
        }
    }
}

/// Typed reply payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// Status-only replies (OKAY, RESET, echo, ...).
    None,
    /// Free-form ASCII payload.
    Text(String),
    /// `Name=value` pairs in reply order.
    Parameters(Vec<(String, String)>),
    /// (port handle, handle status) pairs from a handle search.
    PortHandles(Vec<(u8, u16)>),
    /// Freshly assigned port handle.
    PortHandle(u8),
    /// Firmware version lines.
    Version(Vec<String>),
    /// Legacy binary tracking data.
    Bx(BxFrame),
    /// General binary format tree.
    Gbf(GbfPayload),
    /// Undecoded binary payload.
    RawBinary(Vec<u8>),
}

/// One decoded reply: a status and, when the status allows it, a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: Status,
    pub payload: ReplyPayload,
}

impl Reply {
    fn ok(payload: ReplyPayload) -> Self {
        Reply {
            status: Status::Ok,
            payload,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }

    /// Convert a device ERROR status into a typed error, preserving the
    /// failed command's context. Warnings pass.
    pub fn into_checked(self, command: &Command) -> Result<Reply> {
        if let Status::Error { code, message } = &self.status {
            return Err(Error::Device {
                code: *code,
                message: format!("{} (command '{}')", message, command.line),
            });
        }
        Ok(self)
    }

    /// Decode a frame in the context of the command that produced it.
    pub fn decode(frame: &Frame, command: &Command) -> Result<Reply> {
        match frame.kind {
            FrameKind::Ascii => Self::decode_ascii(&frame.ascii_text(), command),
            FrameKind::Binary | FrameKind::ExtendedBinary => {
                Self::decode_binary(frame.payload(), command)
            }
        }
    }

    fn decode_ascii(text: &str, command: &Command) -> Result<Reply> {
        // ERROR and WARNING replies can substitute for any expected shape.
        if let Some(code_text) = text.strip_prefix("ERROR") {
            let code = parse_hex_u8(code_text)?;
            log::warn!("[reply] ERROR {:02X}: {}", code, error_text(code));
            return Ok(Reply {
                status: Status::Error {
                    code,
                    message: error_text(code).to_string(),
                },
                payload: ReplyPayload::None,
            });
        }
        if let Some(code_text) = text.strip_prefix("WARNING") {
            let code = parse_hex_u8(code_text)?;
            log::warn!("[reply] WARNING {:02X}: {}", code, warning_text(code));
            return Ok(Reply {
                status: Status::Warning {
                    code,
                    message: warning_text(code).to_string(),
                },
                payload: ReplyPayload::None,
            });
        }

        match &command.format {
            ReplyFormat::Okay | ReplyFormat::OkayOrWarning => {
                if text.starts_with("OKAY") {
                    Ok(Reply::ok(ReplyPayload::None))
                } else {
                    Err(malformed(command, text))
                }
            }
            ReplyFormat::Reset => {
                if text.starts_with("RESET") {
                    Ok(Reply::ok(ReplyPayload::None))
                } else {
                    Err(malformed(command, text))
                }
            }
            ReplyFormat::Echo => {
                // The device echoes the command's arguments back.
                let expected = command.line.strip_prefix("ECHO ").unwrap_or(&command.line);
                if text.starts_with(expected) {
                    Ok(Reply::ok(ReplyPayload::Text(text.to_string())))
                } else {
                    Err(malformed(command, text))
                }
            }
            ReplyFormat::Beep => match text.as_bytes().first() {
                Some(b'1') => Ok(Reply::ok(ReplyPayload::None)),
                Some(b'0') => Ok(Reply {
                    status: Status::Warning {
                        code: 0,
                        message: "device is busy beeping".to_string(),
                    },
                    payload: ReplyPayload::None,
                }),
                _ => Err(malformed(command, text)),
            },
            ReplyFormat::Text => Ok(Reply::ok(ReplyPayload::Text(text.to_string()))),
            ReplyFormat::Parameters => Ok(Reply::ok(ReplyPayload::Parameters(parse_parameters(
                text,
            )))),
            ReplyFormat::PortHandleList => parse_port_handles(text, command),
            ReplyFormat::PortHandleAssign => {
                Ok(Reply::ok(ReplyPayload::PortHandle(parse_hex_u8(text)?)))
            }
            ReplyFormat::Version => Ok(Reply::ok(ReplyPayload::Version(
                text.split('\n').map(str::to_string).collect(),
            ))),
            ReplyFormat::Bx { .. } | ReplyFormat::Gbf | ReplyFormat::RawBinary => {
                // Capture-only variants of the binary commands answer OKAY.
                if text.starts_with("OKAY") {
                    Ok(Reply::ok(ReplyPayload::None))
                } else {
                    Err(malformed(command, text))
                }
            }
        }
    }

    fn decode_binary(payload: &[u8], command: &Command) -> Result<Reply> {
        match &command.format {
            ReplyFormat::Bx { options } => {
                let mut cur = Cursor::new(payload);
                let frame = BxFrame::decode(&mut cur, *options)?;
                Ok(Reply::ok(ReplyPayload::Bx(frame)))
            }
            ReplyFormat::Gbf => {
                let mut cur = Cursor::new(payload);
                let tree = GbfPayload::decode(&mut cur)?;
                Ok(Reply::ok(ReplyPayload::Gbf(tree)))
            }
            ReplyFormat::RawBinary => Ok(Reply::ok(ReplyPayload::RawBinary(payload.to_vec()))),
            _ => Err(Error::MalformedReply(format!(
                "binary reply to ASCII command '{}'",
                command.line
            ))),
        }
    }
}

fn malformed(command: &Command, text: &str) -> Error {
    let preview: String = text.chars().take(40).collect();
    Error::MalformedReply(format!(
        "unexpected reply '{}' to command '{}'",
        preview, command.line
    ))
}

/// Parse two leading hex characters into a byte.
fn parse_hex_u8(text: &str) -> Result<u8> {
    let digits = text.get(0..2).ok_or_else(|| {
        Error::MalformedReply(format!("expected 2 hex characters in '{}'", text))
    })?;
    u8::from_str_radix(digits, 16)
        .map_err(|_| Error::MalformedReply(format!("bad hex field '{}'", digits)))
}

/// `Name=value` lines; no LF after the final parameter.
fn parse_parameters(text: &str) -> Vec<(String, String)> {
    let mut parameters = Vec::new();
    for segment in text.split('\n') {
        if let Some(eq) = segment.find('=') {
            parameters.push((segment[..eq].to_string(), segment[eq + 1..].to_string()));
        }
    }
    parameters
}

/// Handle search reply: 2 hex chars count, then per handle 2 hex chars id +
/// 3 hex chars status.
fn parse_port_handles(text: &str, command: &Command) -> Result<Reply> {
    let count = parse_hex_u8(text)? as usize;
    let mut handles = Vec::with_capacity(count);
    let mut pos = 2;
    for _ in 0..count {
        let id = text
            .get(pos..pos + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| malformed(command, text))?;
        let status = text
            .get(pos + 2..pos + 5)
            .and_then(|s| u16::from_str_radix(s, 16).ok())
            .ok_or_else(|| malformed(command, text))?;
        handles.push((id, status));
        pos += 5;
    }
    Ok(Reply::ok(ReplyPayload::PortHandles(handles)))
}

// ============================================================================
// Fixed status code tables
// ============================================================================

/// Human-readable text for a device ERROR code.
pub fn error_text(code: u8) -> &'static str {
    match code {
        0x01 => "invalid command",
        0x02 => "command too long",
        0x03 => "command too short",
        0x04 => "invalid CRC calculated for command",
        0x05 => "time-out on command execution",
        0x06 => "unable to set up new communication parameters",
        0x07 => "incorrect number of parameters",
        0x08 => "invalid port handle selected",
        0x09 => "invalid priority selected",
        0x0A => "invalid LED selected",
        0x0B => "invalid LED state selected",
        0x0C => "command is invalid while in the current mode",
        0x0D => "no tool is assigned to the selected port handle",
        0x0E => "selected port handle not initialized",
        0x0F => "selected port handle not enabled",
        0x10 => "system not initialized",
        0x11 => "unable to stop tracking",
        0x12 => "unable to start tracking",
        0x13 => "unable to initialize the port handle",
        0x14 => "invalid position sensor characterization parameters",
        0x16 => "unable to initialize the system",
        0x17 => "unable to start diagnostic mode",
        0x18 => "unable to stop diagnostic mode",
        0x1A => "unable to determine environmental infrared interference",
        0x1B => "unable to read device firmware version information",
        0x1C => "internal system error",
        0x1E => "unable to read the tool definition from the port handle",
        0x20 => "command marked for removal from the API",
        0x22 => "enabled tools are not supported by the selected volume",
        0x23 => "command parameter is out of range",
        0x2A => "system memory is full",
        0x2C => "requested port is already in use",
        0x33 => "invalid volume selected",
        0x42 => "no device detected on the selected port",
        _ => "unrecognized error code",
    }
}

/// Human-readable text for a device WARNING code.
pub fn warning_text(code: u8) -> &'static str {
    match code {
        0x01 => "possible hardware fault detected",
        0x02 => "the tool definition does not match the connected tool",
        0x03 => "a tool is enabled but its port is unoccupied",
        0x04 => "tool definition loaded with a non-fatal fault",
        0x05 => "transformation may be inaccurate near the volume boundary",
        0x06 => "system initialized with default parameter values",
        0x07 => "firmware is running in safe mode",
        _ => "unrecognized warning code",
    }
}
