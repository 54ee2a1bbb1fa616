// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Command line builders.
//!
//! Every command is an ASCII line terminated with CR. Binary arguments (port
//! handles, reply-option masks, SROM bytes) are encoded as fixed-width
//! uppercase hex inside the line, even when the reply comes back binary.
//! Each builder tags the command with the reply shape it expects so the
//! decoder knows how to interpret the frame that comes back.

/// Reply shape a command expects. Drives the reply decoder's dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFormat {
    /// `OKAY` or `ERRORxx`.
    Okay,
    /// `OKAY`, `WARNINGxx`, or `ERRORxx`.
    OkayOrWarning,
    /// `RESET` banner.
    Reset,
    /// Echo of the command's arguments.
    Echo,
    /// `1` (done) or `0` (busy).
    Beep,
    /// Free-form ASCII payload.
    Text,
    /// `Name=value` lines.
    Parameters,
    /// Port handle list: count + (id, status) per handle, hex encoded.
    PortHandleList,
    /// Single freshly assigned port handle, hex encoded.
    PortHandleAssign,
    /// LF-separated firmware version lines.
    Version,
    /// Legacy binary reply; the decoder needs the request's option mask.
    Bx { options: u16 },
    /// General binary format payload.
    Gbf,
    /// Raw binary payload handed through undecoded.
    RawBinary,
}

/// One command ready to send: the ASCII line (without CR) plus the expected
/// reply shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub line: String,
    pub format: ReplyFormat,
}

impl Command {
    pub fn new(line: impl Into<String>, format: ReplyFormat) -> Self {
        Self {
            line: line.into(),
            format,
        }
    }

    /// Bytes to put on the wire: the line with the CR terminator appended.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = self.line.clone().into_bytes();
        if bytes.last() != Some(&b'\r') {
            bytes.push(b'\r');
        }
        bytes
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

/// Default item filter for the GBF data command.
pub const DEFAULT_GBF_FILTER: &str = "--6d=tools --3d=all";

/// PHSR search modes.
pub mod search_mode {
    /// All allocated port handles.
    pub const ALL: u8 = 0;
    /// Handles that need to be freed.
    pub const STALE: u8 = 1;
    /// Occupied but not initialized.
    pub const UNINITIALIZED: u8 = 2;
    /// Initialized but not enabled.
    pub const UNENABLED: u8 = 3;
    /// Enabled handles.
    pub const ENABLED: u8 = 4;
}

pub fn init() -> Command {
    Command::new("INIT ", ReplyFormat::OkayOrWarning)
}

pub fn reset() -> Command {
    Command::new("RESET ", ReplyFormat::Reset)
}

pub fn tstart() -> Command {
    Command::new("TSTART ", ReplyFormat::Okay)
}

pub fn tstop() -> Command {
    Command::new("TSTOP ", ReplyFormat::Okay)
}

/// Legacy data request; `options` is the reply-option bitmask, sent as four
/// hex digits and needed again to decode the reply.
pub fn bx(options: u16) -> Command {
    Command::new(format!("BX {:04X}", options), ReplyFormat::Bx { options })
}

/// GBF data request with an item filter such as [`DEFAULT_GBF_FILTER`].
pub fn bx2(filter: &str) -> Command {
    Command::new(format!("BX2 {}", filter), ReplyFormat::Gbf)
}

pub fn stream(filter: &str) -> Command {
    Command::new(format!("STREAM BX2 {}", filter), ReplyFormat::Okay)
}

pub fn ustream(filter: &str) -> Command {
    Command::new(format!("USTREAM BX2 {}", filter), ReplyFormat::Okay)
}

pub fn phsr(mode: u8) -> Command {
    Command::new(format!("PHSR {:02}", mode), ReplyFormat::PortHandleList)
}

/// Request a free port handle for a wireless tool.
pub fn phrq() -> Command {
    Command::new("PHRQ *********1****", ReplyFormat::PortHandleAssign)
}

pub fn phf(handle: u8) -> Command {
    Command::new(format!("PHF {:02X}", handle), ReplyFormat::Okay)
}

pub fn pinit(handle: u8) -> Command {
    Command::new(format!("PINIT {:02X}", handle), ReplyFormat::OkayOrWarning)
}

/// Enable a port handle. `mode` is the tracking priority character the
/// device expects: 'S' static, 'D' dynamic, 'B' button box.
pub fn pena(handle: u8, mode: char) -> Command {
    Command::new(
        format!("PENA {:02X}{}", handle, mode),
        ReplyFormat::OkayOrWarning,
    )
}

pub fn phinf(handle: u8, mode: u16) -> Command {
    Command::new(format!("PHINF {:02X}{:04X}", handle, mode), ReplyFormat::Text)
}

/// SROM chunk size per PVWR write.
pub const SROM_CHUNK: usize = 64;

/// Write one 64-byte chunk of a tool definition at `addr`. Short chunks are
/// zero-padded, matching how tool ROM files are flashed.
pub fn pvwr(handle: u8, addr: u16, chunk: &[u8]) -> Command {
    debug_assert!(chunk.len() <= SROM_CHUNK);
    let mut line = format!("PVWR {:02X}{:04X}", handle, addr);
    for i in 0..SROM_CHUNK {
        let byte = chunk.get(i).copied().unwrap_or(0);
        line.push_str(&format!("{:02X}", byte));
    }
    Command::new(line, ReplyFormat::Okay)
}

pub fn get(parameter: &str) -> Command {
    Command::new(format!("GET {}", parameter), ReplyFormat::Parameters)
}

pub fn getinfo(parameter: &str) -> Command {
    Command::new(format!("GETINFO {}", parameter), ReplyFormat::Parameters)
}

pub fn set(parameter: &str, value: &str) -> Command {
    Command::new(format!("SET {}={}", parameter, value), ReplyFormat::Okay)
}

pub fn ver(option: u8) -> Command {
    Command::new(format!("VER {}", option), ReplyFormat::Version)
}

pub fn apirev() -> Command {
    Command::new("APIREV ", ReplyFormat::Text)
}

pub fn beep(count: u8) -> Command {
    Command::new(format!("BEEP {}", count), ReplyFormat::Beep)
}

pub fn echo(text: &str) -> Command {
    Command::new(format!("ECHO {}", text), ReplyFormat::Echo)
}

pub fn getlog(options: &str) -> Command {
    Command::new(format!("GETLOG {}", options), ReplyFormat::RawBinary)
}

/// Image capture through the GBF path.
pub fn vcap(options: &str) -> Command {
    Command::new(format!("VCAP {}", options), ReplyFormat::Gbf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes_appends_cr_once() {
        let cmd = init();
        assert_eq!(cmd.wire_bytes(), b"INIT \r");
        let cmd = Command::new("TSTOP \r", ReplyFormat::Okay);
        assert_eq!(cmd.wire_bytes(), b"TSTOP \r");
    }

    #[test]
    fn test_binary_arguments_are_fixed_width_hex() {
        assert_eq!(bx(0x1803).line, "BX 1803");
        assert_eq!(phf(0x0A).line, "PHF 0A");
        assert_eq!(pena(0x0B, 'D').line, "PENA 0BD");
        assert_eq!(phsr(2).line, "PHSR 02");
    }

    #[test]
    fn test_pvwr_pads_short_chunks() {
        let cmd = pvwr(0x0A, 0x0040, &[0xAB, 0xCD]);
        assert!(cmd.line.starts_with("PVWR 0A0040ABCD00"));
        // "PVWR " + 2 + 4 + 128 hex chars
        assert_eq!(cmd.line.len(), 5 + 2 + 4 + 2 * SROM_CHUNK);
    }

    #[test]
    fn test_bx_format_carries_request_options() {
        match bx(0x0801).format {
            ReplyFormat::Bx { options } => assert_eq!(options, 0x0801),
            other => panic!("unexpected format {:?}", other),
        }
    }
}
