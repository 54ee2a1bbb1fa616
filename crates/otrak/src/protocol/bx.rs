// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Legacy per-handle binary reply codec (the BX format).
//!
//! Unlike GBF, nothing at this level is self-describing: which fields are
//! present depends entirely on the reply-option bitmask the caller sent with
//! the command, and options are reported in ascending bit order per handle.
//! The decoder must therefore be driven by the same bitmask to know which
//! bytes to expect next.
//!
//! ```text
//! <handle count u8>
//! per handle: <id u8> <status u8> <option 0001 data> ... <option 0008 data>
//! <option 1000 data (stray passive markers)>
//! <system status u16>
//! ```

use crate::core::{Cursor, Pose, Position};
use crate::error::Result;

// ============================================================================
// Reply options and status bitfields
// ============================================================================

/// Reply-option bits for the legacy data command. OR them together; the
/// device reports the selected blocks per handle in ascending bit order.
pub mod reply_option {
    /// Pose, port status, and frame number.
    pub const TRANSFORM: u16 = 0x0001;
    /// Tool information byte plus per-marker 4-bit codes.
    pub const TOOL_MARKER_INFO: u16 = 0x0002;
    /// 3D position of a single stray active marker.
    pub const STRAY_ACTIVE: u16 = 0x0004;
    /// 3D positions of the markers on each tool.
    pub const TOOL_MARKERS: u16 = 0x0008;
    /// Report transforms the device would otherwise suppress (e.g. out of
    /// volume).
    pub const ALL_TRANSFORMS: u16 = 0x0800;
    /// 3D positions of stray passive markers, after all handles.
    pub const STRAY_PASSIVE: u16 = 0x1000;
    /// Extends STRAY_PASSIVE with 4-bit phantom status per marker.
    pub const STRAY_PASSIVE_EXTENDED: u16 = 0x2000;
}

/// Per-handle status byte values.
pub mod handle_status {
    pub const VALID: u8 = 0x01;
    pub const MISSING: u8 = 0x02;
    pub const DISABLED: u8 = 0x04;
}

/// Port status bits reported with the transform block.
pub mod port_status {
    pub const OCCUPIED: u32 = 0x0001;
    pub const SWITCH_1: u32 = 0x0002;
    pub const SWITCH_2: u32 = 0x0004;
    pub const SWITCH_3: u32 = 0x0008;
    pub const INITIALIZED: u32 = 0x0010;
    pub const ENABLED: u32 = 0x0020;
    pub const OUT_OF_VOLUME: u32 = 0x0040;
    pub const PARTIALLY_OUT_OF_VOLUME: u32 = 0x0080;
    pub const BUFFER_OVERRUN: u32 = 0x0100;
    pub const IR_INTERFERENCE: u32 = 0x0200;
    pub const PROCESSING_EXCEPTION: u32 = 0x1000;
    pub const FELL_BEHIND: u32 = 0x4000;
    pub const DATA_BUFFER_LIMIT: u32 = 0x8000;
}

/// System status bits in the trailing field of every BX reply.
pub mod system_status {
    pub const SYNC_ERROR: u16 = 0x0001;
    pub const PROCESSING_EXCEPTION: u16 = 0x0008;
    pub const HANDLE_OCCUPIED: u16 = 0x0040;
    pub const HANDLE_UNOCCUPIED: u16 = 0x0080;
    pub const DIAGNOSTIC_PENDING: u16 = 0x0100;
    pub const TEMPERATURE: u16 = 0x0200;
    pub const CONFIG_CHANGED: u16 = 0x0400;
}

/// Stray-active marker status values (exact values, not bits).
pub mod stray_active_status {
    pub const VALID: u8 = 0x01;
    pub const MISSING: u8 = 0x02;
    pub const OUT_OF_VOLUME: u8 = 0x08;
}

// ============================================================================
// Decoded reply
// ============================================================================

/// One decoded BX reply.
#[derive(Debug, Clone, PartialEq)]
pub struct BxFrame {
    pub handles: Vec<BxHandle>,
    /// Present when the STRAY_PASSIVE option was requested.
    pub stray_passive: Option<Vec<BxStrayMarker>>,
    pub system_status: u16,
}

impl BxFrame {
    pub fn system_ok(&self) -> bool {
        self.system_status == 0
    }
}

/// Per-handle data; option-gated fields are `None` when the corresponding
/// bit was not requested (or the handle was disabled).
#[derive(Debug, Clone, PartialEq)]
pub struct BxHandle {
    pub handle: u8,
    pub status: u8,
    /// Transform; `None` inside `Some(..)` distinguishes "requested but
    /// missing" from "not requested" at the field level below.
    pub pose: Option<Pose>,
    pub port_status: Option<u32>,
    pub frame_number: Option<u32>,
    pub tool_info: Option<BxToolInfo>,
    pub stray_active: Option<BxStrayActive>,
    pub markers: Option<Vec<BxMarker>>,
}

impl BxHandle {
    pub fn is_valid(&self) -> bool {
        self.status & handle_status::VALID != 0
    }

    pub fn is_missing(&self) -> bool {
        self.status & handle_status::MISSING != 0
    }

    pub fn is_disabled(&self) -> bool {
        self.status & handle_status::DISABLED != 0
    }
}

/// Tool information byte plus the 4-bit per-marker codes (20 markers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BxToolInfo {
    pub tool: u8,
    /// One 4-bit code per marker, index 0 = marker A.
    pub markers: [u8; 20],
}

/// Marker-information nibble codes.
pub mod marker_info {
    pub const MISSING: u8 = 0;
    pub const OFF_ANGLE: u8 = 1;
    pub const MAX_3D_ERROR: u8 = 2;
    pub const USED: u8 = 3;
    pub const OUT_OF_VOLUME: u8 = 4;
    pub const OUT_OF_CHARACTERIZED: u8 = 5;
}

/// Single stray active marker block.
#[derive(Debug, Clone, PartialEq)]
pub struct BxStrayActive {
    pub status: u8,
    pub position: Option<Position>,
}

/// One tool marker with its out-of-volume flag.
#[derive(Debug, Clone, PartialEq)]
pub struct BxMarker {
    pub position: Position,
    pub out_of_volume: bool,
}

/// One stray passive marker; `phantom_status` is nonzero only when the
/// extended option was requested and the device flagged the marker.
#[derive(Debug, Clone, PartialEq)]
pub struct BxStrayMarker {
    pub position: Position,
    pub out_of_volume: bool,
    pub phantom_status: u8,
}

// ============================================================================
// Decoding
// ============================================================================

impl BxFrame {
    /// Decode a BX payload. `options` must be the reply-option bitmask that
    /// was sent with the command — there is no self-describing length at
    /// this level.
    pub fn decode(cur: &mut Cursor<'_>, options: u16) -> Result<Self> {
        let count = cur.read_u8()?;
        let mut handles = Vec::with_capacity(count as usize);
        for _ in 0..count {
            handles.push(BxHandle::decode(cur, options)?);
        }

        let stray_passive = if options & reply_option::STRAY_PASSIVE != 0 {
            Some(decode_stray_passive(cur, options)?)
        } else {
            None
        };

        let system_status = cur.read_u16_le()?;
        Ok(BxFrame {
            handles,
            stray_passive,
            system_status,
        })
    }
}

impl BxHandle {
    fn decode(cur: &mut Cursor<'_>, options: u16) -> Result<Self> {
        let handle = cur.read_u8()?;
        let status = cur.read_u8()?;

        let mut decoded = BxHandle {
            handle,
            status,
            pose: None,
            port_status: None,
            frame_number: None,
            tool_info: None,
            stray_active: None,
            markers: None,
        };

        // A disabled handle reports nothing further, regardless of the
        // requested options.
        if decoded.is_disabled() {
            return Ok(decoded);
        }

        if options & reply_option::TRANSFORM != 0 {
            // A missing transform omits the pose; port status and frame
            // number still follow.
            if !decoded.is_missing() {
                decoded.pose = Some(read_pose(cur)?);
            }
            decoded.port_status = Some(cur.read_u32_le()?);
            decoded.frame_number = Some(cur.read_u32_le()?);
        }

        if options & reply_option::TOOL_MARKER_INFO != 0 {
            decoded.tool_info = Some(BxToolInfo::decode(cur)?);
        }

        if options & reply_option::STRAY_ACTIVE != 0 {
            decoded.stray_active = Some(BxStrayActive::decode(cur, options)?);
        }

        if options & reply_option::TOOL_MARKERS != 0 {
            decoded.markers = Some(decode_tool_markers(cur)?);
        }

        Ok(decoded)
    }
}

impl BxToolInfo {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let tool = cur.read_u8()?;
        let raw = cur.read_bytes(10)?;
        // Two markers per byte, last byte first, low nibble before high.
        let mut markers = [0u8; 20];
        for (b, byte) in raw.iter().rev().enumerate() {
            markers[b * 2] = byte & 0x0F;
            markers[b * 2 + 1] = (byte >> 4) & 0x0F;
        }
        Ok(BxToolInfo { tool, markers })
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.tool);
        let mut raw = [0u8; 10];
        for b in 0..10 {
            let low = self.markers[b * 2] & 0x0F;
            let high = self.markers[b * 2 + 1] & 0x0F;
            raw[9 - b] = (high << 4) | low;
        }
        out.extend_from_slice(&raw);
    }
}

impl BxStrayActive {
    fn decode(cur: &mut Cursor<'_>, options: u16) -> Result<Self> {
        let status = cur.read_u8()?;
        let position = if status == stray_active_status::VALID
            || (status == stray_active_status::OUT_OF_VOLUME
                && options & reply_option::ALL_TRANSFORMS != 0)
        {
            Some(read_position(cur)?)
        } else {
            None
        };
        Ok(BxStrayActive { status, position })
    }
}

fn decode_tool_markers(cur: &mut Cursor<'_>) -> Result<Vec<BxMarker>> {
    let count = cur.read_u8()? as usize;
    let oov = read_oov_bits(cur, count)?;
    let mut markers = Vec::with_capacity(count);
    for out_of_volume in oov {
        markers.push(BxMarker {
            position: read_position(cur)?,
            out_of_volume,
        });
    }
    Ok(markers)
}

fn decode_stray_passive(cur: &mut Cursor<'_>, options: u16) -> Result<Vec<BxStrayMarker>> {
    let count = cur.read_u8()? as usize;
    // Zero markers: no out-of-volume bytes, no positions, and no extended
    // status block even when requested.
    if count == 0 {
        return Ok(Vec::new());
    }

    let oov = read_oov_bits(cur, count)?;
    let mut markers = Vec::with_capacity(count);
    for out_of_volume in oov.into_iter().take(count) {
        markers.push(BxStrayMarker {
            position: read_position(cur)?,
            out_of_volume,
            phantom_status: 0,
        });
    }

    if options & reply_option::STRAY_PASSIVE_EXTENDED != 0 {
        // 4 bits per marker, high nibble first within each byte.
        let bytes = count.div_ceil(2);
        for b in 0..bytes {
            let status = cur.read_u8()?;
            markers[b * 2].phantom_status = (status >> 4) & 0x0F;
            if b * 2 + 1 < count {
                markers[b * 2 + 1].phantom_status = status & 0x0F;
            }
        }
    }

    Ok(markers)
}

/// Out-of-volume bits: one bit per marker, packed 8 per byte, last byte
/// holding the lowest-numbered markers.
fn read_oov_bits(cur: &mut Cursor<'_>, count: usize) -> Result<Vec<bool>> {
    let len = count.div_ceil(8);
    let raw = cur.read_bytes(len)?;
    let mut bits = Vec::with_capacity(count);
    for m in 0..count {
        let byte = m / 8;
        let bit = m % 8;
        bits.push((raw[len - 1 - byte] >> bit) & 0x01 != 0);
    }
    Ok(bits)
}

fn read_position(cur: &mut Cursor<'_>) -> Result<Position> {
    Ok(Position::new(
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
    ))
}

fn read_pose(cur: &mut Cursor<'_>) -> Result<Pose> {
    Ok(Pose::new(
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
        cur.read_f32_le()?,
    ))
}

// ============================================================================
// Encoding. Option-conditional, same fixed order as the decoder; used by
// device simulators and tests.
// ============================================================================

impl BxFrame {
    pub fn encode(&self, options: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.handles.len() as u8);
        for handle in &self.handles {
            handle.encode_into(&mut out, options);
        }
        if options & reply_option::STRAY_PASSIVE != 0 {
            let markers = self.stray_passive.as_deref().unwrap_or(&[]);
            out.push(markers.len() as u8);
            if !markers.is_empty() {
                write_oov_bits(&mut out, markers.iter().map(|m| m.out_of_volume));
                for marker in markers {
                    write_position(&mut out, &marker.position);
                }
                if options & reply_option::STRAY_PASSIVE_EXTENDED != 0 {
                    for pair in markers.chunks(2) {
                        let high = pair[0].phantom_status & 0x0F;
                        let low = pair.get(1).map(|m| m.phantom_status & 0x0F).unwrap_or(0);
                        out.push((high << 4) | low);
                    }
                }
            }
        }
        out.extend_from_slice(&self.system_status.to_le_bytes());
        out
    }
}

impl BxHandle {
    fn encode_into(&self, out: &mut Vec<u8>, options: u16) {
        out.push(self.handle);
        out.push(self.status);
        if self.is_disabled() {
            return;
        }

        if options & reply_option::TRANSFORM != 0 {
            if let Some(pose) = &self.pose {
                write_pose(out, pose);
            }
            out.extend_from_slice(&self.port_status.unwrap_or(0).to_le_bytes());
            out.extend_from_slice(&self.frame_number.unwrap_or(0).to_le_bytes());
        }

        if options & reply_option::TOOL_MARKER_INFO != 0 {
            if let Some(info) = &self.tool_info {
                info.encode_into(out);
            }
        }

        if options & reply_option::STRAY_ACTIVE != 0 {
            if let Some(stray) = &self.stray_active {
                out.push(stray.status);
                if let Some(pos) = &stray.position {
                    write_position(out, pos);
                }
            }
        }

        if options & reply_option::TOOL_MARKERS != 0 {
            if let Some(markers) = &self.markers {
                out.push(markers.len() as u8);
                write_oov_bits(out, markers.iter().map(|m| m.out_of_volume));
                for marker in markers {
                    write_position(out, &marker.position);
                }
            }
        }
    }
}

fn write_oov_bits(out: &mut Vec<u8>, flags: impl ExactSizeIterator<Item = bool>) {
    let count = flags.len();
    let len = count.div_ceil(8);
    let mut raw = vec![0u8; len];
    for (m, flag) in flags.enumerate() {
        if flag {
            let byte = m / 8;
            let bit = m % 8;
            raw[len - 1 - byte] |= 1 << bit;
        }
    }
    out.extend_from_slice(&raw);
}

fn write_position(out: &mut Vec<u8>, pos: &Position) {
    out.extend_from_slice(&pos.x.to_le_bytes());
    out.extend_from_slice(&pos.y.to_le_bytes());
    out.extend_from_slice(&pos.z.to_le_bytes());
}

fn write_pose(out: &mut Vec<u8>, pose: &Pose) {
    for v in [
        pose.q0, pose.qx, pose.qy, pose.qz, pose.tx, pose.ty, pose.tz, pose.error,
    ] {
        out.extend_from_slice(&v.to_le_bytes());
    }
}
