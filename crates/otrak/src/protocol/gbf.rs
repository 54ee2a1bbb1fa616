// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! General Binary Format (GBF) component codec.
//!
//! GBF is the recursive, self-describing payload format used by the newer
//! data commands. A payload is a version, a component count, and that many
//! data components; a frame component's items each nest a complete payload
//! again, making the format self-similar at two levels:
//!
//! ```text
//! payload
//!   +- component (type, size, item format, item count)
//!        +- item ... item
//!             +- payload          (frame items only)
//!                  +- component ...
//! ```
//!
//! The component set is the fixed set defined by the device protocol, so it
//! decodes into a closed tagged union. Unrecognized type codes are not
//! fatal: the declared size field says exactly how many bytes to skip, and
//! the raw bytes are preserved in an `Unknown` component so nothing is lost.

use crate::core::{Cursor, MarkerStatus, Pose, Position};
use crate::error::{Error, Result};
use crate::protocol::constants::{
    COMP_1D, COMP_3D, COMP_3D_ERROR, COMP_6D, COMP_ALERT, COMP_FRAME, COMP_HEADER_READ, COMP_IMAGE,
};

/// Nesting bound for frame items. Device data is two levels deep; anything
/// beyond this is a corrupted stream.
const MAX_NESTING: u32 = 8;

/// Bytes of a known component's header: type (2) + size (4) + item format
/// (2) + item count (4).
const COMP_HEADER_FULL: usize = 12;

/// 6D status bit: transform missing.
const STATUS_6D_MISSING: u16 = 0x0100;

/// Top-level GBF payload: version, then a list of data components.
#[derive(Debug, Clone, PartialEq)]
pub struct GbfPayload {
    pub version: u16,
    pub components: Vec<DataComponent>,
}

/// One data component: the item format option from its header plus the
/// decoded items.
#[derive(Debug, Clone, PartialEq)]
pub struct DataComponent {
    /// Item format option from the component header (carried through so
    /// re-encoding is lossless).
    pub item_format: u16,
    pub body: ComponentBody,
}

/// Closed union over the protocol's component set.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentBody {
    /// Frame components: one item per sampled frame, each nesting a payload.
    Frame(Vec<FrameItem>),
    /// 6D pose items, one per tool.
    Pose6d(Vec<Item6d>),
    /// 3D marker groups, one per tool (stray markers use handle 0xFFFF).
    Marker3d(Vec<Tool3d>),
    /// Button state groups, one per tool.
    Button1d(Vec<Tool1d>),
    /// Per-marker fit error groups, one per tool.
    MarkerError(Vec<ToolMarkerError>),
    /// Sensor image items.
    Image(Vec<ImageItem>),
    /// System fault/alert/event items.
    Alert(Vec<AlertItem>),
    /// Unrecognized component type: raw bytes after the type and size
    /// fields, preserved verbatim.
    Unknown { type_code: u16, raw: Vec<u8> },
}

impl ComponentBody {
    /// Wire type code for this component.
    pub fn type_code(&self) -> u16 {
        match self {
            ComponentBody::Frame(_) => COMP_FRAME,
            ComponentBody::Pose6d(_) => COMP_6D,
            ComponentBody::Marker3d(_) => COMP_3D,
            ComponentBody::Button1d(_) => COMP_1D,
            ComponentBody::MarkerError(_) => COMP_3D_ERROR,
            ComponentBody::Image(_) => COMP_IMAGE,
            ComponentBody::Alert(_) => COMP_ALERT,
            ComponentBody::Unknown { type_code, .. } => *type_code,
        }
    }

    fn item_count(&self) -> usize {
        match self {
            ComponentBody::Frame(items) => items.len(),
            ComponentBody::Pose6d(items) => items.len(),
            ComponentBody::Marker3d(items) => items.len(),
            ComponentBody::Button1d(items) => items.len(),
            ComponentBody::MarkerError(items) => items.len(),
            ComponentBody::Image(items) => items.len(),
            ComponentBody::Alert(items) => items.len(),
            ComponentBody::Unknown { .. } => 0,
        }
    }
}

/// One sampled frame: header fields plus a nested payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameItem {
    pub frame_type: u8,
    pub sequence_index: u8,
    pub status: u16,
    pub frame_number: u32,
    pub timestamp_s: u32,
    pub timestamp_ns: u32,
    pub payload: GbfPayload,
}

/// 6D pose item for one tool. The pose is absent when the status carries
/// the transform-missing bit.
#[derive(Debug, Clone, PartialEq)]
pub struct Item6d {
    pub handle: u16,
    pub status: u16,
    pub pose: Option<Pose>,
}

impl Item6d {
    pub fn is_missing(&self) -> bool {
        self.status & STATUS_6D_MISSING != 0
    }
}

/// 3D marker group for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool3d {
    pub handle: u16,
    pub markers: Vec<Item3d>,
}

/// One 3D marker measurement. Position bytes are present only when the
/// status is not Missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Item3d {
    pub status: MarkerStatus,
    pub index: u16,
    pub position: Option<Position>,
}

/// Button states for one tool, one byte per button.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool1d {
    pub handle: u16,
    pub buttons: Vec<u8>,
}

/// Per-marker fit errors for one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolMarkerError {
    pub handle: u16,
    /// (marker index, fit error) pairs
    pub errors: Vec<(u16, f32)>,
}

/// System alert classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertType {
    Fault,
    Alert,
    Event,
    Other(u8),
}

impl AlertType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AlertType::Fault,
            1 => AlertType::Alert,
            2 => AlertType::Event,
            other => AlertType::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            AlertType::Fault => 0,
            AlertType::Alert => 1,
            AlertType::Event => 2,
            AlertType::Other(raw) => raw,
        }
    }
}

/// One system fault/alert/event entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertItem {
    pub alert_type: AlertType,
    pub code: u16,
}

/// Pixel data sub-format of an image item.
pub const IMAGE_FORMAT_RAW: u8 = 0;
pub const IMAGE_FORMAT_PGM: u8 = 1;

/// One sensor image with its acquisition parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    pub format: u8,
    pub sensor: u8,
    pub frame_type: u8,
    pub frame_index: u8,
    pub frame_number: u32,
    pub trigger_threshold: f32,
    pub background_threshold: f32,
    pub exposure: u16,
    pub stride: u8,
    /// Bits per pixel
    pub depth: u8,
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub metadata: Vec<u8>,
    /// Pixel bytes (raw), or the embedded file bytes (PGM). Empty for
    /// deferred formats; the component size field keeps the stream in sync.
    pub data: Vec<u8>,
}

// ============================================================================
// Decoding
// ============================================================================

impl GbfPayload {
    /// Decode a payload from the cursor.
    pub fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Self::decode_at_depth(cur, 0)
    }

    fn decode_at_depth(cur: &mut Cursor<'_>, depth: u32) -> Result<Self> {
        if depth > MAX_NESTING {
            return Err(Error::MalformedReply(format!(
                "frame components nested deeper than {}",
                MAX_NESTING
            )));
        }

        let version = cur.read_u16_le()?;
        let count = cur.read_u16_le()?;
        let mut components = Vec::with_capacity(count as usize);
        for _ in 0..count {
            components.push(DataComponent::decode(cur, depth)?);
        }
        Ok(GbfPayload {
            version,
            components,
        })
    }
}

impl DataComponent {
    fn decode(cur: &mut Cursor<'_>, depth: u32) -> Result<Self> {
        let start = cur.offset();
        let type_code = cur.read_u16_le()?;
        let size = cur.read_u32_le()? as usize;

        if !is_known_type(type_code) {
            // Device output sometimes carries stray component codes. The
            // declared size keeps the cursor synchronized: skip exactly
            // size - 6 bytes (type and size were already read).
            if size < COMP_HEADER_READ {
                return Err(Error::MalformedReply(format!(
                    "component {:#06X} declares size {} below its own header",
                    type_code, size
                )));
            }
            let raw = cur.read_bytes(size - COMP_HEADER_READ)?.to_vec();
            log::debug!(
                "[gbf] skipped unknown component {:#06X} ({} bytes)",
                type_code,
                size
            );
            return Ok(DataComponent {
                item_format: 0,
                body: ComponentBody::Unknown { type_code, raw },
            });
        }

        let item_format = cur.read_u16_le()?;
        let item_count = cur.read_u32_le()? as usize;

        let body = match type_code {
            COMP_FRAME => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(FrameItem::decode(cur, depth + 1)?);
                }
                ComponentBody::Frame(items)
            }
            COMP_6D => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(Item6d::decode(cur)?);
                }
                ComponentBody::Pose6d(items)
            }
            COMP_3D => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(Tool3d::decode(cur)?);
                }
                ComponentBody::Marker3d(items)
            }
            COMP_1D => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(Tool1d::decode(cur)?);
                }
                ComponentBody::Button1d(items)
            }
            COMP_3D_ERROR => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(ToolMarkerError::decode(cur)?);
                }
                ComponentBody::MarkerError(items)
            }
            COMP_IMAGE => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(ImageItem::decode(cur)?);
                }
                ComponentBody::Image(items)
            }
            COMP_ALERT => {
                let mut items = Vec::with_capacity(item_count);
                for _ in 0..item_count {
                    items.push(AlertItem::decode(cur)?);
                }
                ComponentBody::Alert(items)
            }
            _ => unreachable!("type code checked above"),
        };

        // The size field is informational for known components, but when the
        // declared size exceeds what the item decoders consumed (deferred
        // image sub-formats, format extensions), skipping the remainder
        // keeps the cursor synchronized for the next component.
        let consumed = cur.offset() - start;
        if size > consumed {
            cur.skip(size - consumed)?;
            log::trace!(
                "[gbf] component {:#06X}: skipped {} undecoded trailing bytes",
                type_code,
                size - consumed
            );
        }

        Ok(DataComponent { item_format, body })
    }
}

fn is_known_type(type_code: u16) -> bool {
    matches!(
        type_code,
        COMP_FRAME | COMP_6D | COMP_3D | COMP_1D | COMP_3D_ERROR | COMP_IMAGE | COMP_ALERT
    )
}

impl FrameItem {
    fn decode(cur: &mut Cursor<'_>, depth: u32) -> Result<Self> {
        let frame_type = cur.read_u8()?;
        let sequence_index = cur.read_u8()?;
        let status = cur.read_u16_le()?;
        let frame_number = cur.read_u32_le()?;
        let timestamp_s = cur.read_u32_le()?;
        let timestamp_ns = cur.read_u32_le()?;
        let payload = GbfPayload::decode_at_depth(cur, depth)?;
        Ok(FrameItem {
            frame_type,
            sequence_index,
            status,
            frame_number,
            timestamp_s,
            timestamp_ns,
            payload,
        })
    }
}

impl Item6d {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let handle = cur.read_u16_le()?;
        let status = cur.read_u16_le()?;
        let pose = if status & STATUS_6D_MISSING != 0 {
            None
        } else {
            Some(read_pose(cur)?)
        };
        Ok(Item6d {
            handle,
            status,
            pose,
        })
    }
}

impl Tool3d {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let handle = cur.read_u16_le()?;
        let count = cur.read_u16_le()?;
        let mut markers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            markers.push(Item3d::decode(cur)?);
        }
        Ok(Tool3d { handle, markers })
    }
}

impl Item3d {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let status = MarkerStatus::from_u8(cur.read_u8()?);
        cur.skip(1)?; // reserved
        let index = cur.read_u16_le()?;
        let position = if status.is_missing() {
            None
        } else {
            Some(read_position(cur)?)
        };
        Ok(Item3d {
            status,
            index,
            position,
        })
    }
}

impl Tool1d {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let handle = cur.read_u16_le()?;
        let count = cur.read_u16_le()?;
        let mut buttons = Vec::with_capacity(count as usize);
        for _ in 0..count {
            buttons.push(cur.read_u8()?);
        }
        Ok(Tool1d { handle, buttons })
    }
}

impl ToolMarkerError {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let handle = cur.read_u16_le()?;
        let count = cur.read_u16_le()?;
        let mut errors = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let index = cur.read_u16_le()?;
            let error = cur.read_f32_le()?;
            errors.push((index, error));
        }
        Ok(ToolMarkerError { handle, errors })
    }
}

impl AlertItem {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let alert_type = AlertType::from_u8(cur.read_u8()?);
        cur.skip(1)?; // reserved
        let code = cur.read_u16_le()?;
        Ok(AlertItem { alert_type, code })
    }
}

impl ImageItem {
    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        let format = cur.read_u8()?;
        let sensor = cur.read_u8()?;
        let frame_type = cur.read_u8()?;
        let frame_index = cur.read_u8()?;
        let frame_number = cur.read_u32_le()?;
        let trigger_threshold = cur.read_f32_le()?;
        let background_threshold = cur.read_f32_le()?;
        let exposure = cur.read_u16_le()?;
        let stride = cur.read_u8()?;
        let depth = cur.read_u8()?;
        let x = cur.read_u16_le()?;
        let y = cur.read_u16_le()?;
        let width = cur.read_u16_le()?;
        let height = cur.read_u16_le()?;
        let meta_len = cur.read_u32_le()? as usize;
        let metadata = cur.read_bytes(meta_len)?.to_vec();

        let pixel_count = width as usize * height as usize;
        let data = match format {
            IMAGE_FORMAT_RAW => {
                // Pixel bytes derive from the image area and bit depth;
                // colour images carry two bytes per pixel.
                let len = if depth > 8 {
                    pixel_count * 2
                } else {
                    pixel_count * depth as usize / 8
                };
                cur.read_bytes(len)?.to_vec()
            }
            IMAGE_FORMAT_PGM => {
                // Embedded PGM file: magic line, text lines through the
                // maximum-value line, then two bytes per pixel.
                let mut blob = Vec::new();
                blob.extend_from_slice(cur.read_line()?.as_bytes());
                loop {
                    let line = cur.read_line()?;
                    blob.extend_from_slice(line.as_bytes());
                    if line.trim_end().ends_with("65535") {
                        break;
                    }
                }
                blob.extend_from_slice(cur.read_bytes(pixel_count * 2)?);
                blob
            }
            // TIFF/JPEG sub-formats are not decoded; the component's
            // declared size skips their bytes.
            _ => Vec::new(),
        };

        Ok(ImageItem {
            format,
            sensor,
            frame_type,
            frame_index,
            frame_number,
            trigger_threshold,
            background_threshold,
            exposure,
            stride,
            depth,
            x,
            y,
            width,
            height,
            metadata,
            data,
        })
    }
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
// Encoding. Used by device simulators and the round-trip tests; mirrors the
// decoders field for field.
// ============================================================================

impl GbfPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.components.len() as u16).to_le_bytes());
        for component in &self.components {
            component.encode_into(out);
        }
    }
}

impl DataComponent {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        if let ComponentBody::Unknown { type_code, raw } = &self.body {
            out.extend_from_slice(&type_code.to_le_bytes());
            out.extend_from_slice(&((raw.len() + COMP_HEADER_READ) as u32).to_le_bytes());
            out.extend_from_slice(raw);
            return;
        }

        let mut body = Vec::new();
        match &self.body {
            ComponentBody::Frame(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Pose6d(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Marker3d(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Button1d(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::MarkerError(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Image(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Alert(items) => {
                for item in items {
                    item.encode_into(&mut body);
                }
            }
            ComponentBody::Unknown { .. } => unreachable!("handled above"),
        }

        out.extend_from_slice(&self.body.type_code().to_le_bytes());
        out.extend_from_slice(&((COMP_HEADER_FULL + body.len()) as u32).to_le_bytes());
        out.extend_from_slice(&self.item_format.to_le_bytes());
        out.extend_from_slice(&(self.body.item_count() as u32).to_le_bytes());
        out.extend_from_slice(&body);
    }
}

impl FrameItem {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.frame_type);
        out.push(self.sequence_index);
        out.extend_from_slice(&self.status.to_le_bytes());
        out.extend_from_slice(&self.frame_number.to_le_bytes());
        out.extend_from_slice(&self.timestamp_s.to_le_bytes());
        out.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        self.payload.encode_into(out);
    }
}

impl Item6d {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.handle.to_le_bytes());
        out.extend_from_slice(&self.status.to_le_bytes());
        if let Some(pose) = &self.pose {
            write_pose(out, pose);
        }
    }
}

impl Tool3d {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.handle.to_le_bytes());
        out.extend_from_slice(&(self.markers.len() as u16).to_le_bytes());
        for marker in &self.markers {
            marker.encode_into(out);
        }
    }
}

impl Item3d {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.status.as_u8());
        out.push(0); // reserved
        out.extend_from_slice(&self.index.to_le_bytes());
        if let Some(pos) = &self.position {
            write_position(out, pos);
        }
    }
}

impl Tool1d {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.handle.to_le_bytes());
        out.extend_from_slice(&(self.buttons.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.buttons);
    }
}

impl ToolMarkerError {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.handle.to_le_bytes());
        out.extend_from_slice(&(self.errors.len() as u16).to_le_bytes());
        for (index, error) in &self.errors {
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&error.to_le_bytes());
        }
    }
}

impl AlertItem {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.alert_type.as_u8());
        out.push(0); // reserved
        out.extend_from_slice(&self.code.to_le_bytes());
    }
}

impl ImageItem {
    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.format);
        out.push(self.sensor);
        out.push(self.frame_type);
        out.push(self.frame_index);
        out.extend_from_slice(&self.frame_number.to_le_bytes());
        out.extend_from_slice(&self.trigger_threshold.to_le_bytes());
        out.extend_from_slice(&self.background_threshold.to_le_bytes());
        out.extend_from_slice(&self.exposure.to_le_bytes());
        out.push(self.stride);
        out.push(self.depth);
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&(self.metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.metadata);
        out.extend_from_slice(&self.data);
    }
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

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> GbfPayload {
        let mut cur = Cursor::new(bytes);
        let payload = GbfPayload::decode(&mut cur).expect("decode should succeed");
        assert!(cur.is_eof(), "decoder must consume the whole payload");
        payload
    }

    fn sample_pose() -> Pose {
        Pose::new(0.7071, 0.0, 0.7071, 0.0, 102.5, -14.25, -1450.0, 0.18)
    }

    #[test]
    fn test_empty_3d_component_consumes_header_only() {
        let payload = GbfPayload {
            version: 1,
            components: vec![DataComponent {
                item_format: 0,
                body: ComponentBody::Marker3d(vec![]),
            }],
        };
        let bytes = payload.encode();
        // payload header (2 + 2) + component header (2 + 4 + 2 + 4)
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode(&bytes), payload);
    }

    #[test]
    fn test_roundtrip_every_component_variant() {
        let inner = GbfPayload {
            version: 1,
            components: vec![
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Pose6d(vec![
                        Item6d {
                            handle: 0x0A,
                            status: 0x0000,
                            pose: Some(sample_pose()),
                        },
                        Item6d {
                            handle: 0x0B,
                            status: STATUS_6D_MISSING,
                            pose: None,
                        },
                    ]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Marker3d(vec![Tool3d {
                        handle: 0x0A,
                        markers: vec![
                            Item3d {
                                status: MarkerStatus::Okay,
                                index: 0,
                                position: Some(Position::new(1.0, 2.0, 3.0)),
                            },
                            Item3d {
                                status: MarkerStatus::Missing,
                                index: 1,
                                position: None,
                            },
                        ],
                    }]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Button1d(vec![Tool1d {
                        handle: 0x0A,
                        buttons: vec![1, 0, 0],
                    }]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::MarkerError(vec![ToolMarkerError {
                        handle: 0x0A,
                        errors: vec![(0, 0.05), (1, 0.11)],
                    }]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Alert(vec![AlertItem {
                        alert_type: AlertType::Event,
                        code: 3,
                    }]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Image(vec![ImageItem {
                        format: IMAGE_FORMAT_RAW,
                        sensor: 0,
                        frame_type: 2,
                        frame_index: 0,
                        frame_number: 77,
                        trigger_threshold: 0.5,
                        background_threshold: 0.25,
                        exposure: 120,
                        stride: 1,
                        depth: 8,
                        x: 0,
                        y: 0,
                        width: 4,
                        height: 2,
                        metadata: b"cam0".to_vec(),
                        data: vec![9, 8, 7, 6, 5, 4, 3, 2],
                    }]),
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Unknown {
                        type_code: 0x0042,
                        raw: vec![0xDE, 0xAD, 0xBE, 0xEF],
                    },
                },
            ],
        };
        let payload = GbfPayload {
            version: 1,
            components: vec![DataComponent {
                item_format: 1,
                body: ComponentBody::Frame(vec![FrameItem {
                    frame_type: 2,
                    sequence_index: 0,
                    status: 0,
                    frame_number: 123_456,
                    timestamp_s: 1_700_000_000,
                    timestamp_ns: 250_000,
                    payload: inner,
                }]),
            }],
        };

        assert_eq!(decode(&payload.encode()), payload);
    }

    #[test]
    fn test_unknown_component_resynchronization() {
        // Unknown component with declared size S, then a well-formed 6D
        // component: the decoder must consume exactly S - 6 bytes and pick
        // the next component up cleanly.
        let junk = vec![0x55u8; 17];
        let payload = GbfPayload {
            version: 1,
            components: vec![
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Unknown {
                        type_code: 0x7777,
                        raw: junk.clone(),
                    },
                },
                DataComponent {
                    item_format: 0,
                    body: ComponentBody::Pose6d(vec![Item6d {
                        handle: 1,
                        status: 0,
                        pose: Some(sample_pose()),
                    }]),
                },
            ],
        };
        let decoded = decode(&payload.encode());
        assert_eq!(decoded, payload);
        match &decoded.components[0].body {
            ComponentBody::Unknown { type_code, raw } => {
                assert_eq!(*type_code, 0x7777);
                assert_eq!(raw, &junk);
            }
            other => panic!("expected unknown component, got {:?}", other),
        }
    }

    #[test]
    fn test_undersized_unknown_component_is_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u16.to_le_bytes()); // version
        bytes.extend_from_slice(&1u16.to_le_bytes()); // count
        bytes.extend_from_slice(&0x9999u16.to_le_bytes()); // unknown type
        bytes.extend_from_slice(&2u32.to_le_bytes()); // size below header
        let mut cur = Cursor::new(&bytes);
        assert!(matches!(
            GbfPayload::decode(&mut cur),
            Err(Error::MalformedReply(_))
        ));
    }

    #[test]
    fn test_truncated_item_reports_underrun() {
        let payload = GbfPayload {
            version: 1,
            components: vec![DataComponent {
                item_format: 0,
                body: ComponentBody::Pose6d(vec![Item6d {
                    handle: 1,
                    status: 0,
                    pose: Some(sample_pose()),
                }]),
            }],
        };
        let bytes = payload.encode();
        let mut cur = Cursor::new(&bytes[..bytes.len() - 3]);
        assert!(matches!(
            GbfPayload::decode(&mut cur),
            Err(Error::Underrun { .. })
        ));
    }

    #[test]
    fn test_oversized_declared_size_skips_trailing_bytes() {
        // A component whose declared size covers 4 extra bytes the item
        // decoders do not understand, followed by another component. The
        // decoder must skip the surplus and stay synchronized.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u16.to_le_bytes()); // version
        bytes.extend_from_slice(&2u16.to_le_bytes()); // two components
        bytes.extend_from_slice(&COMP_ALERT.to_le_bytes());
        bytes.extend_from_slice(&20u32.to_le_bytes()); // 12 header + 4 item + 4 surplus
        bytes.extend_from_slice(&0u16.to_le_bytes()); // item format
        bytes.extend_from_slice(&1u32.to_le_bytes()); // one item
        bytes.extend_from_slice(&[1, 0]); // alert type + reserved
        bytes.extend_from_slice(&7u16.to_le_bytes()); // code
        bytes.extend_from_slice(&[0xEE; 4]); // surplus covered by size
        bytes.extend_from_slice(&COMP_1D.to_le_bytes());
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let decoded = decode(&bytes);
        assert_eq!(decoded.components.len(), 2);
        assert!(matches!(decoded.components[1].body, ComponentBody::Button1d(_)));
    }

    #[test]
    fn test_pgm_image_blob_is_preserved() {
        let mut pgm = Vec::new();
        pgm.extend_from_slice(b"P5\n");
        pgm.extend_from_slice(b"NDCAM 2 1\n");
        pgm.extend_from_slice(b"2 1  65535\n");
        pgm.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]); // 2x1 pixels, 2 bytes each

        let item = ImageItem {
            format: IMAGE_FORMAT_PGM,
            sensor: 1,
            frame_type: 2,
            frame_index: 0,
            frame_number: 9,
            trigger_threshold: 0.0,
            background_threshold: 0.0,
            exposure: 30,
            stride: 1,
            depth: 16,
            x: 0,
            y: 0,
            width: 2,
            height: 1,
            metadata: Vec::new(),
            data: pgm,
        };
        let payload = GbfPayload {
            version: 1,
            components: vec![DataComponent {
                item_format: 0,
                body: ComponentBody::Image(vec![item]),
            }],
        };
        assert_eq!(decode(&payload.encode()), payload);
    }
}
