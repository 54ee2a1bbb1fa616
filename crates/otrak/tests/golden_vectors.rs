// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Golden wire-format vectors.
//!
//! Byte-exact checks of the framing and codecs against hand-written
//! buffers, independent of the crate's own encoders wherever the layout is
//! fixed enough to spell out.

use otrak::core::cursor::Cursor;
use otrak::protocol::bx::{reply_option, BxFrame};
use otrak::protocol::commands;
use otrak::protocol::crc::{crc16, crc16_ascii};
use otrak::protocol::gbf::{ComponentBody, GbfPayload};
use otrak::protocol::{Frame, FrameKind, FrameReader, Reply, ReplyPayload, Status};
use otrak::Connection;

/// Serves a fixed byte sequence, then reports timeouts.
struct Replay {
    bytes: Vec<u8>,
    pos: usize,
}

impl Replay {
    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Connection for Replay {
    fn connect(&mut self) -> otrak::Result<()> {
        Ok(())
    }
    fn is_connected(&self) -> bool {
        true
    }
    fn send(&mut self, _: &[u8]) -> otrak::Result<()> {
        Ok(())
    }
    fn recv(&mut self, buf: &mut [u8]) -> otrak::Result<usize> {
        let rest = &self.bytes[self.pos..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
    fn close(&mut self) -> otrak::Result<()> {
        Ok(())
    }
    fn describe(&self) -> String {
        "replay".into()
    }
}

fn read_one(bytes: Vec<u8>) -> Frame {
    FrameReader::default()
        .read_frame(&mut Replay::new(bytes))
        .expect("frame should parse")
}

#[test]
fn crc16_matches_device_transcripts() {
    assert_eq!(crc16(b"OKAY"), 0xA896);
    assert_eq!(crc16_ascii(b"OKAY"), "A896");
    assert_eq!(Frame::encode_ascii("OKAY"), b"OKAYA896\r");
}

#[test]
fn standard_binary_frame_layout() {
    let encoded = Frame::encode_binary(&[0x42]);
    // Start sequence 0xA5C4 appears little-endian on the wire.
    assert_eq!(&encoded[..2], &[0xC4, 0xA5]);
    // Length field.
    assert_eq!(&encoded[2..4], &[0x01, 0x00]);
    // Header CRC covers start + length.
    let header_crc = u16::from_le_bytes([encoded[4], encoded[5]]);
    assert_eq!(header_crc, crc16(&encoded[..4]));
    // Payload, then data CRC over the payload.
    assert_eq!(encoded[6], 0x42);
    let data_crc = u16::from_le_bytes([encoded[7], encoded[8]]);
    assert_eq!(data_crc, crc16(&[0x42]));
    assert_eq!(encoded.len(), 9);
}

#[test]
fn extended_binary_frame_layout() {
    let encoded = Frame::encode_extended(&[0x11, 0x22]);
    assert_eq!(&encoded[..2], &[0xC8, 0xA5]);
    assert_eq!(&encoded[2..6], &2u32.to_le_bytes());
    assert_eq!(&encoded[6..], &[0x11, 0x22]);
}

#[test]
fn stream_wrapper_layout() {
    let encoded = Frame::encode_stream_wrapper(b"id");
    assert_eq!(&encoded[..2], &[0xD4, 0xB5]);
    assert_eq!(&encoded[2..4], &2u16.to_le_bytes());
    assert_eq!(&encoded[4..6], b"id");
    assert_eq!(encoded.len(), 8); // wrapper carries a trailing header CRC
}

#[test]
fn scenario_ascii_parameter_reply() {
    // GET Param.X answered with "Param.X=12\n" + CRC + CR.
    let payload = "Param.X=12\n";
    let mut bytes = payload.as_bytes().to_vec();
    bytes.extend_from_slice(crc16_ascii(payload.as_bytes()).as_bytes());
    bytes.push(0x0D);

    let frame = read_one(bytes);
    assert_eq!(frame.kind, FrameKind::Ascii);

    let command = commands::get("Param.X");
    let reply = Reply::decode(&frame, &command).expect("decode");
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(
        reply.payload,
        ReplyPayload::Parameters(vec![("Param.X".into(), "12".into())])
    );
}

#[test]
fn scenario_gbf_empty_component_consumes_header_only() {
    // version 1, one component: 3D type, size 12, format 0, zero items.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&0x0003u16.to_le_bytes());
    bytes.extend_from_slice(&12u32.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(bytes.len(), 16);

    let mut cur = Cursor::new(&bytes);
    let payload = GbfPayload::decode(&mut cur).expect("decode");
    assert_eq!(cur.offset(), 16);
    assert_eq!(payload.components.len(), 1);
    match &payload.components[0].body {
        ComponentBody::Marker3d(groups) => assert!(groups.is_empty()),
        other => panic!("expected empty 3D component, got {:?}", other),
    }
}

#[test]
fn scenario_bx_missing_handle_advances_past_trailing_fields() {
    // Hand-written BX reply: one handle, status Missing, transform option
    // requested. No pose bytes; port status and frame number follow.
    let mut bytes = Vec::new();
    bytes.push(0x01); // handle count
    bytes.push(0x0A); // handle id
    bytes.push(0x02); // status: missing
    bytes.extend_from_slice(&0x0000_0031u32.to_le_bytes()); // port status
    bytes.extend_from_slice(&12_345u32.to_le_bytes()); // frame number
    bytes.extend_from_slice(&0u16.to_le_bytes()); // system status

    let mut cur = Cursor::new(&bytes);
    let frame = BxFrame::decode(&mut cur, reply_option::TRANSFORM).expect("decode");
    assert_eq!(cur.remaining(), 0);

    let handle = &frame.handles[0];
    assert!(handle.is_missing());
    assert_eq!(handle.pose, None);
    assert_eq!(handle.port_status, Some(0x31));
    assert_eq!(handle.frame_number, Some(12_345));
    assert!(frame.system_ok());
}

#[test]
fn bx_decoded_fields_match_option_bits() {
    use otrak::core::{Pose, Position};
    use otrak::protocol::bx::{handle_status, BxHandle, BxMarker, BxStrayActive, BxToolInfo};

    // For each option mask, populate exactly the blocks the mask names,
    // round-trip, and check unrequested blocks stay absent.
    let masks = [
        reply_option::TRANSFORM,
        reply_option::TOOL_MARKER_INFO,
        reply_option::TOOL_MARKERS,
        reply_option::TRANSFORM | reply_option::TOOL_MARKER_INFO,
        reply_option::TRANSFORM | reply_option::STRAY_ACTIVE | reply_option::ALL_TRANSFORMS,
        reply_option::TRANSFORM | reply_option::TOOL_MARKERS | reply_option::STRAY_PASSIVE,
    ];

    for &mask in &masks {
        let handle = BxHandle {
            handle: 0x0A,
            status: handle_status::VALID,
            pose: (mask & reply_option::TRANSFORM != 0)
                .then(|| Pose::new(1.0, 0.0, 0.0, 0.0, 4.0, 5.0, 6.0, 0.2)),
            port_status: (mask & reply_option::TRANSFORM != 0).then_some(0x31),
            frame_number: (mask & reply_option::TRANSFORM != 0).then_some(99),
            tool_info: (mask & reply_option::TOOL_MARKER_INFO != 0).then(|| BxToolInfo {
                tool: 0,
                markers: [3; 20],
            }),
            stray_active: (mask & reply_option::STRAY_ACTIVE != 0).then(|| BxStrayActive {
                status: 0x08,
                position: Some(Position::new(1.0, 2.0, 3.0)),
            }),
            markers: (mask & reply_option::TOOL_MARKERS != 0).then(|| {
                vec![BxMarker {
                    position: Position::new(7.0, 8.0, 9.0),
                    out_of_volume: false,
                }]
            }),
        };
        let frame = BxFrame {
            handles: vec![handle],
            stray_passive: (mask & reply_option::STRAY_PASSIVE != 0).then(Vec::new),
            system_status: 0,
        };

        let encoded = frame.encode(mask);
        let mut cur = Cursor::new(&encoded);
        let decoded = BxFrame::decode(&mut cur, mask).expect("decode");
        assert_eq!(cur.remaining(), 0, "mask {:#06X} left bytes", mask);
        assert_eq!(decoded, frame, "mask {:#06X} mismatched", mask);

        let h = &decoded.handles[0];
        assert_eq!(h.pose.is_some(), mask & reply_option::TRANSFORM != 0);
        assert_eq!(h.tool_info.is_some(), mask & reply_option::TOOL_MARKER_INFO != 0);
        assert_eq!(h.stray_active.is_some(), mask & reply_option::STRAY_ACTIVE != 0);
        assert_eq!(h.markers.is_some(), mask & reply_option::TOOL_MARKERS != 0);
    }
}

#[test]
fn gbf_6d_item_byte_layout() {
    use otrak::core::Pose;
    use otrak::protocol::gbf::{DataComponent, Item6d};

    let payload = GbfPayload {
        version: 1,
        components: vec![DataComponent {
            item_format: 0,
            body: ComponentBody::Pose6d(vec![Item6d {
                handle: 0x000A,
                status: 0,
                pose: Some(Pose::new(1.0, 0.0, 0.0, 0.0, 2.0, 3.0, 4.0, 0.5)),
            }]),
        }],
    };
    let bytes = payload.encode();

    // payload header: version, count
    assert_eq!(&bytes[0..2], &1u16.to_le_bytes());
    assert_eq!(&bytes[2..4], &1u16.to_le_bytes());
    // component header: type 0x0002, size 12 + 36, format, item count
    assert_eq!(&bytes[4..6], &0x0002u16.to_le_bytes());
    assert_eq!(&bytes[6..10], &48u32.to_le_bytes());
    assert_eq!(&bytes[10..12], &0u16.to_le_bytes());
    assert_eq!(&bytes[12..16], &1u32.to_le_bytes());
    // item: handle, status, q0 as the first float
    assert_eq!(&bytes[16..18], &0x000Au16.to_le_bytes());
    assert_eq!(&bytes[18..20], &0u16.to_le_bytes());
    assert_eq!(&bytes[20..24], &1.0f32.to_le_bytes());
    assert_eq!(bytes.len(), 16 + 4 + 8 * 4);
}

#[test]
fn streamed_frame_sequence_decodes_like_command_replies() {
    // A stream wrapper followed by a binary GBF frame, then an ASCII OKAY:
    // exactly what the wire looks like around a STREAM command.
    let payload = GbfPayload {
        version: 1,
        components: vec![],
    };
    let mut bytes = Frame::encode_stream_wrapper(b"bx2-stream");
    bytes.extend_from_slice(&Frame::encode_binary(&payload.encode()));
    bytes.extend_from_slice(&Frame::encode_ascii("OKAY"));

    let reader = FrameReader::default();
    let mut conn = Replay::new(bytes);

    let first = reader.read_frame(&mut conn).expect("streamed frame");
    assert_eq!(first.kind, FrameKind::Binary);
    let reply = Reply::decode(&first, &commands::bx2("--6d=tools")).expect("decode");
    assert_eq!(reply.payload, ReplyPayload::Gbf(payload));

    let second = reader.read_frame(&mut conn).expect("ack frame");
    assert_eq!(second.kind, FrameKind::Ascii);
    assert_eq!(second.ascii_text(), "OKAY");
}
