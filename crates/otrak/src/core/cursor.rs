// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 otrak contributors

//! Read cursor for decoding binary reply payloads.
//!
//! All multi-byte wire values are little-endian. Every read is all-or-nothing:
//! a request past the end of the buffer fails with [`CursorError`] and leaves
//! the cursor position unchanged.

use super::{CursorError, CursorResult};

/// Generate read methods for primitive types (eliminates code duplication)
///
/// Each generated method:
/// 1. Checks buffer bounds (returns `CursorError` if the read would overrun)
/// 2. Reads N bytes from buffer
/// 3. Converts bytes to value via `from_le_bytes()`
/// 4. Advances offset
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> CursorResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(self.underrun($size));
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Immutable cursor for reading (bounds-checked, zero-copy)
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    // Generate fixed-width read methods via macro
    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u16_le, u16, 2);
    impl_read_le!(read_u32_le, u32, 4);
    impl_read_le!(read_i16_le, i16, 2);
    impl_read_le!(read_i32_le, i32, 4);

    pub fn read_f32_le(&mut self) -> CursorResult<f32> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    /// Read an unsigned integer of `n` bytes (n in 1..=4), little-endian.
    ///
    /// The legacy per-handle format mixes 1, 2, and 4-byte fields freely, so
    /// decoders need the width as a runtime argument.
    pub fn read_uint_le(&mut self, n: usize) -> CursorResult<u32> {
        debug_assert!((1..=4).contains(&n), "read_uint_le width out of range");
        let bytes = self.read_bytes(n)?;
        let mut padded = [0u8; 4];
        padded[..n].copy_from_slice(bytes);
        Ok(u32::from_le_bytes(padded))
    }

    /// Read a signed integer of `n` bytes (n in 1..=4), little-endian,
    /// sign-extended to i32.
    pub fn read_int_le(&mut self, n: usize) -> CursorResult<i32> {
        let raw = self.read_uint_le(n)?;
        let shift = 32 - 8 * n as u32;
        Ok(((raw << shift) as i32) >> shift)
    }

    pub fn read_bytes(&mut self, len: usize) -> CursorResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(self.underrun(len));
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Read `n` bytes and interpret them as ASCII text.
    ///
    /// Bytes outside the ASCII range are mapped through as-is (Latin-1), the
    /// way device text fields are observed on the wire.
    pub fn read_char(&mut self, n: usize) -> CursorResult<String> {
        let bytes = self.read_bytes(n)?;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    /// Consume bytes through the first `\n` (inclusive) and return them as
    /// text. Fails without advancing if no `\n` remains.
    pub fn read_line(&mut self) -> CursorResult<String> {
        let rest = &self.buffer[self.offset..];
        match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => self.read_char(pos + 1),
            None => Err(self.underrun(rest.len() + 1)),
        }
    }

    pub fn skip(&mut self, n: usize) -> CursorResult<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    fn underrun(&self, needed: usize) -> CursorError {
        CursorError::Underrun {
            offset: self.offset,
            needed,
            available: self.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_U16: u16 = 0xCDEF;
    const TEST_U32: u32 = 0x1234_5678;

    #[test]
    fn test_read_overrun_reports_offset_and_keeps_position() {
        let buffer = [0u8; 1];
        let mut cursor = Cursor::new(&buffer);
        assert_eq!(cursor.read_u8().expect("Read u8 should succeed"), 0);

        let err = cursor.read_u16_le().unwrap_err();
        match err {
            CursorError::Underrun {
                offset,
                needed,
                available,
            } => {
                assert_eq!(offset, 1);
                assert_eq!(needed, 2);
                assert_eq!(available, 0);
            }
        }
        // failed read must not advance
        assert_eq!(cursor.offset(), 1);
    }

    #[test]
    fn test_read_primitives_content() {
        let mut buffer = Vec::new();
        buffer.push(0x11);
        buffer.extend_from_slice(&TEST_U16.to_le_bytes());
        buffer.extend_from_slice(&TEST_U32.to_le_bytes());
        buffer.extend_from_slice(&(-123i32).to_le_bytes());
        buffer.extend_from_slice(&1.5f32.to_le_bytes());
        buffer.extend_from_slice(&[0xDE, 0xAD]);

        let mut cursor = Cursor::new(&buffer);
        assert_eq!(cursor.read_u8().expect("Read u8 should succeed"), 0x11);
        assert_eq!(
            cursor.read_u16_le().expect("Read u16 should succeed"),
            TEST_U16
        );
        assert_eq!(
            cursor.read_u32_le().expect("Read u32 should succeed"),
            TEST_U32
        );
        assert_eq!(cursor.read_i32_le().expect("Read i32 should succeed"), -123);
        assert!((cursor.read_f32_le().expect("Read f32 should succeed") - 1.5).abs() < f32::EPSILON);
        assert_eq!(
            cursor.read_bytes(2).expect("Read bytes should succeed"),
            &[0xDE, 0xAD]
        );
        assert!(cursor.is_eof());
    }

    #[test]
    fn test_variable_width_reads() {
        let buffer = [0xFF, 0x01, 0x02, 0x03, 0x04];
        let mut cursor = Cursor::new(&buffer);
        assert_eq!(cursor.read_uint_le(1).expect("u8 width"), 0xFF);
        // 0x0201 little-endian
        assert_eq!(cursor.read_uint_le(2).expect("u16 width"), 0x0201);
        assert_eq!(cursor.read_uint_le(2).expect("u16 width"), 0x0403);

        let mut cursor = Cursor::new(&buffer);
        // 0xFF as a signed byte is -1
        assert_eq!(cursor.read_int_le(1).expect("i8 width"), -1);
    }

    #[test]
    fn test_read_line_consumes_through_newline() {
        let buffer = b"Param.X=12\nrest";
        let mut cursor = Cursor::new(buffer);
        assert_eq!(
            cursor.read_line().expect("Read line should succeed"),
            "Param.X=12\n"
        );
        assert_eq!(cursor.remaining(), 4);
    }

    #[test]
    fn test_read_line_without_newline_fails_cleanly() {
        let buffer = b"no terminator";
        let mut cursor = Cursor::new(buffer);
        assert!(cursor.read_line().is_err());
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn test_skip_and_remaining() {
        let buffer = [0u8; 10];
        let mut cursor = Cursor::new(&buffer);
        cursor.skip(4).expect("Skip should succeed");
        assert_eq!(cursor.offset(), 4);
        assert_eq!(cursor.remaining(), 6);
        assert!(cursor.skip(7).is_err());
        assert_eq!(cursor.offset(), 4);
    }
}
