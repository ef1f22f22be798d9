//! Byte-level access to the SMF container: big-endian integers, VLQs and
//! length-prefixed chunks.

use crate::error::{FlowError, Result};

pub const HEADER_TAG: [u8; 4] = *b"MThd";
pub const TRACK_TAG: [u8; 4] = *b"MTrk";
pub const HEADER_LENGTH: usize = 6;

/// Read position over a borrowed byte slice. Every read is bounds checked
/// and fails with [`FlowError::TruncatedInput`].
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Unread bytes, without advancing.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(FlowError::truncated(len, self.remaining()));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Variable-length quantity: 7 bits per byte, high bit set on all but
    /// the last byte.
    pub fn read_vlq(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            value = (value << 7) | u64::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// A VLQ used as a byte count.
    pub fn read_vlq_len(&mut self) -> Result<usize> {
        let len = self.read_vlq()?;
        usize::try_from(len).map_err(|_| FlowError::truncated(usize::MAX, self.remaining()))
    }
}

/// A tagged, length-prefixed section of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn expect_tag(&self, tag: [u8; 4]) -> Result<()> {
        if self.tag == tag {
            Ok(())
        } else {
            Err(FlowError::MalformedContainer(format!(
                "expected {} chunk, found {:?}",
                String::from_utf8_lossy(&tag),
                String::from_utf8_lossy(&self.tag)
            )))
        }
    }

    pub fn cursor(&self) -> ByteCursor<'a> {
        ByteCursor::new(self.data)
    }
}

/// Read a 4-byte tag, a big-endian u32 length and exactly that many bytes.
pub fn read_chunk<'a>(cursor: &mut ByteCursor<'a>) -> Result<Chunk<'a>> {
    let tag_bytes = cursor.take(4)?;
    let tag = [tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]];
    let len = cursor.read_u32()? as usize;
    let data = cursor.take(len)?;
    Ok(Chunk { tag, data })
}

/// Append `value` as a VLQ.
pub fn write_vlq(out: &mut Vec<u8>, mut value: u64) {
    let mut buf = [0u8; 10];
    let mut i = buf.len() - 1;
    buf[i] = (value & 0x7f) as u8;
    value >>= 7;
    while value > 0 {
        i -= 1;
        buf[i] = (value & 0x7f) as u8 | 0x80;
        value >>= 7;
    }
    out.extend_from_slice(&buf[i..]);
}
