//! Snapshot pack codec
//!
//! Big-endian encoding with a movable write offset. The driver reserves a
//! record-count field, lets every backend append, then seeks back to patch the
//! count in place; [`PackBuffer::set_offset`] exists for exactly that.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use tracing::warn;

/// Length marker for an absent string
const NULL_STR_LEN: u32 = u32::MAX;

/// Longest string that can be packed without colliding with [`NULL_STR_LEN`]
const MAX_STR_LEN: usize = (u32::MAX - 1) as usize;

/// Wire length of a string of `len` bytes; longer strings are truncated
#[inline]
fn packed_str_len(len: usize) -> usize {
    len.min(MAX_STR_LEN)
}

// =============================================================================
// Pack Buffer
// =============================================================================

/// Growable pack buffer with a seekable write position
#[derive(Debug, Default, Clone)]
pub struct PackBuffer {
    data: BytesMut,
    offset: usize,
}

impl PackBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            offset: 0,
        }
    }

    /// Current write position
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes written so far
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the write position. The target must lie within written data.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::PackOffset {
                offset,
                len: self.data.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) {
        if self.offset == self.data.len() {
            self.data.put_slice(bytes);
        } else {
            let end = self.offset + bytes.len();
            if end > self.data.len() {
                self.data.resize(end, 0);
            }
            self.data[self.offset..end].copy_from_slice(bytes);
        }
        self.offset += bytes.len();
    }

    pub fn pack16(&mut self, value: u16) {
        self.write(&value.to_be_bytes());
    }

    pub fn pack32(&mut self, value: u32) {
        self.write(&value.to_be_bytes());
    }

    /// Pack an optional string as a u32 length followed by its bytes
    pub fn pack_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                let len = packed_str_len(s.len());
                if len < s.len() {
                    warn!(len = s.len(), packed = len, "Truncating oversized string");
                }
                self.pack32(len as u32);
                self.write(&s.as_bytes()[..len]);
            }
            None => self.pack32(NULL_STR_LEN),
        }
    }

    /// All written bytes, independent of the write position
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

// =============================================================================
// Unpacker
// =============================================================================

/// Reader for data produced by [`PackBuffer`]
#[derive(Debug)]
pub struct Unpacker<'a> {
    buf: &'a [u8],
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(Error::Unpack {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn unpack16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn unpack32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn unpack_str(&mut self) -> Result<Option<String>> {
        let len = self.unpack32()?;
        if len == NULL_STR_LEN {
            return Ok(None);
        }
        let len = len as usize;
        self.ensure(len)?;
        let value = String::from_utf8_lossy(&self.buf[..len]).into_owned();
        self.buf.advance(len);
        Ok(Some(value))
    }
}
