//! Binary reading and writing utilities for the session protocol.
//!
//! All values are little-endian. Strings are UTF-8 with a u16 length prefix.

use crate::ProtocolError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A reader for decoding binary session messages.
///
/// All reads are checked: running past the end of the buffer yields
/// [`ProtocolError::UnexpectedEof`] instead of panicking, since the data
/// comes straight off the wire.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() < n {
            Err(ProtocolError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_f32(&mut self) -> Result<f32, ProtocolError> {
        self.ensure(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a u16-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u16()? as usize;
        self.ensure(len)?;
        let raw = self.buf.copy_to_bytes(len);
        String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidString)
    }
}

/// A writer for encoding binary session messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(64),
        }
    }

    pub fn put_u8(&mut self, val: u8) {
        self.buf.put_u8(val);
    }

    pub fn put_u16(&mut self, val: u16) {
        self.buf.put_u16_le(val);
    }

    pub fn put_u32(&mut self, val: u32) {
        self.buf.put_u32_le(val);
    }

    pub fn put_f32(&mut self, val: f32) {
        self.buf.put_f32_le(val);
    }

    pub fn put_bool(&mut self, val: bool) {
        self.buf.put_u8(val as u8);
    }

    /// Write a u16-length-prefixed UTF-8 string. Longer strings are
    /// truncated at the u16 boundary rather than rejected.
    pub fn put_string(&mut self, val: &str) {
        let bytes = val.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.buf.put_u16_le(len as u16);
        self.buf.put_slice(&bytes[..len]);
    }

    /// Consume the writer and return the encoded bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
