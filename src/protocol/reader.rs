//! Bounded little-endian reader over a received datagram.
//!
//! Every read checks the remaining length first, so a truncated buffer
//! surfaces as a `ReadError` instead of a panic.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("read of {needed} byte(s) at offset {offset} overruns buffer of {len}")]
pub struct ReadError {
    pub offset: usize,
    pub needed: usize,
    pub len: usize,
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if self.remaining() < n {
            return Err(ReadError {
                offset: self.pos,
                needed: n,
                len: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Reads up to and including a NUL terminator, or to the end of the buffer.
    pub fn read_string(&mut self) -> String {
        let rest = &self.buf[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                self.pos += end + 1;
                String::from_utf8_lossy(&rest[..end]).into_owned()
            }
            None => {
                self.pos = self.buf.len();
                String::from_utf8_lossy(rest).into_owned()
            }
        }
    }

    /// `u8` length prefix followed by that many raw bytes, rendered as lowercase hex.
    pub fn read_hex(&mut self) -> Result<String, ReadError> {
        let len = self.read_u8()? as usize;
        Ok(hex::encode(self.take(len)?))
    }
}
