//! Position-tracked little-endian packet buffer.
//!
//! A [`Packet`] owns its bytes and a read cursor. Writes always append;
//! reads advance the cursor and fail with [`ProtocolError::OutOfRange`] when
//! not enough bytes remain, leaving the cursor where it was.

use crate::error::{ProtocolError, Result};
use std::net::Ipv4Addr;

/// Fixed-width integer that can be read from and written to a [`Packet`].
pub trait Primitive: Sized + Copy {
    /// Encoded width in bytes
    const SIZE: usize;

    fn decode_le(bytes: &[u8]) -> Self;

    fn encode_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn decode_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn encode_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Mutable byte buffer with a read cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    data: Vec<u8>,
    position: usize,
}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Start an outbound client packet with its opcode already written.
    pub fn with_opcode(opcode: u16) -> Self {
        let mut packet = Self::with_capacity(32);
        packet.write(opcode);
        packet
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    /// Move the cursor back to the first byte.
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn take(&mut self, needed: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(ProtocolError::OutOfRange { needed, remaining });
        }
        let start = self.position;
        self.position += needed;
        Ok(&self.data[start..self.position])
    }

    pub fn read<T: Primitive>(&mut self) -> Result<T> {
        self.take(T::SIZE).map(T::decode_le)
    }

    pub fn write<T: Primitive>(&mut self, value: T) -> &mut Self {
        value.encode_le(&mut self.data);
        self
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read::<u8>()? != 0)
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write(u8::from(value))
    }

    /// Read a `u16` length prefix followed by that many bytes.
    ///
    /// The cursor is only advanced when both the prefix and the body fit.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.position;
        let len = self.read::<u16>()? as usize;
        let remaining = self.remaining();
        if len > remaining {
            self.position = start;
            return Err(ProtocolError::OutOfRange {
                needed: len,
                remaining,
            });
        }
        let raw = self.read_bytes(len)?;
        Ok(String::from_utf8(raw)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }

    /// Write a `u16` length prefix followed by the string bytes.
    ///
    /// Strings longer than `u16::MAX` bytes are truncated to fit the prefix.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        let raw = value.as_bytes();
        let len = raw.len().min(u16::MAX as usize);
        self.write(len as u16);
        self.data.extend_from_slice(&raw[..len]);
        self
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a raw run of `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.take(count).map(<[u8]>::to_vec)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Write `count` zero bytes.
    pub fn write_zeroes(&mut self, count: usize) -> &mut Self {
        self.data.resize(self.data.len() + count, 0);
        self
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr> {
        self.read_array::<4>().map(Ipv4Addr::from)
    }

    pub fn write_ipv4(&mut self, address: Ipv4Addr) -> &mut Self {
        self.write_bytes(&address.octets())
    }
}

impl From<Vec<u8>> for Packet {
    fn from(data: Vec<u8>) -> Self {
        Self { data, position: 0 }
    }
}

impl From<&[u8]> for Packet {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut p = Packet::new();
        p.write(0x0102_u16).write(0x0A0B_0C0D_u32).write(-2_i8);
        assert_eq!(p.as_bytes(), &[0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A, 0xFE]);

        assert_eq!(p.read::<u16>().unwrap(), 0x0102);
        assert_eq!(p.read::<u32>().unwrap(), 0x0A0B_0C0D);
        assert_eq!(p.read::<i8>().unwrap(), -2);
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn short_read_does_not_move_cursor() {
        let mut p = Packet::from(vec![1, 2, 3]);
        p.read::<u8>().unwrap();
        let err = p.read::<u32>().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::OutOfRange {
                needed: 4,
                remaining: 2
            }
        ));
        assert_eq!(p.position(), 1);
        assert_eq!(p.read::<u16>().unwrap(), 0x0302);
    }

    #[test]
    fn string_prefix_is_u16() {
        let mut p = Packet::new();
        p.write_string("admin");
        assert_eq!(&p.as_bytes()[..2], &[5, 0]);
        assert_eq!(p.read_string().unwrap(), "admin");
    }

    #[test]
    fn truncated_string_body_restores_cursor() {
        // prefix claims 10 bytes, only 3 present
        let mut p = Packet::from(vec![10, 0, b'a', b'b', b'c']);
        assert!(p.read_string().is_err());
        assert_eq!(p.position(), 0);
    }

    #[test]
    fn raw_runs_and_invalid_utf8() {
        let mut p = Packet::new();
        p.write_bytes(&[1, 2, 3]).write(2u16).write_bytes(&[0xFF, b'x']);
        assert_eq!(p.read_bytes(3).unwrap(), vec![1, 2, 3]);
        assert_eq!(p.read_string().unwrap(), "\u{FFFD}x");
        assert!(p.read_bytes(1).is_err());
    }

    #[test]
    fn bools_and_addresses() {
        let mut p = Packet::new();
        p.write_bool(true)
            .write_bool(false)
            .write_ipv4(Ipv4Addr::new(10, 0, 0, 9));
        assert!(p.read_bool().unwrap());
        assert!(!p.read_bool().unwrap());
        assert_eq!(p.read_ipv4().unwrap(), Ipv4Addr::new(10, 0, 0, 9));
    }

    #[test]
    fn opcode_header() {
        let p = Packet::with_opcode(0x000B);
        assert_eq!(p.as_bytes(), &[0x0B, 0x00]);
    }
}
