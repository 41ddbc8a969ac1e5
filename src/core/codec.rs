//! Length-prefixed framing for client and interoperability sockets.
//!
//! ```text
//! [Length(4, LE)] [Body(N)]
//! ```
//!
//! The body of a client frame starts with its 2-byte opcode, the body of an
//! interoperability request with its 1-byte kind tag. Replies carry the bare
//! payload. The codec knows nothing about either; it only bounds frame size.

use crate::config::MAX_FRAME_SIZE;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the length header in bytes
pub const HEADER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&src[..HEADER_SIZE]);
        let length = u32::from_le_bytes(header) as usize;

        // Reject before buffering anything for it
        if length > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(length));
        }

        if src.len() < HEADER_SIZE + length {
            src.reserve(HEADER_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let body = src.split_to(length);
        Ok(Some(Packet::from(body.to_vec())))
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let length = item.len();
        if length > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(length));
        }

        dst.reserve(HEADER_SIZE + length);
        dst.put_u32_le(length as u32);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_header_waits() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[3u8, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn partial_body_is_left_in_place() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[3u8, 0, 0, 0, 0xAA][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);

        buf.extend_from_slice(&[0xBB, 0xCC]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.as_bytes(), &[0xAA, 0xBB, 0xCC]);
        assert!(buf.is_empty());
    }

    #[test]
    fn declared_length_over_limit_is_rejected() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::from(&[17u8, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(17))
        ));
    }

    #[test]
    fn encode_refuses_oversized_packet() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        let packet = Packet::from(vec![0u8; 5]);
        assert!(codec.encode(packet, &mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn back_to_back_frames() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Packet::from(vec![1]), &mut buf).unwrap();
        codec.encode(Packet::from(vec![2, 3]), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_bytes(), &[1]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_bytes(), &[2, 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
