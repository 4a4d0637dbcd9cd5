//! RWP Frame Structure
//!
//! Binary frame format with 22-byte header for efficient parsing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

/// Magic bytes identifying the RWP protocol: "RACK"
pub const MAGIC: [u8; 4] = [0x52, 0x41, 0x43, 0x4B];

/// Protocol version
pub const VERSION: u8 = 1;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 22;

/// Operation codes for RWP requests and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // Requests
    Ping = 0x01,
    Pong = 0x02,
    Has = 0x03,
    Get = 0x04,
    MGet = 0x05,
    Set = 0x06,
    MExpire = 0x07,
    Ttl = 0x08,
    Delete = 0x09,
    Close = 0x0A,

    // Response codes
    Ok = 0x10,
    Error = 0x11,
    Value = 0x12,
    Nil = 0x13,
    BoolMap = 0x14,
    ValueMap = 0x15,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(OpCode::Ping),
            0x02 => Some(OpCode::Pong),
            0x03 => Some(OpCode::Has),
            0x04 => Some(OpCode::Get),
            0x05 => Some(OpCode::MGet),
            0x06 => Some(OpCode::Set),
            0x07 => Some(OpCode::MExpire),
            0x08 => Some(OpCode::Ttl),
            0x09 => Some(OpCode::Delete),
            0x0A => Some(OpCode::Close),
            0x10 => Some(OpCode::Ok),
            0x11 => Some(OpCode::Error),
            0x12 => Some(OpCode::Value),
            0x13 => Some(OpCode::Nil),
            0x14 => Some(OpCode::BoolMap),
            0x15 => Some(OpCode::ValueMap),
            _ => None,
        }
    }
}

/// RWP Frame Header (22 bytes)
///
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬─────────────────┐
/// │  Magic   │ Version  │  OpCode  │  Flags   │  Payload Len    │
/// │ (4 bytes)│ (1 byte) │ (1 byte) │ (2 bytes)│   (4 bytes)     │
/// ├──────────┴──────────┴──────────┴──────────┴─────────────────┤
/// │  Request ID (8 bytes)  │  Reserved (2 bytes)                │
/// └─────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub opcode: OpCode,
    pub flags: u16,
    pub payload_len: u32,
    pub request_id: u64,
}

impl FrameHeader {
    pub fn new(opcode: OpCode, request_id: u64) -> Self {
        Self {
            version: VERSION,
            opcode,
            flags: 0,
            payload_len: 0,
            request_id,
        }
    }

    pub fn with_payload_len(mut self, len: u32) -> Self {
        self.payload_len = len;
        self
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.opcode as u8);
        buf.put_u16(self.flags);
        buf.put_u32(self.payload_len);
        buf.put_u64(self.request_id);
        buf.put_u16(0); // Reserved
    }

    pub fn decode(buf: &mut impl Buf) -> io::Result<Self> {
        // Check magic bytes
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let version = buf.get_u8();
        let opcode_byte = buf.get_u8();
        let opcode = OpCode::from_u8(opcode_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid opcode: {}", opcode_byte),
            )
        })?;
        let flags = buf.get_u16();
        let payload_len = buf.get_u32();
        let request_id = buf.get_u64();
        let _reserved = buf.get_u16();

        Ok(Self {
            version,
            opcode,
            flags,
            payload_len,
            request_id,
        })
    }
}

/// Complete RWP Frame with header and payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: OpCode, request_id: u64, payload: Bytes) -> Self {
        let header = FrameHeader::new(opcode, request_id).with_payload_len(payload.len() as u32);
        Self { header, payload }
    }

    pub fn ping(request_id: u64) -> Self {
        Self::new(OpCode::Ping, request_id, Bytes::new())
    }

    pub fn pong(request_id: u64) -> Self {
        Self::new(OpCode::Pong, request_id, Bytes::new())
    }

    pub fn ok(request_id: u64) -> Self {
        Self::new(OpCode::Ok, request_id, Bytes::new())
    }

    pub fn nil(request_id: u64) -> Self {
        Self::new(OpCode::Nil, request_id, Bytes::new())
    }

    pub fn error(request_id: u64, msg: &str) -> Self {
        Self::new(
            OpCode::Error,
            request_id,
            Bytes::copy_from_slice(msg.as_bytes()),
        )
    }

    pub fn value(request_id: u64, data: Bytes) -> Self {
        Self::new(OpCode::Value, request_id, data)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_slice(&self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode() {
        let header = FrameHeader::new(OpCode::MGet, 12345).with_payload_len(100);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = FrameHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.opcode, OpCode::MGet);
        assert_eq!(decoded.request_id, 12345);
        assert_eq!(decoded.payload_len, 100);
    }

    #[test]
    fn test_frame_encode() {
        let frame = Frame::new(OpCode::Set, 42, Bytes::from_static(b"test"));
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE + 4);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = BytesMut::new();
        FrameHeader::new(OpCode::Ping, 1).encode(&mut buf);
        buf[0] = b'X';

        assert!(FrameHeader::decode(&mut buf.freeze()).is_err());
    }
}
