//! RWP Response types
//!
//! Response variants mirroring the storage contract's return shapes:
//! boolean maps, byte payloads and value maps keyed by the requested key.

use std::collections::HashMap;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use super::command::{get_bytes, get_count, get_string, put_bytes, put_string};
use super::frame::{Frame, OpCode};

/// Response to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Simple OK response
    Ok,

    /// Pong response (for PING)
    Pong,

    /// Nil/null response (key not found)
    Nil,

    /// Single value payload
    Value(Bytes),

    /// Presence map (`has`); absent keys are omitted
    BoolMap(HashMap<String, bool>),

    /// Value map (`mget`, `ttl` — TTL strings ride as bytes)
    ValueMap(HashMap<String, Bytes>),

    /// Error response
    Error(String),
}

impl Response {
    /// Convert the response to an RWP frame
    pub fn to_frame(&self, request_id: u64) -> Frame {
        match self {
            Response::Ok => Frame::ok(request_id),
            Response::Pong => Frame::pong(request_id),
            Response::Nil => Frame::nil(request_id),
            Response::Value(data) => Frame::value(request_id, data.clone()),
            Response::Error(msg) => Frame::error(request_id, msg),

            Response::BoolMap(map) => {
                let mut buf = BytesMut::new();
                buf.put_u32(map.len() as u32);
                for (key, present) in map {
                    put_string(&mut buf, key);
                    buf.put_u8(u8::from(*present));
                }
                Frame::new(OpCode::BoolMap, request_id, buf.freeze())
            }

            Response::ValueMap(map) => {
                let mut buf = BytesMut::new();
                buf.put_u32(map.len() as u32);
                for (key, value) in map {
                    put_string(&mut buf, key);
                    put_bytes(&mut buf, value);
                }
                Frame::new(OpCode::ValueMap, request_id, buf.freeze())
            }
        }
    }

    /// Parse a response from an RWP frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.header.opcode {
            OpCode::Ok => Ok(Response::Ok),
            OpCode::Pong => Ok(Response::Pong),
            OpCode::Nil => Ok(Response::Nil),
            OpCode::Value => Ok(Response::Value(frame.payload.clone())),

            OpCode::Error => {
                let msg = String::from_utf8_lossy(&frame.payload).to_string();
                Ok(Response::Error(msg))
            }

            OpCode::BoolMap => {
                let count = get_count(&mut payload)?;
                let mut map = HashMap::with_capacity(count);
                for _ in 0..count {
                    let key = get_string(&mut payload)?;
                    let flag = get_bytes_u8(&mut payload)?;
                    map.insert(key, flag != 0);
                }
                Ok(Response::BoolMap(map))
            }

            OpCode::ValueMap => {
                let count = get_count(&mut payload)?;
                let mut map = HashMap::with_capacity(count);
                for _ in 0..count {
                    let key = get_string(&mut payload)?;
                    let value = get_bytes(&mut payload)?;
                    map.insert(key, value);
                }
                Ok(Response::ValueMap(map))
            }

            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for response: {:?}", other),
            )),
        }
    }
}

fn get_bytes_u8(buf: &mut Bytes) -> io::Result<u8> {
    use bytes::Buf;
    if buf.remaining() < 1 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough data for flag",
        ));
    }
    Ok(buf.get_u8())
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Pong => write!(f, "PONG"),
            Response::Nil => write!(f, "(nil)"),
            Response::Value(data) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            Response::Error(msg) => write!(f, "(error) {}", msg),

            Response::BoolMap(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}: {}", key, map[*key])?;
                }
                if keys.is_empty() {
                    write!(f, "(empty map)")?;
                }
                Ok(())
            }

            Response::ValueMap(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}: \"{}\"", key, String::from_utf8_lossy(&map[*key]))?;
                }
                if keys.is_empty() {
                    write!(f, "(empty map)")?;
                }
                Ok(())
            }
        }
    }
}
