//! RWP Command Parsing
//!
//! Parses request arguments from RWP frames. Single-target requests carry
//! one storage name; the fan-out `Set` carries a list of target storages.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;

use crate::storage::Item;

use super::frame::{Frame, OpCode};

/// Parsed request from an RWP frame
#[derive(Debug, Clone)]
pub enum Command {
    /// Health check
    Ping,

    /// Check which keys are present in one storage
    Has { storage: String, keys: Vec<String> },

    /// Get a value from one storage
    Get { storage: String, key: String },

    /// Get multiple values from one storage
    MGet { storage: String, keys: Vec<String> },

    /// Upsert items into every named storage concurrently
    Set {
        storages: Vec<String>,
        items: Vec<Item>,
    },

    /// Overwrite expiry deadlines in one storage
    MExpire { storage: String, items: Vec<Item> },

    /// Report expiry deadlines from one storage
    Ttl { storage: String, keys: Vec<String> },

    /// Remove keys from one storage
    Delete { storage: String, keys: Vec<String> },

    /// Close one storage
    Close { storage: String },
}

impl Command {
    /// Parse a command from an RWP frame
    pub fn from_frame(frame: &Frame) -> io::Result<Self> {
        let mut payload = frame.payload.clone();
        match frame.header.opcode {
            OpCode::Ping => Ok(Command::Ping),

            OpCode::Has => Ok(Command::Has {
                storage: get_string(&mut payload)?,
                keys: get_string_list(&mut payload)?,
            }),

            OpCode::Get => Ok(Command::Get {
                storage: get_string(&mut payload)?,
                key: get_string(&mut payload)?,
            }),

            OpCode::MGet => Ok(Command::MGet {
                storage: get_string(&mut payload)?,
                keys: get_string_list(&mut payload)?,
            }),

            OpCode::Set => Ok(Command::Set {
                storages: get_string_list(&mut payload)?,
                items: get_item_list(&mut payload)?,
            }),

            OpCode::MExpire => Ok(Command::MExpire {
                storage: get_string(&mut payload)?,
                items: get_item_list(&mut payload)?,
            }),

            OpCode::Ttl => Ok(Command::Ttl {
                storage: get_string(&mut payload)?,
                keys: get_string_list(&mut payload)?,
            }),

            OpCode::Delete => Ok(Command::Delete {
                storage: get_string(&mut payload)?,
                keys: get_string_list(&mut payload)?,
            }),

            OpCode::Close => Ok(Command::Close {
                storage: get_string(&mut payload)?,
            }),

            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unexpected opcode for command: {:?}", other),
            )),
        }
    }

    /// Encode the command into frame payload bytes
    pub fn encode(&self) -> (OpCode, Bytes) {
        let mut buf = BytesMut::new();
        let opcode = match self {
            Command::Ping => OpCode::Ping,

            Command::Has { storage, keys } => {
                put_string(&mut buf, storage);
                put_string_list(&mut buf, keys);
                OpCode::Has
            }

            Command::Get { storage, key } => {
                put_string(&mut buf, storage);
                put_string(&mut buf, key);
                OpCode::Get
            }

            Command::MGet { storage, keys } => {
                put_string(&mut buf, storage);
                put_string_list(&mut buf, keys);
                OpCode::MGet
            }

            Command::Set { storages, items } => {
                put_string_list(&mut buf, storages);
                put_item_list(&mut buf, items);
                OpCode::Set
            }

            Command::MExpire { storage, items } => {
                put_string(&mut buf, storage);
                put_item_list(&mut buf, items);
                OpCode::MExpire
            }

            Command::Ttl { storage, keys } => {
                put_string(&mut buf, storage);
                put_string_list(&mut buf, keys);
                OpCode::Ttl
            }

            Command::Delete { storage, keys } => {
                put_string(&mut buf, storage);
                put_string_list(&mut buf, keys);
                OpCode::Delete
            }

            Command::Close { storage } => {
                put_string(&mut buf, storage);
                OpCode::Close
            }
        };
        (opcode, buf.freeze())
    }
}

// ---------------------------------------------------------------------------
// Length-prefixed payload helpers
// ---------------------------------------------------------------------------

pub(super) fn get_bytes(buf: &mut Bytes) -> io::Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough data for length prefix",
        ));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough data for payload",
        ));
    }
    Ok(buf.copy_to_bytes(len))
}

pub(super) fn get_string(buf: &mut Bytes) -> io::Result<String> {
    let raw = get_bytes(buf)?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8 string"))
}

pub(super) fn get_count(buf: &mut Bytes) -> io::Result<usize> {
    if buf.remaining() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Not enough data for count",
        ));
    }
    Ok(buf.get_u32() as usize)
}

fn get_string_list(buf: &mut Bytes) -> io::Result<Vec<String>> {
    let count = get_count(buf)?;
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(get_string(buf)?);
    }
    Ok(list)
}

fn get_item_list(buf: &mut Bytes) -> io::Result<Vec<Item>> {
    let count = get_count(buf)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let key = get_string(buf)?;
        let value = get_bytes(buf)?;
        let ttl = get_string(buf)?;
        items.push(Item { key, value, ttl });
    }
    Ok(items)
}

pub(super) fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
}

pub(super) fn put_string(buf: &mut BytesMut, s: &str) {
    put_bytes(buf, s.as_bytes());
}

fn put_string_list(buf: &mut BytesMut, list: &[String]) {
    buf.put_u32(list.len() as u32);
    for s in list {
        put_string(buf, s);
    }
}

fn put_item_list(buf: &mut BytesMut, items: &[Item]) {
    buf.put_u32(items.len() as u32);
    for item in items {
        put_string(buf, &item.key);
        put_bytes(buf, &item.value);
        put_string(buf, &item.ttl);
    }
}
