//! RWP Protocol - Rack Wire Protocol
//!
//! Binary request/response protocol for the storage gateway.
//! Uses 22-byte fixed headers for minimal parsing overhead.

mod codec;
mod command;
mod frame;
mod response;

pub use codec::RwpCodec;
pub use command::Command;
pub use frame::{Frame, FrameHeader, OpCode, HEADER_SIZE, MAGIC};
pub use response::Response;
