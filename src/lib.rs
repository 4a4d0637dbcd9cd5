//! KEYRACK - Multi-Backend Key-Value Storage Service
//!
//! Several independently-configured key-value stores behind one uniform
//! contract, addressed by logical name and reached through a single
//! framed-TCP gateway (RWP - Rack Wire Protocol).

pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod storage;

pub use config::{DriverConfig, ServiceConfig};
pub use error::{KvError, Result};
pub use metrics::Metrics;
pub use protocol::{Command, Frame, Response, RwpCodec};
pub use registry::Registry;
pub use server::{Config, Server};
pub use storage::{FileConfig, FileStorage, Item, MemoryConfig, MemoryStorage, Storage};
