//! Connection Handler
//!
//! Processes RWP frames and dispatches commands through the registry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::error::{KvError, Result};
use crate::metrics::Metrics;
use crate::protocol::{Command, Response, RwpCodec};
use crate::registry::Registry;

/// Connection handler
pub struct Handler {
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
    timeout: Duration,
}

impl Handler {
    /// Create a new handler
    pub fn new(registry: Arc<Registry>, metrics: Arc<Metrics>, timeout: Duration) -> Self {
        Self {
            registry,
            metrics,
            timeout,
        }
    }

    /// Run the handler for a connection
    pub async fn run(self, mut framed: Framed<TcpStream, RwpCodec>) -> std::io::Result<()> {
        while let Some(result) = framed.next().await {
            let frame = result?;
            let start = Instant::now();

            let request_id = frame.header.request_id;
            let cmd_name = format!("{:?}", frame.header.opcode);

            let response = match Command::from_frame(&frame) {
                Ok(cmd) => self.execute(cmd).await,
                Err(e) => Response::Error(e.to_string()),
            };

            framed.send(response.to_frame(request_id)).await?;

            let elapsed = start.elapsed();
            self.metrics.record_operation(&cmd_name, elapsed);
            debug!(cmd = %cmd_name, latency = ?elapsed, "Command executed");
        }

        Ok(())
    }

    /// Execute a command under the request deadline
    pub async fn execute(&self, cmd: Command) -> Response {
        match tokio::time::timeout(self.timeout, self.dispatch(cmd)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => Response::Error(e.to_string()),
            Err(_) => Response::Error(KvError::Timeout.to_string()),
        }
    }

    /// Route a command to its backend(s) and shape the result
    async fn dispatch(&self, cmd: Command) -> Result<Response> {
        match cmd {
            Command::Ping => Ok(Response::Pong),

            Command::Has { storage, keys } => {
                let m = self.registry.get(&storage)?.has(&keys).await?;
                Ok(Response::BoolMap(m))
            }

            Command::Get { storage, key } => {
                match self.registry.get(&storage)?.get(&key).await? {
                    Some(value) => Ok(Response::Value(value)),
                    None => Ok(Response::Nil),
                }
            }

            Command::MGet { storage, keys } => {
                let m = self.registry.get(&storage)?.mget(&keys).await?;
                Ok(Response::ValueMap(m))
            }

            Command::Set { storages, items } => {
                self.registry.set_all(&storages, &items).await?;
                Ok(Response::Ok)
            }

            Command::MExpire { storage, items } => {
                self.registry.get(&storage)?.mexpire(&items).await?;
                Ok(Response::Ok)
            }

            Command::Ttl { storage, keys } => {
                let m = self.registry.get(&storage)?.ttl(&keys).await?;
                let m = m
                    .into_iter()
                    .map(|(key, deadline)| (key, Bytes::from(deadline)))
                    .collect();
                Ok(Response::ValueMap(m))
            }

            Command::Delete { storage, keys } => {
                self.registry.get(&storage)?.delete(&keys).await?;
                Ok(Response::Ok)
            }

            Command::Close { storage } => {
                self.registry.close(&storage).await?;
                Ok(Response::Ok)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::storage::{Item, MemoryConfig};
    use std::collections::HashMap;

    fn handler() -> Handler {
        let mut configs = HashMap::new();
        configs.insert(
            "hot".to_string(),
            DriverConfig::Memory(MemoryConfig::default()),
        );
        configs.insert(
            "warm".to_string(),
            DriverConfig::Memory(MemoryConfig::default()),
        );
        let registry = Registry::open(&configs).unwrap();
        Handler::new(
            Arc::new(registry),
            Arc::new(Metrics::new()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_ping() {
        let handler = handler();
        assert_eq!(handler.execute(Command::Ping).await, Response::Pong);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let handler = handler();

        let response = handler
            .execute(Command::Set {
                storages: vec!["hot".to_string(), "warm".to_string()],
                items: vec![Item::new("key", "value")],
            })
            .await;
        assert_eq!(response, Response::Ok);

        for storage in ["hot", "warm"] {
            let response = handler
                .execute(Command::Get {
                    storage: storage.to_string(),
                    key: "key".to_string(),
                })
                .await;
            assert_eq!(response, Response::Value(Bytes::from_static(b"value")));
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_nil() {
        let handler = handler();
        let response = handler
            .execute(Command::Get {
                storage: "hot".to_string(),
                key: "missing".to_string(),
            })
            .await;
        assert_eq!(response, Response::Nil);
    }

    #[tokio::test]
    async fn test_unknown_storage_is_error() {
        let handler = handler();
        let response = handler
            .execute(Command::Get {
                storage: "cold".to_string(),
                key: "key".to_string(),
            })
            .await;
        assert_eq!(
            response,
            Response::Error(KvError::UnknownStorage("cold".to_string()).to_string())
        );
    }

    #[tokio::test]
    async fn test_validation_error_surfaces() {
        let handler = handler();
        let response = handler
            .execute(Command::Delete {
                storage: "hot".to_string(),
                keys: vec!["  ".to_string()],
            })
            .await;
        assert_eq!(response, Response::Error(KvError::EmptyKey.to_string()));
    }

    #[tokio::test]
    async fn test_close_storage() {
        let handler = handler();
        let response = handler
            .execute(Command::Close {
                storage: "hot".to_string(),
            })
            .await;
        assert_eq!(response, Response::Ok);
    }
}
