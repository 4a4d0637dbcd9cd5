//! Gateway Server
//!
//! TCP server exposing every registered storage over the RWP protocol.
//! One task per connection; a ctrl-c shutdown closes every backend so no
//! sweep task outlives the process's useful life.

mod config;
mod handler;

pub use config::Config;
pub use handler::Handler;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tracing::{error, info};

use crate::metrics::Metrics;
use crate::protocol::RwpCodec;
use crate::registry::Registry;

/// Storage gateway server
pub struct Server {
    config: Config,
    registry: Arc<Registry>,
    metrics: Arc<Metrics>,
}

impl Server {
    /// Create a new server over an already-built registry
    pub fn new(config: Config, registry: Registry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Run the accept loop until ctrl-c, then close every backend
    pub async fn run(self) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.config.bind, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        info!("keyrack gateway listening on {}", addr);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        info!("New connection from {}", peer_addr);

                        let registry = self.registry.clone();
                        let metrics = self.metrics.clone();

                        tokio::spawn(async move {
                            let framed = Framed::new(socket, RwpCodec::new());
                            let handler = Handler::new(registry, metrics, timeout);

                            if let Err(e) = handler.run(framed).await {
                                error!("Connection error from {}: {}", peer_addr, e);
                            }

                            info!("Connection closed: {}", peer_addr);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.registry.close_all().await;
        Ok(())
    }

    /// Get a reference to the registry (for testing)
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get metrics reference
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}
