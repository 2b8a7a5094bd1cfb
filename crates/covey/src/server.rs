//! `CoveyServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → town registry. The
//! registry is shared by every connection task; town operations lock only
//! the town they touch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use covey_protocol::{Codec, JsonCodec};
use covey_session::{NoVideo, VideoTokenIssuer};
use covey_town::{TownRegistry, TownsConfig};
use covey_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{CoveyError, ServerConfig};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared state handed to each connection task.
pub(crate) struct ServerState<V: VideoTokenIssuer, C: Codec> {
    pub(crate) registry: Arc<TownRegistry>,
    pub(crate) video: V,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

/// Builder for configuring and starting a Covey server.
///
/// # Example
///
/// ```rust,ignore
/// use covey::prelude::*;
///
/// let server = CoveyServer::builder()
///     .bind("0.0.0.0:8081")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct CoveyServerBuilder {
    config: ServerConfig,
    registry: Option<Arc<TownRegistry>>,
}

impl CoveyServerBuilder {
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Starts from a fully loaded configuration, e.g.
    /// [`ServerConfig::from_env`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets how long a connection may stay silent before it is closed.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets occupancy and admission rules for new towns. Ignored when an
    /// existing registry is supplied.
    pub fn towns_config(mut self, towns: TownsConfig) -> Self {
        self.config.towns = towns;
        self
    }

    /// Serves an existing registry instead of creating a fresh one.
    pub fn registry(mut self, registry: Arc<TownRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Binds the listener. Joined players get no video token.
    pub async fn build(self) -> Result<CoveyServer<NoVideo, JsonCodec>, CoveyError> {
        self.build_with_video(NoVideo).await
    }

    /// Binds the listener; players joining a video-enabled town get a
    /// token from `video`.
    pub async fn build_with_video<V: VideoTokenIssuer>(
        self,
        video: V,
    ) -> Result<CoveyServer<V, JsonCodec>, CoveyError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(TownRegistry::new(self.config.towns.clone())));

        let state = Arc::new(ServerState {
            registry,
            video,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(CoveyServer { transport, state })
    }
}

impl Default for CoveyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Covey server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CoveyServer<V: VideoTokenIssuer, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V, C>>,
}

impl CoveyServer<NoVideo, JsonCodec> {
    pub fn builder() -> CoveyServerBuilder {
        CoveyServerBuilder::new()
    }
}

impl<V, C> CoveyServer<V, C>
where
    V: VideoTokenIssuer,
    C: Codec,
{
    /// The registry this server fronts. Towns created through it are
    /// visible to clients and vice versa.
    pub fn registry(&self) -> Arc<TownRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CoveyError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the accept loop until the process ends, spawning one handler
    /// task per connection.
    pub async fn run(mut self) -> Result<(), CoveyError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "covey server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
