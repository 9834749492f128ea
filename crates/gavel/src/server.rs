//! `GavelServer` builder and accept loop.
//!
//! This is the entry point for running an auction server. It ties the
//! layers together: WebSocket gateway → protocol → rooms.

use std::sync::Arc;

use gavel_assist::Assistant;
use gavel_protocol::{Codec, JsonCodec};
use gavel_room::RoomRegistry;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::gateway::handle_connection;
use crate::GavelError;

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry lock is held only long enough to resolve or insert a room
/// handle; rooms themselves run as independent tasks.
pub(crate) struct ServerState<A: Assistant, C: Codec> {
    pub(crate) rooms: Mutex<RoomRegistry<A>>,
    pub(crate) codec: C,
}

/// Builder for configuring and starting a Gavel server.
///
/// # Example
///
/// ```rust,ignore
/// let server = GavelServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(CannedAssistant)
///     .await?;
/// server.run().await
/// ```
pub struct GavelServerBuilder {
    bind_addr: String,
}

impl GavelServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Builds and starts the server with the given assistant backend.
    ///
    /// Uses `JsonCodec`, which is what the browser client speaks.
    pub async fn build<A: Assistant>(
        self,
        assist: A,
    ) -> Result<GavelServer<A, JsonCodec>, GavelError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        tracing::info!(addr = %self.bind_addr, "gavel server listening");

        let state = Arc::new(ServerState {
            rooms: Mutex::new(RoomRegistry::new(Arc::new(assist))),
            codec: JsonCodec,
        });

        Ok(GavelServer { listener, state })
    }
}

impl Default for GavelServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Gavel auction server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct GavelServer<A: Assistant, C: Codec> {
    listener: TcpListener,
    state: Arc<ServerState<A, C>>,
}

impl<A, C> GavelServer<A, C>
where
    A: Assistant,
    C: Codec + Clone,
{
    /// Creates a new builder.
    pub fn builder() -> GavelServerBuilder {
        GavelServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming connections and spawns a gateway task for each.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), GavelError> {
        tracing::info!("gavel server running");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, state).await {
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
