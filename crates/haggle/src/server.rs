//! `HaggleServer` builder and server loop.
//!
//! This is the entry point for running a Haggle arena. It ties together
//! all the layers: transport → session → scheduler → negotiation.

use std::sync::Arc;

use haggle_negotiation::Generator;
use haggle_scheduler::{Leaderboard, MemoryLeaderboard, Scheduler, SchedulerHandle};
use haggle_session::{HashcashVerifier, SessionConfig, Verifier};
use haggle_transport::{Transport, WebSocketConnection, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{HaggleError, ServerConfig};

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) session_config: SessionConfig,
    pub(crate) verifier: Arc<dyn Verifier>,
    pub(crate) scheduler: SchedulerHandle<WebSocketConnection>,
}

/// Builder for configuring and starting a Haggle server.
///
/// # Example
///
/// ```rust,no_run
/// use haggle::prelude::*;
///
/// # async fn run() -> Result<(), HaggleError> {
/// let server = HaggleServer::builder()
///     .config(ServerConfig {
///         bind: "0.0.0.0:8000".into(),
///         ..ServerConfig::default()
///     })
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct HaggleServerBuilder {
    config: ServerConfig,
    leaderboard: Option<Arc<dyn Leaderboard>>,
}

impl HaggleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            leaderboard: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets where results go. Defaults to a fresh [`MemoryLeaderboard`].
    pub fn leaderboard(mut self, leaderboard: Arc<dyn Leaderboard>) -> Self {
        self.leaderboard = Some(leaderboard);
        self
    }

    /// Enumerates the game space, binds the listener, and spawns the
    /// scheduler.
    ///
    /// # Errors
    ///
    /// [`HaggleError::Negotiation`] if the game constraints admit no game,
    /// [`HaggleError::Transport`] if the address cannot be bound.
    pub async fn build(self) -> Result<HaggleServer, HaggleError> {
        let config = self.config;
        let generator = Generator::new(&config.generator_config())?;
        let session_config = config.session_config();
        let transport = WebSocketTransport::bind(&config.bind)
            .await?
            .with_upgrade_timeout(session_config.handshake_timeout);

        // Freshness must not exceed the reset period or replays slip through.
        let verifier: Arc<dyn Verifier> =
            Arc::new(HashcashVerifier::new(config.complexity, config.pow_reset()));
        let leaderboard = self
            .leaderboard
            .unwrap_or_else(|| Arc::new(MemoryLeaderboard::new()));

        let scheduler = Scheduler::new(
            config.scheduler_config(),
            generator,
            Arc::clone(&verifier),
            leaderboard,
        )
        .spawn();

        let state = Arc::new(ServerState {
            session_config,
            verifier,
            scheduler,
        });

        Ok(HaggleServer {
            transport,
            state,
            config,
        })
    }
}

impl Default for HaggleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Haggle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HaggleServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl HaggleServer {
    /// Creates a new builder.
    pub fn builder() -> HaggleServerBuilder {
        HaggleServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the scheduler, for stats and shutdown.
    pub fn scheduler(&self) -> SchedulerHandle<WebSocketConnection> {
        self.state.scheduler.clone()
    }

    /// Runs the server accept loop.
    ///
    /// Spawns a handler task for each accepted connection and a task that
    /// resets the proof-of-work verifier on every `pow_reset` tick. Runs
    /// until the process is terminated.
    pub async fn run(mut self) -> Result<(), HaggleError> {
        tracing::info!(
            complexity = self.config.complexity,
            parallel_games = self.config.parallel_games,
            "Haggle server running"
        );

        let reset = tokio::spawn(reset_verifier(
            Arc::clone(&self.state.verifier),
            self.config.pow_reset(),
        ));
        // The reset task must not outlive the server.
        let _reset = AbortOnDrop(reset);

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

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn reset_verifier(verifier: Arc<dyn Verifier>, period: std::time::Duration) {
    let mut ticks = tokio::time::interval(period);
    // The first tick completes immediately.
    ticks.tick().await;
    loop {
        ticks.tick().await;
        verifier.reset();
    }
}
