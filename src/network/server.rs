//! WebSocket Game Server
//!
//! Accepts sockets on the configured path, hands each one to a session task
//! and runs the background loops that drive the world: the 60 Hz tick, the
//! two spawners and the periodic position flush.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, instrument, warn};

use crate::core::rng::GameRng;
use crate::game::config::MatchConfig;
use crate::game::spawner::{next_powerup_delay, spawn_powerup, spawn_weapon};
use crate::game::tick::tick;
use crate::game::world::{SharedWorld, World};
use crate::network::session::run_session;
use crate::persistence::Persistence;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Path the WebSocket upgrade is served on.
    pub ws_path: String,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Outbound queue capacity per connection.
    pub outbound_buffer: usize,
    /// How long an upgraded socket may wait before sending `session_init`.
    pub handshake_timeout: Duration,
    /// How often connected players' positions are logged to the store.
    pub position_flush_interval: Duration,
    /// Fixed RNG seed; seeded from the clock when unset.
    pub rng_seed: Option<u64>,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ws_path: "/ws".to_string(),
            max_connections: 1000,
            outbound_buffer: 256,
            handshake_timeout: Duration::from_secs(10),
            position_flush_interval: Duration::from_millis(500),
            rng_seed: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from `ARENA_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, GameServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GameServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, GameServerError> {
            value
                .trim()
                .parse()
                .map_err(|_| GameServerError::InvalidConfig { key, value })
        }

        let mut config = Self::default();
        if let Some(v) = lookup("ARENA_BIND_ADDR") {
            config.bind_addr = parse("ARENA_BIND_ADDR", v)?;
        }
        if let Some(v) = lookup("ARENA_WS_PATH") {
            if !v.starts_with('/') {
                return Err(GameServerError::InvalidConfig { key: "ARENA_WS_PATH", value: v });
            }
            config.ws_path = v;
        }
        if let Some(v) = lookup("ARENA_MAX_CONNECTIONS") {
            config.max_connections = parse("ARENA_MAX_CONNECTIONS", v)?;
        }
        if let Some(v) = lookup("ARENA_OUTBOUND_BUFFER") {
            let buffer: usize = parse("ARENA_OUTBOUND_BUFFER", v.clone())?;
            if buffer == 0 {
                return Err(GameServerError::InvalidConfig { key: "ARENA_OUTBOUND_BUFFER", value: v });
            }
            config.outbound_buffer = buffer;
        }
        if let Some(v) = lookup("ARENA_HANDSHAKE_TIMEOUT_MS") {
            let ms: u64 = parse("ARENA_HANDSHAKE_TIMEOUT_MS", v.clone())?;
            if ms == 0 {
                return Err(GameServerError::InvalidConfig { key: "ARENA_HANDSHAKE_TIMEOUT_MS", value: v });
            }
            config.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("ARENA_POSITION_FLUSH_MS") {
            let ms: u64 = parse("ARENA_POSITION_FLUSH_MS", v.clone())?;
            if ms == 0 {
                return Err(GameServerError::InvalidConfig { key: "ARENA_POSITION_FLUSH_MS", value: v });
            }
            config.position_flush_interval = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("ARENA_RNG_SEED") {
            config.rng_seed = Some(parse("ARENA_RNG_SEED", v)?);
        }
        Ok(config)
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Bad configuration value.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidConfig {
        /// Variable name.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// Releases a connection slot when the socket task ends.
struct ConnectionSlot(Arc<AtomicUsize>);

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// The shared world.
    world: SharedWorld,
    /// Player store front.
    persistence: Persistence,
    /// Open sockets.
    connections: Arc<AtomicUsize>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a server with its own world.
    pub fn new(config: ServerConfig, match_config: MatchConfig, persistence: Persistence) -> Self {
        let rng = config.rng_seed.map_or_else(GameRng::from_clock, GameRng::new);
        let world = World::new(match_config, rng).into_shared();
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            world,
            persistence,
            connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
        }
    }

    /// The shared world.
    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// Bind and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    #[instrument(skip(self, listener))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!(
            "Arena Tactics server v{} listening on {}{}",
            self.config.version,
            listener.local_addr()?,
            self.config.ws_path
        );

        let background = [
            tokio::spawn(Self::run_tick_loop(self.world.clone(), self.persistence.clone())),
            tokio::spawn(Self::run_weapon_spawn_loop(self.world.clone())),
            tokio::spawn(Self::run_powerup_spawn_loop(self.world.clone())),
            tokio::spawn(Self::run_position_flush_loop(
                self.world.clone(),
                self.persistence.clone(),
                self.config.position_flush_interval,
            )),
        ];

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.connections.load(Ordering::SeqCst) >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        for handle in background {
            handle.abort();
        }
        Ok(())
    }

    /// Upgrade a socket and run its session.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let slot = ConnectionSlot(self.connections.clone());
        let world = self.world.clone();
        let persistence = self.persistence.clone();
        let ws_path = self.config.ws_path.clone();
        let outbound_buffer = self.config.outbound_buffer;
        let handshake_timeout = self.config.handshake_timeout;

        tokio::spawn(async move {
            let _slot = slot;
            let check_path = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
                if req.uri().path() == ws_path {
                    Ok(response)
                } else {
                    let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
                    *rejection.status_mut() = StatusCode::NOT_FOUND;
                    Err(rejection)
                }
            };

            let ws_stream = match accept_hdr_async(stream, check_path).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("WebSocket upgrade failed for {}: {}", addr, e);
                    return;
                }
            };

            let session = run_session(ws_stream, addr, world, persistence, outbound_buffer, handshake_timeout);
            if let Err(e) = session.await {
                debug!("Session from {} ended: {}", addr, e);
            }
        });
    }

    /// Fixed-rate simulation.
    async fn run_tick_loop(world: SharedWorld, persistence: Persistence) {
        let period = world.read().await.config.tick_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let writes = {
                let mut world = world.write().await;
                let result = tick(&mut world, Instant::now());
                if !result.hits.is_empty() {
                    debug!(hits = result.hits.len(), "Tick resolved hits");
                }
                world.take_store_writes()
            };
            persistence.dispatch(writes);
        }
    }

    /// One weapon spawn attempt per period.
    async fn run_weapon_spawn_loop(world: SharedWorld) {
        let period = world.read().await.config.weapon_spawn_interval;
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            spawn_weapon(&mut *world.write().await, Instant::now());
        }
    }

    /// One power-up spawn attempt after each random delay.
    async fn run_powerup_spawn_loop(world: SharedWorld) {
        loop {
            let delay = next_powerup_delay(&mut *world.write().await);
            tokio::time::sleep(delay).await;
            spawn_powerup(&mut *world.write().await, Instant::now());
        }
    }

    /// Log every connected player's position to the store.
    async fn run_position_flush_loop(world: SharedWorld, persistence: Persistence, period: Duration) {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let writes = {
                let mut world = world.write().await;
                world.queue_position_samples();
                world.take_store_writes()
            };
            persistence.dispatch(writes);
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Open socket count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Players currently in the world.
    pub async fn player_count(&self) -> usize {
        self.world.read().await.players.len()
    }
}
