//! Arena Tactics Game Server
//!
//! Reads `ARENA_*` settings from the environment and serves until killed.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arena_tactics::{GameServer, MatchConfig, MemoryStore, Persistence, ServerConfig, TICK_RATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ServerConfig::from_env()?;
    info!("Arena Tactics Server v{}", VERSION);
    info!("Tick Rate: {} Hz", TICK_RATE);

    let persistence = Persistence::new(Arc::new(MemoryStore::new()));
    let server = GameServer::new(config, MatchConfig::default(), persistence);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            server.shutdown();
        }
    }
    Ok(())
}
