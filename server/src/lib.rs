//! # Football AI Match Server
//!
//! Authoritative server that lets AI clients play 11-a-side football matches
//! against each other. Clients connect over TCP, log in with a player and AI
//! name, declare their team's capabilities and then send one action per
//! player every simulation step. The server checks every action against the
//! physical limits derived from those capabilities, simulates the match and
//! reports a [`shared::MatchInfo`] when it ends.
//!
//! ## Module Organization
//!
//! ### Connections (`connection`, `registry`, `network`)
//! The game listener performs the login handshake and registers each client
//! in the [`registry::ConnectionRegistry`], keyed by player and AI name. A
//! connection owns a reader and a writer task, so match code only ever deals
//! with message queues.
//!
//! ### Matchmaking (`matchmaking`, `orchestrator`)
//! The [`orchestrator::MatchOrchestrator`] starts matches on request, pairs
//! players looking for a random opponent in FIFO order, and forwards cancel
//! and progress queries to running matches. The `control` module exposes it
//! as a line-based JSON interface.
//!
//! ### Simulation (`simulator`, `game`, `physics`)
//! Every match runs on its own task. The [`simulator::MatchSimulator`]
//! exchanges parameters, waits for both sides' actions each tick with a
//! deadline and decides walkovers. [`game::Simulation`] holds the players,
//! the ball and the statistics, and `physics` enforces speed, acceleration
//! and kick limits.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, mut results) = server::start(ServerConfig::default()).await?;
//!     println!("AI clients connect to {}", server.game_addr);
//!
//!     while let Some(record) = results.recv().await {
//!         println!("{}", record.to_json()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod control;
pub mod game;
pub mod matchmaking;
pub mod network;
pub mod orchestrator;
pub mod physics;
pub mod registry;
pub mod simulator;

use config::ServerConfig;
use control::ControlServer;
use log::info;
use network::GameServer;
use orchestrator::MatchOrchestrator;
use registry::ConnectionRegistry;
use shared::MatchRecord;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A started server: its bound addresses, its shared state and the tasks
/// running its listeners.
pub struct ServerHandle {
    pub game_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub registry: Arc<ConnectionRegistry>,
    pub orchestrator: Arc<MatchOrchestrator>,
    listeners: Vec<JoinHandle<io::Result<()>>>,
}

impl ServerHandle {
    /// Stops accepting new clients. Running matches finish on their own.
    pub fn shutdown(self) {
        for listener in self.listeners {
            listener.abort();
        }
    }
}

/// Binds the game and control listeners and starts serving. Every finished
/// match is delivered on the returned channel.
pub async fn start(
    config: ServerConfig,
) -> io::Result<(ServerHandle, mpsc::UnboundedReceiver<MatchRecord>)> {
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(ConnectionRegistry::new());
    let orchestrator = Arc::new(MatchOrchestrator::new(
        Arc::clone(&registry),
        config.clone(),
        results_tx,
    ));

    let game =
        GameServer::bind(config.game_addr, Arc::clone(&registry), config.login_timeout).await?;
    let control = ControlServer::bind(config.control_addr, Arc::clone(&orchestrator)).await?;
    let game_addr = game.local_addr()?;
    let control_addr = control.local_addr()?;

    let listeners = vec![tokio::spawn(game.run()), tokio::spawn(control.run())];
    info!(
        "Serving matches of {} steps every {:?}",
        config.step_count, config.step_interval
    );

    Ok((
        ServerHandle {
            game_addr,
            control_addr,
            registry,
            orchestrator,
            listeners,
        },
        results_rx,
    ))
}

/// File a match record is stored in below `dir`.
pub fn record_path(dir: &Path, record: &MatchRecord) -> PathBuf {
    dir.join(format!(
        "{}-{}-vs-{}.json",
        record.match_id, record.player1, record.player2
    ))
}

/// Writes the record as pretty JSON into `dir` and returns the file path.
pub async fn write_record(dir: &Path, record: &MatchRecord) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = record_path(dir, record);
    tokio::fs::write(&path, record.to_json()?).await?;
    Ok(path)
}
