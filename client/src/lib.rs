//! # Reference AI Client
//!
//! A headless bot speaking the match server's wire protocol. It logs in,
//! answers the parameters request with a balanced team and then sends one
//! action per step until the match is over.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Owns the stream to the server: login handshake, the per-step
//! request/response loop and the final match outcome.
//!
//! ### Strategy Module (`strategy`)
//! Pure decision making. The player closest to the ball chases it without
//! exceeding its speed or acceleration limits and shoots at the opponent
//! goal once the ball is in reach.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::network::BotError> {
//!     let mut bot = Client::connect("127.0.0.1:50030", "alice", "chaser", 200.0).await?;
//!     bot.login().await?;
//!     if let Some(outcome) = bot.run().await? {
//!         println!("won: {}", outcome.won());
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod strategy;
