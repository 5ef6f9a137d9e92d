//! Service boundary of the match server.
//!
//! The orchestrator is what the outer web/tournament layer talks to: it
//! starts matches between logged-in AIs, pairs players asking for a random
//! opponent, and forwards cancel and progress queries to running matches.
//! Every operation reports failure through [`OrchestrationError`], whose
//! `Display` text is the message returned to the caller.

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionKey};
use crate::matchmaking::{MatchmakingError, MatchmakingQueue, QueueOutcome};
use crate::registry::ConnectionRegistry;
use crate::simulator::{MatchHandle, MatchSimulator};
use log::{info, warn};
use shared::MatchRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Step reported for a player who is not in a match.
pub const NOT_IN_MATCH: i32 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Ai is no longer active")]
    AiNotActive,
    #[error("{0} is already looking for an opponent")]
    AlreadyWaiting(String),
    #[error("{0} is already playing a match")]
    AlreadyPlaying(String),
    #[error("{0} cannot play against themselves")]
    SamePlayer(String),
}

impl From<MatchmakingError> for OrchestrationError {
    fn from(error: MatchmakingError) -> Self {
        match error {
            MatchmakingError::AlreadyWaiting(player) => {
                OrchestrationError::AlreadyWaiting(player)
            }
        }
    }
}

/// Result of asking for a random opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matchmaking {
    Waiting,
    Started(u64),
}

pub struct MatchOrchestrator {
    registry: Arc<ConnectionRegistry>,
    queue: MatchmakingQueue,
    matches: Mutex<HashMap<u64, Arc<MatchHandle>>>,
    config: ServerConfig,
    results: mpsc::UnboundedSender<MatchRecord>,
    next_match_id: AtomicU64,
}

impl MatchOrchestrator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        config: ServerConfig,
        results: mpsc::UnboundedSender<MatchRecord>,
    ) -> Self {
        Self {
            registry,
            queue: MatchmakingQueue::new(),
            matches: Mutex::new(HashMap::new()),
            config,
            results,
            next_match_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Pairs the player with the longest-waiting opponent, or queues them.
    pub async fn wants_to_play(
        self: &Arc<Self>,
        player_name: &str,
        ai_name: &str,
    ) -> Result<Matchmaking, OrchestrationError> {
        let requester = self
            .registry
            .find(player_name, ai_name)
            .await
            .ok_or(OrchestrationError::AiNotActive)?;
        if self.match_of(player_name).await.is_some() {
            return Err(OrchestrationError::AlreadyPlaying(player_name.to_string()));
        }

        match self.queue.request_opponent(Arc::clone(&requester)).await? {
            QueueOutcome::Waiting => Ok(Matchmaking::Waiting),
            QueueOutcome::Paired(waiter) => {
                match self.launch(Arc::clone(&waiter), requester).await {
                    Ok(id) => Ok(Matchmaking::Started(id)),
                    Err(e) => {
                        if self.queue.requeue_front(waiter).await {
                            warn!("Pairing for {} failed ({}), opponent requeued", player_name, e);
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Starts a match between two logged-in AIs. The first one plays as
    /// `FirstPlayer`.
    pub async fn start_match(
        self: &Arc<Self>,
        player1: &str,
        ai1: &str,
        player2: &str,
        ai2: &str,
    ) -> Result<u64, OrchestrationError> {
        if player1 == player2 {
            return Err(OrchestrationError::SamePlayer(player1.to_string()));
        }
        let first = self
            .registry
            .find(player1, ai1)
            .await
            .ok_or(OrchestrationError::AiNotActive)?;
        let second = self
            .registry
            .find(player2, ai2)
            .await
            .ok_or(OrchestrationError::AiNotActive)?;

        self.queue.cancel_waiting(player1).await;
        self.queue.cancel_waiting(player2).await;
        self.launch(first, second).await
    }

    async fn launch(
        self: &Arc<Self>,
        first: Arc<Connection>,
        second: Arc<Connection>,
    ) -> Result<u64, OrchestrationError> {
        let handle = {
            let mut matches = self.matches.lock().await;
            for connection in [&first, &second] {
                let name = &connection.key().player_name;
                if matches.values().any(|m| m.side_of(name).is_some()) {
                    return Err(OrchestrationError::AlreadyPlaying(name.clone()));
                }
            }
            if !first.claim_for_match() {
                return Err(OrchestrationError::AlreadyPlaying(
                    first.key().player_name.clone(),
                ));
            }
            if !second.claim_for_match() {
                first.release();
                return Err(OrchestrationError::AlreadyPlaying(
                    second.key().player_name.clone(),
                ));
            }

            let id = self.next_match_id.fetch_add(1, Ordering::Relaxed);
            let players: [ConnectionKey; 2] = [first.key().clone(), second.key().clone()];
            let handle = Arc::new(MatchHandle::new(id, players));
            matches.insert(id, Arc::clone(&handle));
            handle
        };

        let id = handle.id();
        let simulator =
            MatchSimulator::new(Arc::clone(&handle), [first, second], self.config.clone());
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let record = simulator.run().await;
            orchestrator.matches.lock().await.remove(&record.match_id);
            if orchestrator.results.send(record).is_err() {
                warn!("Result of match {} dropped, nobody is listening", id);
            }
        });

        info!("Started match {}", id);
        Ok(id)
    }

    async fn match_of(&self, player_name: &str) -> Option<Arc<MatchHandle>> {
        let matches = self.matches.lock().await;
        matches
            .values()
            .find(|m| m.side_of(player_name).is_some())
            .cloned()
    }

    /// Asks the player's running match to stop at the next tick. Returns
    /// whether a match was found; calling it again has no further effect.
    pub async fn cancel_match(&self, player_name: &str) -> bool {
        let Some(handle) = self.match_of(player_name).await else {
            return false;
        };
        if let Some(team) = handle.side_of(player_name) {
            if handle.request_cancel(team) {
                info!("{} asked to cancel match {}", player_name, handle.id());
            }
        }
        true
    }

    /// Takes the player out of the matchmaking queue, if queued.
    pub async fn cancel_looking(&self, player_name: &str) -> bool {
        self.queue.cancel_waiting(player_name).await
    }

    /// Current tick of the player's match, or [`NOT_IN_MATCH`].
    pub async fn current_match_step(&self, player_name: &str) -> i32 {
        match self.match_of(player_name).await {
            Some(handle) => handle.current_step(),
            None => NOT_IN_MATCH,
        }
    }

    /// Waits up to `limit` for any client running `ai_name` to log in.
    pub async fn wait_for_ai(
        &self,
        ai_name: &str,
        limit: Duration,
    ) -> Result<ConnectionKey, OrchestrationError> {
        tokio::time::timeout(limit, self.registry.wait_for_connection(ai_name))
            .await
            .map(|connection| connection.key().clone())
            .map_err(|_| OrchestrationError::AiNotActive)
    }

    pub async fn running_matches(&self) -> usize {
        self.matches.lock().await.len()
    }
}
