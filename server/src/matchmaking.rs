//! FIFO queue of players looking for a random opponent.

use crate::connection::{Connection, ConnectionKey};
use log::info;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchmakingError {
    #[error("{0} is already looking for an opponent")]
    AlreadyWaiting(String),
}

#[derive(Debug)]
pub enum QueueOutcome {
    /// Nobody was waiting; the requester is now at the back of the queue.
    Waiting,
    /// The longest-waiting player was taken out of the queue to play the
    /// requester.
    Paired(Arc<Connection>),
}

#[derive(Default)]
pub struct MatchmakingQueue {
    waiting: Mutex<VecDeque<Arc<Connection>>>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs the requester with the oldest waiter, or enqueues it.
    ///
    /// Waiters whose transport has closed or who got into a match some
    /// other way are dropped instead of being paired.
    pub async fn request_opponent(
        &self,
        requester: Arc<Connection>,
    ) -> Result<QueueOutcome, MatchmakingError> {
        let mut waiting = self.waiting.lock().await;

        let player_name = &requester.key().player_name;
        if waiting.iter().any(|c| &c.key().player_name == player_name) {
            return Err(MatchmakingError::AlreadyWaiting(player_name.clone()));
        }

        while let Some(head) = waiting.pop_front() {
            if head.is_open() && !head.is_in_match() {
                info!("Paired {} with {}", head.key(), requester.key());
                return Ok(QueueOutcome::Paired(head));
            }
            info!("Dropping stale matchmaking entry {}", head.key());
        }

        info!("{} is waiting for an opponent", requester.key());
        waiting.push_back(requester);
        Ok(QueueOutcome::Waiting)
    }

    /// Puts a waiter taken out by [`request_opponent`](Self::request_opponent)
    /// back at the head of the queue after its pairing fell through.
    pub async fn requeue_front(&self, waiter: Arc<Connection>) -> bool {
        let mut waiting = self.waiting.lock().await;
        let player_name = &waiter.key().player_name;
        if !waiter.is_open()
            || waiter.is_in_match()
            || waiting.iter().any(|c| &c.key().player_name == player_name)
        {
            return false;
        }

        info!("{} is back at the head of the queue", waiter.key());
        waiting.push_front(waiter);
        true
    }

    /// Removes the player's entry. Returns false if it was not queued.
    pub async fn cancel_waiting(&self, player_name: &str) -> bool {
        let mut waiting = self.waiting.lock().await;
        let before = waiting.len();
        waiting.retain(|c| c.key().player_name != player_name);
        before != waiting.len()
    }

    pub async fn len(&self) -> usize {
        self.waiting.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.waiting.lock().await.is_empty()
    }

    /// Queued players, oldest first.
    pub async fn waiting(&self) -> Vec<ConnectionKey> {
        self.waiting
            .lock()
            .await
            .iter()
            .map(|c| c.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{split, DuplexStream};

    fn connection(id: u64, player: &str) -> (Arc<Connection>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(1024);
        let (reader, writer) = split(server_side);
        let connection = Connection::attach(id, ConnectionKey::new(player, "bot"), reader, writer);
        (connection, client_side)
    }

    fn paired_name(outcome: QueueOutcome) -> String {
        match outcome {
            QueueOutcome::Paired(c) => c.key().player_name.clone(),
            QueueOutcome::Waiting => panic!("expected a pairing"),
        }
    }

    #[tokio::test]
    async fn test_first_request_waits() {
        let queue = MatchmakingQueue::new();
        let (a, _a) = connection(1, "a");
        assert!(matches!(
            queue.request_opponent(a).await.unwrap(),
            QueueOutcome::Waiting
        ));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_request_pairs() {
        let queue = MatchmakingQueue::new();
        let (a, _a) = connection(1, "a");
        let (b, _b) = connection(2, "b");
        queue.request_opponent(a).await.unwrap();
        assert_eq!(paired_name(queue.request_opponent(b).await.unwrap()), "a");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_oldest_waiter_paired_first() {
        let queue = MatchmakingQueue::new();
        let mut clients = Vec::new();
        // with the queue seeded directly, A, B and C wait side by side
        for (id, name) in [(1, "A"), (2, "B"), (3, "C")] {
            let (c, client) = connection(id, name);
            clients.push(client);
            queue.waiting.lock().await.push_back(c);
        }

        let (d, _d) = connection(4, "D");
        assert_eq!(paired_name(queue.request_opponent(d).await.unwrap()), "A");

        let remaining: Vec<String> = queue
            .waiting()
            .await
            .into_iter()
            .map(|k| k.player_name)
            .collect();
        assert_eq!(remaining, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_duplicate_request_rejected() {
        let queue = MatchmakingQueue::new();
        let (a, _a) = connection(1, "a");
        let (a_again, _b) = connection(2, "a");
        queue.request_opponent(a).await.unwrap();
        assert_eq!(
            queue.request_opponent(a_again).await.unwrap_err(),
            MatchmakingError::AlreadyWaiting("a".to_string())
        );
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancel_waiting() {
        let queue = MatchmakingQueue::new();
        let (a, _a) = connection(1, "a");
        queue.request_opponent(a).await.unwrap();

        assert!(queue.cancel_waiting("a").await);
        assert!(!queue.cancel_waiting("a").await);
        assert!(!queue.cancel_waiting("nobody").await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_requeued_waiter_is_paired_next() {
        let queue = MatchmakingQueue::new();
        let (a, _a) = connection(1, "a");
        let (b, _b) = connection(2, "b");
        let (c, _c) = connection(3, "c");
        queue.request_opponent(a).await.unwrap();
        queue.waiting.lock().await.push_back(b);

        let (d, _d) = connection(4, "d");
        let QueueOutcome::Paired(waiter) = queue.request_opponent(d).await.unwrap() else {
            panic!("expected a pairing");
        };
        assert!(queue.requeue_front(waiter.clone()).await);
        assert!(!queue.requeue_front(waiter).await);

        assert_eq!(paired_name(queue.request_opponent(c).await.unwrap()), "a");
    }

    #[tokio::test]
    async fn test_closed_waiter_skipped() {
        let queue = MatchmakingQueue::new();
        let (a, client_a) = connection(1, "a");
        let (b, _b) = connection(2, "b");
        let (c, _c) = connection(3, "c");
        queue.request_opponent(a.clone()).await.unwrap();
        queue.waiting.lock().await.push_back(b);

        drop(client_a);
        a.closed().await;

        assert_eq!(paired_name(queue.request_opponent(c).await.unwrap()), "b");
    }
}
