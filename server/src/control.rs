//! Line-based JSON control interface for the outer tournament layer.
//!
//! Each request is one JSON object on its own line, answered by one JSON
//! value on its own line: `"ok"`, an error message, or a step number.

use crate::orchestrator::{MatchOrchestrator, OrchestrationError};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Longest a single `WaitForAi` request may block its control connection.
const MAX_AI_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    WantsToPlay {
        player_name: String,
        ai_name: String,
    },
    StartMatch {
        player1: String,
        ai1: String,
        player2: String,
        ai2: String,
    },
    CancelMatch {
        player_name: String,
    },
    CancelLooking {
        player_name: String,
    },
    CurrentMatchStep {
        player_name: String,
    },
    WaitForAi {
        ai_name: String,
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Step(i32),
    Message(String),
}

impl ControlResponse {
    pub fn ok() -> Self {
        ControlResponse::Message("ok".to_string())
    }
}

impl From<Result<(), OrchestrationError>> for ControlResponse {
    fn from(result: Result<(), OrchestrationError>) -> Self {
        match result {
            Ok(()) => ControlResponse::ok(),
            Err(e) => ControlResponse::Message(e.to_string()),
        }
    }
}

/// Executes one request against the orchestrator.
pub async fn handle_request(
    orchestrator: &Arc<MatchOrchestrator>,
    request: ControlRequest,
) -> ControlResponse {
    match request {
        ControlRequest::WantsToPlay {
            player_name,
            ai_name,
        } => orchestrator
            .wants_to_play(&player_name, &ai_name)
            .await
            .map(|_| ())
            .into(),
        ControlRequest::StartMatch {
            player1,
            ai1,
            player2,
            ai2,
        } => orchestrator
            .start_match(&player1, &ai1, &player2, &ai2)
            .await
            .map(|_| ())
            .into(),
        ControlRequest::CancelMatch { player_name } => {
            orchestrator.cancel_match(&player_name).await;
            ControlResponse::ok()
        }
        ControlRequest::CancelLooking { player_name } => {
            orchestrator.cancel_looking(&player_name).await;
            ControlResponse::ok()
        }
        ControlRequest::CurrentMatchStep { player_name } => {
            ControlResponse::Step(orchestrator.current_match_step(&player_name).await)
        }
        ControlRequest::WaitForAi {
            ai_name,
            timeout_ms,
        } => {
            let limit = Duration::from_millis(timeout_ms).min(MAX_AI_WAIT);
            orchestrator
                .wait_for_ai(&ai_name, limit)
                .await
                .map(|_| ())
                .into()
        }
    }
}

pub struct ControlServer {
    listener: TcpListener,
    orchestrator: Arc<MatchOrchestrator>,
}

impl ControlServer {
    pub async fn bind(addr: SocketAddr, orchestrator: Arc<MatchOrchestrator>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Control interface listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            orchestrator,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };
            debug!("Control connection from {}", addr);

            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                if let Err(e) = serve_control(stream, orchestrator).await {
                    warn!("Control connection {} failed: {}", addr, e);
                }
            });
        }
    }
}

async fn serve_control(stream: TcpStream, orchestrator: Arc<MatchOrchestrator>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => {
                debug!("Control request {:?}", request);
                handle_request(&orchestrator, request).await
            }
            Err(e) => ControlResponse::Message(format!("invalid request: {}", e)),
        };

        let mut reply = serde_json::to_string(&response)?;
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}
