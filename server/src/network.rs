//! TCP listener for AI clients: accept, log in, register, and clean up
//! after the client leaves.

use crate::connection::{Connection, ConnectionKey};
use crate::registry::{ConnectionRegistry, RegistryError};
use log::{error, info, warn};
use shared::transport::{read_message, write_message};
use shared::{FrameKind, Message, ProtocolError};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("connection closed before logging in")]
    Closed,
    #[error("no login within {0:?}")]
    TimedOut(Duration),
    #[error("expected a login frame, got {0:?}")]
    UnexpectedFrame(FrameKind),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Accepts AI clients and hands logged-in connections to the registry.
pub struct GameServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    login_timeout: Duration,
}

impl GameServer {
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        login_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Game server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry,
            login_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until the listener fails. Each client is served on
    /// its own task.
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };
            info!("Connection from {}", addr);

            let registry = Arc::clone(&self.registry);
            let login_timeout = self.login_timeout;
            tokio::spawn(async move {
                if let Err(e) = serve_client(stream, registry, login_timeout).await {
                    warn!("Client {} rejected: {}", addr, e);
                }
            });
        }
    }
}

/// Runs the login handshake, then keeps the client registered until its
/// transport closes.
async fn serve_client(
    stream: TcpStream,
    registry: Arc<ConnectionRegistry>,
    login_timeout: Duration,
) -> Result<(), LoginError> {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to disable Nagle's algorithm: {}", e);
    }
    let (mut reader, mut writer) = stream.into_split();

    let login = match tokio::time::timeout(login_timeout, read_message(&mut reader)).await {
        Err(_) => Err(LoginError::TimedOut(login_timeout)),
        Ok(Ok(None)) => Err(LoginError::Closed),
        Ok(Ok(Some(Message::Login(login)))) => Ok(login),
        Ok(Ok(Some(other))) => Err(LoginError::UnexpectedFrame(other.kind())),
        Ok(Err(e)) => Err(LoginError::Protocol(e)),
    };
    let login = match login {
        Ok(login) => login,
        Err(e) => {
            let rejection = Message::LoginRejected {
                reason: e.to_string(),
            };
            // best effort, the client may already be gone
            let _ = write_message(&mut writer, &rejection).await;
            return Err(e);
        }
    };

    let key = ConnectionKey::new(login.player_name, login.ai_name);
    let connection = Connection::attach(registry.next_connection_id(), key, reader, writer);
    if let Err(e) = registry.register(Arc::clone(&connection)).await {
        connection.send(Message::LoginRejected {
            reason: e.to_string(),
        });
        connection.close();
        return Err(e.into());
    }
    connection.send(Message::LoginAccepted);

    connection.closed().await;
    registry.unregister(connection.key(), connection.id()).await;
    Ok(())
}
