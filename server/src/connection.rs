//! A logged-in AI client and the tasks pumping its socket.
//!
//! Each connection runs two tasks: a reader that decodes frames into an
//! inbound queue, and a writer that drains an outbound queue onto the
//! socket. Whoever currently drives the client (the registry while idle,
//! a match simulator while playing) only ever touches the queues, so a
//! timed-out receive never leaves the byte stream half-read.

use log::{debug, info, warn};
use shared::transport::{read_frame, write_message};
use shared::Message;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};

/// Inbound frames buffered per connection before the reader stops reading.
const INBOUND_CAPACITY: usize = 64;

/// Identity of a logged-in client. Unique among active connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub player_name: String,
    pub ai_name: String,
}

impl ConnectionKey {
    pub fn new(player_name: impl Into<String>, ai_name: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            ai_name: ai_name.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.player_name, self.ai_name)
    }
}

/// Something the client sent after logging in.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(Message),
    /// A frame that could not be decoded; the stream itself is still usable.
    Malformed(String),
}

#[derive(Debug)]
pub struct Connection {
    id: u64,
    key: ConnectionKey,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: Mutex<mpsc::Receiver<Inbound>>,
    open: AtomicBool,
    in_match: AtomicBool,
    closed: Notify,
}

impl Connection {
    /// Wraps an already logged-in stream and spawns its reader and writer
    /// tasks.
    pub fn attach<R, W>(id: u64, key: ConnectionKey, reader: R, writer: W) -> Arc<Connection>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        let connection = Arc::new(Connection {
            id,
            key,
            outbound: outbound_tx,
            inbound: Mutex::new(inbound_rx),
            open: AtomicBool::new(true),
            in_match: AtomicBool::new(false),
            closed: Notify::new(),
        });

        tokio::spawn(Self::read_loop(Arc::clone(&connection), reader, inbound_tx));
        tokio::spawn(Self::write_loop(Arc::clone(&connection), writer, outbound_rx));

        connection
    }

    async fn read_loop<R>(
        connection: Arc<Connection>,
        mut reader: R,
        inbound: mpsc::Sender<Inbound>,
    ) where
        R: AsyncRead + Unpin,
    {
        loop {
            let read = tokio::select! {
                read = read_frame(&mut reader) => read,
                _ = connection.closed() => break,
            };
            let frame = match read {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("{} closed the connection", connection.key);
                    break;
                }
                Err(e) => {
                    warn!("Dropping {}: {}", connection.key, e);
                    break;
                }
            };

            let event = match frame.decode() {
                Ok(message) => Inbound::Message(message),
                Err(e) => {
                    warn!("Malformed frame from {}: {}", connection.key, e);
                    Inbound::Malformed(e.to_string())
                }
            };

            if inbound.send(event).await.is_err() {
                break;
            }
        }

        connection.mark_closed();
    }

    async fn write_loop<W>(
        connection: Arc<Connection>,
        mut writer: W,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) where
        W: AsyncWrite + Unpin,
    {
        loop {
            tokio::select! {
                biased;
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = write_message(&mut writer, &message).await {
                        warn!("Failed to send to {}: {}", connection.key, e);
                        connection.mark_closed();
                        break;
                    }
                }
                _ = connection.closed() => break,
            }
        }
    }

    fn mark_closed(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Connection {} ({}) closed", self.id, self.key);
        }
        self.closed.notify_waiters();
    }

    /// Shuts the connection down once everything already queued with
    /// [`Connection::send`] has been written.
    pub fn close(&self) {
        self.mark_closed();
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Completes once the transport is gone.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_open() {
                return;
            }
            notified.await;
        }
    }

    /// Queues a message for the client. Returns false if the transport is gone.
    pub fn send(&self, message: Message) -> bool {
        self.is_open() && self.outbound.send(message).is_ok()
    }

    /// Waits for the next frame from the client. `None` means the transport
    /// is closed and nothing more will arrive. Cancel safe.
    pub async fn recv(&self) -> Option<Inbound> {
        self.inbound.lock().await.recv().await
    }

    /// Drops frames the client sent while nobody was listening.
    pub async fn discard_pending(&self) -> usize {
        let mut inbound = self.inbound.lock().await;
        let mut dropped = 0;
        while inbound.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn is_in_match(&self) -> bool {
        self.in_match.load(Ordering::SeqCst)
    }

    /// Binds the connection to a match. Fails if it already plays one.
    pub fn claim_for_match(&self) -> bool {
        self.in_match
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns the connection to the idle state after a match.
    pub fn release(&self) {
        self.in_match.store(false, Ordering::SeqCst);
    }
}
