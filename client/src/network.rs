use crate::strategy::Strategy;
use log::{debug, info, warn};
use shared::transport::{read_message, write_message};
use shared::{LoginMessage, Message, Team};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub type BotError = Box<dyn std::error::Error + Send + Sync>;

/// How a match ended from the bot's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    pub side: Option<Team>,
    pub winner: Option<Team>,
}

impl MatchOutcome {
    pub fn won(&self) -> bool {
        self.side.is_some() && self.side == self.winner
    }
}

pub struct Client<S> {
    stream: S,
    player_name: String,
    ai_name: String,
    strategy: Strategy,
    side: Option<Team>,
}

impl Client<TcpStream> {
    pub async fn connect(
        server_addr: &str,
        player_name: &str,
        ai_name: &str,
        step_ms: f32,
    ) -> Result<Self, BotError> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", server_addr);
        Ok(Client::new(stream, player_name, ai_name, step_ms))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, player_name: &str, ai_name: &str, step_ms: f32) -> Self {
        Client {
            stream,
            player_name: player_name.to_string(),
            ai_name: ai_name.to_string(),
            strategy: Strategy::new(step_ms),
            side: None,
        }
    }

    pub async fn login(&mut self) -> Result<(), BotError> {
        let login = Message::Login(LoginMessage {
            player_name: self.player_name.clone(),
            ai_name: self.ai_name.clone(),
        });
        write_message(&mut self.stream, &login).await?;

        match read_message(&mut self.stream).await? {
            Some(Message::LoginAccepted) => {
                info!("Logged in as {}/{}", self.player_name, self.ai_name);
                Ok(())
            }
            Some(Message::LoginRejected { reason }) => {
                Err(format!("login rejected: {}", reason).into())
            }
            Some(other) => Err(format!("unexpected {:?} frame during login", other.kind()).into()),
            None => Err("server closed the connection during login".into()),
        }
    }

    /// Plays until the server announces the end of a match. Returns `None`
    /// if the server hung up first.
    pub async fn run(&mut self) -> Result<Option<MatchOutcome>, BotError> {
        loop {
            let message = match read_message(&mut self.stream).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("Server closed the connection");
                    return Ok(None);
                }
                Err(e) if !e.is_fatal() => {
                    warn!("Ignoring malformed frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match message {
                Message::ParametersRequest { side } => {
                    info!("Playing as {:?}", side);
                    self.side = Some(side);
                    let parameters = Message::Parameters(self.strategy.parameters());
                    write_message(&mut self.stream, &parameters).await?;
                }
                Message::State(state) => {
                    let Some(side) = self.side else {
                        debug!("State before parameters request, ignoring");
                        continue;
                    };
                    let action = self.strategy.decide(side, &state);
                    write_message(&mut self.stream, &Message::Action(action)).await?;
                }
                Message::MatchOver { winner } => {
                    let outcome = MatchOutcome {
                        side: self.side.take(),
                        winner,
                    };
                    info!("Match over, winner {:?} (we were {:?})", winner, outcome.side);
                    return Ok(Some(outcome));
                }
                other => debug!("Ignoring {:?} frame", other.kind()),
            }
        }
    }
}
