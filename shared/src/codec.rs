//! Binary message codec for the AI client protocol.
//!
//! Every message travels as one frame: a kind byte, a little-endian `u32`
//! payload length and the payload. This module only deals with payloads;
//! [`crate::transport`] reads and writes the frame envelope.
//!
//! Fixed-size payloads (parameters, actions, state) are laid out by bincode
//! with fixed-width little-endian integers and IEEE-754 floats, which gives
//! exactly the sizes below. Strings are `u64` length-prefixed UTF-8.

use crate::entities::{PlayerAction, PlayerParameters, Team};
use crate::vector::Vector;
use crate::{PLAYERS_PER_TEAM, MAX_FRAME_LEN};
use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 11 players × 4 floats × 4 bytes.
pub const PARAMETERS_FRAME_LEN: usize = PLAYERS_PER_TEAM * 4 * 4;
/// Step index followed by 11 players × 4 floats × 4 bytes.
pub const ACTION_FRAME_LEN: usize = 4 + PLAYERS_PER_TEAM * 4 * 4;
/// Step index, the ball and 22 players, each as position + movement.
pub const STATE_FRAME_LEN: usize = 4 + (1 + 2 * PLAYERS_PER_TEAM) * 4 * 4;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed {kind:?} frame: {reason}")]
    MalformedFrame { kind: FrameKind, reason: String },

    #[error("unknown frame kind {0}")]
    UnknownFrameKind(u8),

    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(u32),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] bincode::Error),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Fatal errors leave the stream at an unknown offset; the connection
    /// has to be dropped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::FrameTooLarge(_) | ProtocolError::Io(_))
    }

    fn malformed(kind: FrameKind, reason: impl Into<String>) -> Self {
        ProtocolError::MalformedFrame {
            kind,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Login = 1,
    Parameters = 2,
    Action = 3,
    LoginAccepted = 4,
    LoginRejected = 5,
    ParametersRequest = 6,
    State = 7,
    MatchOver = 8,
}

impl TryFrom<u8> for FrameKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => FrameKind::Login,
            2 => FrameKind::Parameters,
            3 => FrameKind::Action,
            4 => FrameKind::LoginAccepted,
            5 => FrameKind::LoginRejected,
            6 => FrameKind::ParametersRequest,
            7 => FrameKind::State,
            8 => FrameKind::MatchOver,
            other => return Err(ProtocolError::UnknownFrameKind(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginMessage {
    pub player_name: String,
    pub ai_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ParametersMessage {
    pub players: [PlayerParameters; PLAYERS_PER_TEAM],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ActionMessage {
    pub step: i32,
    pub actions: [PlayerAction; PLAYERS_PER_TEAM],
}

/// Position and per-step movement of a body on the field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BodyState {
    pub position: Vector,
    pub movement: Vector,
}

/// State broadcast sent before every step. Players 0-10 belong to
/// FirstPlayer, 11-21 to SecondPlayer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct StateMessage {
    pub step: i32,
    pub ball: BodyState,
    pub players: [BodyState; 2 * PLAYERS_PER_TEAM],
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Login(LoginMessage),
    Parameters(ParametersMessage),
    Action(ActionMessage),
    LoginAccepted,
    LoginRejected { reason: String },
    ParametersRequest { side: Team },
    State(StateMessage),
    MatchOver { winner: Option<Team> },
}

impl Message {
    pub fn kind(&self) -> FrameKind {
        match self {
            Message::Login(_) => FrameKind::Login,
            Message::Parameters(_) => FrameKind::Parameters,
            Message::Action(_) => FrameKind::Action,
            Message::LoginAccepted => FrameKind::LoginAccepted,
            Message::LoginRejected { .. } => FrameKind::LoginRejected,
            Message::ParametersRequest { .. } => FrameKind::ParametersRequest,
            Message::State(_) => FrameKind::State,
            Message::MatchOver { .. } => FrameKind::MatchOver,
        }
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_FRAME_LEN as u64)
        .reject_trailing_bytes()
}

fn expect_len(kind: FrameKind, bytes: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if bytes.len() != expected {
        return Err(ProtocolError::malformed(
            kind,
            format!("expected {} bytes, got {}", expected, bytes.len()),
        ));
    }
    Ok(())
}

fn deserialize<'a, T: Deserialize<'a>>(
    kind: FrameKind,
    bytes: &'a [u8],
) -> Result<T, ProtocolError> {
    wire_options()
        .deserialize(bytes)
        .map_err(|e| ProtocolError::malformed(kind, e.to_string()))
}

fn validate_name(kind: FrameKind, field: &str, name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::malformed(kind, format!("empty {}", field)));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ProtocolError::malformed(
            kind,
            format!("{} contains whitespace", field),
        ));
    }
    Ok(())
}

fn team_from_byte(kind: FrameKind, byte: u8) -> Result<Option<Team>, ProtocolError> {
    match byte {
        0 => Ok(None),
        1 => Ok(Some(Team::FirstPlayer)),
        2 => Ok(Some(Team::SecondPlayer)),
        other => Err(ProtocolError::malformed(kind, format!("invalid team {}", other))),
    }
}

fn team_to_byte(team: Option<Team>) -> u8 {
    match team {
        None => 0,
        Some(Team::FirstPlayer) => 1,
        Some(Team::SecondPlayer) => 2,
    }
}

/// Decodes a frame payload. An absent buffer is passed as an empty slice.
pub fn decode(kind: FrameKind, bytes: &[u8]) -> Result<Message, ProtocolError> {
    match kind {
        FrameKind::Login => {
            let login: LoginMessage = deserialize(kind, bytes)?;
            validate_name(kind, "player name", &login.player_name)?;
            validate_name(kind, "ai name", &login.ai_name)?;
            Ok(Message::Login(login))
        }
        FrameKind::Parameters => {
            expect_len(kind, bytes, PARAMETERS_FRAME_LEN)?;
            Ok(Message::Parameters(deserialize(kind, bytes)?))
        }
        FrameKind::Action => {
            expect_len(kind, bytes, ACTION_FRAME_LEN)?;
            Ok(Message::Action(deserialize(kind, bytes)?))
        }
        FrameKind::LoginAccepted => {
            expect_len(kind, bytes, 0)?;
            Ok(Message::LoginAccepted)
        }
        FrameKind::LoginRejected => Ok(Message::LoginRejected {
            reason: deserialize(kind, bytes)?,
        }),
        FrameKind::ParametersRequest => {
            expect_len(kind, bytes, 1)?;
            let side = match bytes[0] {
                0 => Team::FirstPlayer,
                1 => Team::SecondPlayer,
                other => {
                    return Err(ProtocolError::malformed(kind, format!("invalid side {}", other)))
                }
            };
            Ok(Message::ParametersRequest { side })
        }
        FrameKind::State => {
            expect_len(kind, bytes, STATE_FRAME_LEN)?;
            Ok(Message::State(deserialize(kind, bytes)?))
        }
        FrameKind::MatchOver => {
            expect_len(kind, bytes, 1)?;
            Ok(Message::MatchOver {
                winner: team_from_byte(kind, bytes[0])?,
            })
        }
    }
}

/// Encodes a message into its frame kind and payload.
pub fn encode(message: &Message) -> Result<(FrameKind, Vec<u8>), ProtocolError> {
    let options = wire_options();
    let payload = match message {
        Message::Login(login) => options.serialize(login)?,
        Message::Parameters(parameters) => options.serialize(parameters)?,
        Message::Action(action) => options.serialize(action)?,
        Message::LoginAccepted => Vec::new(),
        Message::LoginRejected { reason } => options.serialize(reason)?,
        Message::ParametersRequest { side } => vec![side.index() as u8],
        Message::State(state) => options.serialize(state)?,
        Message::MatchOver { winner } => vec![team_to_byte(*winner)],
    };
    Ok((message.kind(), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_action(step: i32) -> ActionMessage {
        let mut message = ActionMessage {
            step,
            ..ActionMessage::default()
        };
        for (i, action) in message.actions.iter_mut().enumerate() {
            action.movement = Vector::new(i as f32 * 0.1, -0.5);
            action.kick = Vector::new(1.25, i as f32);
        }
        message
    }

    fn roundtrip(message: Message) -> Message {
        let (kind, payload) = encode(&message).unwrap();
        decode(kind, &payload).unwrap()
    }

    #[test]
    fn test_frame_lengths() {
        assert_eq!(PARAMETERS_FRAME_LEN, 176);
        assert_eq!(ACTION_FRAME_LEN, 180);
        assert_eq!(STATE_FRAME_LEN, 372);

        let (_, payload) = encode(&Message::Parameters(ParametersMessage::default())).unwrap();
        assert_eq!(payload.len(), 176);
        let (_, payload) = encode(&Message::Action(sample_action(3))).unwrap();
        assert_eq!(payload.len(), 180);
    }

    #[test]
    fn test_action_layout_is_little_endian() {
        let mut message = ActionMessage {
            step: 7,
            ..ActionMessage::default()
        };
        message.actions[0].movement = Vector::new(1.5, -2.0);
        message.actions[0].kick = Vector::new(0.25, 4.0);

        let (kind, payload) = encode(&Message::Action(message)).unwrap();
        assert_eq!(kind, FrameKind::Action);
        assert_eq!(&payload[0..4], &7i32.to_le_bytes());
        assert_eq!(&payload[4..8], &1.5f32.to_le_bytes());
        assert_eq!(&payload[8..12], &(-2.0f32).to_le_bytes());
        assert_eq!(&payload[12..16], &0.25f32.to_le_bytes());
        assert_eq!(&payload[16..20], &4.0f32.to_le_bytes());
    }

    #[test]
    fn test_parameters_roundtrip() {
        let mut parameters = ParametersMessage::default();
        parameters.players[10] = PlayerParameters {
            speed: 0.4,
            precision: 0.3,
            possession: 0.2,
            kick_power: 0.1,
        };
        let message = Message::Parameters(parameters);
        assert_eq!(roundtrip(message.clone()), message);
    }

    #[test]
    fn test_action_and_state_roundtrip() {
        let action = Message::Action(sample_action(1499));
        assert_eq!(roundtrip(action.clone()), action);

        let mut state = StateMessage {
            step: 12,
            ball: BodyState {
                position: Vector::new(55.0, 37.5),
                movement: Vector::new(1.0, 0.0),
            },
            players: [BodyState::default(); 2 * PLAYERS_PER_TEAM],
        };
        state.players[21].position = Vector::new(100.0, 3.0);
        let state = Message::State(state);
        assert_eq!(roundtrip(state.clone()), state);
    }

    #[test]
    fn test_control_messages_roundtrip() {
        for message in [
            Message::LoginAccepted,
            Message::LoginRejected {
                reason: "duplicate login".to_string(),
            },
            Message::ParametersRequest {
                side: Team::SecondPlayer,
            },
            Message::MatchOver { winner: None },
            Message::MatchOver {
                winner: Some(Team::FirstPlayer),
            },
        ] {
            assert_eq!(roundtrip(message.clone()), message);
        }
    }

    #[test]
    fn test_login_roundtrip_and_validation() {
        let login = Message::Login(LoginMessage {
            player_name: "alice".to_string(),
            ai_name: "striker-v2".to_string(),
        });
        assert_eq!(roundtrip(login.clone()), login);

        for (player, ai) in [("", "bot"), ("alice", ""), ("al ice", "bot"), ("alice", "b\tot")] {
            let (kind, payload) = encode(&Message::Login(LoginMessage {
                player_name: player.to_string(),
                ai_name: ai.to_string(),
            }))
            .unwrap();
            let result = decode(kind, &payload);
            assert!(
                matches!(result, Err(ProtocolError::MalformedFrame { .. })),
                "{:?}/{:?} should be rejected",
                player,
                ai
            );
        }
    }

    #[test]
    fn test_wrong_lengths_are_malformed() {
        for len in [0, 1, 175, 177, 180, 352] {
            let bytes = vec![0u8; len];
            assert!(matches!(
                decode(FrameKind::Parameters, &bytes),
                Err(ProtocolError::MalformedFrame {
                    kind: FrameKind::Parameters,
                    ..
                })
            ));
        }
        for len in [0, 4, 176, 179, 181, 360] {
            let bytes = vec![0u8; len];
            assert!(matches!(
                decode(FrameKind::Action, &bytes),
                Err(ProtocolError::MalformedFrame {
                    kind: FrameKind::Action,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_truncated_login_is_malformed() {
        let (_, payload) = encode(&Message::Login(LoginMessage {
            player_name: "alice".to_string(),
            ai_name: "bot".to_string(),
        }))
        .unwrap();
        let result = decode(FrameKind::Login, &payload[..payload.len() - 1]);
        assert!(matches!(result, Err(ProtocolError::MalformedFrame { .. })));
        assert!(!result.unwrap_err().is_fatal());
    }

    #[test]
    fn test_oversized_login_length_prefix_is_malformed() {
        let mut payload = u64::MAX.to_le_bytes().to_vec();
        payload.extend_from_slice(b"alice");
        assert!(matches!(
            decode(FrameKind::Login, &payload),
            Err(ProtocolError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_unknown_frame_kind() {
        assert!(matches!(
            FrameKind::try_from(42),
            Err(ProtocolError::UnknownFrameKind(42))
        ));
        assert_eq!(FrameKind::try_from(3).unwrap(), FrameKind::Action);
    }
}
