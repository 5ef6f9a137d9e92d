//! Types shared by the match server and AI clients: field geometry,
//! simulation entities, the binary wire codec and match results.

pub mod codec;
pub mod entities;
pub mod match_info;
pub mod transport;
pub mod vector;

pub use codec::{
    decode, encode, ActionMessage, BodyState, FrameKind, LoginMessage, Message,
    ParametersMessage, ProtocolError, StateMessage,
};
pub use entities::{
    kickoff_position, speed_of, step_length, Ball, FootballPlayer, PlayerAction,
    PlayerParameters, Team,
};
pub use match_info::{
    ErrorReason, Goal, MatchInfo, MatchRecord, SimulationError, TeamStatistics,
};
pub use vector::Vector;

pub const PLAYERS_PER_TEAM: usize = 11;

pub const FIELD_WIDTH: f32 = 110.0;
pub const FIELD_HEIGHT: f32 = 75.0;
pub const GOAL_WIDTH: f32 = 7.32;

pub const DEFAULT_STEP_INTERVAL_MS: u64 = 200;
pub const DEFAULT_STEP_COUNT: u32 = 1500;

/// Speed the ball loses every second, in metres per second.
pub const BALL_DECELERATION: f32 = 1.5;
/// Seconds a player needs to reach top speed from a standstill.
pub const ACCELERATION_TIME: f32 = 0.4;
/// Kick reach of a player with zero possession, in metres.
pub const KICK_RADIUS_BASE: f32 = 1.0;
/// Largest kick direction error in radians, for zero precision.
pub const MAX_KICK_DEVIATION: f32 = 0.2;

pub const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Lowest and highest y coordinate of the goal mouth.
pub fn goal_posts() -> (f32, f32) {
    let centre = FIELD_HEIGHT / 2.0;
    (centre - GOAL_WIDTH / 2.0, centre + GOAL_WIDTH / 2.0)
}
