use crate::entities::Team;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    TooHighSpeed,
    TooHighAcceleration,
    TooStrongKick,
    InvalidMovementVector,
    InvalidKickVector,
    InvalidParameters,
    Disconnection,
    Cancellation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Step during which the ball crossed the goal line.
    pub step: u32,
    pub team: Team,
    /// Index of the scoring player; `None` for an own goal.
    pub scorer: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationError {
    pub step: u32,
    pub reason: ErrorReason,
    pub team: Team,
    pub player: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TeamStatistics {
    pub goals: u32,
    pub shots: u32,
    pub shots_on_target: u32,
}

/// Result of one match. Goals and errors are appended in the order they
/// happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchInfo {
    pub goals: Vec<Goal>,
    pub errors: Vec<SimulationError>,
    pub team1_statistics: TeamStatistics,
    pub team2_statistics: TeamStatistics,
    pub winner: Option<Team>,
}

impl MatchInfo {
    pub fn statistics(&self, team: Team) -> &TeamStatistics {
        match team {
            Team::FirstPlayer => &self.team1_statistics,
            Team::SecondPlayer => &self.team2_statistics,
        }
    }

    pub fn statistics_mut(&mut self, team: Team) -> &mut TeamStatistics {
        match team {
            Team::FirstPlayer => &mut self.team1_statistics,
            Team::SecondPlayer => &mut self.team2_statistics,
        }
    }

    /// Winner by goal count, `None` on a draw.
    pub fn winner_by_score(&self) -> Option<Team> {
        let first = self.team1_statistics.goals;
        let second = self.team2_statistics.goals;
        match first.cmp(&second) {
            std::cmp::Ordering::Greater => Some(Team::FirstPlayer),
            std::cmp::Ordering::Less => Some(Team::SecondPlayer),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn errors_of(&self, team: Team) -> impl Iterator<Item = &SimulationError> {
        self.errors.iter().filter(move |e| e.team == team)
    }
}

/// A finished match as handed to persistence: the result plus who played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: u64,
    pub player1: String,
    pub ai1: String,
    pub player2: String,
    pub ai2: String,
    pub info: MatchInfo,
}

impl MatchRecord {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
