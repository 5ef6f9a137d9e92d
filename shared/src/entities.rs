use crate::vector::Vector;
use crate::{
    ACCELERATION_TIME, FIELD_HEIGHT, FIELD_WIDTH, KICK_RADIUS_BASE, PLAYERS_PER_TEAM,
};
use serde::{Deserialize, Serialize};

/// One side of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    FirstPlayer,
    SecondPlayer,
}

impl Team {
    pub const BOTH: [Team; 2] = [Team::FirstPlayer, Team::SecondPlayer];

    pub fn opponent(self) -> Team {
        match self {
            Team::FirstPlayer => Team::SecondPlayer,
            Team::SecondPlayer => Team::FirstPlayer,
        }
    }

    /// Position of this side in per-team arrays.
    pub fn index(self) -> usize {
        match self {
            Team::FirstPlayer => 0,
            Team::SecondPlayer => 1,
        }
    }

    /// The x coordinate of the goal line this team attacks.
    pub fn attacked_goal_x(self) -> f32 {
        match self {
            Team::FirstPlayer => FIELD_WIDTH,
            Team::SecondPlayer => 0.0,
        }
    }
}

/// Capability parameters declared once per match for a single player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerParameters {
    pub speed: f32,
    pub precision: f32,
    pub possession: f32,
    pub kick_power: f32,
}

impl PlayerParameters {
    pub fn uniform(value: f32) -> Self {
        Self {
            speed: value,
            precision: value,
            possession: value,
            kick_power: value,
        }
    }

    /// Returns the parameters clamped into `[0, 1]` (non-finite values become
    /// zero) and whether anything had to change.
    pub fn sanitized(&self) -> (PlayerParameters, bool) {
        fn fix(value: f32) -> f32 {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }

        let fixed = PlayerParameters {
            speed: fix(self.speed),
            precision: fix(self.precision),
            possession: fix(self.possession),
            kick_power: fix(self.kick_power),
        };
        let changed = fixed.speed.to_bits() != self.speed.to_bits()
            || fixed.precision.to_bits() != self.precision.to_bits()
            || fixed.possession.to_bits() != self.possession.to_bits()
            || fixed.kick_power.to_bits() != self.kick_power.to_bits();
        (fixed, changed)
    }
}

/// One player's submitted intent for a single step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayerAction {
    /// Displacement for this step, in metres.
    pub movement: Vector,
    /// Ball displacement per step the player wants to impart.
    pub kick: Vector,
}

/// Converts a per-step displacement to metres per second.
pub fn speed_of(movement: &Vector, step_ms: f32) -> f32 {
    movement.length() * 1000.0 / step_ms
}

/// Converts metres per second to a per-step displacement length.
pub fn step_length(speed: f32, step_ms: f32) -> f32 {
    speed * step_ms / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FootballPlayer {
    pub index: u8,
    pub parameters: PlayerParameters,
    pub position: Vector,
    pub movement: Vector,
    pub kick: Vector,
}

impl FootballPlayer {
    pub fn new(index: u8, parameters: PlayerParameters, position: Vector) -> Self {
        Self {
            index,
            parameters,
            position,
            movement: Vector::ZERO,
            kick: Vector::ZERO,
        }
    }

    /// Maximum running speed in metres per second.
    pub fn max_speed(&self) -> f32 {
        5.0 + self.parameters.speed * 2.5 / 0.4
    }

    /// Maximum gain of speed, in metres per second squared.
    pub fn max_acceleration(&self) -> f32 {
        self.max_speed() / ACCELERATION_TIME
    }

    /// Maximum speed the player can give the ball, in metres per second.
    pub fn max_kick_speed(&self) -> f32 {
        15.0 + self.parameters.kick_power * 10.0 / 0.4
    }

    /// Distance from the ball within which the player can kick it.
    pub fn kick_radius(&self) -> f32 {
        KICK_RADIUS_BASE + self.parameters.possession * 0.5 / 0.4
    }

    pub fn current_speed(&self, step_ms: f32) -> f32 {
        speed_of(&self.movement, step_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub position: Vector,
    pub movement: Vector,
}

impl Ball {
    pub fn at_kickoff() -> Self {
        Self {
            position: Vector::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0),
            movement: Vector::ZERO,
        }
    }

    pub fn current_speed(&self, step_ms: f32) -> f32 {
        speed_of(&self.movement, step_ms)
    }
}

/// Kickoff positions of the FirstPlayer team, which defends x = 0.
const LEFT_FORMATION: [(f32, f32); PLAYERS_PER_TEAM] = [
    (3.0, 37.5),
    (20.0, 10.0),
    (20.0, 28.0),
    (20.0, 47.0),
    (20.0, 65.0),
    (38.0, 12.0),
    (38.0, 30.0),
    (38.0, 45.0),
    (38.0, 63.0),
    (50.0, 30.0),
    (50.0, 45.0),
];

/// Kickoff position of a player; SecondPlayer mirrors the FirstPlayer formation.
pub fn kickoff_position(team: Team, index: usize) -> Vector {
    let (x, y) = LEFT_FORMATION[index % PLAYERS_PER_TEAM];
    match team {
        Team::FirstPlayer => Vector::new(x, y),
        Team::SecondPlayer => Vector::new(FIELD_WIDTH - x, y),
    }
}
