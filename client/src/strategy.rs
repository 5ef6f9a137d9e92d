//! Chase-and-shoot decision making of the reference bot.

use shared::{
    speed_of, step_length, ActionMessage, FootballPlayer, ParametersMessage, PlayerAction,
    PlayerParameters, StateMessage, Team, Vector, FIELD_HEIGHT, PLAYERS_PER_TEAM,
};

/// Share of each physical limit the bot uses, to stay clear of rounding.
const SAFETY: f32 = 0.95;

pub struct Strategy {
    step_ms: f32,
    parameters: PlayerParameters,
}

impl Strategy {
    pub fn new(step_ms: f32) -> Self {
        Self {
            step_ms,
            parameters: PlayerParameters::uniform(0.4),
        }
    }

    pub fn parameters(&self) -> ParametersMessage {
        ParametersMessage {
            players: [self.parameters; PLAYERS_PER_TEAM],
        }
    }

    /// Picks this step's actions for `side`. The player nearest to the ball
    /// runs at it and shoots at the opponent goal once in reach; everyone
    /// else stands still.
    pub fn decide(&self, side: Team, state: &StateMessage) -> ActionMessage {
        let mut action = ActionMessage {
            step: state.step,
            ..ActionMessage::default()
        };

        let offset = side.index() * PLAYERS_PER_TEAM;
        let ours = &state.players[offset..offset + PLAYERS_PER_TEAM];
        let ball = state.ball.position;

        let Some((chaser, body)) = ours.iter().enumerate().min_by(|(_, a), (_, b)| {
            a.position
                .distance(&ball)
                .total_cmp(&b.position.distance(&ball))
        }) else {
            return action;
        };

        let mut player = FootballPlayer::new(chaser as u8, self.parameters, body.position);
        player.movement = body.movement;

        let movement = self.run_towards(&player, ball);
        let reach = player.kick_radius() * SAFETY;
        let in_reach = (player.position + movement).distance(&ball) <= reach;
        let kick = if in_reach {
            self.shot(&player, ball, side)
        } else {
            Vector::ZERO
        };

        action.actions[chaser] = PlayerAction { movement, kick };
        action
    }

    /// Movement towards `target` that respects both the speed and the
    /// acceleration limit and does not overshoot.
    fn run_towards(&self, player: &FootballPlayer, target: Vector) -> Vector {
        let offset = target - player.position;
        let distance = offset.length();
        if distance < 0.01 {
            return Vector::ZERO;
        }

        let previous = speed_of(&player.movement, self.step_ms);
        let max_gain = player.max_acceleration() * self.step_ms / 1000.0;
        let speed = (previous + max_gain * SAFETY).min(player.max_speed() * SAFETY);
        let length = step_length(speed, self.step_ms).min(distance);
        offset.with_length(length)
    }

    fn shot(&self, player: &FootballPlayer, ball: Vector, side: Team) -> Vector {
        let goal = Vector::new(side.attacked_goal_x(), FIELD_HEIGHT / 2.0);
        let speed = player.max_kick_speed() * SAFETY;
        (goal - ball).with_length(step_length(speed, self.step_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{kickoff_position, BodyState, FIELD_WIDTH};

    const STEP_MS: f32 = 200.0;

    fn kickoff_state() -> StateMessage {
        let mut players = [BodyState::default(); 2 * PLAYERS_PER_TEAM];
        for team in Team::BOTH {
            for i in 0..PLAYERS_PER_TEAM {
                players[team.index() * PLAYERS_PER_TEAM + i].position = kickoff_position(team, i);
            }
        }
        StateMessage {
            step: 17,
            ball: BodyState {
                position: Vector::new(FIELD_WIDTH / 2.0, FIELD_HEIGHT / 2.0),
                movement: Vector::ZERO,
            },
            players,
        }
    }

    fn moving_players(action: &ActionMessage) -> Vec<usize> {
        action
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.movement.is_zero())
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_only_nearest_player_moves() {
        let strategy = Strategy::new(STEP_MS);
        let action = strategy.decide(Team::FirstPlayer, &kickoff_state());

        assert_eq!(action.step, 17);
        let moving = moving_players(&action);
        assert_eq!(moving.len(), 1);
        let target = action.actions[moving[0]].movement;
        assert!(target.x > 0.0);
    }

    #[test]
    fn test_first_stride_respects_acceleration() {
        let strategy = Strategy::new(STEP_MS);
        let action = strategy.decide(Team::SecondPlayer, &kickoff_state());
        let moving = moving_players(&action);
        let stride = action.actions[moving[0]].movement;

        let player = FootballPlayer::new(0, PlayerParameters::uniform(0.4), Vector::ZERO);
        let max_gain = player.max_acceleration() * STEP_MS / 1000.0;
        assert_approx_eq!(speed_of(&stride, STEP_MS), max_gain * SAFETY, 1e-4);
        // SecondPlayer runs towards the centre, i.e. to lower x
        assert!(stride.x < 0.0);
    }

    #[test]
    fn test_shoots_at_opponent_goal_when_in_reach() {
        let strategy = Strategy::new(STEP_MS);
        let mut state = kickoff_state();
        state.ball.position = state.players[9].position + Vector::new(0.5, 0.0);

        let action = strategy.decide(Team::FirstPlayer, &state);
        let kick = action.actions[9].kick;
        assert!(kick.x > 0.0);

        let player = FootballPlayer::new(9, PlayerParameters::uniform(0.4), Vector::ZERO);
        assert!(speed_of(&kick, STEP_MS) <= player.max_kick_speed());
    }

    #[test]
    fn test_top_speed_is_capped() {
        let strategy = Strategy::new(STEP_MS);
        let mut state = kickoff_state();
        state.ball.position = Vector::new(5.0, 5.0);
        let player = FootballPlayer::new(0, PlayerParameters::uniform(0.4), Vector::ZERO);
        // already running at top speed
        state.players[1].movement = Vector::new(-1.0, 0.0).with_length(step_length(
            player.max_speed(),
            STEP_MS,
        ));

        let action = strategy.decide(Team::FirstPlayer, &state);
        let speed = speed_of(&action.actions[1].movement, STEP_MS);
        assert!(speed <= player.max_speed());
        assert!(speed > 0.0);
    }
}
