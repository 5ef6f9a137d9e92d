//! Authoritative football simulation for a single match.
//!
//! [`Simulation`] owns every player, the ball and the [`MatchInfo`] being
//! built. It knows nothing about the network: the match simulator feeds it
//! one batch of actions per side and step, and the same type runs local
//! matches without sockets via [`Simulation::run_local`].

use crate::physics::{decelerate, stopping_distance, validate_action};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    goal_posts, kickoff_position, speed_of, ActionMessage, Ball, BodyState, ErrorReason,
    FootballPlayer, Goal, MatchInfo, ParametersMessage, PlayerAction, SimulationError,
    StateMessage, Team, Vector, BALL_DECELERATION, FIELD_HEIGHT, FIELD_WIDTH,
    MAX_KICK_DEVIATION, PLAYERS_PER_TEAM,
};

#[derive(Debug, Clone)]
pub struct Simulation {
    step_ms: f32,
    step: u32,
    teams: [[FootballPlayer; PLAYERS_PER_TEAM]; 2],
    ball: Ball,
    info: MatchInfo,
    last_kicker: Option<(Team, u8)>,
    /// Team whose last kick was already counted as a shot on target.
    shot_on_target: Option<Team>,
    rng: StdRng,
}

impl Simulation {
    /// Creates a match at kickoff. Out-of-range capability parameters are
    /// clamped and reported as one `InvalidParameters` error per side.
    pub fn new(parameters: [&ParametersMessage; 2], step_ms: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut info = MatchInfo::default();
        let mut teams = [[FootballPlayer::new(0, Default::default(), Vector::ZERO);
            PLAYERS_PER_TEAM]; 2];

        for team in Team::BOTH {
            let mut invalid = false;
            for (i, declared) in parameters[team.index()].players.iter().enumerate() {
                let (sanitized, changed) = declared.sanitized();
                invalid |= changed;
                teams[team.index()][i] =
                    FootballPlayer::new(i as u8, sanitized, kickoff_position(team, i));
            }
            if invalid {
                info.errors.push(SimulationError {
                    step: 0,
                    reason: ErrorReason::InvalidParameters,
                    team,
                    player: None,
                });
            }
        }

        Self {
            step_ms,
            step: 0,
            teams,
            ball: Ball::at_kickoff(),
            info,
            last_kicker: None,
            shot_on_target: None,
            rng,
        }
    }

    /// Index of the next step to be simulated.
    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn info(&self) -> &MatchInfo {
        &self.info
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn player(&self, team: Team, index: usize) -> &FootballPlayer {
        &self.teams[team.index()][index]
    }

    pub fn state(&self) -> StateMessage {
        let mut players = [BodyState::default(); 2 * PLAYERS_PER_TEAM];
        for team in Team::BOTH {
            for (i, player) in self.teams[team.index()].iter().enumerate() {
                players[team.index() * PLAYERS_PER_TEAM + i] = BodyState {
                    position: player.position,
                    movement: player.movement,
                };
            }
        }

        StateMessage {
            step: self.step as i32,
            ball: BodyState {
                position: self.ball.position,
                movement: self.ball.movement,
            },
            players,
        }
    }

    pub fn record_error(&mut self, team: Team, reason: ErrorReason, player: Option<u8>) {
        debug!(
            "Step {}: {:?} for {:?} (player {:?})",
            self.step, reason, team, player
        );
        self.info.errors.push(SimulationError {
            step: self.step,
            reason,
            team,
            player,
        });
    }

    /// Simulates one step. A side without actions stands still this step.
    pub fn advance(&mut self, actions: [Option<&[PlayerAction; PLAYERS_PER_TEAM]>; 2]) {
        for team in Team::BOTH {
            self.apply_actions(team, actions[team.index()]);
        }

        for team in self.teams.iter_mut() {
            for player in team.iter_mut() {
                let moved = player.position + player.movement;
                player.position = Vector::new(
                    moved.x.clamp(0.0, FIELD_WIDTH),
                    moved.y.clamp(0.0, FIELD_HEIGHT),
                );
            }
        }

        self.resolve_kick();
        if let Some(team) = self.move_ball() {
            self.score(team);
        }

        self.step += 1;
    }

    fn apply_actions(&mut self, team: Team, actions: Option<&[PlayerAction; PLAYERS_PER_TEAM]>) {
        let Some(actions) = actions else {
            for player in self.teams[team.index()].iter_mut() {
                player.movement = Vector::ZERO;
                player.kick = Vector::ZERO;
            }
            return;
        };

        for (i, action) in actions.iter().enumerate() {
            let player = &self.teams[team.index()][i];
            let validated = validate_action(player, action, self.step_ms);
            for reason in validated.violations {
                self.record_error(team, reason, Some(i as u8));
            }
            let player = &mut self.teams[team.index()][i];
            player.movement = validated.action.movement;
            player.kick = validated.action.kick;
        }
    }

    /// Lets the kicking player closest to the ball redirect it.
    fn resolve_kick(&mut self) {
        let mut kicker: Option<(Team, usize, f32)> = None;
        for team in Team::BOTH {
            for (i, player) in self.teams[team.index()].iter().enumerate() {
                if player.kick.is_zero() {
                    continue;
                }
                let distance = player.position.distance(&self.ball.position);
                if distance > player.kick_radius() {
                    continue;
                }
                if kicker.map_or(true, |(_, _, best)| distance < best) {
                    kicker = Some((team, i, distance));
                }
            }
        }

        let Some((team, index, _)) = kicker else {
            return;
        };

        let player = self.teams[team.index()][index];
        let deviation =
            MAX_KICK_DEVIATION * (1.0 - (player.parameters.precision / 0.4).min(1.0));
        let angle = if deviation > 0.0 {
            self.rng.gen_range(-deviation..=deviation)
        } else {
            0.0
        };

        self.ball.movement = player.kick.rotate(angle);
        self.last_kicker = Some((team, index as u8));
        self.count_shot(team);
    }

    /// Counts the kick as a shot if the ball would reach the goal line
    /// before stopping.
    fn count_shot(&mut self, team: Team) {
        self.shot_on_target = None;

        let goal_x = team.attacked_goal_x();
        let movement = self.ball.movement;
        let to_line = goal_x - self.ball.position.x;
        if movement.x == 0.0 || to_line * movement.x <= 0.0 {
            return;
        }

        let steps_to_line = to_line / movement.x;
        let path = movement.length() * steps_to_line;
        let reach = stopping_distance(speed_of(&movement, self.step_ms), BALL_DECELERATION);
        if path > reach {
            return;
        }

        let crossing_y = self.ball.position.y + movement.y * steps_to_line;
        let (low, high) = goal_posts();
        let stats = self.info.statistics_mut(team);
        stats.shots += 1;
        if (low..=high).contains(&crossing_y) {
            stats.shots_on_target += 1;
            self.shot_on_target = Some(team);
        }
    }

    /// Moves the ball, bouncing it off the lines. Returns the scoring team
    /// when it crossed a goal line between the posts.
    fn move_ball(&mut self) -> Option<Team> {
        let start = self.ball.position;
        let movement = self.ball.movement;
        let mut end = start + movement;
        let mut bounced = movement;
        let (low, high) = goal_posts();

        for (line, scorer) in [
            (FIELD_WIDTH, Team::FirstPlayer),
            (0.0, Team::SecondPlayer),
        ] {
            let crossed = if line == 0.0 { end.x < 0.0 } else { end.x > line };
            if !crossed {
                continue;
            }
            let t = (line - start.x) / movement.x;
            let crossing_y = start.y + movement.y * t;
            if (low..=high).contains(&crossing_y) {
                self.ball.position = Vector::new(line, crossing_y);
                self.ball.movement = Vector::ZERO;
                return Some(scorer);
            }
            end.x = 2.0 * line - end.x;
            bounced.x = -bounced.x;
        }

        if end.y < 0.0 {
            end.y = -end.y;
            bounced.y = -bounced.y;
        } else if end.y > FIELD_HEIGHT {
            end.y = 2.0 * FIELD_HEIGHT - end.y;
            bounced.y = -bounced.y;
        }

        self.ball.position = Vector::new(
            end.x.clamp(0.0, FIELD_WIDTH),
            end.y.clamp(0.0, FIELD_HEIGHT),
        );
        self.ball.movement = decelerate(bounced, BALL_DECELERATION, self.step_ms);
        None
    }

    fn score(&mut self, team: Team) {
        let scorer = match self.last_kicker {
            Some((kicker_team, index)) if kicker_team == team => Some(index),
            _ => None,
        };
        debug!("Step {}: goal for {:?} by {:?}", self.step, team, scorer);

        self.info.goals.push(Goal {
            step: self.step,
            team,
            scorer,
        });

        let counted = self.shot_on_target == Some(team);
        let stats = self.info.statistics_mut(team);
        stats.goals += 1;
        if !counted {
            stats.shots += 1;
            stats.shots_on_target += 1;
        }

        self.reset_to_kickoff();
    }

    fn reset_to_kickoff(&mut self) {
        for team in Team::BOTH {
            for (i, player) in self.teams[team.index()].iter_mut().enumerate() {
                player.position = kickoff_position(team, i);
                player.movement = Vector::ZERO;
                player.kick = Vector::ZERO;
            }
        }
        self.ball = Ball::at_kickoff();
        self.last_kicker = None;
        self.shot_on_target = None;
    }

    /// Ends the match. A walkover winner overrides the score.
    pub fn finish(mut self, walkover_winner: Option<Team>) -> MatchInfo {
        self.info.winner = walkover_winner.or_else(|| self.info.winner_by_score());
        self.info
    }

    /// Runs a whole match in-process, asking `decide` for each side's
    /// actions before every step.
    pub fn run_local<F>(mut self, step_count: u32, mut decide: F) -> MatchInfo
    where
        F: FnMut(Team, &StateMessage) -> ActionMessage,
    {
        while self.step < step_count {
            let state = self.state();
            let first = decide(Team::FirstPlayer, &state);
            let second = decide(Team::SecondPlayer, &state);
            self.advance([Some(&first.actions), Some(&second.actions)]);
        }
        self.finish(None)
    }
}
