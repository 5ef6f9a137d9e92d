//! Network side of a running match.
//!
//! A [`MatchSimulator`] drives two logged-in connections through
//! `Handshake -> ParameterExchange -> Running -> Completed | Cancelled`,
//! feeding their actions into a [`Simulation`] once per tick. It runs on its
//! own task and is the only code that touches the match state; the rest of
//! the server talks to it through the shared [`MatchHandle`].

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionKey, Inbound};
use crate::game::Simulation;
use log::{debug, info, warn};
use shared::{
    ActionMessage, ErrorReason, MatchInfo, MatchRecord, Message, ParametersMessage,
    SimulationError, Team,
};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep_until, timeout_at, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Handshake,
    ParameterExchange,
    Running,
    Completed,
    Cancelled,
}

/// State of a match visible outside its task: who plays, how far it got,
/// and the per-side cancel flags.
#[derive(Debug)]
pub struct MatchHandle {
    id: u64,
    players: [ConnectionKey; 2],
    cancel: [AtomicBool; 2],
    wake: Notify,
    current_step: AtomicI32,
}

impl MatchHandle {
    pub fn new(id: u64, players: [ConnectionKey; 2]) -> Self {
        Self {
            id,
            players,
            cancel: [AtomicBool::new(false), AtomicBool::new(false)],
            wake: Notify::new(),
            current_step: AtomicI32::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn player(&self, team: Team) -> &ConnectionKey {
        &self.players[team.index()]
    }

    /// Side the named player controls in this match, if any.
    pub fn side_of(&self, player_name: &str) -> Option<Team> {
        Team::BOTH
            .into_iter()
            .find(|team| self.players[team.index()].player_name == player_name)
    }

    /// Flags the side as cancelling. Returns false if it already was.
    pub fn request_cancel(&self, team: Team) -> bool {
        let newly_set = !self.cancel[team.index()].swap(true, Ordering::SeqCst);
        if newly_set {
            self.wake.notify_waiters();
        }
        newly_set
    }

    pub fn cancel_requested(&self, team: Team) -> bool {
        self.cancel[team.index()].load(Ordering::SeqCst)
    }

    fn any_cancel_requested(&self) -> bool {
        Team::BOTH.into_iter().any(|team| self.cancel_requested(team))
    }

    /// Completes once either side has asked to cancel.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.any_cancel_requested() {
                return;
            }
            notified.await;
        }
    }

    pub fn current_step(&self) -> i32 {
        self.current_step.load(Ordering::SeqCst)
    }

    fn set_current_step(&self, step: u32) {
        self.current_step.store(step as i32, Ordering::SeqCst);
    }
}

/// Why a side did not deliver what the match waited for.
#[derive(Debug, Clone, PartialEq)]
enum Fault {
    TimedOut,
    Closed,
    Malformed,
    StepMismatch,
    /// The wait was interrupted by a cancel request; not the side's fault.
    Cancelled,
}

pub struct MatchSimulator {
    handle: Arc<MatchHandle>,
    connections: [Arc<Connection>; 2],
    config: ServerConfig,
    phase: MatchPhase,
}

impl MatchSimulator {
    /// Binds the first connection as `FirstPlayer` and the second as
    /// `SecondPlayer`. Both must already be claimed for this match.
    pub fn new(
        handle: Arc<MatchHandle>,
        connections: [Arc<Connection>; 2],
        config: ServerConfig,
    ) -> Self {
        Self {
            handle,
            connections,
            config,
            phase: MatchPhase::Handshake,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    fn connection(&self, team: Team) -> &Connection {
        &self.connections[team.index()]
    }

    /// Plays the match to the end and returns its record. Both connections
    /// are released and told the result before this returns.
    pub async fn run(mut self) -> MatchRecord {
        info!(
            "Match {}: {} vs {}",
            self.handle.id(),
            self.handle.player(Team::FirstPlayer),
            self.handle.player(Team::SecondPlayer)
        );
        for connection in &self.connections {
            let dropped = connection.discard_pending().await;
            if dropped > 0 {
                debug!("Discarded {} frames queued by {}", dropped, connection.key());
            }
        }

        self.phase = MatchPhase::ParameterExchange;
        let info = match self.exchange_parameters().await {
            Ok(parameters) => {
                self.phase = MatchPhase::Running;
                self.play(parameters).await
            }
            Err(info) => {
                self.phase = MatchPhase::Cancelled;
                info
            }
        };

        for connection in &self.connections {
            connection.send(Message::MatchOver { winner: info.winner });
            connection.release();
        }

        info!(
            "Match {} {:?} after step {}: {}-{}, winner {:?}",
            self.handle.id(),
            self.phase,
            self.handle.current_step(),
            info.team1_statistics.goals,
            info.team2_statistics.goals,
            info.winner
        );

        let first = self.handle.player(Team::FirstPlayer).clone();
        let second = self.handle.player(Team::SecondPlayer).clone();
        MatchRecord {
            match_id: self.handle.id(),
            player1: first.player_name,
            ai1: first.ai_name,
            player2: second.player_name,
            ai2: second.ai_name,
            info,
        }
    }

    /// Asks both sides for their parameters. On failure returns the final
    /// info of the aborted match instead.
    async fn exchange_parameters(&self) -> Result<[ParametersMessage; 2], MatchInfo> {
        for team in Team::BOTH {
            self.connection(team)
                .send(Message::ParametersRequest { side: team });
        }

        let deadline = Instant::now() + self.config.parameters_timeout;
        let (first, second) = tokio::join!(
            self.receive_parameters(Team::FirstPlayer, deadline),
            self.receive_parameters(Team::SecondPlayer, deadline)
        );

        let (first, second) = match (first, second) {
            (Ok(first), Ok(second)) => return Ok([first, second]),
            results => results,
        };

        let mut info = MatchInfo::default();
        let cancelled = self.handle.any_cancel_requested();
        let cancelling: Vec<Team> = Team::BOTH
            .into_iter()
            .filter(|team| self.handle.cancel_requested(*team))
            .collect();
        let at_fault = if !cancelled {
            let mut failed = Vec::new();
            for (team, result) in [(Team::FirstPlayer, first), (Team::SecondPlayer, second)] {
                let Err(fault) = result else { continue };
                warn!(
                    "Match {}: no parameters from {} ({:?})",
                    self.handle.id(),
                    self.handle.player(team),
                    fault
                );
                failed.push(team);
            }
            failed
        } else {
            cancelling
        };

        let reason = if cancelled {
            ErrorReason::Cancellation
        } else {
            ErrorReason::Disconnection
        };
        for team in &at_fault {
            info.errors.push(SimulationError {
                step: 0,
                reason,
                team: *team,
                player: None,
            });
        }
        info.winner = sole_opponent(&at_fault);
        Err(info)
    }

    async fn receive_parameters(
        &self,
        team: Team,
        deadline: Instant,
    ) -> Result<ParametersMessage, Fault> {
        loop {
            match self.next_inbound(team, deadline).await? {
                Inbound::Message(Message::Parameters(parameters)) => return Ok(parameters),
                Inbound::Message(other) => {
                    debug!("Ignoring {:?} frame while waiting for parameters", other.kind());
                }
                Inbound::Malformed(_) => return Err(Fault::Malformed),
            }
        }
    }

    async fn receive_action(
        &self,
        team: Team,
        step: i32,
        deadline: Instant,
    ) -> Result<ActionMessage, Fault> {
        loop {
            match self.next_inbound(team, deadline).await? {
                Inbound::Message(Message::Action(action)) if action.step == step => {
                    return Ok(action)
                }
                Inbound::Message(Message::Action(action)) if action.step < step => {
                    debug!("Skipping stale action for step {}", action.step);
                }
                Inbound::Message(Message::Action(action)) => {
                    debug!("Action for step {} while expecting {}", action.step, step);
                    return Err(Fault::StepMismatch);
                }
                Inbound::Message(other) => {
                    debug!("Ignoring {:?} frame during play", other.kind());
                }
                Inbound::Malformed(_) => return Err(Fault::Malformed),
            }
        }
    }

    /// Next frame from the side, bounded by the deadline and interrupted by
    /// a cancel request.
    async fn next_inbound(&self, team: Team, deadline: Instant) -> Result<Inbound, Fault> {
        tokio::select! {
            biased;
            _ = self.handle.cancelled() => Err(Fault::Cancelled),
            received = timeout_at(deadline, self.connection(team).recv()) => match received {
                Err(_) => Err(Fault::TimedOut),
                Ok(None) => Err(Fault::Closed),
                Ok(Some(inbound)) => Ok(inbound),
            },
        }
    }

    async fn play(&mut self, parameters: [ParametersMessage; 2]) -> MatchInfo {
        let mut simulation = Simulation::new(
            [&parameters[0], &parameters[1]],
            self.config.step_ms(),
            self.config.seed,
        );
        let mut missed = [0u32; 2];
        let mut walkover = None;

        while simulation.step() < self.config.step_count {
            let tick_start = Instant::now();

            let cancelling: Vec<Team> = Team::BOTH
                .into_iter()
                .filter(|team| self.handle.cancel_requested(*team))
                .collect();
            if !cancelling.is_empty() {
                for team in &cancelling {
                    info!(
                        "Match {}: cancelled by {}",
                        self.handle.id(),
                        self.handle.player(*team)
                    );
                    simulation.record_error(*team, ErrorReason::Cancellation, None);
                }
                walkover = sole_opponent(&cancelling);
                self.phase = MatchPhase::Cancelled;
                break;
            }

            let state = simulation.state();
            for connection in &self.connections {
                connection.send(Message::State(state));
            }

            let deadline = tick_start + self.config.action_timeout;
            let (first, second) = tokio::join!(
                self.receive_action(Team::FirstPlayer, state.step, deadline),
                self.receive_action(Team::SecondPlayer, state.step, deadline)
            );
            if matches!(first, Err(Fault::Cancelled)) || matches!(second, Err(Fault::Cancelled)) {
                continue;
            }

            let mut actions = [None, None];
            for (team, result) in [(Team::FirstPlayer, first), (Team::SecondPlayer, second)] {
                match result {
                    Ok(action) => {
                        missed[team.index()] = 0;
                        actions[team.index()] = Some(action.actions);
                    }
                    Err(fault) => {
                        debug!(
                            "Match {} step {}: no action from {} ({:?})",
                            self.handle.id(),
                            state.step,
                            self.handle.player(team),
                            fault
                        );
                        missed[team.index()] += 1;
                        simulation.record_error(team, ErrorReason::Disconnection, None);
                    }
                }
            }

            simulation.advance([actions[0].as_ref(), actions[1].as_ref()]);
            self.handle.set_current_step(simulation.step());

            let forfeiting: Vec<Team> = Team::BOTH
                .into_iter()
                .filter(|team| {
                    !self.connection(*team).is_open()
                        || missed[team.index()] >= self.config.max_missed_steps
                })
                .collect();
            if !forfeiting.is_empty() {
                for team in &forfeiting {
                    warn!(
                        "Match {}: {} forfeits at step {}",
                        self.handle.id(),
                        self.handle.player(*team),
                        simulation.step()
                    );
                }
                walkover = sole_opponent(&forfeiting);
                self.phase = MatchPhase::Cancelled;
                break;
            }

            sleep_until(tick_start + self.config.step_interval).await;
        }

        if self.phase == MatchPhase::Running {
            self.phase = MatchPhase::Completed;
        }
        simulation.finish(walkover)
    }
}

/// The winner by walkover when exactly one side is at fault.
fn sole_opponent(at_fault: &[Team]) -> Option<Team> {
    match at_fault {
        [team] => Some(team.opponent()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::transport::{read_message, write_message};
    use shared::{step_length, PlayerParameters, Vector, PLAYERS_PER_TEAM};
    use std::time::Duration;
    use tokio::io::{split, DuplexStream};
    use tokio::task::JoinHandle;

    #[derive(Clone, Copy)]
    enum Script {
        /// Answers every request with idle actions.
        Idle,
        /// Sends parameters, then disconnects.
        LeaveAfterParameters,
        /// Sends parameters, then never acts.
        Silent,
        /// Never answers the parameters request.
        NoParameters,
        /// Moves player 0 at 50 m/s on the first step.
        Sprint,
    }

    fn test_config(step_count: u32) -> ServerConfig {
        ServerConfig {
            step_interval: Duration::from_millis(2),
            step_count,
            parameters_timeout: Duration::from_millis(300),
            action_timeout: Duration::from_millis(300),
            max_missed_steps: 3,
            seed: Some(3),
            ..ServerConfig::default()
        }
    }

    fn bind(id: u64, player: &str) -> (Arc<Connection>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = split(server_side);
        let connection = Connection::attach(id, ConnectionKey::new(player, "bot"), reader, writer);
        assert!(connection.claim_for_match());
        (connection, client_side)
    }

    /// Plays the scripted client; returns the winner announced by MatchOver.
    fn spawn_client(mut stream: DuplexStream, script: Script) -> JoinHandle<Option<Option<Team>>> {
        tokio::spawn(async move {
            while let Ok(Some(message)) = read_message(&mut stream).await {
                match message {
                    Message::ParametersRequest { .. } => {
                        if matches!(script, Script::NoParameters) {
                            continue;
                        }
                        let parameters = ParametersMessage {
                            players: [PlayerParameters::uniform(0.4); PLAYERS_PER_TEAM],
                        };
                        write_message(&mut stream, &Message::Parameters(parameters))
                            .await
                            .unwrap();
                        if matches!(script, Script::LeaveAfterParameters) {
                            return None;
                        }
                    }
                    Message::State(state) => {
                        if matches!(script, Script::Silent) {
                            continue;
                        }
                        let mut action = ActionMessage {
                            step: state.step,
                            ..ActionMessage::default()
                        };
                        if matches!(script, Script::Sprint) && state.step == 0 {
                            action.actions[0].movement =
                                Vector::new(step_length(50.0, 2.0), 0.0);
                        }
                        let _ = write_message(&mut stream, &Message::Action(action)).await;
                    }
                    Message::MatchOver { winner } => return Some(winner),
                    _ => {}
                }
            }
            None
        })
    }

    async fn play(
        scripts: [Script; 2],
        config: ServerConfig,
    ) -> (MatchRecord, [Option<Option<Team>>; 2], Arc<MatchHandle>) {
        let (first, first_stream) = bind(1, "alice");
        let (second, second_stream) = bind(2, "bob");
        let first_client = spawn_client(first_stream, scripts[0]);
        let second_client = spawn_client(second_stream, scripts[1]);

        let handle = Arc::new(MatchHandle::new(
            7,
            [first.key().clone(), second.key().clone()],
        ));
        let simulator =
            MatchSimulator::new(Arc::clone(&handle), [first.clone(), second.clone()], config);
        let record = tokio::time::timeout(Duration::from_secs(10), simulator.run())
            .await
            .unwrap();

        assert!(!first.is_in_match());
        assert!(!second.is_in_match());
        let outcomes = [first_client.await.unwrap(), second_client.await.unwrap()];
        (record, outcomes, handle)
    }

    #[tokio::test]
    async fn test_full_idle_match() {
        let (record, outcomes, handle) = play([Script::Idle, Script::Idle], test_config(20)).await;

        assert_eq!(record.match_id, 7);
        assert_eq!(record.player1, "alice");
        assert_eq!(record.ai2, "bot");
        assert!(record.info.errors.is_empty(), "{:?}", record.info.errors);
        assert!(record.info.goals.is_empty());
        assert_eq!(record.info.winner, None);
        assert_eq!(handle.current_step(), 20);
        assert_eq!(outcomes, [Some(None), Some(None)]);
    }

    #[tokio::test]
    async fn test_disconnect_during_play_is_walkover() {
        let (record, outcomes, _) =
            play([Script::Idle, Script::LeaveAfterParameters], test_config(50)).await;

        assert_eq!(record.info.winner, Some(Team::FirstPlayer));
        let errors: Vec<_> = record.info.errors_of(Team::SecondPlayer).collect();
        assert!(!errors.is_empty());
        assert!(errors.iter().all(|e| e.reason == ErrorReason::Disconnection));
        assert_eq!(record.info.errors_of(Team::FirstPlayer).count(), 0);
        assert_eq!(outcomes[0], Some(Some(Team::FirstPlayer)));
    }

    #[tokio::test]
    async fn test_missing_parameters_is_walkover() {
        let (record, outcomes, handle) =
            play([Script::NoParameters, Script::Idle], test_config(50)).await;

        assert_eq!(record.info.winner, Some(Team::SecondPlayer));
        assert_eq!(record.info.errors.len(), 1);
        assert_eq!(record.info.errors[0].reason, ErrorReason::Disconnection);
        assert_eq!(record.info.errors[0].team, Team::FirstPlayer);
        assert_eq!(handle.current_step(), 0);
        assert_eq!(outcomes[1], Some(Some(Team::SecondPlayer)));
    }

    #[tokio::test]
    async fn test_silent_side_forfeits_after_missed_steps() {
        let mut config = test_config(50);
        config.action_timeout = Duration::from_millis(20);
        let (record, _, handle) = play([Script::Silent, Script::Idle], config).await;

        assert_eq!(record.info.winner, Some(Team::SecondPlayer));
        assert_eq!(record.info.errors_of(Team::FirstPlayer).count(), 3);
        assert_eq!(handle.current_step(), 3);
    }

    #[tokio::test]
    async fn test_speed_violation_recorded() {
        let (record, _, _) = play([Script::Sprint, Script::Idle], test_config(5)).await;

        assert_eq!(record.info.errors.len(), 1);
        let error = record.info.errors[0];
        assert_eq!(error.reason, ErrorReason::TooHighSpeed);
        assert_eq!(error.team, Team::FirstPlayer);
        assert_eq!(error.player, Some(0));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_match() {
        let (first, first_stream) = bind(1, "alice");
        let (second, second_stream) = bind(2, "bob");
        let _first_client = spawn_client(first_stream, Script::Idle);
        let _second_client = spawn_client(second_stream, Script::Idle);

        let mut config = test_config(100_000);
        config.step_interval = Duration::from_millis(5);
        let handle = Arc::new(MatchHandle::new(1, [first.key().clone(), second.key().clone()]));
        let task = tokio::spawn(
            MatchSimulator::new(Arc::clone(&handle), [first, second], config).run(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.request_cancel(Team::SecondPlayer));
        assert!(!handle.request_cancel(Team::SecondPlayer));

        let record = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.info.winner, Some(Team::FirstPlayer));
        let cancellations: Vec<_> = record
            .info
            .errors
            .iter()
            .filter(|e| e.reason == ErrorReason::Cancellation)
            .collect();
        assert_eq!(cancellations.len(), 1);
        assert_eq!(cancellations[0].team, Team::SecondPlayer);
        assert!(handle.current_step() > 0);
    }

    #[tokio::test]
    async fn test_current_step_is_monotonic() {
        let (first, first_stream) = bind(1, "alice");
        let (second, second_stream) = bind(2, "bob");
        let _first_client = spawn_client(first_stream, Script::Idle);
        let _second_client = spawn_client(second_stream, Script::Idle);

        let handle = Arc::new(MatchHandle::new(1, [first.key().clone(), second.key().clone()]));
        let task = tokio::spawn(
            MatchSimulator::new(Arc::clone(&handle), [first, second], test_config(40)).run(),
        );

        let mut last = 0;
        while !task.is_finished() {
            let step = handle.current_step();
            assert!(step >= last);
            last = step;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        task.await.unwrap();
        assert!(handle.current_step() >= last);
        assert_eq!(handle.current_step(), 40);
    }

    #[test]
    fn test_handle_sides() {
        let handle = MatchHandle::new(
            3,
            [ConnectionKey::new("alice", "a"), ConnectionKey::new("bob", "b")],
        );
        assert_eq!(handle.side_of("alice"), Some(Team::FirstPlayer));
        assert_eq!(handle.side_of("bob"), Some(Team::SecondPlayer));
        assert_eq!(handle.side_of("carol"), None);
        assert!(!handle.cancel_requested(Team::FirstPlayer));
        assert_eq!(handle.current_step(), 0);
    }
}
