use shared::{DEFAULT_STEP_COUNT, DEFAULT_STEP_INTERVAL_MS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings of the match server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address AI clients connect to.
    pub game_addr: SocketAddr,
    /// Address of the request/response control interface.
    pub control_addr: SocketAddr,
    /// Wall-clock length of one simulation step.
    pub step_interval: Duration,
    /// Number of steps in a full match.
    pub step_count: u32,
    /// How long a client may take to log in after connecting.
    pub login_timeout: Duration,
    /// How long each side may take to send its parameters.
    pub parameters_timeout: Duration,
    /// How long to wait for each side's action every step.
    pub action_timeout: Duration,
    /// Consecutive steps without a valid action before a side forfeits.
    pub max_missed_steps: u32,
    /// Directory receiving one JSON record per finished match.
    pub results_dir: Option<PathBuf>,
    /// Seed for kick deviation, for reproducible matches.
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let step_interval = Duration::from_millis(DEFAULT_STEP_INTERVAL_MS);
        Self {
            game_addr: SocketAddr::from(([127, 0, 0, 1], 50030)),
            control_addr: SocketAddr::from(([127, 0, 0, 1], 50031)),
            step_interval,
            step_count: DEFAULT_STEP_COUNT,
            login_timeout: Duration::from_secs(5),
            parameters_timeout: Duration::from_secs(5),
            action_timeout: step_interval,
            max_missed_steps: 50,
            results_dir: None,
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Step interval in milliseconds, as used by the physics formulas.
    pub fn step_ms(&self) -> f32 {
        self.step_interval.as_secs_f32() * 1000.0
    }
}
