use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use shared::MatchRecord;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Football AI match server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind both listeners to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: IpAddr,
    /// Port AI clients connect to
    #[clap(short, long, default_value = "50030")]
    port: u16,
    /// Port of the JSON control interface
    #[clap(long, default_value = "50031")]
    control_port: u16,
    /// Milliseconds per simulation step
    #[clap(long, default_value = "200")]
    step_interval_ms: u64,
    /// Steps in a full match
    #[clap(long, default_value = "1500")]
    steps: u32,
    /// Consecutive steps without an action before a side forfeits
    #[clap(long, default_value = "50")]
    max_missed_steps: u32,
    /// Directory to store finished matches in as JSON
    #[clap(long)]
    results_dir: Option<PathBuf>,
    /// Seed for kick deviation, for reproducible matches
    #[clap(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let step_interval = Duration::from_millis(self.step_interval_ms);
        ServerConfig {
            game_addr: SocketAddr::new(self.host, self.port),
            control_addr: SocketAddr::new(self.host, self.control_port),
            step_interval,
            step_count: self.steps,
            action_timeout: step_interval,
            max_missed_steps: self.max_missed_steps,
            results_dir: self.results_dir,
            seed: self.seed,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let results_dir = config.results_dir.clone();
    let (server, results) = server::start(config).await?;
    info!(
        "Accepting AI clients on {}, control requests on {}",
        server.game_addr, server.control_addr
    );

    tokio::select! {
        _ = store_results(results, results_dir) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    server.shutdown();
    Ok(())
}

async fn store_results(mut results: mpsc::UnboundedReceiver<MatchRecord>, dir: Option<PathBuf>) {
    while let Some(record) = results.recv().await {
        info!(
            "Match {} finished: {} {} - {} {}",
            record.match_id,
            record.player1,
            record.info.team1_statistics.goals,
            record.info.team2_statistics.goals,
            record.player2
        );

        let Some(dir) = &dir else { continue };
        match server::write_record(dir, &record).await {
            Ok(path) => info!("Stored match {} in {}", record.match_id, path.display()),
            Err(e) => error!("Failed to store match {}: {}", record.match_id, e),
        }
    }
}
