use clap::Parser;
use client::network::{BotError, Client};
use log::info;
use shared::DEFAULT_STEP_INTERVAL_MS;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:50030")]
    server: String,

    /// Player name to log in with
    #[arg(short = 'p', long)]
    player: String,

    /// Name of this AI
    #[arg(short = 'a', long, default_value = "chaser")]
    ai: String,

    /// Step interval of the server in milliseconds
    #[arg(long, default_value_t = DEFAULT_STEP_INTERVAL_MS)]
    step_ms: u64,

    /// Keep playing matches until the server closes the connection
    #[arg(long)]
    repeat: bool,
}

#[tokio::main]
async fn main() -> Result<(), BotError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let mut client =
        Client::connect(&args.server, &args.player, &args.ai, args.step_ms as f32).await?;
    client.login().await?;

    while let Some(outcome) = client.run().await? {
        info!("Match finished, won: {}", outcome.won());
        if !args.repeat {
            break;
        }
    }

    Ok(())
}
