use clap::Parser;
use log::{info, LevelFilter};
use server::game::DefaultGame;
use server::map::MapDescription;
use server::network::Server;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick interval in milliseconds, 0 runs as fast as possible
    #[arg(short, long, default_value = "16")]
    tick_ms: u64,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Text map to load instead of the built-in room
    #[arg(long)]
    map: Option<PathBuf>,

    /// Log level, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = args.log_level {
        logger.filter_level(level);
    }
    logger.init();

    let map = match &args.map {
        Some(path) => {
            info!("Loading map from {}", path.display());
            MapDescription::load(path)?
        }
        None => MapDescription::builtin()?,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        Duration::from_millis(args.tick_ms),
        args.max_clients,
        Box::new(DefaultGame::new(map)),
    )
    .await?;

    server.run().await?;

    Ok(())
}
