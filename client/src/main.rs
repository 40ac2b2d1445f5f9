use clap::Parser;
use client::assets::{AssetFetcher, FileFetcher};
use client::game::ClientEngine;
use client::input::HELP;
use client::network::Client;
use client::presentation::{spawn_stdin_reader, ConsolePresentation};
use log::{info, LevelFilter};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player identifier, must be unique in the room
    #[arg(short, long)]
    name: String,

    /// Frame interval in milliseconds
    #[arg(short, long, default_value = "16")]
    frame_ms: u64,

    /// Directory to load tile and entity assets from
    #[arg(short, long)]
    assets: Option<PathBuf>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Log level, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(level) = args.log_level {
        logger.filter_level(level);
    }
    logger.init();

    info!("Connecting to {} as {}", args.server, args.name);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let fetcher = args.assets.map(|root| {
        info!("Loading assets from {}", root.display());
        Box::new(FileFetcher::new(root)) as Box<dyn AssetFetcher>
    });
    let console = ConsolePresentation::new(args.name.clone(), spawn_stdin_reader(), fetcher);
    println!("{}", HELP);

    let mut client = Client::connect(
        &args.server,
        ClientEngine::new(args.name),
        Box::new(console),
        Duration::from_millis(args.frame_ms),
        Duration::from_millis(args.fake_ping),
    )
    .await?;

    client.run().await?;

    Ok(())
}
