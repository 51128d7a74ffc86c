use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use shared::{DEFAULT_SERVER_PORT, MAX_PLAYERS};
use std::time::Duration;

/// Main-method of the dedicated server.
/// Parses command-line arguments, then runs the server until it is interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
        /// Name shown in the server browser
        #[clap(short, long, default_value = "Orbs Havoc")]
        name: String,
        /// Maximum number of connected players
        #[clap(short, long, default_value_t = MAX_PLAYERS)]
        max_clients: usize,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "60")]
        tick_rate: u32,
        /// Do not announce the server on the local network
        #[clap(long)]
        no_discovery: bool,
    }

    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        name: shared::truncate_utf8(args.name.trim(), shared::SERVER_NAME_LENGTH).to_string(),
        tick_duration: Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64),
        max_clients: args.max_clients.max(1),
        announce: !args.no_discovery,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing sessions");
            shutdown.shutdown();
        }
    });

    server.run().await
}
