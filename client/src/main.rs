use clap::Parser;
use client::commands::{split_address, Command, CommandBus, CommandSender};
use client::config::Cvars;
use client::discovery::ServerDiscovery;
use client::game_view::GameView;
use client::input::NeutralInput;
use client::ui::{ConsoleUi, Ui};
use log::info;
use shared::DEFAULT_SERVER_PORT;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server to join on start-up, as host or host:port
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Port used when an address does not name one
    #[arg(short = 'p', long, default_value_t = DEFAULT_SERVER_PORT)]
    port: u16,

    /// Player name
    #[arg(short = 'n', long, default_value = "Player")]
    name: String,

    /// Browse servers on the local network from start-up
    #[arg(short = 'd', long)]
    discover: bool,

    /// Frames per second of the main loop
    #[arg(long, default_value = "60")]
    fps: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let cvars = Cvars::new(&args.name, args.port)?;

    info!("Starting client as '{}'", cvars.player_name());

    let default_port = cvars.default_port;
    let mut bus = CommandBus::new();
    spawn_console_reader(bus.sender(), default_port);

    let mut view = GameView::new(cvars, ConsoleUi::new(), Box::new(NeutralInput));
    let mut discovery = ServerDiscovery::new();
    let mut browsing = args.discover;

    view.ui_mut().show_main_menu();
    if let Some(server) = args.server {
        let (host, port) = split_address(&server, default_port);
        view.connect(&host, port);
    }

    let mut frame = interval(Duration::from_secs_f64(1.0 / args.fps.max(1) as f64));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = frame.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving");
                view.disconnect();
                break;
            }
        }

        for command in bus.drain() {
            match command {
                Command::ListServers if !view.is_connected() => {
                    if discovery.is_active() {
                        view.ui_mut().update_server_list(discovery.servers());
                    } else {
                        println!("Searching for servers...");
                        browsing = true;
                    }
                }
                command => {
                    if !view.handle_command(command) {
                        return Ok(());
                    }
                }
            }
        }

        // The server browser only runs while no session is active.
        if view.is_connected() || !browsing {
            if discovery.is_active() {
                discovery.deactivate();
            }
        } else {
            if !discovery.is_active() {
                discovery.activate();
            }
            discovery.update(view.ui_mut());
        }

        view.update();
    }

    Ok(())
}

fn spawn_console_reader(sender: CommandSender, default_port: u16) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match Command::parse(&line, default_port) {
                Some(command) => {
                    if sender.send(command).is_err() {
                        break;
                    }
                }
                None if !line.trim().is_empty() => println!("Unknown command: {}", line.trim()),
                None => {}
            }
        }
    });
}
