//! Presentation seam between the network layer and whatever draws the game.

use log::debug;

use crate::discovery::ServerInfo;
use crate::session::GameSession;

/// Everything the game view needs from the user interface.
pub trait Ui {
    fn show_error_dialog(&mut self, title: &str, message: &str);

    /// Asks a yes/no question; `true` means the user agreed.
    fn confirm(&mut self, question: &str) -> bool;

    fn show_main_menu(&mut self);

    /// Hides the HUD, scoreboard, chat and overlays of a running session.
    fn hide_session_views(&mut self);

    fn set_loading_overlay(&mut self, visible: bool);

    fn set_waiting_overlay(&mut self, lagging: bool, time_to_drop_ms: u64);

    fn update_hud(&mut self, session: &GameSession);

    fn update_scoreboard(&mut self, session: &GameSession);

    fn append_event(&mut self, line: &str);

    fn clear_event_log(&mut self);

    fn update_server_list(&mut self, servers: &[ServerInfo]);

    fn is_focused(&self) -> bool;
}

/// Text front-end used by the client binary.
#[derive(Default)]
pub struct ConsoleUi {
    lagging: bool,
    loading: bool,
    health: Option<u8>,
    scoreboard: Vec<(String, u16, u16)>,
}

impl ConsoleUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Ui for ConsoleUi {
    fn show_error_dialog(&mut self, title: &str, message: &str) {
        println!("[{}] {}", title, message);
    }

    // Stdin belongs to the command reader; a typed command is its own confirmation.
    fn confirm(&mut self, question: &str) -> bool {
        println!("{} yes", question);
        true
    }

    fn show_main_menu(&mut self) {
        println!("Commands: /connect <host[:port]>, /servers, /name <name>, /disconnect, /quit");
    }

    fn hide_session_views(&mut self) {
        self.lagging = false;
        self.loading = false;
        self.health = None;
        self.scoreboard.clear();
    }

    fn set_loading_overlay(&mut self, visible: bool) {
        if visible && !self.loading {
            println!("Loading...");
        }
        self.loading = visible;
    }

    fn set_waiting_overlay(&mut self, lagging: bool, time_to_drop_ms: u64) {
        if lagging && !self.lagging {
            println!(
                "Waiting for server... dropping in {:.1}s",
                time_to_drop_ms as f64 / 1000.0
            );
        } else if !lagging && self.lagging {
            println!("Connection recovered");
        }
        self.lagging = lagging;
    }

    fn update_hud(&mut self, session: &GameSession) {
        let health = session.local_entity().map(|entity| entity.health);
        if health != self.health {
            match health {
                Some(health) => debug!("Health: {}", health),
                None => println!("Waiting to respawn..."),
            }
            self.health = health;
        }
    }

    fn update_scoreboard(&mut self, session: &GameSession) {
        let scoreboard: Vec<_> = session
            .players()
            .map(|p| (p.name.clone(), p.kills, p.deaths))
            .collect();
        if scoreboard == self.scoreboard {
            return;
        }

        println!("{:<32} {:>5} {:>6}", "Player", "Kills", "Deaths");
        for (name, kills, deaths) in &scoreboard {
            println!("{:<32} {:>5} {:>6}", name, kills, deaths);
        }
        self.scoreboard = scoreboard;
    }

    fn append_event(&mut self, line: &str) {
        println!("{}", line);
    }

    fn clear_event_log(&mut self) {}

    fn update_server_list(&mut self, servers: &[ServerInfo]) {
        if servers.is_empty() {
            println!("No servers found on the local network");
            return;
        }
        println!("Servers on the local network:");
        for server in servers {
            println!("  {:<32} {}", server.name, server.endpoint);
        }
    }

    fn is_focused(&self) -> bool {
        true
    }
}
