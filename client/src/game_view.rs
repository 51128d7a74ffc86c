use log::{error, info};
use shared::{check_chat_message, LimitError, Message, REVISION, RECONNECT_SETTLE_DELAY};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;
use thiserror::Error;

use crate::commands::Command;
use crate::config::Cvars;
use crate::connection::Connection;
use crate::error::NetworkError;
use crate::input::{InputManager, InputSource};
use crate::logic::ClientLogic;
use crate::session::GameSession;
use crate::transport::{self, Transport};
use crate::ui::Ui;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Limit(#[from] LimitError),
    #[error("not connected to a server")]
    NotConnected,
}

/// Frame clock of a session; restarted when synchronization completes.
pub struct Clock {
    last: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Seconds since the previous call or reset.
    pub fn restart(&mut self) -> f64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        elapsed
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// Field order is drop order: session state goes before the connection.
struct ActiveSession {
    logic: ClientLogic,
    input: Option<InputManager>,
    connection: Connection,
}

/// Owns the lifecycle of a game session: connecting, per-frame updates,
/// teardown, and turning faults into dialogs.
pub struct GameView<U: Ui> {
    cvars: Cvars,
    ui: U,
    input_source: Box<dyn InputSource>,
    active: Option<ActiveSession>,
    clock: Clock,
}

impl<U: Ui> GameView<U> {
    pub fn new(cvars: Cvars, ui: U, input_source: Box<dyn InputSource>) -> Self {
        Self {
            cvars,
            ui,
            input_source,
            active: None,
            clock: Clock::new(),
        }
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub fn cvars(&self) -> &Cvars {
        &self.cvars
    }

    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_synced(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.logic.is_synced())
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.active.as_ref().map(|active| active.logic.session())
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.active.as_ref().map(|active| &active.connection)
    }

    /// Resolves `host` and starts a new session with it, ending any
    /// running one first.
    pub fn connect(&mut self, host: &str, port: u16) {
        self.end_active_session();

        let endpoint = match resolve(host, port) {
            Ok(endpoint) => endpoint,
            Err(fault) => return self.report_fault(fault),
        };
        let socket = match transport::bind_for(endpoint) {
            Ok(socket) => socket,
            Err(e) => return self.report_fault(e.into()),
        };
        self.connect_with_transport(Box::new(socket), endpoint);
    }

    pub fn connect_with_transport(&mut self, transport: Box<dyn Transport>, endpoint: SocketAddr) {
        self.end_active_session();

        info!("Connecting to {} as '{}'", endpoint, self.cvars.player_name());
        let mut connection = Connection::create(transport, endpoint)
            .with_connect_timeout(self.cvars.connect_timeout);
        let hello = Message::ClientConnect {
            revision: REVISION,
            player_name: self.cvars.player_name().to_string(),
        };
        if let Err(fault) = connection.enqueue_message(hello) {
            return self.report_fault(fault);
        }

        self.active = Some(ActiveSession {
            logic: ClientLogic::new(),
            input: None,
            connection,
        });
        self.ui.clear_event_log();
        self.ui.set_loading_overlay(true);
    }

    fn end_active_session(&mut self) {
        if self.active.is_some() {
            self.disconnect();
            // Gives the old server a moment to see our Disconnect first.
            std::thread::sleep(RECONNECT_SETTLE_DELAY);
        }
    }

    /// Runs one frame. Faults end the session here and nowhere else.
    pub fn update(&mut self) {
        if let Err(fault) = self.try_update() {
            self.report_fault(fault);
        }
    }

    fn try_update(&mut self) -> Result<(), NetworkError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        active
            .connection
            .dispatch_received_messages(&mut active.logic)?;

        if !active.logic.is_synced() {
            return active.connection.send_queued_messages();
        }

        if active.input.is_none() {
            let Some(player) = active.logic.session().local_player() else {
                return Err(NetworkError::Network(
                    "synchronized without a local player".to_string(),
                ));
            };
            info!("Session synchronized, playing as {}", player);

            self.clock.reset();
            active.connection.enqueue_message(Message::PlayerName {
                player,
                name: self.cvars.player_name().to_string(),
            })?;
            active.input = Some(InputManager::new(player));
            self.ui.set_loading_overlay(false);
            self.ui.clear_event_log();
        }

        let elapsed = self.clock.restart();
        active.logic.session_mut().update_client(elapsed);

        if let Some(input_manager) = active.input.as_mut() {
            let input = input_manager.update(self.input_source.as_ref(), self.ui.is_focused());
            active
                .logic
                .session_mut()
                .apply_prediction(input.sequence, &input.latest());
            active
                .connection
                .enqueue_message(Message::PlayerInput(input))?;
        }
        active.connection.send_queued_messages()?;

        for event in active.logic.take_events() {
            self.ui.append_event(&event.to_string());
        }
        self.ui.update_hud(active.logic.session());
        self.ui.update_scoreboard(active.logic.session());
        self.ui.set_waiting_overlay(
            active.connection.is_lagging(),
            active.connection.time_to_drop(),
        );
        Ok(())
    }

    /// Ends the session, if any, and returns to the main menu.
    pub fn disconnect(&mut self) {
        self.ui.hide_session_views();
        self.ui.show_main_menu();
        self.ui.clear_event_log();

        if let Some(ActiveSession {
            logic,
            input,
            connection,
        }) = self.active.take()
        {
            drop(input);
            drop(logic);
            connection.disconnect();
        }
    }

    fn report_fault(&mut self, fault: NetworkError) {
        error!("Session ended: {}", fault);
        self.disconnect();
        let (title, message) = fault.dialog();
        self.ui.show_error_dialog(title, &message);
    }

    pub fn send_chat(&mut self, message: &str) -> Result<(), ChatError> {
        check_chat_message(message)?;

        let Some(active) = self.active.as_mut().filter(|a| a.logic.is_synced()) else {
            return Err(ChatError::NotConnected);
        };
        let Some(player) = active.logic.session().local_player() else {
            return Err(ChatError::NotConnected);
        };

        let chat = Message::PlayerChat {
            player,
            message: message.to_string(),
        };
        if let Err(fault) = active.connection.enqueue_message(chat) {
            self.report_fault(fault);
        }
        Ok(())
    }

    /// Stores the new name and announces it if a session is running.
    pub fn change_player_name(&mut self, name: &str) -> Result<(), LimitError> {
        self.cvars.set_player_name(name)?;

        let Some(active) = self.active.as_mut().filter(|a| a.logic.is_synced()) else {
            return Ok(());
        };
        let Some(player) = active.logic.session().local_player() else {
            return Ok(());
        };

        let rename = Message::PlayerName {
            player,
            name: self.cvars.player_name().to_string(),
        };
        if let Err(fault) = active.connection.enqueue_message(rename) {
            self.report_fault(fault);
        }
        Ok(())
    }

    /// Executes a console command. Returns `false` when the client should exit.
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect { host, port } => self.connect(&host, port),
            Command::Disconnect => {
                if self.is_connected() {
                    self.disconnect();
                }
            }
            Command::Chat(message) => {
                if let Err(e) = self.send_chat(&message) {
                    self.ui.append_event(&format!("Message not sent: {}", e));
                }
            }
            Command::Name(name) => {
                if let Err(e) = self.change_player_name(&name) {
                    self.ui.append_event(&format!("Name not changed: {}", e));
                }
            }
            // Browsing is driven by the caller while no session is active.
            Command::ListServers => {
                if self.is_connected() {
                    self.ui.append_event("Disconnect first to browse servers");
                }
            }
            Command::Quit => {
                if self.is_connected() && !self.ui.confirm("Leave the current game and quit?") {
                    return true;
                }
                self.disconnect();
                return false;
            }
        }
        true
    }
}

/// Resolves `host`, preferring IPv4 addresses.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let resolution_error = |reason: String| NetworkError::AddressResolution {
        host: host.to_string(),
        reason,
    };

    let addresses: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| resolution_error(e.to_string()))?
        .collect();

    addresses
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| resolution_error("no addresses found".to_string()))
}
