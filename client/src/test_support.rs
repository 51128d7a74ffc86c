//! In-memory doubles for the network and the user interface.

use shared::{Channel, InputState, Message, PlayerId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::discovery::ServerInfo;
use crate::input::InputSource;
use crate::session::GameSession;
use crate::transport::Transport;
use crate::ui::Ui;

#[derive(Default)]
pub struct Wire {
    pub inbound: VecDeque<(Vec<u8>, SocketAddr)>,
    pub outbound: Vec<(Vec<u8>, SocketAddr)>,
    pub receive_error: Option<io::ErrorKind>,
}

#[derive(Clone, Default)]
pub struct MemoryTransport(pub Rc<RefCell<Wire>>);

impl Transport for MemoryTransport {
    fn send_datagram(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        self.0.borrow_mut().outbound.push((data.to_vec(), addr));
        Ok(())
    }

    fn receive_datagram(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        let mut wire = self.0.borrow_mut();
        if let Some(kind) = wire.receive_error.take() {
            return Err(io::Error::new(kind, "injected failure"));
        }
        match wire.inbound.pop_front() {
            Some((data, from)) => {
                let len = data.len().min(buffer.len());
                buffer[..len].copy_from_slice(&data[..len]);
                Ok(Some((len, from)))
            }
            None => Ok(None),
        }
    }
}

/// Server side of a [`MemoryTransport`], speaking through its own channel.
pub struct FakeServer {
    pub addr: SocketAddr,
    pub wire: MemoryTransport,
    pub channel: Channel,
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            addr: "127.0.0.1:32422".parse().unwrap(),
            wire: MemoryTransport::default(),
            channel: Channel::new(),
        }
    }

    pub fn transport(&self) -> Box<dyn Transport> {
        Box::new(self.wire.clone())
    }

    pub fn send(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.channel.enqueue(message).unwrap();
        }
        for datagram in self.channel.flush().unwrap() {
            self.send_raw(datagram, self.addr);
        }
    }

    pub fn send_raw(&self, bytes: Vec<u8>, from: SocketAddr) {
        self.wire.0.borrow_mut().inbound.push_back((bytes, from));
    }

    /// Joins `player` and completes the synchronization handshake.
    pub fn sync(&mut self, player: PlayerId, name: &str) {
        self.send(vec![
            Message::PlayerJoin {
                player,
                name: name.to_string(),
            },
            Message::ClientSynced { player },
        ]);
    }

    /// Everything the client sent since the last call, decoded.
    pub fn receive(&mut self) -> Vec<Message> {
        let outbound: Vec<_> = self.wire.0.borrow_mut().outbound.drain(..).collect();
        let mut messages = Vec::new();
        for (datagram, _) in outbound {
            messages.extend(self.channel.receive(&datagram).unwrap());
        }
        messages
    }

    pub fn outbound_datagrams(&self) -> usize {
        self.wire.0.borrow().outbound.len()
    }

    pub fn fail_next_receive(&self, kind: io::ErrorKind) {
        self.wire.0.borrow_mut().receive_error = Some(kind);
    }
}

#[derive(Default)]
pub struct RecordingUi {
    pub dialogs: Vec<(String, String)>,
    pub confirm_answer: bool,
    pub main_menu_shown: usize,
    pub session_views_hidden: usize,
    pub loading: bool,
    pub waiting: Option<(bool, u64)>,
    pub events: Vec<String>,
    pub event_log_cleared: usize,
    pub server_lists: Vec<Vec<ServerInfo>>,
    pub hud_updates: usize,
    pub scoreboard: Vec<(String, u16, u16)>,
    pub unfocused: bool,
}

impl Ui for RecordingUi {
    fn show_error_dialog(&mut self, title: &str, message: &str) {
        self.dialogs.push((title.to_string(), message.to_string()));
    }

    fn confirm(&mut self, _question: &str) -> bool {
        self.confirm_answer
    }

    fn show_main_menu(&mut self) {
        self.main_menu_shown += 1;
    }

    fn hide_session_views(&mut self) {
        self.session_views_hidden += 1;
        self.loading = false;
        self.waiting = None;
    }

    fn set_loading_overlay(&mut self, visible: bool) {
        self.loading = visible;
    }

    fn set_waiting_overlay(&mut self, lagging: bool, time_to_drop_ms: u64) {
        self.waiting = Some((lagging, time_to_drop_ms));
    }

    fn update_hud(&mut self, _session: &GameSession) {
        self.hud_updates += 1;
    }

    fn update_scoreboard(&mut self, session: &GameSession) {
        self.scoreboard = session
            .players()
            .map(|p| (p.name.clone(), p.kills, p.deaths))
            .collect();
    }

    fn append_event(&mut self, line: &str) {
        self.events.push(line.to_string());
    }

    fn clear_event_log(&mut self) {
        self.events.clear();
        self.event_log_cleared += 1;
    }

    fn update_server_list(&mut self, servers: &[ServerInfo]) {
        self.server_lists.push(servers.to_vec());
    }

    fn is_focused(&self) -> bool {
        !self.unfocused
    }
}

/// Input source returning whatever the test last stored.
#[derive(Clone, Default)]
pub struct ScriptedInput(pub Rc<RefCell<InputState>>);

impl InputSource for ScriptedInput {
    fn sample(&self) -> InputState {
        *self.0.borrow()
    }
}
