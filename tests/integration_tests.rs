//! Integration tests for networked multiplayer components
//!
//! These tests run a real server on a loopback socket and drive real client
//! game views against it.

use client::config::Cvars;
use client::discovery::ServerInfo;
use client::game_view::GameView;
use client::input::{InputSource, NeutralInput};
use client::session::GameSession;
use client::ui::Ui;
use server::network::{Server, ServerConfig, ShutdownHandle};
use shared::{Channel, InputState, Message, RejectReason, ARENA_HEIGHT, ARENA_WIDTH, REVISION};
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

/// Ui that remembers what it was asked to show
#[derive(Default)]
struct TestUi {
    dialogs: Vec<(String, String)>,
    events: Vec<String>,
    loading: bool,
}

impl Ui for TestUi {
    fn show_error_dialog(&mut self, title: &str, message: &str) {
        self.dialogs.push((title.to_string(), message.to_string()));
    }

    fn confirm(&mut self, _question: &str) -> bool {
        true
    }

    fn show_main_menu(&mut self) {}

    fn hide_session_views(&mut self) {
        self.loading = false;
    }

    fn set_loading_overlay(&mut self, visible: bool) {
        self.loading = visible;
    }

    fn set_waiting_overlay(&mut self, _lagging: bool, _time_to_drop_ms: u64) {}

    fn update_hud(&mut self, _session: &GameSession) {}

    fn update_scoreboard(&mut self, _session: &GameSession) {}

    fn append_event(&mut self, line: &str) {
        self.events.push(line.to_string());
    }

    fn clear_event_log(&mut self) {
        self.events.clear();
    }

    fn update_server_list(&mut self, _servers: &[ServerInfo]) {}

    fn is_focused(&self) -> bool {
        true
    }
}

/// Holds forward while aiming at the arena centre
struct ThrustToCentre;

impl InputSource for ThrustToCentre {
    fn sample(&self) -> InputState {
        InputState {
            forward: true,
            target_x: ARENA_WIDTH / 2.0,
            target_y: ARENA_HEIGHT / 2.0,
            ..InputState::default()
        }
    }
}

struct TestServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    fn start(max_clients: usize) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let config = ServerConfig {
                    name: "Test Arena".to_string(),
                    max_clients,
                    announce: false,
                    ..Default::default()
                };
                let mut server = Server::new("127.0.0.1:0", config).await.unwrap();
                tx.send((server.local_addr().unwrap(), server.shutdown_handle()))
                    .unwrap();
                server.run().await.unwrap();
            });
        });
        let (addr, shutdown) = rx.recv().unwrap();

        Self {
            addr,
            shutdown,
            thread: Some(thread),
        }
    }

    fn stop(&mut self) {
        self.shutdown.shutdown();
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn new_view(name: &str, input: Box<dyn InputSource>) -> GameView<TestUi> {
    let cvars = Cvars::new(name, shared::DEFAULT_SERVER_PORT).unwrap();
    GameView::new(cvars, TestUi::default(), input)
}

/// Runs frames of every view until `done` holds or five seconds pass
fn pump_until(
    views: &mut [&mut GameView<TestUi>],
    done: impl Fn(&[&mut GameView<TestUi>]) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        for view in views.iter_mut() {
            view.update();
        }
        if done(views) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn pump_frames(view: &mut GameView<TestUi>, frames: usize) {
    for _ in 0..frames {
        view.update();
        thread::sleep(Duration::from_millis(16));
    }
}

fn connect_and_sync(view: &mut GameView<TestUi>, server: &TestServer) {
    view.connect("127.0.0.1", server.addr.port());
    assert!(
        pump_until(&mut [view], |views| views[0].is_synced()),
        "client did not synchronize"
    );
}

/// SESSION LIFECYCLE TESTS
mod session_tests {
    use super::*;

    /// Tests the handshake up to a synchronized session
    #[test]
    fn client_synchronizes_with_server() {
        let server = TestServer::start(4);
        let mut view = new_view("Tester", Box::new(NeutralInput));

        connect_and_sync(&mut view, &server);

        let session = view.session().unwrap();
        let local = session.local_player().unwrap();
        assert_eq!(session.player(local).unwrap().name, "Tester");
        assert!(session.local_entity().is_some());
        assert!(!view.ui().loading);
        assert!(view.ui().dialogs.is_empty());
    }

    /// Tests that the server moves the orb with the client's input
    #[test]
    fn input_drives_authoritative_orb() {
        let server = TestServer::start(4);
        let mut view = new_view("Pilot", Box::new(ThrustToCentre));
        connect_and_sync(&mut view, &server);
        assert!(pump_until(&mut [&mut view], |views| views[0]
            .session()
            .is_some_and(|session| session.last_tick() > 0)));

        let start = view.session().unwrap().local_entity().unwrap().body;
        pump_frames(&mut view, 30);
        let session = view.session().unwrap();
        let now = session.local_entity().unwrap().body;

        assert!(start.distance_to(&now) > 1.0);
        assert!(session.predicted_orb().is_some());
    }

    /// Tests that chat is relayed back to the sender
    #[test]
    fn chat_round_trip() {
        let server = TestServer::start(4);
        let mut view = new_view("Tester", Box::new(NeutralInput));
        connect_and_sync(&mut view, &server);

        view.send_chat("hello arena").unwrap();

        assert!(pump_until(&mut [&mut view], |views| views[0]
            .ui()
            .events
            .iter()
            .any(|line| line == "Tester: hello arena")));
    }

    /// Tests that players see each other join, rename and leave
    #[test]
    fn players_see_each_other() {
        let server = TestServer::start(4);
        let mut alice = new_view("Alice", Box::new(NeutralInput));
        let mut bob = new_view("Bob", Box::new(NeutralInput));
        connect_and_sync(&mut alice, &server);
        connect_and_sync(&mut bob, &server);

        assert!(pump_until(&mut [&mut alice, &mut bob], |views| views[0]
            .ui()
            .events
            .iter()
            .any(|line| line == "Bob joined the game")));
        assert_eq!(bob.session().unwrap().players().count(), 2);

        bob.change_player_name("Robert").unwrap();
        assert!(pump_until(&mut [&mut alice, &mut bob], |views| views[0]
            .ui()
            .events
            .iter()
            .any(|line| line == "Bob is now known as Robert")));

        bob.disconnect();
        assert!(pump_until(&mut [&mut alice], |views| views[0]
            .ui()
            .events
            .iter()
            .any(|line| line == "Robert left the game")));
        assert_eq!(alice.session().unwrap().players().count(), 1);
    }

    /// Tests that a server shutdown ends the session with a dialog
    #[test]
    fn server_shutdown_ends_session() {
        let mut server = TestServer::start(4);
        let mut view = new_view("Tester", Box::new(NeutralInput));
        connect_and_sync(&mut view, &server);

        server.stop();

        assert!(pump_until(&mut [&mut view], |views| !views[0].is_connected()));
        assert_eq!(view.ui().dialogs[0].0, "Server Shutdown");
    }
}

/// CONNECTION REJECTION TESTS
mod rejection_tests {
    use super::*;

    /// Tests that a full server turns new clients away
    #[test]
    fn full_server_rejects_client() {
        let server = TestServer::start(1);
        let mut first = new_view("First", Box::new(NeutralInput));
        connect_and_sync(&mut first, &server);

        let mut second = new_view("Second", Box::new(NeutralInput));
        second.connect("127.0.0.1", server.addr.port());

        assert!(pump_until(&mut [&mut first, &mut second], |views| !views[1]
            .is_connected()));
        assert_eq!(second.ui().dialogs[0].0, "Connection Rejected");
        assert!(first.is_synced());
    }

    /// Tests that a client of another revision is rejected
    #[test]
    fn revision_mismatch_is_rejected() {
        let server = TestServer::start(4);
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut channel = Channel::new();
        channel
            .enqueue(Message::ClientConnect {
                revision: REVISION.wrapping_add(1),
                player_name: "Time Traveller".to_string(),
            })
            .unwrap();
        for datagram in channel.flush().unwrap() {
            socket.send_to(&datagram, server.addr).unwrap();
        }

        let mut buffer = [0u8; 2048];
        let (len, from) = socket.recv_from(&mut buffer).unwrap();
        assert_eq!(from, server.addr);
        assert_eq!(
            channel.receive(&buffer[..len]).unwrap(),
            vec![Message::ClientRejected {
                reason: RejectReason::VersionMismatch
            }]
        );
    }

    /// Tests that an unresponsive endpoint times the connection out
    #[test]
    fn silent_server_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut cvars = Cvars::new("Tester", shared::DEFAULT_SERVER_PORT).unwrap();
        cvars.connect_timeout = Duration::from_millis(200);
        let mut view = GameView::new(cvars, TestUi::default(), Box::new(NeutralInput));

        view.connect("127.0.0.1", silent.local_addr().unwrap().port());

        assert!(pump_until(&mut [&mut view], |views| !views[0].is_connected()));
        assert_eq!(view.ui().dialogs[0].0, "Connection Failed");
    }

    /// Tests that garbage from a stranger does not disturb the server
    #[test]
    fn garbage_datagrams_are_ignored() {
        let server = TestServer::start(4);
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        stranger.send_to(&[0xde, 0xad, 0xbe, 0xef], server.addr).unwrap();

        let mut view = new_view("Tester", Box::new(NeutralInput));
        connect_and_sync(&mut view, &server);
        assert!(view.ui().dialogs.is_empty());
    }
}
