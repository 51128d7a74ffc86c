//! Finds servers on the local network by listening to their multicast
//! announcements.

use log::{error, info, warn};
use shared::{DiscoveryMessage, DISCOVERY_TIMEOUT, MAX_PACKET_SIZE, MULTICAST_GROUP};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Instant;

use crate::ui::Ui;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub endpoint: SocketAddr,
    pub name: String,
    pub discovery_time: Instant,
}

impl ServerInfo {
    pub fn has_timed_out(&self) -> bool {
        self.discovery_time.elapsed() > DISCOVERY_TIMEOUT
    }
}

/// Keeps the list of announced servers current while the join menu is open.
pub struct ServerDiscovery {
    socket: Option<UdpSocket>,
    active: bool,
    faulted: bool,
    servers: Vec<ServerInfo>,
    dirty: bool,
}

impl ServerDiscovery {
    pub fn new() -> Self {
        Self {
            socket: None,
            active: false,
            faulted: false,
            servers: Vec::new(),
            dirty: false,
        }
    }

    /// Joins the multicast group. Failing to do so leaves discovery active
    /// but faulted: known servers still time out, nothing new is found.
    pub fn activate(&mut self) {
        self.active = true;
        self.dirty = true;
        match open_multicast_socket() {
            Ok(socket) => {
                info!("Listening for servers on {}", MULTICAST_GROUP);
                self.socket = Some(socket);
                self.faulted = false;
            }
            Err(e) => {
                error!("Server discovery unavailable: {}", e);
                self.faulted = true;
            }
        }
    }

    pub fn deactivate(&mut self) {
        self.socket = None;
        self.active = false;
        self.faulted = false;
        self.servers.clear();
        self.dirty = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn servers(&self) -> &[ServerInfo] {
        &self.servers
    }

    /// Expires silent servers, reads pending announcements and publishes the
    /// list to `ui` if it changed.
    pub fn update(&mut self, ui: &mut dyn Ui) {
        let before = self.servers.len();
        self.servers.retain(|server| {
            let expired = server.has_timed_out();
            if expired {
                info!("Server '{}' at {} timed out", server.name, server.endpoint);
            }
            !expired
        });
        if self.servers.len() != before {
            self.dirty = true;
        }

        if !self.faulted {
            self.receive_announcements();
        }

        if self.dirty {
            ui.update_server_list(&self.servers);
            self.dirty = false;
        }
    }

    fn receive_announcements(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };

        let mut received = Vec::new();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            match socket.recv_from(&mut buffer) {
                Ok((len, sender)) => received.push((buffer[..len].to_vec(), sender)),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Server discovery failed: {}", e);
                    self.faulted = true;
                    break;
                }
            }
        }

        for (bytes, sender) in received {
            self.handle_announcement(&bytes, sender);
        }
    }

    /// Records the server announced by `bytes`. The announced port replaces
    /// the sender's, which is the server's discovery socket.
    pub fn handle_announcement(&mut self, bytes: &[u8], sender: SocketAddr) {
        let message = match DiscoveryMessage::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring invalid announcement from {}: {}", sender, e);
                return;
            }
        };

        let endpoint = SocketAddr::new(sender.ip(), message.port);
        let now = Instant::now();
        if let Some(server) = self
            .servers
            .iter_mut()
            .find(|s| s.endpoint == endpoint && s.name == message.server_name)
        {
            server.discovery_time = now;
            return;
        }

        info!("Discovered server '{}' at {}", message.server_name, endpoint);
        self.servers.push(ServerInfo {
            endpoint,
            name: message.server_name,
            discovery_time: now,
        });
        self.dirty = true;
    }
}

impl Default for ServerDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

fn open_multicast_socket() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MULTICAST_GROUP.port());
    socket.bind(&SocketAddr::V4(bind_addr).into())?;
    socket.join_multicast_v4(MULTICAST_GROUP.ip(), &Ipv4Addr::UNSPECIFIED)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingUi;
    use std::time::Duration;

    fn announcement(port: u16, name: &str) -> Vec<u8> {
        DiscoveryMessage::new(port, name).encode().unwrap()
    }

    fn sender() -> SocketAddr {
        "192.168.1.20:40000".parse().unwrap()
    }

    #[test]
    fn test_announcement_adds_server_once() {
        let mut discovery = ServerDiscovery::new();
        let mut ui = RecordingUi::default();

        discovery.handle_announcement(&announcement(32422, "Arena"), sender());
        discovery.handle_announcement(&announcement(32422, "Arena"), sender());
        discovery.update(&mut ui);

        assert_eq!(discovery.servers().len(), 1);
        assert_eq!(
            discovery.servers()[0].endpoint,
            "192.168.1.20:32422".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(ui.server_lists.len(), 1);

        // A repeated announcement only refreshes the timestamp.
        discovery.handle_announcement(&announcement(32422, "Arena"), sender());
        discovery.update(&mut ui);
        assert_eq!(ui.server_lists.len(), 1);
    }

    #[test]
    fn test_same_endpoint_with_new_name_is_a_new_entry() {
        let mut discovery = ServerDiscovery::new();
        discovery.handle_announcement(&announcement(32422, "Arena"), sender());
        discovery.handle_announcement(&announcement(32422, "Renamed"), sender());

        assert_eq!(discovery.servers().len(), 2);
    }

    #[test]
    fn test_invalid_announcements_are_ignored() {
        let mut discovery = ServerDiscovery::new();
        let mut bytes = announcement(32422, "Arena");
        bytes[0] ^= 0xFF;

        discovery.handle_announcement(&bytes, sender());
        discovery.handle_announcement(&[1, 2, 3], sender());

        assert!(discovery.servers().is_empty());
    }

    #[test]
    fn test_silent_servers_expire_with_one_publication() {
        let mut discovery = ServerDiscovery::new();
        let mut ui = RecordingUi::default();
        discovery.handle_announcement(&announcement(1000, "Old"), sender());
        discovery.handle_announcement(&announcement(2000, "Fresh"), sender());
        discovery.update(&mut ui);

        discovery.servers[0].discovery_time =
            Instant::now() - DISCOVERY_TIMEOUT - Duration::from_secs(1);
        discovery.update(&mut ui);
        discovery.update(&mut ui);

        assert_eq!(ui.server_lists.len(), 2);
        let latest = ui.server_lists.last().unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].name, "Fresh");
    }

    #[test]
    fn test_deactivate_forgets_servers() {
        let mut discovery = ServerDiscovery::new();
        discovery.handle_announcement(&announcement(32422, "Arena"), sender());

        discovery.deactivate();
        assert!(!discovery.is_active());
        assert!(discovery.servers().is_empty());
    }
}
