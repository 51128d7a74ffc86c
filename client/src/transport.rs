//! Datagram transport used by [`Connection`](crate::connection::Connection).
//!
//! The client polls its sockets once per frame, so every operation here is
//! non-blocking: a receive with nothing pending returns `Ok(None)`.

use log::warn;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};

pub trait Transport {
    fn send_datagram(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()>;

    fn receive_datagram(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;
}

impl Transport for UdpSocket {
    fn send_datagram(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<()> {
        match self.send_to(data, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                // The datagram is lost like any other; reliable messages are retransmitted.
                warn!("Send buffer full, dropping datagram to {}", addr);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn receive_datagram(&mut self, buffer: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.recv_from(buffer) {
            Ok(received) => Ok(Some(received)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Binds a non-blocking socket of the address family matching `endpoint`.
pub fn bind_for(endpoint: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = if endpoint.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}
