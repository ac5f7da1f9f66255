//! TCP/UDP sockets and SIP transactions, all driven by a shared [`imsua_reactor::Reactor`].

mod error;
mod poll_source;
mod tcp;
mod transaction;
mod udp;
mod udp_transaction;

use std::net::SocketAddr;

pub use error::{Error, Result};
pub use imsua_reactor::RegistrationHandle;
pub use transaction::Transaction;
pub use udp::UdpSocket;

use imsua_reactor::Reactor;

/// Factory over a shared reactor: opens transactions and sockets without any of them owning the
/// reactor thread itself.
#[derive(Clone)]
pub struct Transport {
    reactor: Reactor,
}

impl Transport {
    pub fn new(reactor: Reactor) -> Self {
        Self { reactor }
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    pub fn connect_tcp(&self, remote: SocketAddr) -> Result<Transaction> {
        tcp::connect(&self.reactor, remote)
    }

    pub fn listen_tcp(&self, addr: SocketAddr, on_accept: impl FnMut(Transaction) + Send + 'static) -> Result<(RegistrationHandle, SocketAddr)> {
        tcp::listen(&self.reactor, addr, on_accept)
    }

    pub fn connect_udp(&self, local: SocketAddr, remote: SocketAddr) -> Result<Transaction> {
        udp_transaction::connect(&self.reactor, local, remote)
    }

    pub fn bind_udp_socket(&self, addr: SocketAddr) -> Result<UdpSocket> {
        UdpSocket::bind(&self.reactor, addr)
    }
}
