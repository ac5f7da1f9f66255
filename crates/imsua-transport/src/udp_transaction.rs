//! A SIP transaction over UDP: each datagram is one complete message (no stream reassembly),
//! sent to and received from a single fixed remote endpoint.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use imsua_reactor::{EventHandler, Reactor, RegistrationHandle};
use imsua_sip::Outcome;
use parking_lot::Mutex;

use crate::error::Result;
use crate::transaction::{Transaction, TransactionShared};

const MAX_DEQUEUE_PER_WAKEUP: usize = 10;
const RECV_BUF_LEN: usize = 65_536;

pub const NAME: &str = "UDP";

struct Handler {
    socket: mio::net::UdpSocket,
    remote: SocketAddr,
    outbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    shared: Arc<TransactionShared>,
}

impl EventHandler for Handler {
    fn on_readable(&mut self, handle: &RegistrationHandle) {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) if from == self.remote => match imsua_sip::parse(&buf[..n]) {
                    Ok(Outcome::Parsed { message, .. }) => {
                        self.shared.feed_message(message);
                    }
                    Ok(Outcome::NeedMore) => {
                        self.shared.set_error("received a truncated SIP datagram");
                    }
                    Err(err) => self.shared.set_error(&err.to_string()),
                },
                Ok(_) => {} // datagram from an address we're not talking to; drop it
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.shared.set_error(&e.to_string());
                    handle.close();
                    return;
                }
            }
        }
    }

    fn on_writable(&mut self, handle: &RegistrationHandle) {
        let mut outbound = self.outbound.lock();
        for _ in 0..MAX_DEQUEUE_PER_WAKEUP {
            let Some(item) = outbound.pop_front() else {
                handle.mark_writable(false);
                return;
            };
            match self.socket.send_to(&item, self.remote) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    outbound.push_front(item);
                    return;
                }
                Err(e) => {
                    self.shared.set_error(&e.to_string());
                    handle.close();
                    return;
                }
            }
        }
    }

    fn on_closed(&mut self, _handle: &RegistrationHandle) {
        self.shared.set_error("transaction closed");
    }

    fn on_except(&mut self, handle: &RegistrationHandle) {
        self.shared.set_error("socket reported an exceptional condition");
        handle.close();
    }
}

pub fn connect(reactor: &Reactor, local: SocketAddr, remote: SocketAddr) -> Result<Transaction> {
    let std_socket = std::net::UdpSocket::bind(local)?;
    std_socket.set_nonblocking(true)?;
    std_socket.connect(remote).ok(); // filters local delivery to this peer on platforms that honor it
    let io_socket = mio::net::UdpSocket::from_std(std_socket.try_clone()?);
    let poll_socket = mio::net::UdpSocket::from_std(std_socket);

    let shared = Arc::new(TransactionShared::new());
    let outbound = Arc::new(Mutex::new(VecDeque::new()));
    let handler = Handler { socket: io_socket, remote, outbound: outbound.clone(), shared: shared.clone() };

    let handle = reactor.register(poll_socket, Box::new(handler));
    handle.mark_readable(true);
    Ok(Transaction::new(shared, outbound, handle, NAME))
}
