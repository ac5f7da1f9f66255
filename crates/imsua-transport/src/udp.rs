//! A general-purpose UDP socket driven by the reactor: sends are queued per-destination, reads
//! arrive as `(sender, payload)` pairs. Used both for the SIP UDP transport and for RTP media
//! sockets, which is why destinations are per-send rather than fixed at bind time.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use imsua_reactor::{EventHandler, Reactor, RegistrationHandle};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

const MAX_DEQUEUE_PER_WAKEUP: usize = 10;
const RECV_BUF_LEN: usize = 65_536;

struct Shared {
    inbound: Mutex<VecDeque<(SocketAddr, Vec<u8>)>>,
    inbound_ready: Condvar,
    outbound: Mutex<VecDeque<(SocketAddr, Vec<u8>)>>,
    error: Mutex<Option<String>>,
}

struct Handler {
    socket: mio::net::UdpSocket,
    shared: Arc<Shared>,
}

impl EventHandler for Handler {
    fn on_readable(&mut self, _handle: &RegistrationHandle) {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, sender)) => {
                    let mut inbound = self.shared.inbound.lock();
                    inbound.push_back((sender, buf[..n].to_vec()));
                    self.shared.inbound_ready.notify_all();
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    *self.shared.error.lock() = Some(e.to_string());
                    self.shared.inbound_ready.notify_all();
                    break;
                }
            }
        }
    }

    fn on_writable(&mut self, handle: &RegistrationHandle) {
        let mut outbound = self.shared.outbound.lock();
        for _ in 0..MAX_DEQUEUE_PER_WAKEUP {
            let Some((dest, payload)) = outbound.pop_front() else {
                handle.mark_writable(false);
                return;
            };
            match self.socket.send_to(&payload, dest) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    outbound.push_front((dest, payload));
                    return;
                }
                Err(e) => {
                    *self.shared.error.lock() = Some(e.to_string());
                    self.shared.inbound_ready.notify_all();
                    return;
                }
            }
        }
    }

    fn on_closed(&mut self, _handle: &RegistrationHandle) {
        *self.shared.error.lock() = Some("socket closed".to_string());
        self.shared.inbound_ready.notify_all();
    }

    fn on_except(&mut self, handle: &RegistrationHandle) {
        *self.shared.error.lock() = Some("socket reported an exceptional condition".to_string());
        self.shared.inbound_ready.notify_all();
        handle.close();
    }
}

pub struct UdpSocket {
    shared: Arc<Shared>,
    handle: RegistrationHandle,
    local_addr: SocketAddr,
}

impl UdpSocket {
    pub fn bind(reactor: &Reactor, addr: SocketAddr) -> Result<Self> {
        // The reactor's `source` (used for readiness polling) and the handler's own socket
        // (used for the actual reads/writes) must be distinct objects since `register` takes
        // ownership of the source and never hands it back to the handler. A `dup`'d descriptor
        // shares the same underlying kernel socket, so readiness observed on one is valid for
        // I/O on the other.
        let std_socket = std::net::UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        let local_addr = std_socket.local_addr()?;
        let io_socket = mio::net::UdpSocket::from_std(std_socket.try_clone()?);
        let poll_socket = mio::net::UdpSocket::from_std(std_socket);

        let shared = Arc::new(Shared {
            inbound: Mutex::new(VecDeque::new()),
            inbound_ready: Condvar::new(),
            outbound: Mutex::new(VecDeque::new()),
            error: Mutex::new(None),
        });
        let handle = reactor.register(poll_socket, Box::new(Handler { socket: io_socket, shared: shared.clone() }));
        handle.mark_readable(true);
        Ok(Self { shared, handle, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn send_to(&self, dest: SocketAddr, payload: Vec<u8>) {
        self.shared.outbound.lock().push_back((dest, payload));
        self.handle.mark_writable(true);
    }

    pub fn recv_from(&self, timeout: Option<Duration>) -> Result<(SocketAddr, Vec<u8>)> {
        let mut inbound = self.shared.inbound.lock();
        loop {
            if let Some(item) = inbound.pop_front() {
                return Ok(item);
            }
            if let Some(err) = self.shared.error.lock().clone() {
                return Err(Error::TransportFailure(err));
            }
            match timeout {
                Some(d) => {
                    let result = self.shared.inbound_ready.wait_for(&mut inbound, d);
                    if result.timed_out() {
                        return Err(Error::Timeout);
                    }
                }
                None => self.shared.inbound_ready.wait(&mut inbound),
            }
        }
    }

    pub fn close(&self) {
        self.handle.close();
    }
}
