//! TCP client and server transactions. The client tracks connect-in-progress state so sends
//! issued before the handshake completes are queued and flushed once `take_error` confirms it.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use imsua_reactor::{EventHandler, Reactor, RegistrationHandle};
use parking_lot::Mutex;

use crate::error::Result;
use crate::poll_source::PollSource;
use crate::transaction::{Transaction, TransactionShared};

const MAX_DEQUEUE_PER_WAKEUP: usize = 10;
const READ_CHUNK_LEN: usize = 4096;

pub const NAME: &str = "TCP";

struct StreamHandler {
    socket: Arc<Mutex<mio::net::TcpStream>>,
    connected: AtomicBool,
    outbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    reassembly: Vec<u8>,
    shared: Arc<TransactionShared>,
}

impl EventHandler for StreamHandler {
    fn on_readable(&mut self, handle: &RegistrationHandle) {
        use std::io::Read;
        let mut socket = self.socket.lock();
        loop {
            let mut chunk = [0u8; READ_CHUNK_LEN];
            match socket.read(&mut chunk) {
                Ok(0) => {
                    self.shared.set_error("connection closed by peer (EOF)");
                    handle.close();
                    return;
                }
                Ok(n) => {
                    self.reassembly.extend_from_slice(&chunk[..n]);
                    if let Err(err) = self.shared.feed(&mut self.reassembly) {
                        self.shared.set_error(&err.to_string());
                        handle.close();
                        return;
                    }
                }
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
        use std::io::Write;
        let mut socket = self.socket.lock();

        if !self.connected.load(Ordering::Acquire) {
            match socket.take_error() {
                Ok(None) => self.connected.store(true, Ordering::Release),
                Ok(Some(e)) | Err(e) => {
                    self.shared.set_error(&e.to_string());
                    handle.close();
                    return;
                }
            }
        }

        let mut outbound = self.outbound.lock();
        for _ in 0..MAX_DEQUEUE_PER_WAKEUP {
            let Some(item) = outbound.pop_front() else {
                handle.mark_writable(false);
                return;
            };
            match socket.write_all(&item) {
                Ok(()) => {}
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

fn wrap_stream(reactor: &Reactor, stream: mio::net::TcpStream, already_connected: bool) -> Result<Transaction> {
    stream.set_nodelay(true).ok();
    let socket = Arc::new(Mutex::new(stream));
    let shared = Arc::new(TransactionShared::new());
    let outbound = Arc::new(Mutex::new(VecDeque::new()));

    let handler = StreamHandler {
        socket: socket.clone(),
        connected: AtomicBool::new(already_connected),
        outbound: outbound.clone(),
        reassembly: Vec::new(),
        shared: shared.clone(),
    };

    let handle = reactor.register(PollSource(socket), Box::new(handler));
    handle.mark_readable(true);
    handle.mark_writable(true);
    Ok(Transaction::new(shared, outbound, handle, NAME))
}

/// Opens a non-blocking TCP connection and returns a transaction whose sends queue until the
/// handshake completes.
pub fn connect(reactor: &Reactor, remote: SocketAddr) -> Result<Transaction> {
    let stream = mio::net::TcpStream::connect(remote)?;
    wrap_stream(reactor, stream, false)
}

struct ListenerHandler {
    listener: Arc<Mutex<mio::net::TcpListener>>,
    reactor: Reactor,
    on_accept: Box<dyn FnMut(Transaction) + Send>,
}

impl EventHandler for ListenerHandler {
    fn on_readable(&mut self, _handle: &RegistrationHandle) {
        loop {
            let accepted = self.listener.lock().accept();
            match accepted {
                Ok((stream, _peer)) => match wrap_stream(&self.reactor, stream, true) {
                    Ok(transaction) => (self.on_accept)(transaction),
                    Err(err) => tracing::warn!(error = %err, "imsua_transport: failed to register an accepted TCP connection"),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "imsua_transport: TCP accept failed");
                    break;
                }
            }
        }
    }

    fn on_writable(&mut self, _handle: &RegistrationHandle) {}
    fn on_closed(&mut self, _handle: &RegistrationHandle) {}
}

/// Binds a TCP listener; `on_accept` runs on the reactor thread for each accepted connection.
pub fn listen(reactor: &Reactor, addr: SocketAddr, on_accept: impl FnMut(Transaction) + Send + 'static) -> Result<(RegistrationHandle, SocketAddr)> {
    let listener = mio::net::TcpListener::bind(addr)?;
    let local_addr = listener.local_addr()?;
    let listener = Arc::new(Mutex::new(listener));
    let handler = ListenerHandler {
        listener: listener.clone(),
        reactor: reactor.clone(),
        on_accept: Box::new(on_accept),
    };
    let handle = reactor.register(PollSource(listener), Box::new(handler));
    handle.mark_readable(true);
    Ok((handle, local_addr))
}
