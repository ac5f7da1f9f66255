//! A readiness-based I/O multiplexer that drives all non-blocking sockets for the IMS user agent
//! on a single background thread.
//!
//! The design mirrors a classic selector loop (register a descriptor, flag it readable/writable,
//! block in the OS primitive, dispatch callbacks) rather than an async executor: callers register a
//! [`mio::event::Source`] together with an [`EventHandler`], and the reactor invokes the handler's
//! methods whenever the kernel reports readiness. This keeps the transport layer's state machines
//! (§4.G of the design) fully synchronous and testable without a runtime.

mod error;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use mio::{Events, Interest, Token};
use parking_lot::Mutex;

pub use error::{Error, Result};

const WAKE_TOKEN: Token = Token(usize::MAX);

/// Callbacks invoked by the reactor for a single registered resource.
///
/// Implementations run on the reactor thread; they must not block. A panic inside any method is
/// caught, logged, and treated as [`EventHandler::on_except`] having already run for that
/// registration -- it does not poison the reactor.
pub trait EventHandler: Send {
    /// The descriptor became readable.
    fn on_readable(&mut self, handle: &RegistrationHandle);

    /// The descriptor became writable.
    fn on_writable(&mut self, handle: &RegistrationHandle);

    /// The registration was dropped by the reactor (closed, or its source became invalid).
    fn on_closed(&mut self, handle: &RegistrationHandle);

    /// The descriptor reported an exceptional condition (error, peer half-close).
    fn on_except(&mut self, handle: &RegistrationHandle) {
        let _ = handle;
    }
}

/// A handle to a live registration. Cheap to clone; does not keep the reactor alive (it holds a
/// [`Weak`] reference), matching the "non-owning handle" resolution for the reactor/registration
/// ownership cycle described in the design notes.
///
/// Readiness flags live behind their own small per-registration lock (`flags`), separate from the
/// reactor's registration table lock (`Inner::state`). `Reactor::run` holds `state` locked for the
/// whole dispatch loop so it can hand out `&mut Registration` to each handler in turn; a handler is
/// free to call `mark_readable`/`mark_writable`/`close` back on its own handle from inside that
/// callback without re-entering `state`.
#[derive(Clone)]
pub struct RegistrationHandle {
    token: Token,
    flags: Arc<Mutex<Flags>>,
    reactor: Weak<Inner>,
}

impl RegistrationHandle {
    /// Stable integer descriptor for this registration; constant for its lifetime.
    pub fn id(&self) -> usize {
        self.token.0
    }

    /// Request (or stop requesting) readability notifications.
    pub fn mark_readable(&self, want: bool) {
        self.flags.lock().readable = want;
        self.wake();
    }

    /// Request (or stop requesting) writability notifications.
    pub fn mark_writable(&self, want: bool) {
        self.flags.lock().writable = want;
        self.wake();
    }

    /// Mark this registration invalid. `on_closed` fires on the next reactor iteration and the
    /// registration is then dropped.
    pub fn close(&self) {
        self.flags.lock().closed = true;
        self.wake();
    }

    fn wake(&self) {
        if let Some(inner) = self.reactor.upgrade() {
            let _ = inner.waker.wake();
        }
    }
}

#[derive(Default)]
struct Flags {
    readable: bool,
    writable: bool,
    closed: bool,
}

struct Registration {
    source: Box<dyn mio::event::Source + Send>,
    handler: Box<dyn EventHandler>,
    flags: Arc<Mutex<Flags>>,
    registered_with_poll: bool,
}

struct State {
    registrations: HashMap<Token, Registration>,
}

struct Inner {
    poll: Mutex<mio::Poll>,
    waker: mio::Waker,
    state: Mutex<State>,
    next_token: AtomicUsize,
    stop: AtomicBool,
}

/// The reactor itself. Cheaply cloneable; every clone drives the same underlying event loop state.
#[derive(Clone)]
pub struct Reactor {
    inner: Arc<Inner>,
}

impl Reactor {
    /// Create a new reactor. Does not start any thread -- call [`Reactor::run`] or
    /// [`Reactor::run_forever`] (typically from a dedicated thread) to drive it.
    pub fn new() -> Result<Self> {
        let poll = mio::Poll::new()?;
        let waker = mio::Waker::new(poll.registry(), WAKE_TOKEN)?;
        Ok(Self {
            inner: Arc::new(Inner {
                poll: Mutex::new(poll),
                waker,
                state: Mutex::new(State {
                    registrations: HashMap::new(),
                }),
                next_token: AtomicUsize::new(0),
                stop: AtomicBool::new(false),
            }),
        })
    }

    /// Register a new resource with the reactor. Returns a handle the owner uses to request
    /// readability/writability notifications and to close the registration.
    ///
    /// The descriptor assigned here is constant for the registration's lifetime; it only takes
    /// effect on watch sets during the *next* call to [`Reactor::run`] (registrations added from
    /// within a callback never race a rebuild in progress).
    pub fn register<S>(&self, source: S, handler: Box<dyn EventHandler>) -> RegistrationHandle
    where
        S: mio::event::Source + Send + 'static,
    {
        let token = Token(self.inner.next_token.fetch_add(1, Ordering::Relaxed));
        let flags = Arc::new(Mutex::new(Flags::default()));
        let mut state = self.inner.state.lock();
        state.registrations.insert(
            token,
            Registration {
                source: Box::new(source),
                handler,
                flags: flags.clone(),
                registered_with_poll: false,
            },
        );
        drop(state);
        let _ = self.inner.waker.wake();
        RegistrationHandle {
            token,
            flags,
            reactor: Arc::downgrade(&self.inner),
        }
    }

    /// Request that [`Reactor::run_forever`] stop after its current iteration.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        let _ = self.inner.waker.wake();
    }

    /// Run one iteration of the event loop: rebuild watch sets, block in the OS readiness
    /// primitive for up to `timeout`, then dispatch callbacks for whatever became ready.
    pub fn run(&self, timeout: Option<Duration>) -> Result<()> {
        self.rebuild();

        let mut events = Events::with_capacity(256);
        self.inner.poll.lock().poll(&mut events, timeout)?;

        let mut state = self.inner.state.lock();
        for event in events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }
            let Some(reg) = state.registrations.get_mut(&token) else {
                continue;
            };
            if reg.flags.lock().closed {
                continue;
            }
            let handle = RegistrationHandle {
                token,
                flags: reg.flags.clone(),
                reactor: Arc::downgrade(&self.inner),
            };
            let exceptional = event.is_error() || event.is_read_closed() || event.is_write_closed();
            if exceptional {
                Self::dispatch(reg, |h| h.on_except(&handle));
            }
            if event.is_readable() {
                Self::dispatch(reg, |h| h.on_readable(&handle));
            }
            if event.is_writable() && !reg.flags.lock().closed {
                Self::dispatch(reg, |h| h.on_writable(&handle));
            }
        }
        Ok(())
    }

    fn dispatch(reg: &mut Registration, f: impl FnOnce(&mut dyn EventHandler)) {
        let handler = reg.handler.as_mut();
        if catch_unwind(AssertUnwindSafe(|| f(handler))).is_err() {
            tracing::error!("imsua_reactor: event handler panicked, suppressing");
            reg.flags.lock().closed = true;
        }
    }

    /// Rebuild the poll's watch sets from the current readiness flags, dropping and notifying
    /// any registration that was closed since the last iteration.
    fn rebuild(&self) {
        let mut state = self.inner.state.lock();
        let registry = self.inner.poll.lock();
        let registry = registry.registry();

        let closed_tokens: Vec<Token> = state
            .registrations
            .iter()
            .filter(|(_, r)| r.flags.lock().closed)
            .map(|(t, _)| *t)
            .collect();

        for token in closed_tokens {
            if let Some(mut reg) = state.registrations.remove(&token) {
                if reg.registered_with_poll {
                    let _ = registry.deregister(reg.source.as_mut());
                }
                let handle = RegistrationHandle {
                    token,
                    flags: reg.flags.clone(),
                    reactor: Arc::downgrade(&self.inner),
                };
                Self::dispatch(&mut reg, |h| h.on_closed(&handle));
            }
        }

        for (token, reg) in state.registrations.iter_mut() {
            let (readable, writable) = {
                let flags = reg.flags.lock();
                (flags.readable, flags.writable)
            };
            let interest = match (readable, writable) {
                (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
                (true, false) => Some(Interest::READABLE),
                (false, true) => Some(Interest::WRITABLE),
                (false, false) => None,
            };
            match interest {
                Some(interest) if reg.registered_with_poll => {
                    let _ = registry.reregister(reg.source.as_mut(), *token, interest);
                }
                Some(interest) => {
                    if registry.register(reg.source.as_mut(), *token, interest).is_ok() {
                        reg.registered_with_poll = true;
                    }
                }
                None if reg.registered_with_poll => {
                    let _ = registry.deregister(reg.source.as_mut());
                    reg.registered_with_poll = false;
                }
                None => {}
            }
        }
    }

    /// Run [`Reactor::run`] in a loop until [`Reactor::stop`] is called. Any error from an
    /// iteration is logged and suppressed; the loop then sleeps for `timeout` (or 100ms if none
    /// was given) before retrying, so a transient OS error cannot spin the thread.
    pub fn run_forever(&self, timeout: Option<Duration>) {
        while !self.inner.stop.load(Ordering::SeqCst) {
            if let Err(err) = self.run(timeout) {
                tracing::error!(error = %err, "imsua_reactor: iteration failed, retrying");
                std::thread::sleep(timeout.unwrap_or(Duration::from_millis(100)));
            }
        }
    }

    /// Spawn a dedicated thread that calls [`Reactor::run_forever`]. This is the usual way to
    /// drive the reactor: the caller keeps the returned [`Reactor`] clone to register resources
    /// and the [`std::thread::JoinHandle`] to join on shutdown.
    pub fn spawn(timeout: Option<Duration>) -> Result<(Self, std::thread::JoinHandle<()>)> {
        let reactor = Self::new()?;
        let for_thread = reactor.clone();
        let join = std::thread::Builder::new()
            .name("imsua-reactor".into())
            .spawn(move || for_thread.run_forever(timeout))
            .expect("failed to spawn reactor thread");
        Ok((reactor, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Recorder {
        tx: mpsc::Sender<&'static str>,
    }

    impl EventHandler for Recorder {
        fn on_readable(&mut self, _handle: &RegistrationHandle) {
            let _ = self.tx.send("readable");
        }
        fn on_writable(&mut self, _handle: &RegistrationHandle) {
            let _ = self.tx.send("writable");
        }
        fn on_closed(&mut self, _handle: &RegistrationHandle) {
            let _ = self.tx.send("closed");
        }
    }

    #[test]
    fn registration_id_is_stable() {
        let reactor = Reactor::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let handle = reactor.register(listener, Box::new(Recorder { tx }));
        let id_before = handle.id();
        handle.mark_readable(true);
        assert_eq!(id_before, handle.id());
    }

    #[test]
    fn closing_fires_on_closed_then_drops() -> io::Result<()> {
        let reactor = Reactor::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let listener = mio::net::TcpListener::bind("127.0.0.1:0".parse().unwrap())?;
        let handle = reactor.register(listener, Box::new(Recorder { tx }));
        handle.close();
        reactor.run(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(100)), Ok("closed"));
        Ok(())
    }

    struct SelfMutating {
        tx: mpsc::Sender<&'static str>,
    }

    impl EventHandler for SelfMutating {
        fn on_readable(&mut self, handle: &RegistrationHandle) {
            // Real transport handlers do exactly this from inside a dispatch: toggle their own
            // interest and close themselves. Must not deadlock against the reactor's own lock.
            handle.mark_writable(true);
            handle.mark_readable(false);
            handle.close();
            let _ = self.tx.send("readable");
        }
        fn on_writable(&mut self, _handle: &RegistrationHandle) {}
        fn on_closed(&mut self, _handle: &RegistrationHandle) {
            let _ = self.tx.send("closed");
        }
    }

    #[test]
    fn handler_can_mutate_and_close_its_own_registration_from_a_callback() -> io::Result<()> {
        use std::io::Write;
        use std::net::TcpListener as StdTcpListener;

        let std_listener = StdTcpListener::bind("127.0.0.1:0")?;
        let addr = std_listener.local_addr()?;
        drop(std_listener);

        let reactor = Reactor::new().unwrap();
        let listener = mio::net::TcpListener::bind(addr)?;
        let (tx, rx) = mpsc::channel();
        let handle = reactor.register(listener, Box::new(SelfMutating { tx }));
        handle.mark_readable(true);

        let mut stream = std::net::TcpStream::connect(addr)?;
        stream.write_all(b"x")?;

        reactor.run(Some(Duration::from_millis(200))).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(200)), Ok("readable"));

        reactor.run(Some(Duration::from_millis(200))).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_millis(200)), Ok("closed"));
        Ok(())
    }

    #[test]
    fn wake_unblocks_run() {
        let reactor = Reactor::new().unwrap();
        let clone = reactor.clone();
        let join = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            clone.stop();
        });
        // Without the wake signal this would block for the full timeout every iteration.
        let start = std::time::Instant::now();
        reactor.run_forever(Some(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
        join.join().unwrap();
    }
}
