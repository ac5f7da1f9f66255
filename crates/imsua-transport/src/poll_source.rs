//! A `mio::event::Source` that delegates through a shared, locked socket.
//!
//! The reactor's `register` takes ownership of the source it polls, but a connection handler
//! also needs to read and write that same socket from its callbacks. Wrapping the socket in
//! `Arc<Mutex<_>>` lets both sides hold a handle to the identical underlying descriptor instead
//! of juggling a `dup`'d file descriptor.
use std::io;
use std::sync::Arc;

use mio::event::Source;
use mio::{Registry, Token};
use parking_lot::Mutex;

pub struct PollSource<T>(pub Arc<Mutex<T>>);

impl<T: Source> Source for PollSource<T> {
    fn register(&mut self, registry: &Registry, token: Token, interests: mio::Interest) -> io::Result<()> {
        self.0.lock().register(registry, token, interests)
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: mio::Interest) -> io::Result<()> {
        self.0.lock().reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.0.lock().deregister(registry)
    }
}
