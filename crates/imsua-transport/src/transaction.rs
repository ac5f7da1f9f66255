//! The state shared between a connection's reactor-thread handler and the caller-facing
//! [`Transaction`] handle: an inbound FIFO of parsed messages, a condition variable signalled on
//! each successful parse, and a sticky error flag that latches the first failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use imsua_reactor::RegistrationHandle;
use imsua_sip::{Message, Outcome};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

pub struct TransactionShared {
    inbound: Mutex<VecDeque<Message>>,
    ready: Condvar,
    error: Mutex<Option<String>>,
}

impl TransactionShared {
    pub fn new() -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
            error: Mutex::new(None),
        }
    }

    /// Repeatedly parses complete messages out of `buf`, queuing each and draining its consumed
    /// bytes, until the parser reports it needs more data.
    pub fn feed(&self, buf: &mut Vec<u8>) -> imsua_sip::Result<()> {
        loop {
            match imsua_sip::parse(buf)? {
                Outcome::NeedMore => return Ok(()),
                Outcome::Parsed { message, consumed } => {
                    buf.drain(..consumed);
                    self.inbound.lock().push_back(message);
                    self.ready.notify_all();
                }
            }
        }
    }

    /// Queues an already-parsed message, for transports where one datagram is one message.
    pub fn feed_message(&self, message: Message) {
        self.inbound.lock().push_back(message);
        self.ready.notify_all();
    }

    pub fn set_error(&self, detail: &str) {
        let mut error = self.error.lock();
        if error.is_none() {
            *error = Some(detail.to_string());
        }
        self.ready.notify_all();
    }
}

impl Default for TransactionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// A bidirectional SIP message stream over a single TCP or UDP connection.
pub struct Transaction {
    shared: Arc<TransactionShared>,
    outbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    handle: RegistrationHandle,
    transport_name: &'static str,
}

impl Transaction {
    pub(crate) fn new(
        shared: Arc<TransactionShared>,
        outbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
        handle: RegistrationHandle,
        transport_name: &'static str,
    ) -> Self {
        Self { shared, outbound, handle, transport_name }
    }

    /// Name used in `Via`'s transport token: `"TCP"` or `"UDP"`.
    pub fn transport_name(&self) -> &'static str {
        self.transport_name
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        if let Some(err) = self.shared.error.lock().clone() {
            return Err(Error::TransportFailure(err));
        }
        let wire = imsua_sip::compose(message);
        self.outbound.lock().push_back(wire);
        self.handle.mark_writable(true);
        Ok(())
    }

    pub fn await_message(&self, timeout: Option<Duration>) -> Result<Message> {
        let mut inbound = self.shared.inbound.lock();
        loop {
            if let Some(message) = inbound.pop_front() {
                return Ok(message);
            }
            if let Some(err) = self.shared.error.lock().clone() {
                return Err(Error::TransportFailure(err));
            }
            match timeout {
                Some(d) => {
                    let result = self.shared.ready.wait_for(&mut inbound, d);
                    if result.timed_out() {
                        return Err(Error::Timeout);
                    }
                }
                None => self.shared.ready.wait(&mut inbound),
            }
        }
    }

    pub fn close(&self) {
        self.handle.close();
    }
}
