//! Programmatic client configuration. No file or environment parsing happens in this crate; an
//! embedding application that wants TOML/JSON/env loading derives it from `ClientConfig`'s own
//! `serde::Deserialize` impl with whatever tooling it likes.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::account::Account;

/// Which transport carries the SIP dialog. `Via`'s transport token is taken verbatim from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub account: Account,
    pub server: SocketAddr,
    pub local_bind: IpAddr,
    pub transport: TransportKind,
    pub register_expires: u32,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(account: Account, server: SocketAddr, local_bind: IpAddr) -> Self {
        Self {
            account,
            server,
            local_bind,
            transport: TransportKind::Udp,
            register_expires: 1800,
            user_agent: "imsua/0.1".to_string(),
        }
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_register_expires(mut self, expires: u32) -> Self {
        self.register_expires = expires;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
