//! Facade over the IMS user-agent stack: an [`Account`]'s subscriber secrets, a [`ClientConfig`]
//! describing where and how to connect, and a [`Client`] wiring reactor, transport, session, and
//! media together.
//!
//! The sub-crates remain independently usable; this crate only adds the glue and the
//! programmatic configuration layer described for embedding applications.

mod account;
mod client;
mod config;
mod error;

pub use account::{Account, OperatorKey};
pub use client::Client;
pub use config::{ClientConfig, TransportKind};
pub use error::{Error, Result};

pub use imsua_media::{AudioSink, AudioSource, CallHandler, CallInStream, CallOutStream, CallSession};
pub use imsua_milenage::SubscriberKeys;
pub use imsua_rtp::{FormatRegistry, MediaFormat};
pub use imsua_sdp::SdpMessage;
pub use imsua_session::Session;
pub use imsua_sip::{Method, Uri};
