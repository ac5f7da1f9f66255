use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Reactor(#[from] imsua_reactor::Error),

    #[error("malformed SIP message on the wire: {0}")]
    Parse(#[from] imsua_sip::Error),

    #[error("timed out waiting for a message")]
    Timeout,

    #[error("transport failure: {0}")]
    TransportFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
