use thiserror::Error;

/// Errors produced by the reactor itself (not by the sockets it drives).
#[derive(Debug, Error)]
pub enum Error {
    #[error("reactor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registration {0} is closed")]
    Closed(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
