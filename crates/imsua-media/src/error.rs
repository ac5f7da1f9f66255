use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] imsua_transport::Error),

    #[error(transparent)]
    Rtp(#[from] imsua_rtp::Error),

    #[error(transparent)]
    Sdp(#[from] imsua_sdp::Error),

    #[error("no format in the offer is mutually supported")]
    NoCommonFormat,

    #[error("no free UDP port found in the call media port range")]
    NoFreePort,
}

pub type Result<T> = std::result::Result<T, Error>;
