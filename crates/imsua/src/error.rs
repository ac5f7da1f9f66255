use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] imsua_transport::Error),

    #[error(transparent)]
    Session(#[from] imsua_session::Error),

    #[error(transparent)]
    Media(#[from] imsua_media::Error),

    #[error(transparent)]
    Reactor(#[from] imsua_reactor::Error),

    #[error(transparent)]
    Sip(#[from] imsua_sip::Error),

    #[error("no active call to hang up")]
    NoActiveCall,
}

pub type Result<T> = std::result::Result<T, Error>;
