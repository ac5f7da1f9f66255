use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] imsua_transport::Error),

    #[error(transparent)]
    Sip(#[from] imsua_sip::Error),

    #[error(transparent)]
    Sdp(#[from] imsua_sdp::Error),

    #[error(transparent)]
    Auth(#[from] imsua_milenage::Error),

    #[error("registration was rejected with status {0}")]
    RegistrationFailed(u16),

    #[error("the peer did not challenge or accept within the expected exchange")]
    UnexpectedResponse { expected: &'static str, status: u16 },

    #[error("INVITE failed with status {0}")]
    InviteFailed(u16),

    #[error("response carried no SDP body")]
    MissingSdpBody,

    #[error("no format in the offer is mutually supported")]
    NoCommonFormat,
}

pub type Result<T> = std::result::Result<T, Error>;
