use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("RTP packet is shorter than the fixed 12-byte header: {0} bytes")]
    TooShort(usize),

    #[error("unsupported RTP version {0} (only version 2 is accepted)")]
    UnsupportedVersion(u8),

    #[error("RTP extension bit is set but this implementation does not read extensions")]
    ExtensionUnsupported,

    #[error("invalid RTP padding length {pad_len} for a payload of {remaining} bytes")]
    InvalidPadding { pad_len: usize, remaining: usize },

    #[error("unknown RTP payload type {0}")]
    UnknownPayloadType(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
