use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("challenge nonce is not valid base64: {0}")]
    BadNonceEncoding(#[from] base64::DecodeError),

    #[error("challenge nonce has length {0}, expected 32 bytes (RAND || AUTN)")]
    BadNonceLength(usize),

    #[error("AKA MAC mismatch: network authentication failed")]
    BadChallenge,
}

pub type Result<T> = std::result::Result<T, Error>;
