use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed SIP start line: {0:?}")]
    MalformedStartLine(String),

    #[error("malformed SIP header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("malformed SIP URI: {0:?}")]
    MalformedUri(String),

    #[error("malformed {header} header: {detail}")]
    MalformedHeader { header: &'static str, detail: String },

    #[error("folded header lines are not supported: {0:?}")]
    FoldedHeader(String),

    #[error("Content-Length mismatch: header said {expected}, body is {actual} bytes")]
    ContentLengthMismatch { expected: usize, actual: usize },

    #[error("unsupported SIP version: {0:?}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Sdp(#[from] imsua_sdp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
