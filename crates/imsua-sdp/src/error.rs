use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("malformed SDP line: {0:?}")]
    MalformedLine(String),

    #[error("malformed SDP {field}: {detail}")]
    MalformedField { field: &'static str, detail: String },

    #[error("SDP message has no media description")]
    MissingMedia,

    #[error("SDP media description has no formats")]
    EmptyFormatList,
}

pub type Result<T> = std::result::Result<T, Error>;
