use std::fmt;

use crate::headers::Headers;
use crate::method::Method;
use crate::uri::Uri;

#[derive(Debug, Clone, PartialEq)]
pub enum StartLine {
    Request { method: Method, uri: Uri },
    Response { status: u16, reason: String },
}

impl StartLine {
    pub fn is_request(&self) -> bool {
        matches!(self, StartLine::Request { .. })
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Request { method, uri } => write!(f, "{} {} SIP/2.0", method, uri),
            StartLine::Response { status, reason } => write!(f, "SIP/2.0 {} {}", status, reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Sdp(imsua_sdp::SdpMessage),
    Opaque(Vec<u8>),
    Empty,
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Body::Sdp(_) => 0, // recomputed at compose time from the rendered text
            Body::Opaque(bytes) => bytes.len(),
            Body::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty) || (matches!(self, Body::Opaque(b) if b.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: Body,
}

impl Message {
    pub fn request(method: Method, uri: Uri) -> Self {
        Self {
            start_line: StartLine::Request { method, uri },
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    pub fn response(status: u16, reason: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Response { status, reason: reason.into() },
            headers: Headers::new(),
            body: Body::Empty,
        }
    }

    pub fn with_header(mut self, name: crate::headers::HeaderName, value: crate::headers::HeaderValue) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }
}
