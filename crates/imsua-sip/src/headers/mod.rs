//! Header taxonomy: a small set of headers this client actually inspects get typed values;
//! everything else round-trips as an opaque string under [`HeaderValue::Custom`].

mod auth;
mod name_addr;
mod via;

pub use auth::AuthParams;
pub use name_addr::NameAddr;
pub use via::Via;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::method::Method;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeaderName {
    Via,
    From,
    To,
    CallId,
    CSeq,
    MaxForwards,
    Contact,
    ContentType,
    ContentLength,
    Expires,
    Authorization,
    WwwAuthenticate,
    RecordRoute,
    Route,
    Custom(String),
}

impl HeaderName {
    pub fn as_str(&self) -> &str {
        match self {
            HeaderName::Via => "Via",
            HeaderName::From => "From",
            HeaderName::To => "To",
            HeaderName::CallId => "Call-ID",
            HeaderName::CSeq => "CSeq",
            HeaderName::MaxForwards => "Max-Forwards",
            HeaderName::Contact => "Contact",
            HeaderName::ContentType => "Content-Type",
            HeaderName::ContentLength => "Content-Length",
            HeaderName::Expires => "Expires",
            HeaderName::Authorization => "Authorization",
            HeaderName::WwwAuthenticate => "WWW-Authenticate",
            HeaderName::RecordRoute => "Record-Route",
            HeaderName::Route => "Route",
            HeaderName::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeaderName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "via" | "v" => HeaderName::Via,
            "from" | "f" => HeaderName::From,
            "to" | "t" => HeaderName::To,
            "call-id" | "i" => HeaderName::CallId,
            "cseq" => HeaderName::CSeq,
            "max-forwards" => HeaderName::MaxForwards,
            "contact" | "m" => HeaderName::Contact,
            "content-type" | "c" => HeaderName::ContentType,
            "content-length" | "l" => HeaderName::ContentLength,
            "expires" => HeaderName::Expires,
            "authorization" => HeaderName::Authorization,
            "www-authenticate" => HeaderName::WwwAuthenticate,
            "record-route" => HeaderName::RecordRoute,
            "route" => HeaderName::Route,
            _ => HeaderName::Custom(s.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Via(Via),
    From(NameAddr),
    To(NameAddr),
    CallId(String),
    CSeq { seq: u32, method: Method },
    MaxForwards(u32),
    Contact(NameAddr),
    ContentType(String),
    ContentLength(usize),
    Expires(u32),
    Authorization(AuthParams),
    WwwAuthenticate(AuthParams),
    RecordRoute(NameAddr),
    Route(NameAddr),
    Custom(String),
}

impl HeaderValue {
    /// Parse the header body against the typed shape implied by `name`, falling back to
    /// [`HeaderValue::Custom`] for anything that doesn't parse as its typed form.
    pub fn parse(name: &HeaderName, body: &str) -> Result<Self> {
        let body = body.trim();
        Ok(match name {
            HeaderName::Via => HeaderValue::Via(Via::parse(body)?),
            HeaderName::From => HeaderValue::From(NameAddr::parse(body)?),
            HeaderName::To => HeaderValue::To(NameAddr::parse(body)?),
            HeaderName::CallId => HeaderValue::CallId(body.to_string()),
            HeaderName::CSeq => {
                let mut parts = body.splitn(2, char::is_whitespace);
                let seq = parts
                    .next()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::MalformedHeader { header: "CSeq", detail: body.to_string() })?;
                let method = parts
                    .next()
                    .ok_or_else(|| Error::MalformedHeader { header: "CSeq", detail: body.to_string() })?
                    .parse()
                    .unwrap_or_else(|_: std::convert::Infallible| unreachable!());
                HeaderValue::CSeq { seq, method }
            }
            HeaderName::MaxForwards => HeaderValue::MaxForwards(
                body.parse()
                    .map_err(|_| Error::MalformedHeader { header: "Max-Forwards", detail: body.to_string() })?,
            ),
            HeaderName::Contact => HeaderValue::Contact(NameAddr::parse(body)?),
            HeaderName::ContentType => HeaderValue::ContentType(body.to_string()),
            HeaderName::ContentLength => HeaderValue::ContentLength(
                body.parse()
                    .map_err(|_| Error::MalformedHeader { header: "Content-Length", detail: body.to_string() })?,
            ),
            HeaderName::Expires => HeaderValue::Expires(
                body.parse()
                    .map_err(|_| Error::MalformedHeader { header: "Expires", detail: body.to_string() })?,
            ),
            HeaderName::Authorization => HeaderValue::Authorization(AuthParams::parse(body)?),
            HeaderName::WwwAuthenticate => HeaderValue::WwwAuthenticate(AuthParams::parse(body)?),
            HeaderName::RecordRoute => HeaderValue::RecordRoute(NameAddr::parse(body)?),
            HeaderName::Route => HeaderValue::Route(NameAddr::parse(body)?),
            HeaderName::Custom(_) => HeaderValue::Custom(body.to_string()),
        })
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Via(v) => write!(f, "{}", v),
            HeaderValue::From(v) | HeaderValue::To(v) | HeaderValue::Contact(v) => write!(f, "{}", v),
            HeaderValue::RecordRoute(v) | HeaderValue::Route(v) => write!(f, "{}", v),
            HeaderValue::CallId(v) => write!(f, "{}", v),
            HeaderValue::CSeq { seq, method } => write!(f, "{} {}", seq, method),
            HeaderValue::MaxForwards(v) => write!(f, "{}", v),
            HeaderValue::ContentType(v) => write!(f, "{}", v),
            HeaderValue::ContentLength(v) => write!(f, "{}", v),
            HeaderValue::Expires(v) => write!(f, "{}", v),
            HeaderValue::Authorization(v) => write!(f, "{}", v),
            HeaderValue::WwwAuthenticate(v) => write!(f, "{}", v),
            HeaderValue::Custom(v) => write!(f, "{}", v),
        }
    }
}

/// Insertion-ordered, multi-valued header list. Headers like `Via` and `Route` may legally
/// repeat; order among repeats is semantically load-bearing (routing, Via unwinding) and is
/// preserved exactly as received.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(HeaderName, HeaderValue)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.push((name, value));
    }

    /// Drops any existing values for `name` and pushes `value` in their place. For
    /// single-valued headers (`Expires`, `CSeq`, ...) where a caller wants to override a
    /// previously-set default rather than add a second copy.
    pub fn replace(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.retain(|(n, _)| *n != name);
        self.0.push((name, value));
    }

    pub fn first(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn all<'a>(&'a self, name: &'a HeaderName) -> impl Iterator<Item = &'a HeaderValue> {
        self.0.iter().filter(move |(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HeaderName, HeaderValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
