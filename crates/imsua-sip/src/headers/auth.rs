//! Digest-scheme parameters carried by `Authorization` and `WWW-Authenticate`, shared because
//! both headers are a scheme token followed by the same `name=value` comma list.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthParams {
    pub scheme: String,
    pub username: Option<String>,
    pub realm: Option<String>,
    pub nonce: Option<String>,
    pub uri: Option<String>,
    pub response: Option<String>,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub cnonce: Option<String>,
    pub nc: Option<String>,
    pub opaque: Option<String>,
    pub stale: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl AuthParams {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), ..Default::default() }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let malformed = || Error::MalformedHeader { header: "Authorization", detail: input.to_string() };

        let mut parts = input.splitn(2, char::is_whitespace);
        let scheme = parts.next().ok_or_else(malformed)?.to_string();
        let rest = parts.next().unwrap_or("").trim();

        let mut auth = AuthParams::new(scheme);
        for field in split_params(rest) {
            let (name, value) = field.split_once('=').ok_or_else(malformed)?;
            let name = name.trim();
            let value = value.trim().trim_matches('"');
            match name {
                "username" => auth.username = Some(value.to_string()),
                "realm" => auth.realm = Some(value.to_string()),
                "nonce" => auth.nonce = Some(value.to_string()),
                "uri" => auth.uri = Some(value.to_string()),
                "response" => auth.response = Some(value.to_string()),
                "algorithm" => auth.algorithm = Some(value.to_string()),
                "qop" => auth.qop = Some(value.to_string()),
                "cnonce" => auth.cnonce = Some(value.to_string()),
                "nc" => auth.nc = Some(value.to_string()),
                "opaque" => auth.opaque = Some(value.to_string()),
                "stale" => auth.stale = Some(value.to_string()),
                other => auth.extra.push((other.to_string(), value.to_string())),
            }
        }
        Ok(auth)
    }
}

/// Splits on top-level commas, respecting double-quoted values that may themselves contain commas.
fn split_params(input: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(input[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = input[start..].trim();
    if !tail.is_empty() {
        fields.push(tail);
    }
    fields
}

impl fmt::Display for AuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.scheme)?;
        let mut fields = Vec::new();
        if let Some(v) = &self.username {
            fields.push(format!("username=\"{}\"", v));
        }
        if let Some(v) = &self.realm {
            fields.push(format!("realm=\"{}\"", v));
        }
        if let Some(v) = &self.nonce {
            fields.push(format!("nonce=\"{}\"", v));
        }
        if let Some(v) = &self.uri {
            fields.push(format!("uri=\"{}\"", v));
        }
        if let Some(v) = &self.response {
            fields.push(format!("response=\"{}\"", v));
        }
        if let Some(v) = &self.algorithm {
            fields.push(format!("algorithm={}", v));
        }
        if let Some(v) = &self.cnonce {
            fields.push(format!("cnonce=\"{}\"", v));
        }
        if let Some(v) = &self.qop {
            fields.push(format!("qop={}", v));
        }
        if let Some(v) = &self.nc {
            fields.push(format!("nc={}", v));
        }
        if let Some(v) = &self.opaque {
            fields.push(format!("opaque=\"{}\"", v));
        }
        if let Some(v) = &self.stale {
            fields.push(format!("stale={}", v));
        }
        for (name, value) in &self.extra {
            fields.push(format!("{}=\"{}\"", name, value));
        }
        write!(f, "{}", fields.join(", "))
    }
}
