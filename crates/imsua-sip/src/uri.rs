//! A pragmatic SIP URI: `sip:[user@]host[:port][;param=value...]`. Good enough for the
//! Request-URI, `From`/`To`/`Contact` address-of-record, and `Via` `sent-by` this client needs;
//! it does not attempt the full RFC 3261 URI grammar (headers component, escaping, `sips:`/`tel:`
//! schemes are accepted as opaque scheme tokens but not specially interpreted).

use std::fmt;

use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::opt;
use nom::multi::many0;
use nom::sequence::{pair, preceded};
use nom::IResult;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<(String, String)>,
}

impl Uri {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn parse(input: &str) -> Result<Self> {
        fn is_scheme_char(c: char) -> bool {
            c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'
        }
        fn is_user_char(c: char) -> bool {
            !matches!(c, '@' | ':' | ';' | ' ')
        }
        fn is_host_char(c: char) -> bool {
            !matches!(c, ':' | ';' | ' ')
        }
        fn is_param_char(c: char) -> bool {
            !matches!(c, ';' | '=' | ' ')
        }

        fn parse_param(input: &str) -> IResult<&str, (String, String)> {
            let (input, _) = char(';')(input)?;
            let (input, name) = take_while1(is_param_char)(input)?;
            let (input, value) = opt(preceded(char('='), take_while(is_param_char)))(input)?;
            Ok((input, (name.to_string(), value.unwrap_or("").to_string())))
        }

        fn parse_all(input: &str) -> IResult<&str, Uri> {
            let (input, scheme) = take_while1(is_scheme_char)(input)?;
            let (input, _) = tag(":")(input)?;
            let (input, user) = opt(pair(take_while1(is_user_char), char('@')))(input)?;
            let (input, host) = take_while1(is_host_char)(input)?;
            let (input, port) = opt(preceded(char(':'), take_while1(|c: char| c.is_ascii_digit())))(input)?;
            let (input, params) = many0(parse_param)(input)?;
            Ok((
                input,
                Uri {
                    scheme: scheme.to_string(),
                    user: user.map(|(u, _)| u.to_string()),
                    host: host.to_string(),
                    port: port.and_then(|p| p.parse().ok()),
                    params,
                },
            ))
        }

        match parse_all(input) {
            Ok((rest, uri)) if rest.is_empty() => Ok(uri),
            _ => Err(Error::MalformedUri(input.to_string())),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            if value.is_empty() {
                write!(f, ";{}", name)?;
            } else {
                write!(f, ";{}={}", name, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port() {
        let uri = Uri::parse("sip:alice@ims.example.com:5060").unwrap();
        assert_eq!(uri.scheme, "sip");
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host, "ims.example.com");
        assert_eq!(uri.port, Some(5060));
    }

    #[test]
    fn round_trips_with_params() {
        let text = "sip:bob@192.0.2.1;transport=udp;gr";
        let uri = Uri::parse(text).unwrap();
        assert_eq!(uri.to_string(), text);
        assert_eq!(uri.param("transport"), Some("udp"));
        assert_eq!(uri.param("gr"), Some(""));
    }

    #[test]
    fn host_only_uri() {
        let uri = Uri::parse("sip:ims.mnc001.mcc001.3gppnetwork.org").unwrap();
        assert_eq!(uri.user, None);
        assert_eq!(uri.host, "ims.mnc001.mcc001.3gppnetwork.org");
    }
}
