//! `Via: SIP/2.0/<transport> <host>[:<port>];branch=...[;rport][;received=...]`

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    pub branch: Option<String>,
    /// `None` if the `rport` param is absent, `Some(None)` if present without a value
    /// (what a client sends), `Some(Some(port))` once a server has filled it in.
    pub rport: Option<Option<u16>>,
    pub received: Option<String>,
    pub params: Vec<(String, String)>,
}

impl Via {
    pub fn new(transport: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port: None,
            branch: None,
            rport: None,
            received: None,
            params: Vec::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let malformed = || Error::MalformedHeader { header: "Via", detail: input.to_string() };

        let mut parts = input.splitn(2, char::is_whitespace);
        let proto = parts.next().ok_or_else(malformed)?;
        let rest = parts.next().ok_or_else(malformed)?.trim();
        let transport = proto.rsplit('/').next().ok_or_else(malformed)?.to_string();

        let mut segments = rest.split(';');
        let sent_by = segments.next().ok_or_else(malformed)?.trim();
        let (host, port) = match sent_by.rsplit_once(':') {
            Some((h, p)) => (h.to_string(), p.parse::<u16>().ok()),
            None => (sent_by.to_string(), None),
        };

        let mut via = Via {
            transport,
            host,
            port,
            branch: None,
            rport: None,
            received: None,
            params: Vec::new(),
        };

        for segment in segments {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match segment.split_once('=') {
                Some(("branch", v)) => via.branch = Some(v.to_string()),
                Some(("received", v)) => via.received = Some(v.to_string()),
                Some(("rport", v)) => via.rport = Some(v.parse().ok()),
                Some((name, value)) => via.params.push((name.to_string(), value.to_string())),
                None if segment == "rport" => via.rport = Some(None),
                None => via.params.push((segment.to_string(), String::new())),
            }
        }

        Ok(via)
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport.to_uppercase(), self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, ";branch={}", branch)?;
        }
        match &self.rport {
            Some(Some(port)) => write!(f, ";rport={}", port)?,
            Some(None) => write!(f, ";rport")?,
            None => {}
        }
        if let Some(received) = &self.received {
            write!(f, ";received={}", received)?;
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
    fn parses_client_via_with_bare_rport() {
        let via = Via::parse("SIP/2.0/UDP 192.0.2.5:5060;branch=z9hG4bK776asdhds;rport").unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.host, "192.0.2.5");
        assert_eq!(via.port, Some(5060));
        assert_eq!(via.branch.as_deref(), Some("z9hG4bK776asdhds"));
        assert_eq!(via.rport, Some(None));
    }

    #[test]
    fn round_trips_server_filled_via() {
        let mut via = Via::new("tcp", "ims.example.com").with_port(5060).with_branch("z9hG4bK1");
        via.rport = Some(Some(35000));
        via.received = Some("198.51.100.9".to_string());
        let text = via.to_string();
        let parsed = Via::parse(&text).unwrap();
        assert_eq!(parsed, via);
    }
}
