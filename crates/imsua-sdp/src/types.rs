//! SDP field and attribute taxonomies (RFC 8866-shaped, scoped to what an audio offer/answer
//! needs). Each field kind is a concrete struct/enum rather than a generic string map, but the
//! message preserves the insertion order of repeatable fields (`b=`, `a=`) exactly.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: String,
    pub session_version: String,
    pub nettype: String,
    pub addrtype: String,
    pub address: String,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username, self.session_id, self.session_version, self.nettype, self.addrtype, self.address
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub nettype: String,
    pub addrtype: String,
    pub address: String,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.nettype, self.addrtype, self.address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub start: u64,
    pub stop: u64,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.start, self.stop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    pub bwtype: String,
    pub value: u64,
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bwtype, self.value)
    }
}

/// One `a=` line. Known attribute kinds get their own variant; everything else round-trips
/// through [`Attribute::Custom`] keeping the exact name and (if any) value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    RtpMap {
        payload_type: u8,
        encoding: String,
        clock_rate: u32,
        channels: Option<u32>,
    },
    Fmtp {
        payload_type: u8,
        params: String,
    },
    Rtcp {
        port: u16,
    },
    Ptime(u32),
    MaxPtime(u32),
    SendRecv,
    RecvOnly,
    SendOnly,
    Inactive,
    Custom {
        name: String,
        value: Option<String>,
    },
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::RtpMap {
                payload_type,
                encoding,
                clock_rate,
                channels,
            } => {
                write!(f, "rtpmap:{} {}/{}", payload_type, encoding, clock_rate)?;
                if let Some(channels) = channels {
                    write!(f, "/{}", channels)?;
                }
                Ok(())
            }
            Attribute::Fmtp { payload_type, params } => write!(f, "fmtp:{} {}", payload_type, params),
            Attribute::Rtcp { port } => write!(f, "rtcp:{}", port),
            Attribute::Ptime(v) => write!(f, "ptime:{}", v),
            Attribute::MaxPtime(v) => write!(f, "maxptime:{}", v),
            Attribute::SendRecv => write!(f, "sendrecv"),
            Attribute::RecvOnly => write!(f, "recvonly"),
            Attribute::SendOnly => write!(f, "sendonly"),
            Attribute::Inactive => write!(f, "inactive"),
            Attribute::Custom { name, value: Some(v) } => write!(f, "{}:{}", name, v),
            Attribute::Custom { name, value: None } => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub protocol: String,
    pub formats: Vec<u8>,
    pub connection: Option<Connection>,
    pub bandwidths: Vec<Bandwidth>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    pub fn new_audio(port: u16, formats: Vec<u8>) -> Self {
        Self {
            media: "audio".to_string(),
            port,
            protocol: "RTP/AVP".to_string(),
            formats,
            connection: None,
            bandwidths: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn rtpmap(&self, payload_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| matches!(a, Attribute::RtpMap { payload_type: pt, .. } if *pt == payload_type))
    }

    pub fn fmtp(&self, payload_type: u8) -> Option<&str> {
        self.attributes.iter().find_map(|a| match a {
            Attribute::Fmtp { payload_type: pt, params } if *pt == payload_type => Some(params.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpMessage {
    pub version: u32,
    pub origin: Origin,
    pub session_name: String,
    pub connection: Option<Connection>,
    pub bandwidths: Vec<Bandwidth>,
    pub timing: Timing,
    pub attributes: Vec<Attribute>,
    pub media: Vec<MediaDescription>,
}

impl SdpMessage {
    /// The first (and, for this client, only) audio media description.
    pub fn audio(&self) -> Option<&MediaDescription> {
        self.media.iter().find(|m| m.media == "audio")
    }
}
