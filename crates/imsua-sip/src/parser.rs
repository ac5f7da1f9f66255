//! Restartable message framing: `parse` is handed whatever bytes a transport has buffered so
//! far and reports either that it needs more, or a complete message plus how many bytes it
//! consumed. Callers are expected to loop, draining the buffer until `NeedMore`.

use crate::error::{Error, Result};
use crate::headers::{HeaderName, HeaderValue, Headers};
use crate::message::{Body, Message, StartLine};
use crate::method::Method;
use crate::uri::Uri;

#[derive(Debug)]
pub enum Outcome {
    NeedMore,
    Parsed { message: Message, consumed: usize },
}

pub fn parse(buf: &[u8]) -> Result<Outcome> {
    let Some(header_end) = find_double_crlf(buf) else {
        return Ok(Outcome::NeedMore);
    };

    let header_block = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| Error::MalformedStartLine("non-UTF-8 header block".to_string()))?;
    let mut lines = header_block.split("\r\n");

    let start_line_text = lines.next().unwrap_or("");
    let start_line = parse_start_line(start_line_text)?;

    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            return Err(Error::FoldedHeader(line.to_string()));
        }
        let (name, body) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedHeaderLine(line.to_string()))?;
        let name: HeaderName = name.trim().parse().unwrap_or_else(|_: std::convert::Infallible| unreachable!());
        let value = HeaderValue::parse(&name, body)?;
        headers.push(name, value);
    }

    let content_length = match headers.first(&HeaderName::ContentLength) {
        Some(HeaderValue::ContentLength(n)) => *n,
        _ => 0,
    };

    let body_start = header_end + 4;
    let total = body_start + content_length;
    if buf.len() < total {
        return Ok(Outcome::NeedMore);
    }

    let body_bytes = &buf[body_start..total];
    let is_sdp = matches!(
        headers.first(&HeaderName::ContentType),
        Some(HeaderValue::ContentType(ct)) if ct.eq_ignore_ascii_case("application/sdp")
    );
    let body = if body_bytes.is_empty() {
        Body::Empty
    } else if is_sdp {
        let text = std::str::from_utf8(body_bytes)
            .map_err(|_| Error::ContentLengthMismatch { expected: content_length, actual: body_bytes.len() })?;
        Body::Sdp(imsua_sdp::parse(text)?)
    } else {
        Body::Opaque(body_bytes.to_vec())
    };

    Ok(Outcome::Parsed {
        message: Message { start_line, headers, body },
        consumed: total,
    })
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_start_line(line: &str) -> Result<StartLine> {
    if let Some(rest) = line.strip_prefix("SIP/2.0 ") {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let status: u16 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::MalformedStartLine(line.to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();
        return Ok(StartLine::Response { status, reason });
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| Error::MalformedStartLine(line.to_string()))?;
    let uri_text = parts.next().ok_or_else(|| Error::MalformedStartLine(line.to_string()))?;
    let version = parts.next().ok_or_else(|| Error::MalformedStartLine(line.to_string()))?;
    if version != "SIP/2.0" {
        return Err(Error::UnsupportedVersion(version.to_string()));
    }
    let method: Method = method.parse().unwrap_or_else(|_: std::convert::Infallible| unreachable!());
    let uri = Uri::parse(uri_text)?;
    Ok(StartLine::Request { method, uri })
}
