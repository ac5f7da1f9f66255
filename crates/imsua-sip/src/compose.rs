//! Serializes a [`Message`] back to wire bytes. Always emits `Content-Length` (and
//! `Content-Type` when there is a body) itself rather than trusting whatever the caller put in
//! `headers`, since a stale or hand-set length would desync every subsequent message on the
//! same connection.

use crate::headers::{HeaderName, HeaderValue};
use crate::message::{Body, Message};

pub fn compose(message: &Message) -> Vec<u8> {
    let body_text = match &message.body {
        Body::Sdp(sdp) => imsua_sdp::compose(sdp),
        Body::Opaque(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Body::Empty => String::new(),
    };

    let mut out = String::new();
    out.push_str(&message.start_line.to_string());
    out.push_str("\r\n");

    for (name, value) in message.headers.iter() {
        if matches!(name, HeaderName::ContentLength | HeaderName::ContentType) {
            continue;
        }
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&value.to_string());
        out.push_str("\r\n");
    }

    if matches!(message.body, Body::Sdp(_)) {
        out.push_str("Content-Type: application/sdp\r\n");
    } else if let Some(HeaderValue::ContentType(ct)) = message.headers.first(&HeaderName::ContentType) {
        out.push_str("Content-Type: ");
        out.push_str(ct);
        out.push_str("\r\n");
    }

    out.push_str("Content-Length: ");
    out.push_str(&body_text.len().to_string());
    out.push_str("\r\n\r\n");
    out.push_str(&body_text);

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::NameAddr;
    use crate::method::Method;
    use crate::uri::Uri;

    #[test]
    fn composes_request_with_computed_content_length() {
        let msg = Message::request(Method::Register, Uri::parse("sip:ims.example.com").unwrap())
            .with_header(HeaderName::From, HeaderValue::From(NameAddr::new(Uri::parse("sip:alice@example.com").unwrap())))
            .with_header(HeaderName::CallId, HeaderValue::CallId("abc123".to_string()));

        let wire = compose(&msg);
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("REGISTER sip:ims.example.com SIP/2.0\r\n"));
        assert!(text.contains("Content-Length: 0\r\n\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
