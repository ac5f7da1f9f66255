//! SIP message model and codec: request/response types, the header taxonomy, and a restartable
//! parser suited to a stream transport that may hand back partial reads.

mod compose;
mod error;
mod headers;
mod message;
mod method;
mod parser;
mod uri;

pub use compose::compose;
pub use error::{Error, Result};
pub use headers::{AuthParams, HeaderName, HeaderValue, Headers, NameAddr, Via};
pub use message::{Body, Message, StartLine};
pub use method::Method;
pub use parser::{parse, Outcome};
pub use uri::Uri;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_register_request() {
        let msg = Message::request(Method::Register, Uri::parse("sip:ims.example.com").unwrap())
            .with_header(HeaderName::Via, HeaderValue::Via(Via::new("udp", "192.0.2.5").with_port(5060).with_branch("z9hG4bK1")))
            .with_header(
                HeaderName::From,
                HeaderValue::From(NameAddr::new(Uri::parse("sip:alice@example.com").unwrap()).with_tag("a1")),
            )
            .with_header(HeaderName::To, HeaderValue::To(NameAddr::new(Uri::parse("sip:alice@example.com").unwrap())))
            .with_header(HeaderName::CallId, HeaderValue::CallId("abc123@192.0.2.5".to_string()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: 1, method: Method::Register })
            .with_header(HeaderName::MaxForwards, HeaderValue::MaxForwards(70));

        let wire = compose(&msg);
        let parsed = match parse(&wire).unwrap() {
            Outcome::Parsed { message, consumed } => {
                assert_eq!(consumed, wire.len());
                message
            }
            Outcome::NeedMore => panic!("a fully composed message must parse in one shot"),
        };

        assert_eq!(parsed.method(), Some(&Method::Register));
        assert_eq!(parsed.headers.first(&HeaderName::CallId), msg.headers.first(&HeaderName::CallId));
    }

    #[test]
    fn parser_resumes_across_two_responses_split_mid_body() {
        let one = Message::response(200, "OK")
            .with_header(HeaderName::CallId, HeaderValue::CallId("call-1".to_string()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: 1, method: Method::Options });
        let two = Message::response(200, "OK")
            .with_header(HeaderName::CallId, HeaderValue::CallId("call-2".to_string()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: 2, method: Method::Options });

        let mut combined = compose(&one);
        let second_wire = compose(&two);
        combined.extend_from_slice(&second_wire);

        let split = combined.len() - 4;
        let first_pass = parse(&combined[..split]).unwrap();
        let Outcome::Parsed { message, consumed } = first_pass else {
            panic!("the first message is fully buffered and should parse");
        };
        assert_eq!(message.headers.first(&HeaderName::CallId), Some(&HeaderValue::CallId("call-1".to_string())));

        let remaining = &combined[consumed..split];
        assert!(matches!(parse(remaining).unwrap(), Outcome::NeedMore));

        match parse(&combined[consumed..]).unwrap() {
            Outcome::Parsed { message, .. } => {
                assert_eq!(message.headers.first(&HeaderName::CallId), Some(&HeaderValue::CallId("call-2".to_string())));
            }
            Outcome::NeedMore => panic!("the whole buffer now contains the full second message"),
        }
    }

    #[test]
    fn sdp_body_is_typed_and_content_type_is_derived() {
        let sdp = imsua_sdp::parse(
            "v=0\r\no=- 1 1 IN IP4 192.0.2.5\r\ns=-\r\nc=IN IP4 192.0.2.5\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0\r\n",
        )
        .unwrap();
        let msg = Message::response(200, "OK")
            .with_header(HeaderName::CallId, HeaderValue::CallId("call-3".to_string()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: 1, method: Method::Invite })
            .with_body(Body::Sdp(sdp.clone()));

        let wire = compose(&msg);
        let text = String::from_utf8(wire.clone()).unwrap();
        assert!(text.contains("Content-Type: application/sdp\r\n"));

        match parse(&wire).unwrap() {
            Outcome::Parsed { message, .. } => assert_eq!(message.body, Body::Sdp(sdp)),
            Outcome::NeedMore => panic!("a fully composed message must parse in one shot"),
        }
    }
}
