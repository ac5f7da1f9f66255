//! Session Description Protocol types and codec, scoped to the single-audio-stream offer/answer
//! this IMS client negotiates (§4.E of the design).

mod compose;
mod error;
mod parser;
mod types;

pub use compose::compose;
pub use error::{Error, Result};
pub use parser::parse;
pub use types::{Attribute, Bandwidth, Connection, MediaDescription, Origin, SdpMessage, Timing};

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_offer() -> SdpMessage {
        SdpMessage {
            version: 0,
            origin: Origin {
                username: "-".to_string(),
                session_id: "123456".to_string(),
                session_version: "1".to_string(),
                nettype: "IN".to_string(),
                addrtype: "IP4".to_string(),
                address: "192.0.2.10".to_string(),
            },
            session_name: "-".to_string(),
            connection: Some(Connection {
                nettype: "IN".to_string(),
                addrtype: "IP4".to_string(),
                address: "192.0.2.10".to_string(),
            }),
            bandwidths: Vec::new(),
            timing: Timing { start: 0, stop: 0 },
            attributes: Vec::new(),
            media: vec![{
                let mut m = MediaDescription::new_audio(40000, vec![0, 8]);
                m.attributes.push(Attribute::Rtcp { port: 40001 });
                m.attributes.push(Attribute::SendRecv);
                m.attributes.push(Attribute::Ptime(20));
                m.attributes.push(Attribute::RtpMap {
                    payload_type: 0,
                    encoding: "PCMU".to_string(),
                    clock_rate: 8000,
                    channels: None,
                });
                m.attributes.push(Attribute::RtpMap {
                    payload_type: 8,
                    encoding: "PCMA".to_string(),
                    clock_rate: 8000,
                    channels: None,
                });
                m
            }],
        }
    }

    #[test]
    fn round_trips_an_audio_offer() {
        let offer = sample_offer();
        let wire = compose(&offer);
        let parsed = parse(&wire).unwrap();
        assert_eq!(parsed, offer);
    }

    #[test]
    fn preserves_attribute_order() {
        let offer = sample_offer();
        let wire = compose(&offer);
        let parsed = parse(&wire).unwrap();
        let audio = parsed.audio().unwrap();
        let names: Vec<String> = audio.attributes.iter().map(|a| a.to_string()).collect();
        assert_eq!(names[0], "rtcp:40001");
        assert_eq!(names[1], "sendrecv");
        assert_eq!(names[2], "ptime:20");
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let body = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\ni=some session info\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\n";
        let parsed = parse(body).unwrap();
        assert_eq!(parsed.audio().unwrap().formats, vec![0]);
    }

    #[test]
    fn rtpmap_and_fmtp_parse_together() {
        let body = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nc=IN IP4 127.0.0.1\r\nt=0 0\r\nm=audio 4000 RTP/AVP 8\r\na=rtpmap:8 PCMA/8000\r\na=fmtp:8 annexb=no\r\n";
        let parsed = parse(body).unwrap();
        let audio = parsed.audio().unwrap();
        assert_eq!(audio.fmtp(8), Some("annexb=no"));
        assert!(matches!(audio.rtpmap(8), Some(Attribute::RtpMap { encoding, .. }) if encoding == "PCMA"));
    }
}
