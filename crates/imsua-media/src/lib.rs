//! The RTP media pipeline: format/port negotiation for a call, the encode/decode pump between a
//! UDP socket and the application's audio source/sink, and the playlist/buffered stream helpers
//! built on top of it.

mod call;
mod error;
mod rtp_stream;
mod stream;

pub use call::{CallHandler, CallSession};
pub use error::{Error, Result};
pub use rtp_stream::RtpStream;
pub use stream::{AudioSink, AudioSource, CallInStream, CallOutStream};

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use imsua_reactor::Reactor;
    use imsua_transport::Transport;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedChunks {
        chunks: std::collections::VecDeque<Bytes>,
    }

    impl AudioSource for FixedChunks {
        fn recv_chunk(&mut self) -> Option<Bytes> {
            self.chunks.pop_front()
        }
    }

    struct CollectSink {
        received: Arc<parking_lot::Mutex<Vec<Bytes>>>,
    }

    impl AudioSink for CollectSink {
        fn write_chunk(&mut self, chunk: Bytes) -> bool {
            self.received.lock().push(chunk);
            true
        }
    }

    #[test]
    fn outbound_offer_advertises_every_registered_format() {
        let (reactor, _join) = Reactor::spawn(Some(Duration::from_millis(5))).unwrap();
        let transport = Transport::new(reactor);
        let bind_ip: IpAddr = "127.0.0.1".parse().unwrap();

        let caller = CallHandler::new(transport, bind_ip);
        let (offer, _socket) = caller.build_offer().unwrap();

        let audio = offer.audio().unwrap();
        assert_eq!(audio.formats, vec![0, 8]);
        assert!(audio.rtpmap(0).is_some());
        assert!(audio.rtpmap(8).is_some());
    }

    #[test]
    fn call_roundtrips_audio_between_two_negotiated_endpoints() {
        let (reactor, _join) = Reactor::spawn(Some(Duration::from_millis(5))).unwrap();
        let transport = Transport::new(reactor);
        let bind_ip: IpAddr = "127.0.0.1".parse().unwrap();

        let caller = CallHandler::new(transport.clone(), bind_ip);
        let callee = CallHandler::new(transport, bind_ip);

        let (offer, caller_socket) = caller.build_offer().unwrap();

        let callee_received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let callee_source = FixedChunks { chunks: std::collections::VecDeque::new() };
        let callee_sink = CollectSink { received: callee_received.clone() };
        let (answer, mut callee_session) = callee
            .accept_offer(&offer, Box::new(callee_source), Box::new(callee_sink), || {})
            .unwrap();

        let caller_received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let caller_source = FixedChunks {
            chunks: std::collections::VecDeque::from([Bytes::from_static(&[0u8; 320])]),
        };
        let caller_sink = CollectSink { received: caller_received.clone() };
        let send_done = Arc::new(AtomicBool::new(false));
        let send_done_clone = send_done.clone();
        let mut caller_session = caller
            .accept_answer(caller_socket, &answer, Box::new(caller_source), Box::new(caller_sink), move || {
                send_done_clone.store(true, Ordering::SeqCst);
            })
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while callee_received.lock().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(callee_received.lock().len(), 1);
        assert_eq!(callee_received.lock()[0].len(), 320);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !send_done.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(send_done.load(Ordering::SeqCst));

        caller_session.stop();
        callee_session.stop();
    }
}
