//! Encodes a local [`AudioSource`] into outbound RTP packets and decodes inbound ones into a
//! local [`AudioSink`], for one negotiated media format on one UDP socket.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use imsua_rtp::{MediaFormat, RtpPacket};
use imsua_transport::UdpSocket;
use rand::RngCore;

use crate::stream::{AudioSink, AudioSource};

const RECV_POLL: Duration = Duration::from_millis(200);

struct Shared {
    stopped: AtomicBool,
    sequence: AtomicU16,
    timestamp: AtomicU32,
}

/// Owns the socket and drives two threads: one pulling PCM from `source` and sending RTP, one
/// receiving RTP and pushing decoded PCM into `sink`. Dropping the handle does not stop the
/// threads; call [`RtpStream::stop`] for that.
pub struct RtpStream {
    shared: Arc<Shared>,
    send_thread: Option<JoinHandle<()>>,
    recv_thread: Option<JoinHandle<()>>,
}

impl RtpStream {
    /// Starts the pump threads immediately. `on_send_complete` fires once, from the send thread,
    /// when `source` is exhausted.
    pub fn start(
        socket: UdpSocket,
        remote: std::net::SocketAddr,
        format: MediaFormat,
        mut source: Box<dyn AudioSource>,
        mut sink: Box<dyn AudioSink>,
        on_send_complete: impl FnOnce() + Send + 'static,
    ) -> Self {
        let ssrc = rand::thread_rng().next_u32();
        let shared = Arc::new(Shared {
            stopped: AtomicBool::new(false),
            sequence: AtomicU16::new((rand::thread_rng().next_u32() & 0xFFFF) as u16),
            timestamp: AtomicU32::new(rand::thread_rng().next_u32()),
        });

        let socket = Arc::new(socket);
        let send_socket = socket.clone();
        let send_shared = shared.clone();
        let send_thread = std::thread::spawn(move || {
            while !send_shared.stopped.load(Ordering::Acquire) {
                let Some(pcm) = source.recv_chunk() else {
                    on_send_complete();
                    break;
                };
                let payload = format.encode(&pcm);
                let seq = send_shared.sequence.fetch_add(1, Ordering::Relaxed);
                let ts = send_shared
                    .timestamp
                    .fetch_add(payload.len() as u32, Ordering::Relaxed);
                let packet = RtpPacket::new(format.rtp_payload_type, seq, ts, ssrc, Bytes::from(payload));
                send_socket.send_to(remote, packet.compose());
            }
        });

        let recv_socket = socket;
        let recv_shared = shared.clone();
        let recv_thread = std::thread::spawn(move || {
            while !recv_shared.stopped.load(Ordering::Acquire) {
                let (from, datagram) = match recv_socket.recv_from(Some(RECV_POLL)) {
                    Ok(received) => received,
                    Err(imsua_transport::Error::Timeout) => continue,
                    Err(err) => {
                        tracing::debug!(error = %err, "imsua_media: RTP socket closed, stopping receive pump");
                        break;
                    }
                };
                if from != remote {
                    continue;
                }
                let packet = match RtpPacket::parse(&datagram) {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::debug!(error = %err, "imsua_media: dropping unparseable RTP packet");
                        continue;
                    }
                };
                if packet.payload_type != format.rtp_payload_type {
                    continue; // not the negotiated format, drop
                }
                let pcm = format.decode(&packet.payload);
                if !sink.write_chunk(Bytes::from(pcm)) {
                    recv_shared.stopped.store(true, Ordering::Release);
                    break;
                }
            }
        });

        Self {
            shared,
            send_thread: Some(send_thread),
            recv_thread: Some(recv_thread),
        }
    }

    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.send_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.recv_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RtpStream {
    fn drop(&mut self) {
        self.stop();
    }
}
