//! Negotiates a media format and RTP port for one call and wires up the [`RtpStream`] pump.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};

use imsua_rtp::{FormatRegistry, MediaFormat};
use imsua_sdp::{Attribute, Connection, MediaDescription, Origin, SdpMessage, Timing};
use imsua_transport::Transport;
use rand::Rng;

use crate::error::{Error, Result};
use crate::rtp_stream::RtpStream;
use crate::stream::{AudioSink, AudioSource};

const PORT_RANGE_LOW: u16 = 40_000;
const PORT_RANGE_HIGH: u16 = 50_000;
const BIND_ATTEMPTS: usize = 16;

/// One negotiated call's media plane: the bound socket's pump and the format it was negotiated
/// with.
pub struct CallSession {
    pub id: u64,
    pub local_addr: SocketAddr,
    pub format: MediaFormat,
    stream: RtpStream,
}

impl CallSession {
    pub fn stop(&mut self) {
        self.stream.stop();
    }
}

/// Maintains a session-id counter and the local bind address; negotiates formats and opens RTP
/// sockets for both inbound and outbound calls.
pub struct CallHandler {
    transport: Transport,
    bind_ip: IpAddr,
    formats: FormatRegistry,
    next_id: AtomicU64,
}

impl CallHandler {
    pub fn new(transport: Transport, bind_ip: IpAddr) -> Self {
        Self {
            transport,
            bind_ip,
            formats: FormatRegistry::builtin(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_formats(transport: Transport, bind_ip: IpAddr, formats: FormatRegistry) -> Self {
        Self {
            transport,
            bind_ip,
            formats,
            next_id: AtomicU64::new(1),
        }
    }

    fn bind_media_socket(&self) -> Result<imsua_transport::UdpSocket> {
        let mut rng = rand::thread_rng();
        for _ in 0..BIND_ATTEMPTS {
            let port = rng.gen_range(PORT_RANGE_LOW..=PORT_RANGE_HIGH);
            match self.transport.bind_udp_socket(SocketAddr::new(self.bind_ip, port)) {
                Ok(socket) => return Ok(socket),
                Err(_) => continue, // port taken, try another
            }
        }
        Err(Error::NoFreePort)
    }

    /// Builds an SDP message advertising `formats`, one `a=rtpmap` per entry. Used both for the
    /// single-format answer (one mutually-negotiated format) and the multi-format outbound offer
    /// (every format we're willing to negotiate).
    fn message_for(&self, local_addr: SocketAddr, formats: &[MediaFormat]) -> SdpMessage {
        let payload_types = formats.iter().map(|f| f.rtp_payload_type).collect();
        let mut media = MediaDescription::new_audio(local_addr.port(), payload_types);
        for format in formats {
            media.attributes.push(Attribute::RtpMap {
                payload_type: format.rtp_payload_type,
                encoding: format.name.to_string(),
                clock_rate: format.sample_rate,
                channels: None,
            });
        }
        media.attributes.push(Attribute::SendRecv);

        SdpMessage {
            version: 0,
            origin: Origin {
                username: "-".to_string(),
                session_id: self.next_id.load(Ordering::Relaxed).to_string(),
                session_version: "1".to_string(),
                nettype: "IN".to_string(),
                addrtype: "IP4".to_string(),
                address: local_addr.ip().to_string(),
            },
            session_name: "-".to_string(),
            connection: Some(Connection {
                nettype: "IN".to_string(),
                addrtype: "IP4".to_string(),
                address: local_addr.ip().to_string(),
            }),
            bandwidths: Vec::new(),
            timing: Timing { start: 0, stop: 0 },
            attributes: Vec::new(),
            media: vec![media],
        }
    }

    fn remote_media_addr(offer: &SdpMessage) -> Result<SocketAddr> {
        let audio = offer.audio().ok_or(Error::NoCommonFormat)?;
        let connection = audio.connection.as_ref().or(offer.connection.as_ref()).ok_or(Error::NoCommonFormat)?;
        let ip: IpAddr = connection.address.parse().map_err(|_| Error::NoCommonFormat)?;
        Ok(SocketAddr::new(ip, audio.port))
    }

    /// Handles an inbound INVITE's offer: negotiates a format, binds a socket, starts the pump,
    /// and returns the answer SDP to send back with the `CallSession`.
    pub fn accept_offer(
        &self,
        offer: &SdpMessage,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        on_send_complete: impl FnOnce() + Send + 'static,
    ) -> Result<(SdpMessage, CallSession)> {
        let audio = offer.audio().ok_or(Error::NoCommonFormat)?;
        let format = self.formats.select(&audio.formats).ok_or(Error::NoCommonFormat)?;
        let remote = Self::remote_media_addr(offer)?;

        let socket = self.bind_media_socket()?;
        let local_addr = socket.local_addr();
        let answer = self.message_for(local_addr, &[format]);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stream = RtpStream::start(socket, remote, format, source, sink, on_send_complete);
        Ok((answer, CallSession { id, local_addr, format, stream }))
    }

    /// Builds the SDP offer for an outbound INVITE, binding the local RTP socket up front so its
    /// port can be advertised. Advertises every format this handler is willing to negotiate, not
    /// just its most preferred one, so the callee can answer with whichever it supports.
    pub fn build_offer(&self) -> Result<(SdpMessage, imsua_transport::UdpSocket)> {
        let socket = self.bind_media_socket()?;
        let local_addr = socket.local_addr();
        if self.formats.preferred().is_none() {
            return Err(Error::NoCommonFormat);
        }
        let offer = self.message_for(local_addr, self.formats.all());
        Ok((offer, socket))
    }

    /// Completes an outbound call once the answer SDP has come back on the INVITE's `200 OK`.
    pub fn accept_answer(
        &self,
        socket: imsua_transport::UdpSocket,
        answer: &SdpMessage,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        on_send_complete: impl FnOnce() + Send + 'static,
    ) -> Result<CallSession> {
        let audio = answer.audio().ok_or(Error::NoCommonFormat)?;
        let format = self.formats.by_payload_type(*audio.formats.first().ok_or(Error::NoCommonFormat)?)?;
        let remote = Self::remote_media_addr(answer)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let local_addr = socket.local_addr();
        let stream = RtpStream::start(socket, remote, format, source, sink, on_send_complete);
        Ok(CallSession { id, local_addr, format, stream })
    }
}
