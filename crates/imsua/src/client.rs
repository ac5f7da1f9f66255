//! The facade: wires a reactor, a transport, a session, and a call handler into one handle an
//! embedding application drives.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use imsua_media::{AudioSink, AudioSource, CallHandler, CallSession};
use imsua_reactor::Reactor;
use imsua_sdp::SdpMessage;
use imsua_session::Session;
use imsua_sip::{HeaderName, HeaderValue, Method, Uri};
use imsua_transport::Transport;
use parking_lot::Mutex;

use crate::config::{ClientConfig, TransportKind};
use crate::error::Result;

/// Finds an unused local port by binding a throwaway std socket and dropping it, then reusing the
/// chosen address for the real transaction. Mirrors the same probe `imsua_media::CallHandler`
/// uses to pick RTP ports, applied here to the SIP signaling socket.
fn ephemeral_addr(bind_ip: IpAddr) -> Result<SocketAddr> {
    let probe = std::net::UdpSocket::bind(SocketAddr::new(bind_ip, 0)).map_err(imsua_transport::Error::from)?;
    Ok(probe.local_addr().map_err(imsua_transport::Error::from)?)
}

fn resolve_expires(configured_default: u32, override_expires: Option<u32>) -> u32 {
    override_expires.unwrap_or(configured_default)
}

/// A registered (or registering) IMS user agent: one SIP dialog and, at most, one active call.
pub struct Client {
    session: Arc<Session>,
    call_handler: CallHandler,
    active_call: Mutex<Option<CallSession>>,
    default_register_expires: u32,
}

impl Client {
    /// Spawns a reactor thread, opens the signaling transaction to `config.server`, and builds
    /// the session with an initial (challengeless) Authorization ready to be re-sent once the
    /// registrar issues a 401.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let (reactor, _reactor_thread) = Reactor::spawn(Some(Duration::from_millis(50)))?;
        let transport = Transport::new(reactor);

        let (transaction, contact_addr) = match config.transport {
            TransportKind::Udp => {
                let local = ephemeral_addr(config.local_bind)?;
                (transport.connect_udp(local, config.server)?, local)
            }
            TransportKind::Tcp => {
                let transaction = transport.connect_tcp(config.server)?;
                // The socket's local ephemeral port isn't exposed by a bare TCP connect; the
                // bind address still identifies us well enough for this client's one-dialog model.
                (transaction, SocketAddr::new(config.local_bind, 0))
            }
        };

        let realm = config.account.realm();
        let local_aor = Uri::new("sip", realm.clone()).with_user(config.account.imsi.clone());
        let registrar = Uri::new("sip", realm);

        let default_headers = vec![(
            HeaderName::Custom("User-Agent".to_string()),
            HeaderValue::Custom(config.user_agent.clone()),
        )];

        let session = Session::new(
            transaction,
            local_aor,
            contact_addr,
            registrar,
            config.account.digest_username(),
            config.account.subscriber_keys(),
            config.account.amf,
            default_headers,
        );

        let call_handler = CallHandler::new(transport, config.local_bind);

        Ok(Self {
            session: Arc::new(session),
            call_handler,
            active_call: Mutex::new(None),
            default_register_expires: config.register_expires,
        })
    }

    pub fn is_registered(&self) -> bool {
        self.session.is_registered()
    }

    pub fn registration_lease(&self) -> Option<u32> {
        self.session.registration_lease()
    }

    /// Registers (or re-registers, to refresh the lease before it lapses), resolving an
    /// AKAv1-MD5 challenge if the registrar sends one. `expires` overrides the `register_expires`
    /// the client was configured with; pass `None` to use that default.
    pub fn register(&self, expires: Option<u32>) -> Result<u32> {
        Ok(self.session.register(resolve_expires(self.default_register_expires, expires))?)
    }

    /// Places an outbound call: negotiates an SDP offer/answer over INVITE/ACK, then starts the
    /// RTP pump between `source` and `sink`. Replaces any previously active call.
    pub fn call(
        &self,
        callee: Uri,
        source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
        on_send_complete: impl FnOnce() + Send + 'static,
        timeout: Duration,
    ) -> Result<()> {
        let (offer, socket) = self.call_handler.build_offer()?;
        let answer = self.session.invite(callee, offer, timeout)?;
        let call = self.call_handler.accept_answer(socket, &answer, source, sink, on_send_complete)?;
        *self.active_call.lock() = Some(call);
        Ok(())
    }

    /// Hangs up the active call, if any, sending BYE and stopping the RTP pump.
    pub fn hangup(&self) -> Result<()> {
        self.session.bye()?;
        if let Some(mut call) = self.active_call.lock().take() {
            call.stop();
        }
        Ok(())
    }

    /// Answers one inbound INVITE: `on_offer` inspects the remote SDP offer and either accepts
    /// (returning a source/sink pair to splice onto the RTP stream) or declines by returning
    /// `None`, which sends `400 Bad Request`.
    fn accept_one_invite(
        &self,
        request: &imsua_sip::Message,
        on_offer: impl FnOnce(&SdpMessage) -> Option<(Box<dyn AudioSource>, Box<dyn AudioSink>, Box<dyn FnOnce() + Send>)>,
    ) -> Result<()> {
        let call_handler = &self.call_handler;
        let mut established: Option<CallSession> = None;
        let mut on_offer = Some(on_offer);

        self.session.handle_invite(request, |offer| {
            let (source, sink, on_send_complete) = on_offer.take()?(offer)?;
            match call_handler.accept_offer(offer, source, sink, move || on_send_complete()) {
                Ok((answer, call)) => {
                    established = Some(call);
                    Some(answer)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "imsua: declining inbound offer, no compatible media");
                    None
                }
            }
        })?;

        if let Some(call) = established {
            *self.active_call.lock() = Some(call);
        }
        Ok(())
    }

    /// Runs the inbound-dispatch loop on the calling thread: blocks forever, answering each
    /// INVITE via `on_offer` and tearing down the active call on BYE. Spawn this from its own
    /// thread; it never returns under normal operation.
    pub fn run_inbound(
        &self,
        mut on_offer: impl FnMut(&SdpMessage) -> Option<(Box<dyn AudioSource>, Box<dyn AudioSink>, Box<dyn FnOnce() + Send>)>,
    ) {
        self.session.dispatch_inbound(&[Method::Invite, Method::Bye], |message| match message.method() {
            Some(Method::Invite) => {
                if let Err(err) = self.accept_one_invite(&message, |offer| on_offer(offer)) {
                    tracing::warn!(error = %err, "imsua: failed to answer inbound INVITE");
                }
            }
            Some(Method::Bye) => {
                if let Some(mut call) = self.active_call.lock().take() {
                    call.stop();
                }
            }
            _ => {}
        });
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitting_expires_falls_back_to_the_configured_default() {
        assert_eq!(resolve_expires(1800, None), 1800);
    }

    #[test]
    fn explicit_expires_overrides_the_configured_default() {
        assert_eq!(resolve_expires(1800, Some(600)), 600);
    }
}
