//! Session/dialog state machine: building requests and responses with the right boilerplate
//! headers, driving registration (including the AKAv1-MD5 challenge round trip), and the
//! INVITE/ACK/BYE call flows. One [`Session`] owns one [`imsua_transport::Transaction`].

mod error;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use imsua_milenage::{generate_cnonce, resolve_challenge, DigestInputs, NonceCounters, SubscriberKeys};
use imsua_sdp::SdpMessage;
use imsua_sip::{AuthParams, Body, HeaderName, HeaderValue, Message, Method, NameAddr, Uri, Via};
use imsua_transport::Transaction;
use parking_lot::Mutex;
use rand::RngCore;

pub use error::{Error, Result};

const REGISTER_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FORWARDS: u32 = 70;
const DEFAULT_EXPIRES: u32 = 1800;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

fn fresh_branch() -> String {
    format!("z9hG4bK{}", random_hex(8))
}

fn fresh_tag() -> String {
    random_hex(4)
}

#[derive(Default)]
struct DialogState {
    remote_tag: Option<String>,
    remote_uri: Option<Uri>,
}

/// One registered (or registering) user agent's worth of SIP state, bound to a single
/// transaction.
pub struct Session {
    transaction: Transaction,
    local_aor: Uri,
    contact_addr: SocketAddr,
    registrar: Uri,
    digest_username: String,
    keys: SubscriberKeys,
    amf: [u8; 2],
    call_id: String,
    local_tag: String,
    cseq: Mutex<u32>,
    nonce_counters: Mutex<NonceCounters>,
    default_headers: Vec<(HeaderName, HeaderValue)>,
    registered: AtomicBool,
    registration_expires: Mutex<Option<u32>>,
    dialog: Mutex<DialogState>,
}

enum RegisterOutcome {
    Registered(u32),
    Challenge(AuthParams),
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction: Transaction,
        local_aor: Uri,
        contact_addr: SocketAddr,
        registrar: Uri,
        digest_username: impl Into<String>,
        keys: SubscriberKeys,
        amf: [u8; 2],
        default_headers: Vec<(HeaderName, HeaderValue)>,
    ) -> Self {
        Self {
            transaction,
            local_aor,
            contact_addr,
            registrar,
            digest_username: digest_username.into(),
            keys,
            amf,
            call_id: format!("{}@{}", random_hex(8), contact_addr.ip()),
            local_tag: fresh_tag(),
            cseq: Mutex::new(0),
            nonce_counters: Mutex::new(NonceCounters::default()),
            default_headers,
            registered: AtomicBool::new(false),
            registration_expires: Mutex::new(None),
            dialog: Mutex::new(DialogState::default()),
        }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// The `Expires` value accepted in the last successful registration, if any -- the caller
    /// decides when to re-register before this elapses; this crate runs no background timer.
    pub fn registration_lease(&self) -> Option<u32> {
        *self.registration_expires.lock()
    }

    fn next_cseq(&self) -> u32 {
        let mut cseq = self.cseq.lock();
        *cseq += 1;
        *cseq
    }

    fn via(&self, branch: &str) -> Via {
        Via::new(self.transaction.transport_name(), self.contact_addr.ip().to_string())
            .with_port(self.contact_addr.port())
            .with_branch(branch)
    }

    /// Builds a request carrying the standard boilerplate: fresh CSeq, Max-Forwards, Expires,
    /// From (with our tag), To, Call-ID, a freshly-branched Via, and the session's default
    /// headers.
    fn create_request(&self, method: Method, request_uri: Uri, to_uri: Uri, to_tag: Option<String>) -> (Message, u32, String) {
        let seq = self.next_cseq();
        let branch = fresh_branch();

        let mut to = NameAddr::new(to_uri);
        to.tag = to_tag;

        let mut message = Message::request(method.clone(), request_uri)
            .with_header(HeaderName::Via, HeaderValue::Via(self.via(&branch)))
            .with_header(HeaderName::MaxForwards, HeaderValue::MaxForwards(MAX_FORWARDS))
            .with_header(HeaderName::Expires, HeaderValue::Expires(DEFAULT_EXPIRES))
            .with_header(
                HeaderName::From,
                HeaderValue::From(NameAddr::new(self.local_aor.clone()).with_tag(self.local_tag.clone())),
            )
            .with_header(HeaderName::To, HeaderValue::To(to))
            .with_header(HeaderName::CallId, HeaderValue::CallId(self.call_id.clone()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq, method });

        for (name, value) in &self.default_headers {
            message.headers.push(name.clone(), value.clone());
        }
        (message, seq, branch)
    }

    /// Builds a response echoing From/To/Call-ID/CSeq from `request`, adding our tag to `To` if
    /// it doesn't already carry one (we're acting as UAS, establishing the dialog).
    fn create_response(&self, status: u16, reason: &str, request: &Message) -> Message {
        let mut message = Message::response(status, reason);

        for via in request.headers.all(&HeaderName::Via) {
            message.headers.push(HeaderName::Via, via.clone());
        }
        if let Some(from) = request.headers.first(&HeaderName::From) {
            message.headers.push(HeaderName::From, from.clone());
        }
        if let Some(HeaderValue::To(to)) = request.headers.first(&HeaderName::To) {
            let mut to = to.clone();
            if to.tag.is_none() {
                to.tag = Some(self.local_tag.clone());
            }
            message.headers.push(HeaderName::To, HeaderValue::To(to));
        }
        if let Some(call_id) = request.headers.first(&HeaderName::CallId) {
            message.headers.push(HeaderName::CallId, call_id.clone());
        }
        if let Some(cseq) = request.headers.first(&HeaderName::CSeq) {
            message.headers.push(HeaderName::CSeq, cseq.clone());
        }
        for (name, value) in &self.default_headers {
            message.headers.push(name.clone(), value.clone());
        }
        message
    }

    fn digest_auth_for_challenge(&self, challenge: &AuthParams, method: &str, uri: &str) -> Result<AuthParams> {
        let realm = challenge.realm.clone().unwrap_or_default();
        let nonce = challenge.nonce.clone().unwrap_or_default();
        let qop = challenge.qop.clone().unwrap_or_else(|| "auth".to_string());

        let resolution = resolve_challenge(&self.keys, &nonce, self.amf)?;
        let password = imsua_milenage::res_as_password(&resolution.res);
        let cnonce = generate_cnonce();
        let nc = self.nonce_counters.lock().next(&nonce);

        let response = imsua_milenage::compute_digest_response(
            &password,
            &DigestInputs {
                username: &self.digest_username,
                realm: &realm,
                method,
                uri,
                nonce: &nonce,
                nc,
                cnonce: &cnonce,
                qop: &qop,
            },
        );

        let mut auth = AuthParams::new("Digest");
        auth.username = Some(self.digest_username.clone());
        auth.realm = Some(realm);
        auth.nonce = Some(nonce);
        auth.uri = Some(uri.to_string());
        auth.response = Some(response);
        auth.algorithm = Some("AKAv1-MD5".to_string());
        auth.qop = Some(qop);
        auth.cnonce = Some(cnonce);
        auth.nc = Some(format!("{:08x}", nc));
        Ok(auth)
    }

    /// Registers with `self.registrar`, resolving one AKAv1-MD5 challenge if presented. Returns
    /// the accepted lease (`Expires`) on success.
    pub fn register(&self, expires: u32) -> Result<u32> {
        let mut auth = {
            let mut a = AuthParams::new("Digest");
            a.username = Some(self.digest_username.clone());
            a.uri = Some(self.registrar.to_string());
            a.response = Some(String::new());
            a
        };

        loop {
            let (mut request, _seq, _branch) =
                self.create_request(Method::Register, self.registrar.clone(), self.registrar.clone(), None);
            request.headers.replace(HeaderName::Expires, HeaderValue::Expires(expires));
            request = request.with_header(HeaderName::Authorization, HeaderValue::Authorization(auth));

            self.transaction.send(&request)?;

            match self.await_register_response(expires)? {
                RegisterOutcome::Registered(lease) => {
                    self.registered.store(true, Ordering::Release);
                    *self.registration_expires.lock() = Some(lease);
                    return Ok(lease);
                }
                RegisterOutcome::Challenge(challenge) => {
                    auth = self.digest_auth_for_challenge(&challenge, "REGISTER", &self.registrar.to_string())?;
                }
            }
        }
    }

    fn await_register_response(&self, requested_expires: u32) -> Result<RegisterOutcome> {
        loop {
            let message = self.transaction.await_message(Some(REGISTER_TIMEOUT))?;
            let Some(status) = message.status() else {
                continue; // an inbound request arrived mid-registration; not this flow's concern
            };
            match status {
                100 => continue,
                200 => {
                    let lease = match message.headers.first(&HeaderName::Expires) {
                        Some(HeaderValue::Expires(v)) => *v,
                        _ => requested_expires,
                    };
                    return Ok(RegisterOutcome::Registered(lease));
                }
                401 => {
                    let challenge = message
                        .headers
                        .first(&HeaderName::WwwAuthenticate)
                        .and_then(|v| match v {
                            HeaderValue::WwwAuthenticate(auth) => Some(auth.clone()),
                            _ => None,
                        })
                        .ok_or(Error::UnexpectedResponse { expected: "WWW-Authenticate", status })?;
                    return Ok(RegisterOutcome::Challenge(challenge));
                }
                other => return Err(Error::RegistrationFailed(other)),
            }
        }
    }

    /// Sends an INVITE carrying `offer`, waits for a final response, and on `200 OK` ACKs the
    /// call (sharing the INVITE's branch and From-tag) and returns the negotiated SDP answer.
    pub fn invite(&self, callee: Uri, offer: SdpMessage, timeout: Duration) -> Result<SdpMessage> {
        let (request, seq, branch) = self.create_request(Method::Invite, callee.clone(), callee.clone(), None);
        let request = request.with_body(Body::Sdp(offer));

        self.dialog.lock().remote_uri = Some(callee.clone());

        self.transaction.send(&request)?;

        loop {
            let message = self.transaction.await_message(Some(timeout))?;
            let Some(status) = message.status() else { continue };
            match status {
                100 => continue,
                200 => {
                    let answer = match message.body {
                        Body::Sdp(sdp) => sdp,
                        _ => return Err(Error::MissingSdpBody),
                    };
                    if let Some(HeaderValue::To(to)) = message.headers.first(&HeaderName::To) {
                        self.dialog.lock().remote_tag = to.tag.clone();
                    }
                    let ack = self.build_ack(&callee, &branch, seq);
                    self.transaction.send(&ack)?;
                    return Ok(answer);
                }
                other => return Err(Error::InviteFailed(other)),
            }
        }
    }

    fn build_ack(&self, callee: &Uri, branch: &str, invite_seq: u32) -> Message {
        let dialog = self.dialog.lock();
        let mut to = NameAddr::new(callee.clone());
        to.tag = dialog.remote_tag.clone();
        drop(dialog);

        let mut message = Message::request(Method::Ack, callee.clone())
            .with_header(HeaderName::Via, HeaderValue::Via(self.via(branch)))
            .with_header(HeaderName::MaxForwards, HeaderValue::MaxForwards(MAX_FORWARDS))
            .with_header(
                HeaderName::From,
                HeaderValue::From(NameAddr::new(self.local_aor.clone()).with_tag(self.local_tag.clone())),
            )
            .with_header(HeaderName::To, HeaderValue::To(to))
            .with_header(HeaderName::CallId, HeaderValue::CallId(self.call_id.clone()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: invite_seq, method: Method::Ack });
        for (name, value) in &self.default_headers {
            message.headers.push(name.clone(), value.clone());
        }
        message
    }

    /// Handles an inbound INVITE: hands the offer to `on_invite`, which returns `Some(answer)`
    /// to accept (sent as `200 OK`) or `None` to reject (sent as `400 Bad Request`). Either way,
    /// `Record-Route` is echoed back.
    pub fn handle_invite(&self, request: &Message, on_invite: impl FnOnce(&SdpMessage) -> Option<SdpMessage>) -> Result<()> {
        let offer = match &request.body {
            Body::Sdp(sdp) => sdp,
            _ => return self.respond_bad_request(request),
        };

        if let Some(HeaderValue::From(from)) = request.headers.first(&HeaderName::From) {
            let mut dialog = self.dialog.lock();
            dialog.remote_tag = from.tag.clone();
            dialog.remote_uri = Some(from.uri.clone());
        }

        match on_invite(offer) {
            Some(answer) => {
                let mut response = self.create_response(200, "OK", request).with_body(Body::Sdp(answer));
                for rr in request.headers.all(&HeaderName::RecordRoute) {
                    response.headers.push(HeaderName::RecordRoute, rr.clone());
                }
                self.transaction.send(&response)?;
                Ok(())
            }
            None => self.respond_bad_request(request),
        }
    }

    fn respond_bad_request(&self, request: &Message) -> Result<()> {
        let mut response = self.create_response(400, "Bad Request", request);
        for rr in request.headers.all(&HeaderName::RecordRoute) {
            response.headers.push(HeaderName::RecordRoute, rr.clone());
        }
        self.transaction.send(&response)?;
        Ok(())
    }

    /// Sends a BYE for the current dialog. Per this client's fixed call model there is exactly
    /// one in-dialog request after the initial INVITE/ACK, so its CSeq is always 2.
    pub fn bye(&self) -> Result<()> {
        let (remote_uri, remote_tag) = {
            let dialog = self.dialog.lock();
            (dialog.remote_uri.clone(), dialog.remote_tag.clone())
        };
        let remote_uri = remote_uri.ok_or(Error::UnexpectedResponse { expected: "an active dialog", status: 0 })?;

        let (mut request, _seq, _branch) = self.create_request(Method::Bye, remote_uri.clone(), remote_uri, remote_tag);
        request.headers.replace(HeaderName::CSeq, HeaderValue::CSeq { seq: 2, method: Method::Bye });
        self.transaction.send(&request)?;
        Ok(())
    }

    /// Runs `handler` on the transaction's own thread for every inbound request whose method is
    /// in `methods`. Blocks forever (or until the transaction errors); spawn this from a
    /// dedicated thread.
    pub fn dispatch_inbound(&self, methods: &[Method], mut handler: impl FnMut(Message)) {
        loop {
            match self.transaction.await_message(None) {
                Ok(message) => {
                    if let Some(method) = message.method() {
                        if methods.contains(method) {
                            handler(message);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "imsua_session: inbound dispatch loop stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imsua_reactor::Reactor;
    use imsua_sip::Outcome;
    use imsua_transport::Transport;

    fn ephemeral_addr() -> SocketAddr {
        std::net::UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
    }

    fn paired_transport() -> (Transport, SocketAddr, SocketAddr) {
        let (reactor, _join) = Reactor::spawn(Some(Duration::from_millis(5))).unwrap();
        (Transport::new(reactor), ephemeral_addr(), ephemeral_addr())
    }

    fn test_session(transport: &Transport, client_addr: SocketAddr, server_addr: SocketAddr, keys: SubscriberKeys) -> Session {
        let transaction = transport.connect_udp(client_addr, server_addr).unwrap();
        Session::new(
            transaction,
            Uri::parse("sip:alice@ims.example.com").unwrap(),
            client_addr,
            Uri::parse("sip:ims.example.com").unwrap(),
            "sip:alice@ims.example.com",
            keys,
            [0x80, 0x00],
            Vec::new(),
        )
    }

    #[test]
    fn registers_immediately_when_no_challenge_is_sent() {
        let (transport, client_addr, server_addr) = paired_transport();
        let server = transport.connect_udp(server_addr, client_addr).unwrap();
        let keys = SubscriberKeys::with_opc([0x11; 16], imsua_milenage::opc_of(&[0x11; 16], &[0u8; 16]));
        let session = test_session(&transport, client_addr, server_addr, keys);

        let server_thread = std::thread::spawn(move || {
            let request = server.await_message(Some(Duration::from_secs(2))).unwrap();
            assert_eq!(request.method(), Some(&Method::Register));
            let mut response = Message::response(200, "OK");
            for via in request.headers.all(&HeaderName::Via) {
                response.headers.push(HeaderName::Via, via.clone());
            }
            response.headers.push(HeaderName::From, request.headers.first(&HeaderName::From).unwrap().clone());
            response.headers.push(HeaderName::To, request.headers.first(&HeaderName::To).unwrap().clone());
            response.headers.push(HeaderName::CallId, request.headers.first(&HeaderName::CallId).unwrap().clone());
            response.headers.push(HeaderName::CSeq, request.headers.first(&HeaderName::CSeq).unwrap().clone());
            response.headers.push(HeaderName::Expires, HeaderValue::Expires(3600));
            server.send(&response).unwrap();
        });

        let lease = session.register(1800).unwrap();
        assert_eq!(lease, 3600);
        assert!(session.is_registered());
        server_thread.join().unwrap();
    }

    #[test]
    fn resolves_akav1_md5_challenge_before_registering() {
        let (transport, client_addr, server_addr) = paired_transport();
        let server = transport.connect_udp(server_addr, client_addr).unwrap();
        let ki = [0x22u8; 16];
        let opc = imsua_milenage::opc_of(&ki, &[0u8; 16]);
        let keys = SubscriberKeys::with_opc(ki, opc);
        let session = test_session(&transport, client_addr, server_addr, keys);

        let server_thread = std::thread::spawn(move || {
            let first = server.await_message(Some(Duration::from_secs(2))).unwrap();
            let auth = match first.headers.first(&HeaderName::Authorization) {
                Some(HeaderValue::Authorization(auth)) => auth.clone(),
                _ => panic!("expected an initial unauthenticated Authorization header"),
            };
            assert_eq!(auth.response.as_deref(), Some(""));

            let rand = [0x09u8; 16];
            let sqn = [0, 0, 0, 0, 0, 7];
            let amf = [0x80, 0x00];
            let (_res, ak) = imsua_milenage::f2_f5(&ki, &rand, &opc);
            let sqn_xor_ak: Vec<u8> = sqn.iter().zip(ak.iter()).map(|(a, b)| a ^ b).collect();
            let (mac, _) = imsua_milenage::f1(&ki, &sqn, &rand, &opc, &amf);
            let mut nonce_bytes = Vec::with_capacity(32);
            nonce_bytes.extend_from_slice(&rand);
            nonce_bytes.extend_from_slice(&sqn_xor_ak);
            nonce_bytes.extend_from_slice(&amf);
            nonce_bytes.extend_from_slice(&mac);
            use base64::Engine;
            let nonce_b64 = base64::engine::general_purpose::STANDARD.encode(nonce_bytes);

            let mut challenge = Message::response(401, "Unauthorized");
            for via in first.headers.all(&HeaderName::Via) {
                challenge.headers.push(HeaderName::Via, via.clone());
            }
            challenge.headers.push(HeaderName::From, first.headers.first(&HeaderName::From).unwrap().clone());
            challenge.headers.push(HeaderName::To, first.headers.first(&HeaderName::To).unwrap().clone());
            challenge.headers.push(HeaderName::CallId, first.headers.first(&HeaderName::CallId).unwrap().clone());
            challenge.headers.push(HeaderName::CSeq, first.headers.first(&HeaderName::CSeq).unwrap().clone());
            let mut www_auth = AuthParams::new("Digest");
            www_auth.realm = Some("ims.example.com".to_string());
            www_auth.nonce = Some(nonce_b64);
            www_auth.qop = Some("auth".to_string());
            www_auth.algorithm = Some("AKAv1-MD5".to_string());
            challenge.headers.push(HeaderName::WwwAuthenticate, HeaderValue::WwwAuthenticate(www_auth));
            server.send(&challenge).unwrap();

            let second = server.await_message(Some(Duration::from_secs(2))).unwrap();
            let retried = match second.headers.first(&HeaderName::Authorization) {
                Some(HeaderValue::Authorization(auth)) => auth.clone(),
                _ => panic!("expected a retried Authorization header"),
            };
            assert!(!retried.response.unwrap_or_default().is_empty());

            let mut ok = Message::response(200, "OK");
            for via in second.headers.all(&HeaderName::Via) {
                ok.headers.push(HeaderName::Via, via.clone());
            }
            ok.headers.push(HeaderName::From, second.headers.first(&HeaderName::From).unwrap().clone());
            ok.headers.push(HeaderName::To, second.headers.first(&HeaderName::To).unwrap().clone());
            ok.headers.push(HeaderName::CallId, second.headers.first(&HeaderName::CallId).unwrap().clone());
            ok.headers.push(HeaderName::CSeq, second.headers.first(&HeaderName::CSeq).unwrap().clone());
            ok.headers.push(HeaderName::Expires, HeaderValue::Expires(1800));
            server.send(&ok).unwrap();
        });

        let lease = session.register(1800).unwrap();
        assert_eq!(lease, 1800);
        server_thread.join().unwrap();
    }

    #[test]
    fn register_failure_status_is_reported() {
        let (transport, client_addr, server_addr) = paired_transport();
        let server = transport.connect_udp(server_addr, client_addr).unwrap();
        let keys = SubscriberKeys::with_opc([0x33; 16], imsua_milenage::opc_of(&[0x33; 16], &[0u8; 16]));
        let session = test_session(&transport, client_addr, server_addr, keys);

        let server_thread = std::thread::spawn(move || {
            let request = server.await_message(Some(Duration::from_secs(2))).unwrap();
            let mut response = Message::response(403, "Forbidden");
            response.headers.push(HeaderName::CallId, request.headers.first(&HeaderName::CallId).unwrap().clone());
            response.headers.push(HeaderName::CSeq, request.headers.first(&HeaderName::CSeq).unwrap().clone());
            server.send(&response).unwrap();
        });

        let err = session.register(1800).unwrap_err();
        assert!(matches!(err, Error::RegistrationFailed(403)));
        server_thread.join().unwrap();
    }

    #[test]
    fn create_response_adds_a_to_tag_when_absent() {
        let (transport, client_addr, server_addr) = paired_transport();
        let keys = SubscriberKeys::with_opc([0x44; 16], imsua_milenage::opc_of(&[0x44; 16], &[0u8; 16]));
        let session = test_session(&transport, client_addr, server_addr, keys);

        let request = Message::request(Method::Invite, Uri::parse("sip:alice@ims.example.com").unwrap())
            .with_header(
                HeaderName::From,
                HeaderValue::From(NameAddr::new(Uri::parse("sip:bob@ims.example.com").unwrap()).with_tag("bobtag")),
            )
            .with_header(HeaderName::To, HeaderValue::To(NameAddr::new(Uri::parse("sip:alice@ims.example.com").unwrap())))
            .with_header(HeaderName::CallId, HeaderValue::CallId("call-xyz".to_string()))
            .with_header(HeaderName::CSeq, HeaderValue::CSeq { seq: 1, method: Method::Invite });

        let response = session.create_response(200, "OK", &request);
        match response.headers.first(&HeaderName::To) {
            Some(HeaderValue::To(to)) => assert!(to.tag.is_some()),
            other => panic!("expected a To header, got {other:?}"),
        }

        let wire = imsua_sip::compose(&response);
        assert!(matches!(imsua_sip::parse(&wire).unwrap(), Outcome::Parsed { .. }));
    }
}
