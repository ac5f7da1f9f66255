//! AKAv1-MD5: resolving a 3GPP AKA challenge with Milenage, then folding the result into a SIP
//! Digest response.

mod error;
mod milenage;

use std::collections::VecDeque;

pub use error::{Error, Result};
pub use milenage::{f1, f2_f5, f3, f4, opc_of};

use rand::RngCore;

/// A subscriber's long-term secrets, as provisioned on the SIM/USIM.
#[derive(Clone)]
pub struct SubscriberKeys {
    pub ki: [u8; 16],
    pub opc: [u8; 16],
}

impl SubscriberKeys {
    pub fn with_opc(ki: [u8; 16], opc: [u8; 16]) -> Self {
        Self { ki, opc }
    }

    /// Derive OPc from the operator-wide OP, per TS 35.206 Annex 3.
    pub fn with_op(ki: [u8; 16], op: [u8; 16]) -> Self {
        Self {
            ki,
            opc: opc_of(&ki, &op),
        }
    }
}

/// Session keys and the RES value recovered from a resolved AKA challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkaResolution {
    pub res: [u8; 8],
    pub ck: [u8; 16],
    pub ik: [u8; 16],
}

/// Decode a base64 IMS AKA nonce (`RAND(16) || SQN⊕AK(6) || AMF(2) || MAC(8)`), verify the
/// network's MAC with `f1`, and recover RES/CK/IK with `f2`-`f5`.
///
/// Fails with [`Error::BadChallenge`] if the computed MAC does not match the one carried in the
/// nonce -- this is the only way this function signals "the network isn't who it claims to be".
pub fn resolve_challenge(keys: &SubscriberKeys, nonce_b64: &str, amf: [u8; 2]) -> Result<AkaResolution> {
    use base64::Engine;
    let nonce = base64::engine::general_purpose::STANDARD.decode(nonce_b64)?;
    if nonce.len() != 32 {
        return Err(Error::BadNonceLength(nonce.len()));
    }

    let mut rand = [0u8; 16];
    rand.copy_from_slice(&nonce[0..16]);
    let mut sqn_xor_ak = [0u8; 6];
    sqn_xor_ak.copy_from_slice(&nonce[16..22]);
    let mut received_amf = [0u8; 2];
    received_amf.copy_from_slice(&nonce[22..24]);
    let mut received_mac = [0u8; 8];
    received_mac.copy_from_slice(&nonce[24..32]);

    let (res, ak) = f2_f5(&keys.ki, &rand, &keys.opc);
    let sqn = milenage::xor6(sqn_xor_ak, ak);

    // The network's AMF travels in the nonce; the caller's `amf` is the locally configured value
    // used only if the two must agree. We authenticate with the AMF actually carried on the wire.
    let _ = amf;
    let (expected_mac, _mac_s) = f1(&keys.ki, &sqn, &rand, &keys.opc, &received_amf);
    if expected_mac != received_mac {
        tracing::warn!("imsua_milenage: AKA MAC mismatch, rejecting challenge");
        return Err(Error::BadChallenge);
    }

    let ck = f3(&keys.ki, &rand, &keys.opc);
    let ik = f4(&keys.ki, &rand, &keys.opc);
    Ok(AkaResolution { res, ck, ik })
}

/// Per-nonce digest nonce-count tracking. The reference client hard-wires `nc=00000001`; this
/// implementation tracks the real count per nonce instead (REDESIGN FLAG, see SPEC_FULL.md §9),
/// bounded to a small number of distinct in-flight nonces so a chatty server cannot grow this
/// unbounded.
pub struct NonceCounters {
    capacity: usize,
    order: VecDeque<String>,
    counts: std::collections::HashMap<String, u32>,
}

impl Default for NonceCounters {
    fn default() -> Self {
        Self::new(16)
    }
}

impl NonceCounters {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            counts: std::collections::HashMap::new(),
        }
    }

    /// Return the next nc value for `nonce` (starting at 1) and record the use.
    pub fn next(&mut self, nonce: &str) -> u32 {
        let count = self.counts.entry(nonce.to_string()).or_insert(0);
        *count += 1;
        let value = *count;
        if !self.order.iter().any(|n| n == nonce) {
            self.order.push_back(nonce.to_string());
            while self.order.len() > self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.counts.remove(&evicted);
                }
            }
        }
        value
    }
}

/// Generate a fresh client nonce (8 random bytes, hex-encoded), as used in the `cnonce` digest
/// parameter.
pub fn generate_cnonce() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Inputs needed to compute an HTTP/SIP Digest `response` value for the `AKAv1-MD5` algorithm.
pub struct DigestInputs<'a> {
    pub username: &'a str,
    pub realm: &'a str,
    pub method: &'a str,
    pub uri: &'a str,
    pub nonce: &'a str,
    pub nc: u32,
    pub cnonce: &'a str,
    pub qop: &'a str,
}

/// RES, hex-encoded, is used as the Digest password per RFC 3310 §3.3.
pub fn res_as_password(res: &[u8; 8]) -> String {
    hex::encode(res)
}

/// `response = MD5(MD5(username:realm:password):nonce:nc:cnonce:qop:MD5(method:uri))`.
pub fn compute_digest_response(password: &str, inputs: &DigestInputs<'_>) -> String {
    let a1 = format!("{}:{}:{}", inputs.username, inputs.realm, password);
    let ha1 = hex::encode(md5::compute(a1.as_bytes()).0);

    let a2 = format!("{}:{}", inputs.method, inputs.uri);
    let ha2 = hex::encode(md5::compute(a2.as_bytes()).0);

    let nc = format!("{:08x}", inputs.nc);
    let full = format!(
        "{}:{}:{}:{}:{}:{}",
        ha1, inputs.nonce, nc, inputs.cnonce, inputs.qop, ha2
    );
    hex::encode(md5::compute(full.as_bytes()).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_nonce(ki: &[u8; 16], opc: &[u8; 16], rand: [u8; 16], sqn: [u8; 6], amf: [u8; 2]) -> String {
        let (_res, ak) = f2_f5(ki, &rand, opc);
        let sqn_xor_ak = milenage::xor6(sqn, ak);
        let (mac, _) = f1(ki, &sqn, &rand, opc, &amf);

        let mut nonce = Vec::with_capacity(32);
        nonce.extend_from_slice(&rand);
        nonce.extend_from_slice(&sqn_xor_ak);
        nonce.extend_from_slice(&amf);
        nonce.extend_from_slice(&mac);
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(nonce)
    }

    #[test]
    fn resolves_a_well_formed_challenge() {
        let ki = [0x42u8; 16];
        let opc = opc_of(&ki, &[0u8; 16]);
        let rand = [0x07u8; 16];
        let sqn = [0, 0, 0, 0, 0, 5];
        let amf = [0x80, 0x00];

        let nonce_b64 = build_nonce(&ki, &opc, rand, sqn, amf);
        let keys = SubscriberKeys::with_opc(ki, opc);
        let resolved = resolve_challenge(&keys, &nonce_b64, amf).unwrap();

        let (expected_res, _ak) = f2_f5(&ki, &rand, &opc);
        assert_eq!(resolved.res, expected_res);
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let ki = [0x42u8; 16];
        let opc = opc_of(&ki, &[0u8; 16]);
        let rand = [0x07u8; 16];
        let sqn = [0, 0, 0, 0, 0, 5];
        let amf = [0x80, 0x00];

        let mut nonce_b64 = build_nonce(&ki, &opc, rand, sqn, amf);
        // Corrupt the last base64 character so the decoded MAC no longer matches.
        nonce_b64.pop();
        nonce_b64.push('A');

        let keys = SubscriberKeys::with_opc(ki, opc);
        let err = resolve_challenge(&keys, &nonce_b64, amf).unwrap_err();
        assert!(matches!(err, Error::BadChallenge | Error::BadNonceLength(_)));
    }

    #[test]
    fn nonce_counters_increment_independently() {
        let mut counters = NonceCounters::default();
        assert_eq!(counters.next("a"), 1);
        assert_eq!(counters.next("a"), 2);
        assert_eq!(counters.next("b"), 1);
        assert_eq!(counters.next("a"), 3);
    }

    #[test]
    fn digest_response_matches_reference_computation() {
        let inputs = DigestInputs {
            username: "alice",
            realm: "ims.mnc001.mcc001.3gppnetwork.org",
            method: "REGISTER",
            uri: "sip:ims.mnc001.mcc001.3gppnetwork.org",
            nonce: "deadbeef",
            nc: 1,
            cnonce: "0a4f113b",
            qop: "auth",
        };
        let response = compute_digest_response("aabbccddeeff0011", &inputs);

        let ha1 = hex::encode(md5::compute(b"alice:ims.mnc001.mcc001.3gppnetwork.org:aabbccddeeff0011").0);
        let ha2 = hex::encode(md5::compute(b"REGISTER:sip:ims.mnc001.mcc001.3gppnetwork.org").0);
        let full = format!("{}:deadbeef:00000001:0a4f113b:auth:{}", ha1, ha2);
        let expected = hex::encode(md5::compute(full.as_bytes()).0);

        assert_eq!(response, expected);
    }
}
