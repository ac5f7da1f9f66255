//! 3GPP TS 35.206 §4.1 Milenage primitives (f1, f2, f3, f4, f5) built on AES-128.
//!
//! All inputs/outputs are fixed-size byte arrays; there is no allocation on the hot path.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;

fn aes_encrypt(key: &[u8; 16], block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// Rotate a 16-byte block left by `bits` bits.
fn rotate_left(input: &[u8; 16], bits: u32) -> [u8; 16] {
    if bits == 0 {
        return *input;
    }
    let bytes = (bits / 8) as usize;
    let rem = bits % 8;
    let mut out = [0u8; 16];
    for i in 0..16 {
        let hi = input[(i + bytes) % 16];
        let lo = input[(i + bytes + 1) % 16];
        out[i] = if rem == 0 {
            hi
        } else {
            (hi << rem) | (lo >> (8 - rem))
        };
    }
    out
}

/// OPc = AES(Ki, OP) XOR OP, per TS 35.206 Annex 3.
pub fn opc_of(ki: &[u8; 16], op: &[u8; 16]) -> [u8; 16] {
    xor16(&aes_encrypt(ki, op), op)
}

fn constant(last_byte: u8) -> [u8; 16] {
    let mut c = [0u8; 16];
    c[15] = last_byte;
    c
}

/// f1 / f1*: network authentication MAC. Returns (MAC-A, MAC-S), each 8 bytes.
pub fn f1(ki: &[u8; 16], sqn: &[u8; 6], rand: &[u8; 16], opc: &[u8; 16], amf: &[u8; 2]) -> ([u8; 8], [u8; 8]) {
    let temp = aes_encrypt(ki, &xor16(rand, opc));

    let mut in1 = [0u8; 16];
    in1[0..6].copy_from_slice(sqn);
    in1[6..8].copy_from_slice(amf);
    in1[8..14].copy_from_slice(sqn);
    in1[14..16].copy_from_slice(amf);

    let rotated = rotate_left(&xor16(&in1, opc), 64);
    let out1 = xor16(&aes_encrypt(ki, &xor16(&temp, &rotated)), opc);

    let mut mac_a = [0u8; 8];
    mac_a.copy_from_slice(&out1[0..8]);
    let mut mac_s = [0u8; 8];
    mac_s.copy_from_slice(&out1[8..16]);
    (mac_a, mac_s)
}

/// f2 / f5: RES and the anonymity key AK used to mask SQN in the network's AUTN.
pub fn f2_f5(ki: &[u8; 16], rand: &[u8; 16], opc: &[u8; 16]) -> ([u8; 8], [u8; 6]) {
    let temp = aes_encrypt(ki, &xor16(rand, opc));
    let c2 = constant(0x01);
    let rotated = rotate_left(&xor16(&temp, &c2), 0);
    let out2 = xor16(&aes_encrypt(ki, &rotated), opc);

    let mut res = [0u8; 8];
    res.copy_from_slice(&out2[8..16]);
    let mut ak = [0u8; 6];
    ak.copy_from_slice(&out2[0..6]);
    (res, ak)
}

/// f3: confidentiality key CK.
pub fn f3(ki: &[u8; 16], rand: &[u8; 16], opc: &[u8; 16]) -> [u8; 16] {
    let temp = aes_encrypt(ki, &xor16(rand, opc));
    let c3 = constant(0x02);
    let rotated = rotate_left(&xor16(&temp, &c3), 32);
    xor16(&aes_encrypt(ki, &rotated), opc)
}

/// f4: integrity key IK.
pub fn f4(ki: &[u8; 16], rand: &[u8; 16], opc: &[u8; 16]) -> [u8; 16] {
    let temp = aes_encrypt(ki, &xor16(rand, opc));
    let c4 = constant(0x04);
    let rotated = rotate_left(&xor16(&temp, &c4), 64);
    xor16(&aes_encrypt(ki, &rotated), opc)
}

/// XOR two 6-byte SQN/AK values together (used to recover SQN from SQN⊕AK).
pub fn xor6(a: [u8; 6], b: [u8; 6]) -> [u8; 6] {
    let mut out = [0u8; 6];
    for i in 0..6 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opc_with_zero_op_equals_plain_encrypt() {
        let ki: [u8; 16] = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
            0xff,
        ];
        let op = [0u8; 16];
        let opc = opc_of(&ki, &op);
        assert_eq!(opc, aes_encrypt(&ki, &op));
    }

    #[test]
    fn f1_mac_is_deterministic() {
        let ki = [0x11u8; 16];
        let op = [0x22u8; 16];
        let opc = opc_of(&ki, &op);
        let rand = [0x33u8; 16];
        let sqn = [0, 0, 0, 0, 0, 1];
        let amf = [0x80, 0x00];

        let (mac_a1, mac_s1) = f1(&ki, &sqn, &rand, &opc, &amf);
        let (mac_a2, mac_s2) = f1(&ki, &sqn, &rand, &opc, &amf);
        assert_eq!(mac_a1, mac_a2);
        assert_eq!(mac_s1, mac_s2);
    }

    #[test]
    fn sqn_round_trips_through_ak_masking() {
        let ki = [0xabu8; 16];
        let opc = opc_of(&ki, &[0u8; 16]);
        let rand = [0x01u8; 16];
        let sqn = [1, 2, 3, 4, 5, 6];

        let (_res, ak) = f2_f5(&ki, &rand, &opc);
        let masked = xor6(sqn, ak);
        let recovered = xor6(masked, ak);
        assert_eq!(recovered, sqn);
    }

    /// 3GPP TS 35.207 Annex 4.1 test set 1 -- a literal, independently-published vector that
    /// doesn't share this crate's own (possibly buggy) primitives to build its expected values,
    /// unlike the round-trip tests above.
    #[test]
    fn matches_ts_35_207_test_set_1() {
        let ki: [u8; 16] = [
            0x46, 0x5B, 0x5C, 0xE8, 0xB1, 0x99, 0xB4, 0x9F, 0xAA, 0x5F, 0x0A, 0x2E, 0xE2, 0x38,
            0xA6, 0xBC,
        ];
        let op: [u8; 16] = [
            0xCD, 0xC2, 0x02, 0xD5, 0x12, 0x3E, 0x20, 0xF6, 0x2B, 0x6D, 0x67, 0x6A, 0xC7, 0x2C,
            0xB3, 0x18,
        ];
        let rand: [u8; 16] = [
            0x23, 0x55, 0x3C, 0xBE, 0x96, 0x37, 0xA8, 0x9D, 0x21, 0x8A, 0xE6, 0x4D, 0xAE, 0x47,
            0xBF, 0x35,
        ];
        let sqn: [u8; 6] = [0xFF, 0x9B, 0xB4, 0xD0, 0xB6, 0x07];
        let amf: [u8; 2] = [0xB9, 0xB9];

        let expected_opc: [u8; 16] = [
            0xCD, 0x63, 0xCB, 0x71, 0x95, 0x4A, 0x9F, 0x4E, 0x48, 0xA5, 0x99, 0x4E, 0x37, 0xA0,
            0x2B, 0xAF,
        ];
        let expected_mac_a: [u8; 8] = [0x4A, 0x9F, 0xFA, 0xC3, 0x54, 0xDF, 0xAF, 0xB3];
        let expected_res: [u8; 8] = [0xA5, 0x42, 0x11, 0xD5, 0xE3, 0xBA, 0x50, 0xBF];
        let expected_ak: [u8; 6] = [0xAA, 0x68, 0x9C, 0x64, 0x83, 0x70];
        let expected_ck: [u8; 16] = [
            0xB4, 0x0B, 0xA9, 0xA3, 0xC5, 0x8B, 0x2A, 0x05, 0xAC, 0x41, 0xF5, 0x89, 0xE5, 0x43,
            0x70, 0x07,
        ];
        let expected_ik: [u8; 16] = [
            0xF7, 0x69, 0xBC, 0xD7, 0x51, 0x04, 0x46, 0x04, 0x12, 0x76, 0x73, 0x14, 0x94, 0xC7,
            0xF4, 0xE8,
        ];

        let opc = opc_of(&ki, &op);
        assert_eq!(opc, expected_opc);

        let (mac_a, _mac_s) = f1(&ki, &sqn, &rand, &opc, &amf);
        assert_eq!(mac_a, expected_mac_a);

        let (res, ak) = f2_f5(&ki, &rand, &opc);
        assert_eq!(res, expected_res);
        assert_eq!(ak, expected_ak);

        assert_eq!(f3(&ki, &rand, &opc), expected_ck);
        assert_eq!(f4(&ki, &rand, &opc), expected_ik);
    }
}
