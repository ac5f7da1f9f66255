//! Fixed 12-byte RTP header (RFC 3550 §5.1) plus an optional CSRC list and payload. Header
//! extensions are neither emitted nor read.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

pub const VERSION: u8 = 2;
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub padding: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub payload: Bytes,
}

impl RtpPacket {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32, payload: Bytes) -> Self {
        Self {
            padding: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            payload,
        }
    }

    pub fn compose(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.csrc.len() * 4 + self.payload.len());

        let cc = self.csrc.len() as u8 & 0x0F;
        let byte0 = (VERSION << 6) | ((self.padding as u8) << 5) | (0 << 4) | cc;
        let byte1 = ((self.marker as u8) << 7) | (self.payload_type & 0x7F);
        out.put_u8(byte0);
        out.put_u8(byte1);
        out.put_u16(self.sequence_number);
        out.put_u32(self.timestamp);
        out.put_u32(self.ssrc);
        for csrc in &self.csrc {
            out.put_u32(*csrc);
        }
        out.extend_from_slice(&self.payload);
        out.to_vec()
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(Error::TooShort(buf.len()));
        }

        let byte0 = buf[0];
        let version = byte0 >> 6;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let padding = (byte0 >> 5) & 0x01 != 0;
        let extension = (byte0 >> 4) & 0x01 != 0;
        if extension {
            return Err(Error::ExtensionUnsupported);
        }
        let cc = (byte0 & 0x0F) as usize;

        let byte1 = buf[1];
        let marker = (byte1 >> 7) & 0x01 != 0;
        let payload_type = byte1 & 0x7F;

        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let csrc_end = HEADER_LEN + cc * 4;
        if buf.len() < csrc_end {
            return Err(Error::TooShort(buf.len()));
        }
        let csrc = buf[HEADER_LEN..csrc_end]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let rest = &buf[csrc_end..];
        let payload = if padding {
            let pad_len = *rest.last().ok_or(Error::InvalidPadding { pad_len: 0, remaining: 0 })? as usize;
            if pad_len == 0 || pad_len > rest.len() {
                return Err(Error::InvalidPadding { pad_len, remaining: rest.len() });
            }
            Bytes::copy_from_slice(&rest[..rest.len() - pad_len])
        } else {
            Bytes::copy_from_slice(rest)
        };

        Ok(RtpPacket {
            padding,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_basic_packet() {
        let packet = RtpPacket::new(0, 1000, 160, 0xdead_beef, Bytes::from_static(&[1, 2, 3, 4]));
        let wire = packet.compose();
        assert_eq!(wire.len(), HEADER_LEN + 4);
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn rejects_wrong_version() {
        let mut wire = RtpPacket::new(0, 0, 0, 0, Bytes::new()).compose();
        wire[0] = (1 << 6) | (wire[0] & 0x3F);
        assert!(matches!(RtpPacket::parse(&wire), Err(Error::UnsupportedVersion(1))));
    }

    #[test]
    fn rejects_extension_bit() {
        let mut wire = RtpPacket::new(0, 0, 0, 0, Bytes::new()).compose();
        wire[0] |= 1 << 4;
        assert!(matches!(RtpPacket::parse(&wire), Err(Error::ExtensionUnsupported)));
    }

    #[test]
    fn strips_valid_padding() {
        let mut wire = RtpPacket::new(0, 0, 0, 0, Bytes::from_static(&[9, 9, 9])).compose();
        wire[0] |= 1 << 5; // padding bit
        wire.push(2); // 2 bytes of padding, last byte declares the length
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(&parsed.payload[..], &[9, 9][..]);
    }

    #[test]
    fn rejects_padding_length_longer_than_payload() {
        let mut wire = RtpPacket::new(0, 0, 0, 0, Bytes::new()).compose();
        wire[0] |= 1 << 5;
        wire.push(5);
        assert!(matches!(RtpPacket::parse(&wire), Err(Error::InvalidPadding { .. })));
    }

    #[test]
    fn carries_csrc_list() {
        let mut packet = RtpPacket::new(8, 1, 1, 1, Bytes::from_static(&[0xAA]));
        packet.csrc = vec![11, 22, 33];
        let wire = packet.compose();
        assert_eq!(wire.len(), HEADER_LEN + 12 + 1);
        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed.csrc, vec![11, 22, 33]);
    }
}
