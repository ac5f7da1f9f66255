//! Media format metadata and an explicitly-constructed registry mapping RTP payload-type IDs to
//! formats and their encode/decode functions. There is no global singleton here: callers build a
//! [`FormatRegistry`] once, at construction time, and hand it to whatever needs it.

use crate::codec::g711;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaFormat {
    pub name: &'static str,
    pub rtp_payload_type: u8,
    pub sample_rate: u32,
    pub sample_width_bytes: u8,
    pub channels: u8,
}

impl MediaFormat {
    pub const PCMU: MediaFormat = MediaFormat {
        name: "PCMU",
        rtp_payload_type: 0,
        sample_rate: 8000,
        sample_width_bytes: 2,
        channels: 1,
    };

    pub const PCMA: MediaFormat = MediaFormat {
        name: "PCMA",
        rtp_payload_type: 8,
        sample_rate: 8000,
        sample_width_bytes: 2,
        channels: 1,
    };

    pub fn encode(&self, pcm: &[u8]) -> Vec<u8> {
        match self.rtp_payload_type {
            0 => g711::encode_ulaw_buf(pcm),
            8 => g711::encode_alaw_buf(pcm),
            other => unreachable!("format {other} was constructed outside MediaFormat's builtins"),
        }
    }

    pub fn decode(&self, encoded: &[u8]) -> Vec<u8> {
        match self.rtp_payload_type {
            0 => g711::decode_ulaw_buf(encoded),
            8 => g711::decode_alaw_buf(encoded),
            other => unreachable!("format {other} was constructed outside MediaFormat's builtins"),
        }
    }
}

/// An immutable table of the formats a caller is willing to negotiate, in preference order.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<MediaFormat>,
}

impl FormatRegistry {
    pub fn new(formats: Vec<MediaFormat>) -> Self {
        Self { formats }
    }

    /// The built-in PCMU/PCMA table, PCMU first, matching this client's answerer preference.
    pub fn builtin() -> Self {
        Self::new(vec![MediaFormat::PCMU, MediaFormat::PCMA])
    }

    pub fn by_payload_type(&self, pt: u8) -> Result<MediaFormat> {
        self.formats
            .iter()
            .copied()
            .find(|f| f.rtp_payload_type == pt)
            .ok_or(Error::UnknownPayloadType(pt))
    }

    /// This registry's preference order, intersected with a remote offer's format list,
    /// returning the first local preference present in the offer.
    pub fn select(&self, offered: &[u8]) -> Option<MediaFormat> {
        self.formats.iter().copied().find(|f| offered.contains(&f.rtp_payload_type))
    }

    pub fn payload_types(&self) -> Vec<u8> {
        self.formats.iter().map(|f| f.rtp_payload_type).collect()
    }

    /// This registry's first (most preferred) format, for building an offer with nothing to
    /// intersect against yet.
    pub fn preferred(&self) -> Option<MediaFormat> {
        self.formats.first().copied()
    }

    /// Every format this registry is willing to negotiate, in preference order.
    pub fn all(&self) -> &[MediaFormat] {
        &self.formats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_prefers_pcmu() {
        let registry = FormatRegistry::builtin();
        let selected = registry.select(&[8, 0]).unwrap();
        assert_eq!(selected.rtp_payload_type, 0);
    }

    #[test]
    fn select_returns_none_when_nothing_overlaps() {
        let registry = FormatRegistry::builtin();
        assert!(registry.select(&[18, 101]).is_none());
    }

    #[test]
    fn lookup_by_payload_type() {
        let registry = FormatRegistry::builtin();
        assert_eq!(registry.by_payload_type(8).unwrap().name, "PCMA");
        assert!(registry.by_payload_type(99).is_err());
    }
}
