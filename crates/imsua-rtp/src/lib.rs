//! RTP packet codec, G.711 companding, and the media format registry.

pub mod codec;
mod error;
mod format;
mod packet;

pub use error::{Error, Result};
pub use format::{FormatRegistry, MediaFormat};
pub use packet::{RtpPacket, HEADER_LEN, VERSION};
