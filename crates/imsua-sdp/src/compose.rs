//! Serializes an [`SdpMessage`] back to its `CRLF`-separated wire form.

use std::fmt::Write as _;

use crate::types::SdpMessage;

/// Render `message` as an SDP body, each line terminated with `\r\n`, in canonical field order
/// (`v`, `o`, `s`, `c`, `b`, `t`, `a`, then one `m` block per media description with its own
/// `c`/`b`/`a` lines).
pub fn compose(message: &SdpMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "v={}\r", message.version);
    let _ = writeln!(out, "o={}\r", message.origin);
    let _ = writeln!(out, "s={}\r", message.session_name);
    if let Some(conn) = &message.connection {
        let _ = writeln!(out, "c={}\r", conn);
    }
    for bw in &message.bandwidths {
        let _ = writeln!(out, "b={}\r", bw);
    }
    let _ = writeln!(out, "t={}\r", message.timing);
    for attr in &message.attributes {
        let _ = writeln!(out, "a={}\r", attr);
    }
    for media in &message.media {
        let formats: Vec<String> = media.formats.iter().map(|f| f.to_string()).collect();
        let _ = writeln!(
            out,
            "m={} {} {} {}\r",
            media.media,
            media.port,
            media.protocol,
            formats.join(" ")
        );
        if let Some(conn) = &media.connection {
            let _ = writeln!(out, "c={}\r", conn);
        }
        for bw in &media.bandwidths {
            let _ = writeln!(out, "b={}\r", bw);
        }
        for attr in &media.attributes {
            let _ = writeln!(out, "a={}\r", attr);
        }
    }
    // `writeln!` on a `String` emits `\n`; the explicit `\r` above plus this `\n` gives `\r\n`.
    out
}
