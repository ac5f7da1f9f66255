//! `[display-name] <uri>[;tag=...]`, the shape shared by `From`, `To`, `Contact`, and
//! `Record-Route`.

use std::fmt;

use crate::error::{Error, Result};
use crate::uri::Uri;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub tag: Option<String>,
}

impl NameAddr {
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            tag: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Parse `[display] <uri>[;tag=...]`, also accepting the bare-URI form without angle
    /// brackets that some peers still send.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (core, header_name) = (input, "name-addr");

        if let Some(lt) = core.find('<') {
            let display = core[..lt].trim().trim_matches('"');
            let rest = &core[lt + 1..];
            let gt = rest.find('>').ok_or_else(|| Error::MalformedHeader {
                header: header_name,
                detail: input.to_string(),
            })?;
            let uri_text = &rest[..gt];
            let trailer = &rest[gt + 1..];
            let uri = Uri::parse(uri_text)?;
            let tag = extract_tag(trailer);
            Ok(NameAddr {
                display_name: if display.is_empty() { None } else { Some(display.to_string()) },
                uri,
                tag,
            })
        } else {
            // Bare URI, optionally with a trailing ;tag=... that belongs to the header, not the URI.
            let (uri_part, trailer) = match core.find(";tag=") {
                Some(idx) => (&core[..idx], &core[idx..]),
                None => (core, ""),
            };
            let uri = Uri::parse(uri_part.trim())?;
            Ok(NameAddr {
                display_name: None,
                uri,
                tag: extract_tag(trailer),
            })
        }
    }
}

fn extract_tag(trailer: &str) -> Option<String> {
    trailer.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("tag=").map(|v| v.to_string())
    })
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>", self.uri)?;
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        Ok(())
    }
}
