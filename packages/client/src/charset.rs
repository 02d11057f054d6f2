use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::Error;

/// Encoding applied to string event bodies before they are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Utf16Be,
    Utf16Le,
}

impl Charset {
    /// IANA name, as used in a `Content-Type` header.
    pub fn name(&self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Ascii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
        }
    }

    /// Encode `text`. Characters the charset cannot represent are an error.
    pub fn encode(&self, text: &str) -> Result<Bytes, Error> {
        let bytes = match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Ascii => single_byte(text, 0x7F, *self)?,
            Charset::Latin1 => single_byte(text, 0xFF, *self)?,
            Charset::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Charset::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        };
        Ok(Bytes::from(bytes))
    }
}

fn single_byte(text: &str, max: u32, charset: Charset) -> Result<Vec<u8>, Error> {
    text.chars()
        .map(|c| {
            u8::try_from(c as u32)
                .ok()
                .filter(|b| u32::from(*b) <= max)
                .ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "character {c:?} cannot be encoded as {}",
                        charset.name()
                    ))
                })
        })
        .collect()
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('_', "-").as_str() {
            "UTF-8" | "UTF8" => Ok(Charset::Utf8),
            "US-ASCII" | "ASCII" => Ok(Charset::Ascii),
            "ISO-8859-1" | "LATIN1" | "LATIN-1" => Ok(Charset::Latin1),
            "UTF-16BE" => Ok(Charset::Utf16Be),
            "UTF-16LE" => Ok(Charset::Utf16Le),
            _ => Err(Error::invalid_argument(format!("unsupported charset {s:?}"))),
        }
    }
}
