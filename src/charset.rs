//! Charsets and detection of the response content encoding.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use encoding_rs::Encoding;
use regex::Regex;

use crate::Error;

/// A character set used to encode request data and decode response bodies.
///
/// Labels are resolved the way browsers do it, which means some legacy names
/// map onto their superset. `ISO-8859-1` for instance resolves to
/// `windows-1252`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// UTF-8, the default charset of every outcall.
    pub const UTF_8: Charset = Charset(encoding_rs::UTF_8);

    /// Look up a charset by label, case-insensitively.
    ///
    /// Labels that only resolve to the `replacement` encoding, such as
    /// `ISO-2022-KR`, cannot decode anything and are treated as unknown.
    pub fn for_label(label: &str) -> Option<Charset> {
        Encoding::for_label(label.as_bytes())
            .filter(|e| *e != encoding_rs::REPLACEMENT)
            .map(Charset)
    }

    /// Canonical name of the charset.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Encode text to bytes in this charset.
    ///
    /// Fails with [`Error::UnmappableCharacter`] if the text contains characters
    /// the charset cannot represent.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>, Error> {
        // encoding_rs only encodes to UTF-8 for the UTF-16 variants.
        if self.0 == encoding_rs::UTF_16LE {
            return Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect());
        }
        if self.0 == encoding_rs::UTF_16BE {
            return Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect());
        }

        let (bytes, used, unmappable) = self.0.encode(text);
        if unmappable || used != self.0 {
            return Err(Error::UnmappableCharacter(self.name()));
        }
        Ok(bytes)
    }

    /// Decode bytes in this charset. Malformed sequences become U+FFFD.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        self.0.decode_without_bom_handling(bytes).0
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::UTF_8
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Charset({})", self.name())
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a response `Content-Type` header says about the body charset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    /// The header names a known charset.
    Explicit(Charset),

    /// No header, or a header without a `charset` parameter. The charset
    /// configured on the call applies.
    ConfiguredDefault,

    /// The header names a charset that cannot be resolved. UTF-8 applies,
    /// regardless of the configured charset.
    UnresolvableFallback(String),
}

impl ContentEncoding {
    /// Pick the charset to decode with.
    pub fn resolve(&self, configured: Charset) -> Charset {
        match self {
            ContentEncoding::Explicit(v) => *v,
            ContentEncoding::ConfiguredDefault => configured,
            ContentEncoding::UnresolvableFallback(_) => Charset::UTF_8,
        }
    }
}

fn charset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\bcharset=\s*"?([^\s;"]*)"#).expect("charset pattern to compile")
    })
}

/// Inspect a `Content-Type` header value for its `charset` parameter.
///
/// The parameter name is matched case-insensitively, the value may be quoted
/// and ends at whitespace, `;` or `"`.
pub fn detect_content_encoding(content_type: Option<&str>) -> ContentEncoding {
    let Some(content_type) = content_type else {
        return ContentEncoding::ConfiguredDefault;
    };

    let Some(captures) = charset_pattern().captures(content_type) else {
        return ContentEncoding::ConfiguredDefault;
    };

    let label = captures
        .get(1)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .trim()
        .to_uppercase();

    match Charset::for_label(&label) {
        Some(v) => ContentEncoding::Explicit(v),
        None => ContentEncoding::UnresolvableFallback(label),
    }
}
