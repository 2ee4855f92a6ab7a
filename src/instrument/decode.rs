//! Reply decoding for the nanovoltmeter's textual protocol.
//!
//! Replies may start with a short framing marker left over from the gateway
//! (observed as ``1` `` and `1'`), end in one or more line terminators, and carry
//! numbers in scientific notation with an optional leading `+`.

use crate::error::LinkError;

/// Strips framing from raw replies and parses numeric ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDecoder {
    prefixes: Vec<String>,
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new(vec!["1`".to_string(), "1'".to_string()])
    }
}

impl ReplyDecoder {
    /// Decoder that strips the first matching entry of `prefixes`.
    ///
    /// Empty prefixes are ignored.
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            prefixes: prefixes.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Framing markers this decoder strips.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Reply text with the framing marker and trailing line terminators removed.
    pub fn decode_text<'a>(&self, raw: &'a str) -> &'a str {
        let unframed = self
            .prefixes
            .iter()
            .find_map(|prefix| raw.strip_prefix(prefix.as_str()))
            .unwrap_or(raw);
        unframed.trim_end_matches(|c: char| c == '\n' || c == '\r')
    }

    /// Reply parsed as a floating point number.
    pub fn decode_f64(&self, raw: &str) -> Result<f64, LinkError> {
        let text = self.decode_text(raw).trim();
        let text = text.strip_prefix('+').unwrap_or(text);
        text.parse::<f64>()
            .map_err(|_| LinkError::DoubleCouldNotBeDecoded {
                raw: raw.to_string(),
            })
    }
}
