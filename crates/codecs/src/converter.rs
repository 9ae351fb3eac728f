use thiserror::Error;
use zeroize::Zeroize;

/// Structured decode failure. Positions are zero-based character positions in
/// the caller's original input, whitespace included. The message for
/// `BadCharacter` and `OddLength` is stable; downstream consumers compare by
/// text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidEncoding {
    #[error("Invalid character '{character}' at position {position} in input.")]
    BadCharacter {
        character: char,
        position: usize,
        input: String,
    },
    #[error("Invalid input length {length} in \"{input}\"")]
    BadLength { length: usize, input: String },
    #[error("Non-zero trailing bits in \"{tail}\"")]
    TrailingBits { tail: String },
    #[error("Input data contains an odd number of characters \"{input}\"")]
    OddLength { input: String },
    #[error("Invalid base-85 group \"{context}\": {reason}")]
    Ascii85 {
        reason: Ascii85Reason,
        context: String,
    },
}

/// Why a base-85 group was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Ascii85Reason {
    #[error("group value exceeds 32 bits")]
    ValueOverflow,
    #[error("a single trailing character cannot carry a whole byte")]
    SingleCharacterTail,
}

/// Padding policy for the block codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Padding {
    /// Canonical encodings are padded out to a whole block.
    Required,
    /// Padding is accepted on decode but never produced.
    Optional,
    /// The padding character is not part of the variant at all.
    Forbidden,
}

/// Common contract of every codec: a stateless, thread-safe converter between
/// byte sequences and their text encoding.
///
/// The character-slice operations are primary; the `&str` wrappers are
/// conveniences that collect and then zero their intermediate buffers. For
/// every implementation, `decode(encode(b)) == b`, `encode(b)` is canonical
/// (`clean(encode(b)) == encode(b)`), and `clean` is idempotent.
pub trait Converter: Send + Sync {
    /// Encodes `data` into the codec's canonical character form.
    fn encode_chars(&self, data: &[u8]) -> Vec<char>;

    /// Decodes `text`, tolerating whitespace and (where the variant allows
    /// it) trailing padding. Empty input after stripping yields empty output.
    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding>;

    /// Drops characters that are not part of the alphabet, folds case and
    /// substitutes where the variant specifies, and normalises the trailing
    /// block so that a subsequent decode succeeds. Idempotent, and the
    /// identity on canonical encodings.
    fn clean_chars(&self, text: &[char]) -> Vec<char>;

    fn encode(&self, data: &[u8]) -> String {
        let mut chars = self.encode_chars(data);
        let encoded = chars.iter().collect();
        chars.zeroize();
        encoded
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>, InvalidEncoding> {
        let mut chars: Vec<char> = text.chars().collect();
        let decoded = self.decode_chars(&chars);
        chars.zeroize();
        decoded
    }

    fn clean(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        let mut cleaned = self.clean_chars(&chars);
        let out = cleaned.iter().collect();
        cleaned.zeroize();
        chars.zeroize();
        out
    }
}
