//! Text-encoded binary codecs: hex, the Base32 and Base64 families,
//! Base128, and Ascii85, plus the character-buffer utilities they share.
//!
//! Every codec is a stateless [`Converter`] with immutable precomputed
//! tables, shared freely across threads. The default instances are exposed
//! as named statics. [`base64_hex`] stands apart: it is order-preserving by
//! construction and deliberately supports neither whitespace nor cleaning,
//! so it is exposed as module-level functions instead of a `Converter`.

pub mod ascii85;
pub mod base128;
pub mod base32;
pub mod base64;
pub mod base64_hex;
mod converter;
pub mod hex;
pub mod text;

pub use crate::ascii85::{Ascii85, ASCII85, ASCII85_B_TO_A};
pub use crate::base128::{Base128, BASE128};
pub use crate::base32::{
    Base32, BASE32, BASE32_CROCKFORD, BASE32_HEX, BASE32_LOWER_HEX, ZBASE32,
};
pub use crate::base64::{Base64, BASE64, BASE64URL};
pub use crate::converter::{Ascii85Reason, Converter, InvalidEncoding};
pub use crate::hex::{Hex, HEX};
