//! RFC-4648 Base64 and the URL-safe variant. Same table scheme as the
//! Base32 family: six precomputed contribution tables, two or three lookups
//! OR-ed together per output byte.

use zeroize::Zeroize;

use crate::converter::{Converter, InvalidEncoding, Padding};
use crate::text;

const PAD: char = '=';

const INVALID: u8 = 0xFF;

const MASK_INVALID: u8 = 0xFF;

/// Spill mask for the final digit, indexed by the digit count mod 4. A
/// remainder of one cannot arise from a whole number of bytes.
const OVERFLOW_MASKS: [u8; 4] = [0, MASK_INVALID, 0b00_1111, 0b00_0011];

/// Output bytes carried by a partial block of `r` characters.
const TAIL_BYTES: [usize; 4] = [0, 0, 1, 2];

/// Characters emitted for a block of `n` bytes, `n` in `1..=3`.
const EMITTED: [usize; 4] = [0, 2, 3, 4];

pub struct Base64 {
    alphabet: &'static [u8; 64],
    padding: Padding,
    decode: [u8; 128],
    contrib: [[u8; 128]; 6],
}

impl Base64 {
    const fn new(alphabet: &'static [u8; 64], padding: Padding) -> Self {
        let mut decode = [INVALID; 128];
        let mut i = 0;
        while i < 64 {
            decode[alphabet[i] as usize] = i as u8;
            i += 1;
        }

        let mut contrib = [[0u8; 128]; 6];
        let mut c = 0;
        while c < 128 {
            let d = decode[c];
            if d != INVALID {
                contrib[0][c] = d << 2; // char 0 -> byte 0
                contrib[1][c] = d >> 4; // char 1 -> byte 0
                contrib[2][c] = d << 4; // char 1 -> byte 1
                contrib[3][c] = d >> 2; // char 2 -> byte 1
                contrib[4][c] = d << 6; // char 2 -> byte 2
                contrib[5][c] = d; // char 3 -> byte 2
            }
            c += 1;
        }

        Base64 {
            alphabet,
            padding,
            decode,
            contrib,
        }
    }

    /// Characters in the canonical (unpadded) encoding of `len` bytes.
    pub const fn encoded_len(len: usize) -> usize {
        len / 3 * 4 + EMITTED[len % 3]
    }

    fn digit(&self, c: char) -> Option<u8> {
        let cp = c as u32;
        if cp >= 128 {
            return None;
        }
        match self.decode[cp as usize] {
            INVALID => None,
            d => Some(d),
        }
    }

    fn strip_padding<'a>(&self, stripped: &'a [char]) -> &'a [char] {
        let mut len = stripped.len();
        while len > 0 && stripped[len - 1] == PAD {
            len -= 1;
        }
        &stripped[..len]
    }
}

impl Converter for Base64 {
    fn encode_chars(&self, data: &[u8]) -> Vec<char> {
        let mut out = Vec::with_capacity(data.len().div_ceil(3) * 4);
        for chunk in data.chunks(3) {
            let mut block = [0u8; 3];
            block[..chunk.len()].copy_from_slice(chunk);
            let digits = [
                block[0] >> 2,
                (block[0] & 0b0000_0011) << 4 | block[1] >> 4,
                (block[1] & 0b0000_1111) << 2 | block[2] >> 6,
                block[2] & 0b0011_1111,
            ];
            for &d in &digits[..EMITTED[chunk.len()]] {
                out.push(self.alphabet[d as usize] as char);
            }
        }
        if self.padding == Padding::Required {
            while out.len() % 4 != 0 {
                out.push(PAD);
            }
        }
        out
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding> {
        let stripped = text::strip_whitespace(text);
        let data = self.strip_padding(&stripped);

        let r = data.len() % 4;
        if OVERFLOW_MASKS[r] == MASK_INVALID {
            return Err(InvalidEncoding::BadLength {
                length: data.len(),
                input: text.iter().collect(),
            });
        }

        let mut raw = Vec::with_capacity(data.len());
        for (i, &c) in data.iter().enumerate() {
            if self.digit(c).is_none() {
                return Err(InvalidEncoding::BadCharacter {
                    character: c,
                    position: text::original_position(text, i),
                    input: text.iter().collect(),
                });
            }
            raw.push(c as u8);
        }

        if r != 0 {
            let last = self.decode[raw[raw.len() - 1] as usize];
            if last & OVERFLOW_MASKS[r] != 0 {
                return Err(InvalidEncoding::TrailingBits {
                    tail: data[data.len() - r..].iter().collect(),
                });
            }
        }

        let out_len = raw.len() / 4 * 3 + TAIL_BYTES[r];
        let mut out = Vec::with_capacity(raw.len().div_ceil(4) * 3);
        for chunk in raw.chunks(4) {
            let mut idx = [0usize; 4];
            for (k, &b) in chunk.iter().enumerate() {
                idx[k] = b as usize;
            }
            let t = &self.contrib;
            out.push(t[0][idx[0]] | t[1][idx[1]]);
            out.push(t[2][idx[1]] | t[3][idx[2]]);
            out.push(t[4][idx[2]] | t[5][idx[3]]);
        }
        out.truncate(out_len);
        Ok(out)
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        let mut out = text::CharBuf::with_capacity(text.len());
        let mut digits: Vec<u8> = Vec::with_capacity(text.len());
        for &c in text {
            if let Some(d) = self.digit(c) {
                out.push(c);
                digits.push(d);
            }
        }

        loop {
            let r = digits.len() % 4;
            let mask = OVERFLOW_MASKS[r];
            let dirty = match digits.last() {
                Some(&last) => mask == MASK_INVALID || last & mask != 0,
                None => false,
            };
            if !dirty {
                break;
            }
            out.push(self.alphabet[0] as char);
            digits.push(0);
        }

        if self.padding == Padding::Required {
            while out.len() % 4 != 0 {
                out.push(PAD);
            }
        }
        digits.zeroize();
        out.into_trimmed()
    }
}

/// RFC-4648 Base64, padded.
pub static BASE64: Base64 = Base64::new(
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/",
    Padding::Required,
);

/// URL-and-filename-safe alphabet, padding accepted but not produced.
pub static BASE64URL: Base64 = Base64::new(
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_",
    Padding::Optional,
);

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_rfc4648_vectors() {
        assert_eq!(BASE64.encode(b""), "");
        assert_eq!(BASE64.encode(b"f"), "Zg==");
        assert_eq!(BASE64.encode(b"fo"), "Zm8=");
        assert_eq!(BASE64.encode(b"foo"), "Zm9v");
        assert_eq!(BASE64.encode(b"foob"), "Zm9vYg==");
        assert_eq!(BASE64.encode(b"fooba"), "Zm9vYmE=");
        assert_eq!(BASE64.encode(b"foobar"), "Zm9vYmFy");
    }

    #[test]
    fn test_url_variant() {
        assert_eq!(BASE64URL.encode(&[0x66, 0x6f]), "Zm8");
        assert_eq!(BASE64URL.encode(&[0xfb, 0xff]), "-_8");
        assert_eq!(BASE64URL.decode("Zm8=").unwrap(), b"fo");
        assert_eq!(BASE64URL.decode("Zm8").unwrap(), b"fo");
    }

    #[test]
    fn test_decode() {
        assert_eq!(BASE64.decode("Zm9v").unwrap(), b"foo");
        assert_eq!(BASE64.decode("Zm8=").unwrap(), b"fo");
        assert_eq!(BASE64.decode("Zm8").unwrap(), b"fo");
        assert_eq!(BASE64.decode("Z m\n8 =").unwrap(), b"fo");
        assert_eq!(BASE64.decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(
            BASE64.decode("Z").unwrap_err(),
            InvalidEncoding::BadLength {
                length: 1,
                input: "Z".into()
            }
        );
        assert_eq!(
            BASE64.decode("Zm-v").unwrap_err(),
            InvalidEncoding::BadCharacter {
                character: '-',
                position: 2,
                input: "Zm-v".into()
            }
        );
        // 'Zm9' is fine but 'Zm9=' leaves spilled bits in '9'.
        assert!(matches!(
            BASE64.decode("Zm9=").unwrap_err(),
            InvalidEncoding::TrailingBits { .. }
        ));
    }

    #[test]
    fn test_clean() {
        assert_eq!(BASE64.clean("Zm8"), "Zm8=");
        assert_eq!(BASE64.clean("Z!m?8"), "Zm8=");
        // A single leftover digit gains a zero digit to become decodable.
        assert_eq!(BASE64.clean("Zm9vZ"), "Zm9vZA==");
        // Spilled bits are absorbed by an appended zero digit.
        assert_eq!(BASE64.clean("Zm9"), "Zm9A");
        assert_eq!(BASE64.decode(&BASE64.clean("Zm9")).unwrap(), vec![0x66, 0x6f, 0x40]);
        assert_eq!(BASE64URL.clean("Zm8="), "Zm8");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256, failure_persistence: None, ..ProptestConfig::default()
        })]

        #[test]
        fn proptest_roundtrips(bytes in any::<Vec<u8>>()) {
            for codec in [&BASE64, &BASE64URL] {
                let encoded = codec.encode(&bytes);
                assert_eq!(Base64::encoded_len(bytes.len()), encoded.trim_end_matches(PAD).len());
                assert_eq!(codec.decode(&encoded).unwrap(), bytes);
            }
        }

        #[test]
        fn proptest_canonical(bytes in any::<Vec<u8>>()) {
            for codec in [&BASE64, &BASE64URL] {
                let encoded = codec.encode(&bytes);
                assert_eq!(codec.clean(&encoded), encoded);
            }
        }

        #[test]
        fn proptest_clean_idempotent_and_decodable(s in any::<String>()) {
            for codec in [&BASE64, &BASE64URL] {
                let once = codec.clean(&s);
                assert_eq!(codec.clean(&once), once);
                codec.decode(&once).unwrap();
            }
        }

        #[test]
        fn proptest_decode_never_panics(s in any::<String>()) {
            for codec in [&BASE64, &BASE64URL] {
                let _ = codec.decode(&s);
            }
        }
    }
}
