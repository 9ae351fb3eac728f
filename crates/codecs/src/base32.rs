//! Base32 family: RFC-4648, the hex alphabets, Crockford and z-base-32.
//! One table-driven implementation; the variants are pure configuration.
//!
//! Decode works in blocks of eight characters to five bytes. Each output
//! byte is the OR of two or three lookups in precomputed contribution
//! tables, one table per (character slot, output byte) pair; every entry is
//! the digit value already shifted into place. Rows for non-alphabet
//! codepoints are zero, so a zero-padded partial block needs no branching.

use zeroize::Zeroize;

use crate::converter::{Converter, InvalidEncoding, Padding};
use crate::text;

const PAD: char = '=';

const INVALID: u8 = 0xFF;

const MASK_INVALID: u8 = 0xFF;

/// Low bits of the final digit that would spill past the declared output
/// length, indexed by the digit count mod 8. Remainders 1, 3 and 6 cannot
/// arise from a whole number of bytes.
const OVERFLOW_MASKS: [u8; 8] = [
    0,
    MASK_INVALID,
    0b0_0011,
    MASK_INVALID,
    0b0_1111,
    0b0_0001,
    MASK_INVALID,
    0b0_0111,
];

/// Output bytes carried by a partial block of `r` characters.
const TAIL_BYTES: [usize; 8] = [0, 0, 1, 0, 2, 3, 0, 4];

/// Characters emitted for a block of `n` bytes, `n` in `1..=5`.
const EMITTED: [usize; 6] = [0, 2, 4, 5, 7, 8];

const fn case_flipped(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b + 32
    } else if b.is_ascii_lowercase() {
        b - 32
    } else {
        b
    }
}

pub struct Base32 {
    alphabet: &'static [u8; 32],
    padding: Padding,
    decode: [u8; 128],
    contrib: [[u8; 128]; 12],
}

impl Base32 {
    const fn new(
        alphabet: &'static [u8; 32],
        padding: Padding,
        case_insensitive: bool,
        substitutions: &'static [(u8, u8)],
    ) -> Self {
        let mut decode = [INVALID; 128];
        let mut i = 0;
        while i < 32 {
            decode[alphabet[i] as usize] = i as u8;
            if case_insensitive {
                decode[case_flipped(alphabet[i]) as usize] = i as u8;
            }
            i += 1;
        }
        let mut i = 0;
        while i < substitutions.len() {
            let (from, to) = (substitutions[i].0, substitutions[i].1);
            decode[from as usize] = decode[to as usize];
            i += 1;
        }

        let mut contrib = [[0u8; 128]; 12];
        let mut c = 0;
        while c < 128 {
            let d = decode[c];
            if d != INVALID {
                contrib[0][c] = d << 3; // char 0 -> byte 0
                contrib[1][c] = d >> 2; // char 1 -> byte 0
                contrib[2][c] = d << 6; // char 1 -> byte 1
                contrib[3][c] = d << 1; // char 2 -> byte 1
                contrib[4][c] = d >> 4; // char 3 -> byte 1
                contrib[5][c] = d << 4; // char 3 -> byte 2
                contrib[6][c] = d >> 1; // char 4 -> byte 2
                contrib[7][c] = d << 7; // char 4 -> byte 3
                contrib[8][c] = d << 2; // char 5 -> byte 3
                contrib[9][c] = d >> 3; // char 6 -> byte 3
                contrib[10][c] = d << 5; // char 6 -> byte 4
                contrib[11][c] = d; // char 7 -> byte 4
            }
            c += 1;
        }

        Base32 {
            alphabet,
            padding,
            decode,
            contrib,
        }
    }

    /// Characters in the canonical (unpadded) encoding of `len` bytes.
    pub const fn encoded_len(len: usize) -> usize {
        len / 5 * 8 + EMITTED[len % 5]
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

    /// Canonical character and digit value for `c`: case folded to the
    /// variant's preferred case, substitutions applied.
    fn canonical_digit(&self, c: char) -> Option<(char, u8)> {
        let d = self.digit(c)?;
        Some((self.alphabet[d as usize] as char, d))
    }

    /// Strips trailing padding characters where the variant knows them.
    fn strip_padding<'a>(&self, stripped: &'a [char]) -> &'a [char] {
        if self.padding == Padding::Forbidden {
            return stripped;
        }
        let mut len = stripped.len();
        while len > 0 && stripped[len - 1] == PAD {
            len -= 1;
        }
        &stripped[..len]
    }
}

impl Converter for Base32 {
    fn encode_chars(&self, data: &[u8]) -> Vec<char> {
        let mut out = Vec::with_capacity(data.len().div_ceil(5) * 8);
        for chunk in data.chunks(5) {
            let mut block = [0u8; 5];
            block[..chunk.len()].copy_from_slice(chunk);
            let digits = [
                (block[0] & 0b1111_1000) >> 3,
                (block[0] & 0b0000_0111) << 2 | (block[1] & 0b1100_0000) >> 6,
                (block[1] & 0b0011_1110) >> 1,
                (block[1] & 0b0000_0001) << 4 | (block[2] & 0b1111_0000) >> 4,
                (block[2] & 0b0000_1111) << 1 | (block[3] >> 7),
                (block[3] & 0b0111_1100) >> 2,
                (block[3] & 0b0000_0011) << 3 | (block[4] & 0b1110_0000) >> 5,
                block[4] & 0b0001_1111,
            ];
            for &d in &digits[..EMITTED[chunk.len()]] {
                out.push(self.alphabet[d as usize] as char);
            }
        }
        if self.padding == Padding::Required {
            while out.len() % 8 != 0 {
                out.push(PAD);
            }
        }
        out
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding> {
        let stripped = text::strip_whitespace(text);
        let data = self.strip_padding(&stripped);

        let r = data.len() % 8;
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

        let out_len = raw.len() / 8 * 5 + TAIL_BYTES[r];
        let mut out = Vec::with_capacity(raw.len().div_ceil(8) * 5);
        for chunk in raw.chunks(8) {
            // Codepoint zero has all-zero contributions, so a short final
            // block decodes without branching.
            let mut idx = [0usize; 8];
            for (k, &b) in chunk.iter().enumerate() {
                idx[k] = b as usize;
            }
            let t = &self.contrib;
            out.push(t[0][idx[0]] | t[1][idx[1]]);
            out.push(t[2][idx[1]] | t[3][idx[2]] | t[4][idx[3]]);
            out.push(t[5][idx[3]] | t[6][idx[4]]);
            out.push(t[7][idx[4]] | t[8][idx[5]] | t[9][idx[6]]);
            out.push(t[10][idx[6]] | t[11][idx[7]]);
        }
        out.truncate(out_len);
        Ok(out)
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        let mut out = text::CharBuf::with_capacity(text.len());
        let mut digits: Vec<u8> = Vec::with_capacity(text.len());
        for &c in text {
            if let Some((canonical, d)) = self.canonical_digit(c) {
                out.push(canonical);
                digits.push(d);
            }
        }

        // Append zero-digits until the tail is decodable: the remainder is a
        // legal block length and the final digit carries no spilled bits.
        loop {
            let r = digits.len() % 8;
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
            while out.len() % 8 != 0 {
                out.push(PAD);
            }
        }
        digits.zeroize();
        out.into_trimmed()
    }
}

const CROCKFORD_SUBSTITUTIONS: &[(u8, u8)] = &[
    (b'O', b'0'),
    (b'o', b'0'),
    (b'I', b'1'),
    (b'i', b'1'),
    (b'L', b'1'),
    (b'l', b'1'),
];

/// RFC-4648 Base32, canonical uppercase, padded.
pub static BASE32: Base32 = Base32::new(
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567",
    Padding::Required,
    true,
    &[],
);

/// RFC-4648 Base32 with the extended-hex alphabet, canonical uppercase.
pub static BASE32_HEX: Base32 = Base32::new(
    b"0123456789ABCDEFGHIJKLMNOPQRSTUV",
    Padding::Optional,
    true,
    &[],
);

/// Extended-hex alphabet, canonical lowercase.
pub static BASE32_LOWER_HEX: Base32 = Base32::new(
    b"0123456789abcdefghijklmnopqrstuv",
    Padding::Optional,
    true,
    &[],
);

/// Crockford's Base32: no I, L, O or U; `O`/`o` decode as `0` and
/// `I`/`i`/`L`/`l` as `1`.
pub static BASE32_CROCKFORD: Base32 = Base32::new(
    b"0123456789ABCDEFGHJKMNPQRSTVWXYZ",
    Padding::Optional,
    true,
    CROCKFORD_SUBSTITUTIONS,
);

/// z-base-32: permuted lowercase alphabet, never padded, single-case.
pub static ZBASE32: Base32 = Base32::new(
    b"ybndrfg8ejkmcpqxot1uwisza345h769",
    Padding::Forbidden,
    false,
    &[],
);

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_rfc4648_vectors() {
        assert_eq!(BASE32.encode(b""), "");
        assert_eq!(BASE32.encode(b"f"), "MY======");
        assert_eq!(BASE32.encode(b"fo"), "MZXQ====");
        assert_eq!(BASE32.encode(b"foo"), "MZXW6===");
        assert_eq!(BASE32.encode(b"foob"), "MZXW6YQ=");
        assert_eq!(BASE32.encode(b"fooba"), "MZXW6YTB");
        assert_eq!(BASE32.encode(b"foobar"), "MZXW6YTBOI======");
    }

    #[test]
    fn test_decode() {
        assert_eq!(BASE32.decode("MZXW6===").unwrap(), b"foo");
        assert_eq!(BASE32.decode("MZXW6").unwrap(), b"foo");
        assert_eq!(BASE32.decode("mzxw6===").unwrap(), b"foo");
        assert_eq!(BASE32.decode(" MZ XW6= == ").unwrap(), b"foo");
        assert_eq!(BASE32.decode("").unwrap(), Vec::<u8>::new());
        assert_eq!(BASE32.decode("========").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_bad_length() {
        assert_eq!(
            BASE32.decode("1").unwrap_err(),
            InvalidEncoding::BadLength {
                length: 1,
                input: "1".into()
            }
        );
        assert!(matches!(
            BASE32.decode("MZX").unwrap_err(),
            InvalidEncoding::BadLength { length: 3, .. }
        ));
    }

    #[test]
    fn test_decode_bad_character() {
        assert_eq!(
            BASE32.decode("MZ1W6===").unwrap_err(),
            InvalidEncoding::BadCharacter {
                character: '1',
                position: 2,
                input: "MZ1W6===".into()
            }
        );
    }

    #[test]
    fn test_decode_trailing_bits() {
        // Five digits carry three bytes plus one spare bit; '7' (digit 31)
        // leaves that bit set.
        assert!(matches!(
            BASE32.decode("MZXW7===").unwrap_err(),
            InvalidEncoding::TrailingBits { .. }
        ));
    }

    #[test]
    fn test_clean_repairs_tail() {
        assert_eq!(BASE32.clean("MZXW6"), "MZXW6===");
        assert_eq!(BASE32.clean("mzxw6!!!"), "MZXW6===");
        // Incorrect-length tails gain zero digits until decodable.
        assert_eq!(BASE32.clean("MZX"), "MZXA====");
        assert_eq!(BASE32.decode(&BASE32.clean("MZX")).unwrap(), vec![0x66, 0x6e]);
        assert_eq!(BASE32.clean(""), "");
    }

    #[test]
    fn test_crockford_substitutions() {
        assert_eq!(
            BASE32_CROCKFORD.decode("LO").unwrap(),
            BASE32_CROCKFORD.decode("10").unwrap()
        );
        assert_eq!(
            BASE32_CROCKFORD.decode("i8").unwrap(),
            BASE32_CROCKFORD.decode("18").unwrap()
        );
        // 'X' is digit 29; its spilled bits draw an appended zero digit.
        assert_eq!(BASE32_CROCKFORD.clean("oIlx"), "011X0");
    }

    #[test]
    fn test_zbase32_single_case() {
        let encoded = ZBASE32.encode(b"hello");
        assert_eq!(encoded, encoded.to_lowercase());
        assert!(ZBASE32.decode(&encoded.to_uppercase()).is_err());
        assert_eq!(ZBASE32.decode(&encoded).unwrap(), b"hello");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256, failure_persistence: None, ..ProptestConfig::default()
        })]

        #[test]
        fn proptest_roundtrips(bytes in any::<Vec<u8>>()) {
            for codec in [&BASE32, &BASE32_HEX, &BASE32_LOWER_HEX, &BASE32_CROCKFORD, &ZBASE32] {
                let encoded = codec.encode(&bytes);
                assert_eq!(Base32::encoded_len(bytes.len()), encoded.trim_end_matches(PAD).len());
                assert_eq!(codec.decode(&encoded).unwrap(), bytes);
            }
        }

        #[test]
        fn proptest_matches_base32_crate(bytes in any::<Vec<u8>>()) {
            let pairs: [(&Base32, base32::Alphabet); 4] = [
                (&BASE32, base32::Alphabet::Rfc4648 { padding: true }),
                (&BASE32_HEX, base32::Alphabet::Rfc4648Hex { padding: false }),
                (&BASE32_LOWER_HEX, base32::Alphabet::Rfc4648HexLower { padding: false }),
                (&BASE32_CROCKFORD, base32::Alphabet::Crockford),
            ];
            for (codec, alphabet) in pairs {
                let expected = base32::encode(alphabet, &bytes);
                assert!(codec.encode(&bytes).eq_ignore_ascii_case(&expected));
            }
        }

        #[test]
        fn proptest_canonical(bytes in any::<Vec<u8>>()) {
            for codec in [&BASE32, &BASE32_HEX, &BASE32_LOWER_HEX, &BASE32_CROCKFORD, &ZBASE32] {
                let encoded = codec.encode(&bytes);
                assert_eq!(codec.clean(&encoded), encoded);
            }
        }

        #[test]
        fn proptest_clean_idempotent_and_decodable(s in any::<String>()) {
            for codec in [&BASE32, &BASE32_HEX, &BASE32_LOWER_HEX, &BASE32_CROCKFORD, &ZBASE32] {
                let once = codec.clean(&s);
                assert_eq!(codec.clean(&once), once);
                codec.decode(&once).unwrap();
            }
        }

        #[test]
        fn proptest_clean_preserves_decode(bytes in any::<Vec<u8>>()) {
            // Unpadded, case-flipped input decodes to the same bytes before
            // and after cleaning.
            let lower = BASE32.encode(&bytes).trim_end_matches(PAD).to_lowercase();
            assert_eq!(BASE32.decode(&lower).unwrap(), bytes);
            assert_eq!(BASE32.decode(&BASE32.clean(&lower)).unwrap(), bytes);
        }

        #[test]
        fn proptest_case_insensitive(bytes in any::<Vec<u8>>()) {
            for codec in [&BASE32, &BASE32_HEX, &BASE32_LOWER_HEX, &BASE32_CROCKFORD] {
                let encoded = codec.encode(&bytes);
                assert_eq!(
                    codec.decode(&encoded.to_lowercase()).unwrap(),
                    codec.decode(&encoded.to_uppercase()).unwrap(),
                );
            }
        }

        #[test]
        fn proptest_decode_never_panics(s in any::<String>()) {
            for codec in [&BASE32, &BASE32_HEX, &BASE32_LOWER_HEX, &BASE32_CROCKFORD, &ZBASE32] {
                let _ = codec.decode(&s);
            }
        }
    }
}
