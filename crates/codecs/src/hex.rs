//! Hexadecimal codec. Lowercase is canonical; uppercase is accepted on
//! decode. Full-width digits are folded to ASCII by `clean` only.

use zeroize::Zeroize;

use crate::converter::{Converter, InvalidEncoding};
use crate::text;

const DIGITS: &[u8; 16] = b"0123456789abcdef";

const INVALID: u8 = 0xFF;

/// High- and low-nibble character tables, indexed by the full byte value.
const ENCODE_HI: [char; 256] = {
    let mut table = ['0'; 256];
    let mut b = 0;
    while b < 256 {
        table[b] = DIGITS[b >> 4] as char;
        b += 1;
    }
    table
};

const ENCODE_LO: [char; 256] = {
    let mut table = ['0'; 256];
    let mut b = 0;
    while b < 256 {
        table[b] = DIGITS[b & 0xF] as char;
        b += 1;
    }
    table
};

const DECODE: [u8; 128] = {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < 16 {
        table[DIGITS[i] as usize] = i as u8;
        i += 1;
    }
    let mut i = 10;
    while i < 16 {
        table[(DIGITS[i] - b'a' + b'A') as usize] = i as u8;
        i += 1;
    }
    table
};

pub struct Hex;

pub static HEX: Hex = Hex;

fn digit(c: char) -> Option<u8> {
    let cp = c as u32;
    if cp >= 128 {
        return None;
    }
    match DECODE[cp as usize] {
        INVALID => None,
        d => Some(d),
    }
}

/// Folds a character to canonical lowercase hex, accepting the full-width
/// forms `０-９`, `ａ-ｆ` and `Ａ-Ｆ`. Returns `None` for anything else.
fn fold(c: char) -> Option<char> {
    match c {
        '0'..='9' | 'a'..='f' => Some(c),
        'A'..='F' => Some(c.to_ascii_lowercase()),
        '\u{FF10}'..='\u{FF19}' => char::from_u32(c as u32 - 0xFF10 + '0' as u32),
        '\u{FF41}'..='\u{FF46}' => char::from_u32(c as u32 - 0xFF41 + 'a' as u32),
        '\u{FF21}'..='\u{FF26}' => char::from_u32(c as u32 - 0xFF21 + 'a' as u32),
        _ => None,
    }
}

impl Converter for Hex {
    fn encode_chars(&self, data: &[u8]) -> Vec<char> {
        let mut out = Vec::with_capacity(data.len() * 2);
        for &b in data {
            out.push(ENCODE_HI[b as usize]);
            out.push(ENCODE_LO[b as usize]);
        }
        out
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding> {
        let stripped = text::strip_whitespace(text);
        if stripped.len() % 2 != 0 {
            return Err(InvalidEncoding::OddLength {
                input: text.iter().collect(),
            });
        }
        let mut out = Vec::with_capacity(stripped.len() / 2);
        for (i, &c) in stripped.iter().enumerate() {
            let Some(d) = digit(c) else {
                out.zeroize();
                return Err(InvalidEncoding::BadCharacter {
                    character: c,
                    position: text::original_position(text, i),
                    input: text.iter().collect(),
                });
            };
            if i % 2 == 0 {
                out.push(d << 4);
            } else {
                *out.last_mut().expect("high nibble was pushed") |= d;
            }
        }
        Ok(out)
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        let mut out = text::CharBuf::with_capacity(text.len());
        for &c in text {
            if let Some(folded) = fold(c) {
                out.push(folded);
            }
        }
        if out.len() % 2 != 0 {
            out.push('0');
        }
        out.into_trimmed()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(HEX.encode(&[]), "");
        assert_eq!(HEX.encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(HEX.encode(&[0x00, 0x01, 0x10]), "000110");
    }

    #[test]
    fn test_decode_mixed_case() {
        assert_eq!(
            HEX.decode("DEADbeef").unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(HEX.decode(" de ad\tbe ef ").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(HEX.decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_odd_length() {
        let err = HEX.decode("123").unwrap_err();
        assert_eq!(
            err,
            InvalidEncoding::OddLength {
                input: "123".into()
            }
        );
        assert_eq!(
            err.to_string(),
            "Input data contains an odd number of characters \"123\""
        );
    }

    #[test]
    fn test_decode_bad_character() {
        let err = HEX.decode("12g4").unwrap_err();
        assert_eq!(
            err,
            InvalidEncoding::BadCharacter {
                character: 'g',
                position: 2,
                input: "12g4".into()
            }
        );
        assert_eq!(
            err.to_string(),
            "Invalid character 'g' at position 2 in input."
        );
        // Positions count characters of the original input, whitespace
        // included.
        assert_eq!(
            HEX.decode("12 g4").unwrap_err(),
            InvalidEncoding::BadCharacter {
                character: 'g',
                position: 3,
                input: "12 g4".into()
            }
        );
    }

    #[test]
    fn test_clean_folds_fullwidth() {
        assert_eq!(HEX.clean("ＤＥａｄ０９"), "dead09");
        // Full-width digits are a clean-only tolerance.
        assert!(matches!(
            HEX.decode("ＤＥ").unwrap_err(),
            InvalidEncoding::BadCharacter { position: 0, .. }
        ));
        assert_eq!(HEX.clean("de xx ad"), "dead");
        assert_eq!(HEX.clean("abc"), "abc0");
        assert_eq!(HEX.clean(""), "");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256, failure_persistence: None, ..ProptestConfig::default()
        })]

        #[test]
        fn proptest_hex_roundtrips(bytes in any::<Vec<u8>>()) {
            assert_eq!(HEX.decode(&HEX.encode(&bytes)).unwrap(), bytes);
        }

        #[test]
        fn proptest_hex_matches_hex_crate(bytes in any::<Vec<u8>>()) {
            assert_eq!(HEX.encode(&bytes), hex::encode(&bytes));
        }

        #[test]
        fn proptest_hex_canonical(bytes in any::<Vec<u8>>()) {
            let encoded = HEX.encode(&bytes);
            assert_eq!(HEX.clean(&encoded), encoded);
        }

        #[test]
        fn proptest_hex_clean_idempotent(s in any::<String>()) {
            let once = HEX.clean(&s);
            assert_eq!(HEX.clean(&once), once);
            // A cleaned string always decodes.
            HEX.decode(&once).unwrap();
        }

        #[test]
        fn proptest_hex_decode_never_panics(s in any::<String>()) {
            let _ = HEX.decode(&s);
        }
    }
}
