//! Dense seven-bits-per-character encoding. Seven bytes become eight
//! characters. The 128 digits are not listed anywhere: they are derived at
//! first use by scanning codepoints upward from U+0021 and keeping those in
//! Unicode general categories Nd, Ll, Lu and Sc until 128 are collected.
//! The derivation must be reproduced bit-exactly, so the categorisation
//! comes from a pinned Unicode table rather than `char::is_lowercase` (which
//! tests the derived Lowercase property, a different set).

use std::sync::LazyLock;

use finl_unicode::categories::{CharacterCategories, MinorCategory};

use crate::converter::{Converter, InvalidEncoding};
use crate::text;

const INVALID: u8 = 0xFF;

pub struct Base128 {
    alphabet: [char; 128],
    decode: Vec<u8>,
}

pub static BASE128: LazyLock<Base128> = LazyLock::new(Base128::new);

fn is_digit_category(c: char) -> bool {
    matches!(
        c.get_minor_category(),
        MinorCategory::Nd | MinorCategory::Ll | MinorCategory::Lu | MinorCategory::Sc
    )
}

impl Base128 {
    fn new() -> Self {
        let mut alphabet = ['\0'; 128];
        let mut count = 0;
        let mut cp = 0x21u32;
        while count < 128 {
            if let Some(c) = char::from_u32(cp) {
                if is_digit_category(c) {
                    alphabet[count] = c;
                    count += 1;
                }
            }
            cp += 1;
        }

        let top = alphabet[127] as usize + 1;
        let mut decode = vec![INVALID; top];
        for (d, &c) in alphabet.iter().enumerate() {
            decode[c as usize] = d as u8;
        }
        Base128 { alphabet, decode }
    }

    /// Characters in the encoding of `len` bytes: eight per whole block of
    /// seven, and `m + 1` for a trailing block of `m` bytes.
    pub const fn encoded_len(len: usize) -> usize {
        len / 7 * 8 + if len % 7 == 0 { 0 } else { len % 7 + 1 }
    }

    fn digit(&self, c: char) -> Option<u8> {
        match self.decode.get(c as usize) {
            Some(&d) if d != INVALID => Some(d),
            _ => None,
        }
    }

    /// Low bits of the final digit that no output byte covers, given the
    /// digit count mod 8. A single digit over a block boundary covers
    /// nothing at all.
    fn tail_mask(s: usize) -> u8 {
        match s {
            0 => 0,
            1 => 0x7F,
            _ => (1 << (8 - s)) - 1,
        }
    }
}

impl Converter for Base128 {
    fn encode_chars(&self, data: &[u8]) -> Vec<char> {
        let mut out = Vec::with_capacity(Self::encoded_len(data.len()));
        let mut acc: u32 = 0;
        let mut bits = 0;
        for &b in data {
            acc = acc << 8 | b as u32;
            bits += 8;
            while bits >= 7 {
                bits -= 7;
                out.push(self.alphabet[(acc >> bits) as usize & 0x7F]);
            }
        }
        if bits > 0 {
            // Remaining bits sit in the high end of one final digit.
            out.push(self.alphabet[(acc << (7 - bits)) as usize & 0x7F]);
        }
        out
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding> {
        let stripped = text::strip_whitespace(text);
        let mut digits = Vec::with_capacity(stripped.len());
        for (i, &c) in stripped.iter().enumerate() {
            let Some(d) = self.digit(c) else {
                return Err(InvalidEncoding::BadCharacter {
                    character: c,
                    position: text::original_position(text, i),
                    input: text.iter().collect(),
                });
            };
            digits.push(d);
        }

        let k = digits.len();
        let s = k % 8;
        if s != 0 && digits[k - 1] & Self::tail_mask(s) != 0 {
            return Err(InvalidEncoding::TrailingBits {
                tail: stripped[k - s..].iter().collect(),
            });
        }

        let out_len = k / 8 * 7 + if s == 0 { 0 } else { s - 1 };
        let mut out = Vec::with_capacity(out_len);
        for j in 0..out_len {
            // Byte j spans digits i and i + 1; the split moves one bit per
            // byte within each block of seven.
            let i = j + j / 7;
            let p = (j % 7) as u32;
            let hi = digits[i] << (1 + p);
            let lo = if i + 1 < k { digits[i + 1] >> (6 - p) } else { 0 };
            out.push(hi | lo);
        }
        Ok(out)
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        let mut out = text::CharBuf::with_capacity(text.len());
        let mut last = None;
        let mut count = 0usize;
        for &c in text {
            if let Some(d) = self.digit(c) {
                out.push(c);
                last = Some(d);
                count += 1;
            }
        }
        if let Some(last) = last {
            if last & Self::tail_mask(count % 8) != 0 {
                out.push(self.alphabet[0]);
            }
        }
        out.into_trimmed()
    }
}
