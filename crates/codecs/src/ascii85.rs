//! Ascii85: four bytes to five characters in the digit range `!`..=`u`.
//! The framed variant wraps its output in `<~`…`~>`; the btoa variant adds
//! the `y` shortcut for a block of four spaces. `z` encodes a block of four
//! zero bytes. Shortcuts are only legal at block boundaries.

use zeroize::Zeroize;

use crate::converter::{Ascii85Reason, Converter, InvalidEncoding};
use crate::text;

const FIRST: char = '!';
const LAST: char = 'u';

/// Digit value of `u`, used to right-pad a trailing partial group on decode.
const PAD_DIGIT: u8 = 84;

const ZERO_BLOCK: [u8; 4] = [0; 4];
const SPACE_BLOCK: [u8; 4] = [0x20; 4];

pub struct Ascii85 {
    framing: bool,
    z_shortcut: bool,
    y_shortcut: bool,
}

/// Adobe-style Ascii85: framed, `z` shortcut only.
pub static ASCII85: Ascii85 = Ascii85 {
    framing: true,
    z_shortcut: true,
    y_shortcut: false,
};

/// btoa-style Ascii85: unframed, `z` and `y` shortcuts.
pub static ASCII85_B_TO_A: Ascii85 = Ascii85 {
    framing: false,
    z_shortcut: true,
    y_shortcut: true,
};

fn is_digit(c: char) -> bool {
    (FIRST..=LAST).contains(&c)
}

/// The 32-bit value of a full five-digit group, or `None` on overflow.
fn group_value(digits: &[u8; 5]) -> Option<u32> {
    let mut value: u64 = 0;
    for &d in digits {
        value = value * 85 + d as u64;
    }
    u32::try_from(value).ok()
}

fn push_group(out: &mut Vec<char>, value: u32, count: usize) {
    let mut digits = [0u8; 5];
    let mut v = value;
    for slot in digits.iter_mut().rev() {
        *slot = (v % 85) as u8;
        v /= 85;
    }
    for &d in &digits[..count] {
        out.push((b'!' + d) as char);
    }
}

impl Ascii85 {
    /// Removes the `<~`…`~>` frame from a whitespace-stripped input.
    /// Returns the content and its offset into `stripped`.
    fn strip_frame<'a>(&self, stripped: &'a [char]) -> (&'a [char], usize) {
        if !self.framing {
            return (stripped, 0);
        }
        let (mut data, mut offset) = (stripped, 0);
        if data.len() >= 2 && data[0] == '<' && data[1] == '~' {
            data = &data[2..];
            offset = 2;
        }
        if let Some(close) = data.windows(2).position(|w| w == ['~', '>']) {
            data = &data[..close];
        }
        (data, offset)
    }

    fn shortcut_block(&self, c: char) -> Option<&'static [u8; 4]> {
        if c == 'z' && self.z_shortcut {
            Some(&ZERO_BLOCK)
        } else if c == 'y' && self.y_shortcut {
            Some(&SPACE_BLOCK)
        } else {
            None
        }
    }
}

impl Converter for Ascii85 {
    fn encode_chars(&self, data: &[u8]) -> Vec<char> {
        let mut out = Vec::with_capacity(data.len().div_ceil(4) * 5 + 4);
        if self.framing {
            out.push('<');
            out.push('~');
        }
        for chunk in data.chunks(4) {
            let mut block = [0u8; 4];
            block[..chunk.len()].copy_from_slice(chunk);
            let value = u32::from_be_bytes(block);
            if chunk.len() == 4 {
                if value == 0 && self.z_shortcut {
                    out.push('z');
                } else if value == 0x2020_2020 && self.y_shortcut {
                    out.push('y');
                } else {
                    push_group(&mut out, value, 5);
                }
            } else {
                // A partial block never takes a shortcut.
                push_group(&mut out, value, chunk.len() + 1);
            }
        }
        if self.framing {
            out.push('~');
            out.push('>');
        }
        out
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, InvalidEncoding> {
        let stripped = text::strip_whitespace(text);
        let (data, offset) = self.strip_frame(&stripped);

        let mut out = Vec::with_capacity(data.len() / 5 * 4 + 3);
        let mut group = [0u8; 5];
        let mut filled = 0;
        let mut group_start = 0;
        for (i, &c) in data.iter().enumerate() {
            if filled == 0 {
                if let Some(block) = self.shortcut_block(c) {
                    out.extend_from_slice(block);
                    continue;
                }
            }
            if !is_digit(c) {
                out.zeroize();
                return Err(InvalidEncoding::BadCharacter {
                    character: c,
                    position: text::original_position(text, offset + i),
                    input: text.iter().collect(),
                });
            }
            if filled == 0 {
                group_start = i;
            }
            group[filled] = c as u8 - b'!';
            filled += 1;
            if filled == 5 {
                let Some(value) = group_value(&group) else {
                    out.zeroize();
                    return Err(InvalidEncoding::Ascii85 {
                        reason: Ascii85Reason::ValueOverflow,
                        context: data[group_start..group_start + 5].iter().collect(),
                    });
                };
                out.extend_from_slice(&value.to_be_bytes());
                filled = 0;
            }
        }

        match filled {
            0 => {}
            1 => {
                out.zeroize();
                return Err(InvalidEncoding::Ascii85 {
                    reason: Ascii85Reason::SingleCharacterTail,
                    context: data[group_start..].iter().collect(),
                });
            }
            j => {
                for slot in &mut group[j..] {
                    *slot = PAD_DIGIT;
                }
                let Some(value) = group_value(&group) else {
                    out.zeroize();
                    return Err(InvalidEncoding::Ascii85 {
                        reason: Ascii85Reason::ValueOverflow,
                        context: data[group_start..].iter().collect(),
                    });
                };
                out.extend_from_slice(&value.to_be_bytes()[..j - 1]);
            }
        }
        Ok(out)
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        let stripped = text::strip_whitespace(text);
        let (data, _) = self.strip_frame(&stripped);

        // Reassemble the byte stream, dropping whatever cannot be part of
        // one: stray characters, mid-block shortcuts, overflowing groups
        // and a lone trailing digit. Re-encoding the result yields the
        // canonical text, a fixed point of both `clean` and
        // `encode ∘ decode`.
        let mut bytes = Vec::with_capacity(data.len() / 5 * 4 + 3);
        let mut group = [0u8; 5];
        let mut filled = 0;
        for &c in data {
            if filled == 0 {
                if let Some(block) = self.shortcut_block(c) {
                    bytes.extend_from_slice(block);
                    continue;
                }
            }
            if !is_digit(c) {
                continue;
            }
            group[filled] = c as u8 - b'!';
            filled += 1;
            if filled == 5 {
                if let Some(value) = group_value(&group) {
                    bytes.extend_from_slice(&value.to_be_bytes());
                }
                filled = 0;
            }
        }
        if filled >= 2 {
            for slot in &mut group[filled..] {
                *slot = PAD_DIGIT;
            }
            if let Some(value) = group_value(&group) {
                bytes.extend_from_slice(&value.to_be_bytes()[..filled - 1]);
            }
        }

        let out = self.encode_chars(&bytes);
        bytes.zeroize();
        out
    }
}
