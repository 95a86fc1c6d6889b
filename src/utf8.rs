//! UTF-8 codec and character-class predicates.
//!
//! Decoding is tolerant: malformed bytes become [`INVALID_UNICODE`] sentinels
//! rather than aborting the scan, one byte at a time. Encoding is the
//! reverse map and never needs to tolerate anything, because ids already in
//! an alphabet always came from a successful decode.

/// Sentinel emitted for a byte sequence that doesn't decode to a valid
/// code point. Never a member of any alphabet.
pub const INVALID_UNICODE: u32 = 0x0fff_ffff;

/// U+2581 LOWER ONE EIGHTH BLOCK ("▁"), used to mark a word-initial space.
pub const SPACE_TOKEN: u32 = 0x2581;

/// `true` for ASCII whitespace and for [`SPACE_TOKEN`] itself.
#[inline]
#[must_use]
pub fn is_space(ch: u32) -> bool {
    (ch < 256 && is_ascii_space(ch as u8)) || ch == SPACE_TOKEN
}

#[inline]
fn is_ascii_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// `true` for ASCII punctuation and a fixed set of Unicode punctuation
/// (middle dot, guillemets, single guillemets, and the general dash/hyphen
/// block `U+2010..=U+2038`).
#[inline]
#[must_use]
pub fn is_punctuation(ch: u32) -> bool {
    (ch < 256 && is_ascii_punct(ch as u8))
        || ch == 0x00B7
        || ch == 0x00AB
        || ch == 0x00BB
        || ch == 0x2039
        || ch == 0x203A
        || (0x2010..=0x2038).contains(&ch)
}

#[inline]
fn is_ascii_punct(b: u8) -> bool {
    matches!(b, b'!'..=b'/' | b':'..=b'@' | b'['..=b'`' | b'{'..=b'~')
}

/// `true` for code points in any of the standard CJK unified-ideograph
/// (and compatibility) blocks.
#[inline]
#[must_use]
pub fn is_cjk(ch: u32) -> bool {
    (0x4E00..=0x9FFF).contains(&ch)
        || (0x3400..=0x4DBF).contains(&ch)
        || (0x2_0000..=0x2_A6DF).contains(&ch)
        || (0x2_A700..=0x2_B73F).contains(&ch)
        || (0x2_B740..=0x2_B81F).contains(&ch)
        || (0x2_B820..=0x2_CEAF).contains(&ch)
        || (0xF900..=0xFAFF).contains(&ch)
        || (0x2_F800..=0x2_FA1F).contains(&ch)
}

/// Space, punctuation, or CJK — the boundaries that separate "words" for
/// both the BPE learner and the WordPiece segmenter.
#[inline]
#[must_use]
pub fn is_spacing_char(ch: u32) -> bool {
    is_space(ch) || is_punctuation(ch) || is_cjk(ch)
}

/// `true` if `x` is a valid Unicode scalar value (not a surrogate, within
/// range). Asserted by [`encode_char`] before emitting bytes.
#[inline]
#[must_use]
pub fn check_codepoint(x: u32) -> bool {
    x < 0xD800 || (0xDFFF < x && x < 0x11_0000)
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else if first_byte & 0xF8 == 0xF0 {
        4
    } else {
        0
    }
}

#[inline]
fn is_continuation_byte(b: u8) -> bool {
    b & 0xC0 == 0x80
}

/// Decode the single code point starting at `bytes[0]`.
///
/// Returns the decoded code point and the number of bytes consumed. Invalid
/// input (over-long encodings, surrogate code points, out-of-range code
/// points, truncated sequences) decodes to [`INVALID_UNICODE`] and consumes
/// exactly one byte, so the caller always makes forward progress.
#[must_use]
pub fn decode_one(bytes: &[u8]) -> (u32, usize) {
    debug_assert!(!bytes.is_empty());
    let len = utf8_len(bytes[0]);
    if len == 1 {
        return (u32::from(bytes[0]), 1);
    }
    if len == 0 || bytes.len() < len {
        return (INVALID_UNICODE, 1);
    }
    for &b in &bytes[1..len] {
        if !is_continuation_byte(b) {
            return (INVALID_UNICODE, 1);
        }
    }
    let code_point = match len {
        2 => {
            let cp = (u32::from(bytes[0] & 0x1F) << 6) | u32::from(bytes[1] & 0x3F);
            if cp < 0x0080 { return (INVALID_UNICODE, 1); }
            cp
        }
        3 => {
            let cp = (u32::from(bytes[0] & 0x0F) << 12)
                | (u32::from(bytes[1] & 0x3F) << 6)
                | u32::from(bytes[2] & 0x3F);
            if cp < 0x0800 { return (INVALID_UNICODE, 1); }
            cp
        }
        4 => {
            let cp = (u32::from(bytes[0] & 0x07) << 18)
                | (u32::from(bytes[1] & 0x3F) << 12)
                | (u32::from(bytes[2] & 0x3F) << 6)
                | u32::from(bytes[3] & 0x3F);
            if cp < 0x1_0000 { return (INVALID_UNICODE, 1); }
            cp
        }
        _ => unreachable!(),
    };
    if !check_codepoint(code_point) {
        return (INVALID_UNICODE, 1);
    }
    (code_point, len)
}

/// Decode an entire byte slice to code points.
///
/// [`INVALID_UNICODE`] sentinels are dropped; if any were produced, a single
/// warning is printed to stderr, matching the reference implementation's
/// one-warning-per-call behavior.
#[must_use]
pub fn decode_utf8(bytes: &[u8]) -> Vec<u32> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut saw_invalid = false;
    let mut i = 0;
    while i < bytes.len() {
        let (cp, len) = decode_one(&bytes[i..]);
        if cp == INVALID_UNICODE {
            saw_invalid = true;
        } else {
            out.push(cp);
        }
        i += len;
    }
    if saw_invalid {
        eprintln!("WARNING Input contains invalid unicode characters.");
    }
    out
}

/// Append the shortest legal UTF-8 byte sequence for `cp` to `out`.
///
/// # Panics
/// Panics if `cp` is not a valid code point ([`check_codepoint`] is false).
/// Internal callers only ever pass ids already validated against an
/// alphabet, so this should never fire on real input.
pub fn encode_char(cp: u32, out: &mut String) {
    assert!(check_codepoint(cp), "invalid code point {cp:#x}");
    // SAFETY-free: char::from_u32 handles the validity check and we just
    // asserted it, so this always succeeds.
    let ch = char::from_u32(cp).expect("validated code point");
    out.push(ch);
}

/// Encode a sequence of code points back to a UTF-8 `String`.
#[must_use]
pub fn encode_utf8(codes: &[u32]) -> String {
    let mut out = String::with_capacity(codes.len());
    for &cp in codes {
        encode_char(cp, &mut out);
    }
    out
}
