//! Length-prefixed string helpers shared by token encoders and decoders.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Read a B_VARCHAR: 1-byte length (in UTF-16 code units) followed by UTF-16LE.
pub fn read_b_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 1 {
        return None;
    }
    let len = src.get_u8() as usize;
    read_utf16_string(src, len)
}

/// Read a US_VARCHAR: 2-byte length (in UTF-16 code units) followed by UTF-16LE.
pub fn read_us_varchar(src: &mut impl Buf) -> Option<String> {
    if src.remaining() < 2 {
        return None;
    }
    let len = src.get_u16_le() as usize;
    read_utf16_string(src, len)
}

/// Read a UTF-16LE string of specified code unit length.
pub fn read_utf16_string(src: &mut impl Buf, char_count: usize) -> Option<String> {
    let byte_count = char_count * 2;
    if src.remaining() < byte_count {
        return None;
    }

    let mut chars = Vec::with_capacity(char_count);
    for _ in 0..char_count {
        chars.push(src.get_u16_le());
    }

    String::from_utf16(&chars).ok()
}

/// Write a B_VARCHAR.
///
/// Fails rather than truncating when the string exceeds 255 code units.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) -> Result<(), ProtocolError> {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = u8::try_from(chars.len()).map_err(|_| ProtocolError::TooLong {
        what: "B_VARCHAR",
        len: chars.len(),
        max: u8::MAX as usize,
    })?;
    dst.put_u8(len);
    for c in chars {
        dst.put_u16_le(c);
    }
    Ok(())
}

/// Write a US_VARCHAR.
pub fn write_us_varchar(dst: &mut impl BufMut, s: &str) -> Result<(), ProtocolError> {
    let chars: Vec<u16> = s.encode_utf16().collect();
    let len = u16::try_from(chars.len()).map_err(|_| ProtocolError::TooLong {
        what: "US_VARCHAR",
        len: chars.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16_le(len);
    for c in chars {
        dst.put_u16_le(c);
    }
    Ok(())
}

/// Write a UTF-16LE string without length prefix.
pub fn write_utf16_string(dst: &mut impl BufMut, s: &str) {
    for c in s.encode_utf16() {
        dst.put_u16_le(c);
    }
}

/// Calculate the byte length of a UTF-16 encoded string.
#[must_use]
pub fn utf16_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}
