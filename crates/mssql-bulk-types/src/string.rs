//! Character data.
//!
//! NCHAR/NVARCHAR/XML travel as UTF-16LE. CHAR/VARCHAR travel in the code
//! page of the column collation; characters the code page cannot represent
//! are an error rather than being replaced with `?`.

use tds_wire::Collation;

use crate::error::TypeError;

/// Collation flag marking a UTF-8 collation (SQL Server 2019+).
pub const UTF8_COLLATION_FLAG: u32 = 0x0800_0000;

/// Encode a string as UTF-16LE bytes.
#[must_use]
pub fn encode_utf16(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Number of UTF-16 code units in `s`.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Decode UTF-16LE bytes.
pub fn decode_utf16(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(
            "UTF-16 data must have even length".to_string(),
        ));
    }

    let utf16: Vec<u16> = data
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    String::from_utf16(&utf16).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

/// Windows code page for a collation.
#[must_use]
pub fn code_page(collation: &Collation) -> u16 {
    if collation.info & UTF8_COLLATION_FLAG != 0 {
        return 65001;
    }
    match collation.lcid() & 0xFFFF {
        0x0411 => 932,
        0x0804 | 0x1004 => 936,
        0x0412 => 949,
        0x0404 | 0x0C04 | 0x1404 => 950,
        0x041E => 874,
        0x0405 | 0x0415 | 0x040E | 0x041A | 0x081A | 0x141A | 0x101A | 0x041B | 0x0424
        | 0x0418 | 0x041C => 1250,
        0x0419 | 0x0422 | 0x0423 | 0x0402 | 0x042F | 0x0C1A | 0x201A | 0x0440 | 0x0843
        | 0x0444 | 0x0450 | 0x0485 => 1251,
        0x0408 => 1253,
        0x041F | 0x042C => 1254,
        0x040D => 1255,
        0x0401 | 0x0801 | 0x0C01 | 0x1001 | 0x1401 | 0x1801 | 0x1C01 | 0x2001 | 0x2401
        | 0x2801 | 0x2C01 | 0x3001 | 0x3401 | 0x3801 | 0x3C01 | 0x4001 | 0x0429 | 0x0420
        | 0x048C | 0x0463 => 1256,
        0x0425..=0x0427 => 1257,
        0x042A => 1258,
        _ => 1252,
    }
}

#[cfg(feature = "encoding")]
fn encoding_for(collation: &Collation) -> &'static encoding_rs::Encoding {
    match code_page(collation) {
        65001 => encoding_rs::UTF_8,
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GB18030,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        _ => encoding_rs::WINDOWS_1252,
    }
}

/// Encode a string in the collation's code page.
#[cfg(feature = "encoding")]
pub fn encode_narrow(s: &str, collation: &Collation) -> Result<Vec<u8>, TypeError> {
    let encoding = encoding_for(collation);
    let (bytes, _, had_errors) = encoding.encode(s);
    if had_errors {
        return Err(TypeError::InvalidEncoding(format!(
            "{s:?} is not representable in {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}

/// Decode bytes in the collation's code page.
#[cfg(feature = "encoding")]
pub fn decode_narrow(data: &[u8], collation: &Collation) -> Result<String, TypeError> {
    let encoding = encoding_for(collation);
    let (text, had_errors) = encoding.decode_without_bom_handling(data);
    if had_errors {
        return Err(TypeError::InvalidEncoding(format!(
            "invalid {} data",
            encoding.name()
        )));
    }
    Ok(text.into_owned())
}

/// Encode a string for a narrow column. Without the `encoding` feature only
/// ASCII (or any text under a UTF-8 collation) is accepted.
#[cfg(not(feature = "encoding"))]
pub fn encode_narrow(s: &str, collation: &Collation) -> Result<Vec<u8>, TypeError> {
    if s.is_ascii() || code_page(collation) == 65001 {
        Ok(s.as_bytes().to_vec())
    } else {
        Err(TypeError::InvalidEncoding(format!(
            "{s:?} needs the `encoding` feature for code page {}",
            code_page(collation)
        )))
    }
}

/// Decode narrow column bytes. Without the `encoding` feature only ASCII
/// (or UTF-8 under a UTF-8 collation) is accepted.
#[cfg(not(feature = "encoding"))]
pub fn decode_narrow(data: &[u8], collation: &Collation) -> Result<String, TypeError> {
    if data.is_ascii() || code_page(collation) == 65001 {
        String::from_utf8(data.to_vec()).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
    } else {
        Err(TypeError::InvalidEncoding(format!(
            "non-ASCII data needs the `encoding` feature for code page {}",
            code_page(collation)
        )))
    }
}
