//! PLP (Partially Length-Prefixed) framing for `(max)` values.
//!
//! Layout:
//!
//! ```text
//! u64  total length, or PLP_UNKNOWN_LENGTH, or PLP_NULL
//! { u32 chunk length, chunk bytes }*
//! u32  0 (terminator, omitted for NULL)
//! ```

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Total-length value marking a NULL PLP value.
pub const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Total-length value marking a stream whose length is not announced.
pub const PLP_UNKNOWN_LENGTH: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// Chunk size used when writing. Even, so UTF-16 code units never straddle chunks.
pub const PLP_CHUNK_SIZE: usize = 8000;

/// Whether the writer announces the total length up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlpLength {
    /// Write the exact byte count.
    #[default]
    Known,
    /// Write [`PLP_UNKNOWN_LENGTH`].
    Unknown,
}

/// Write a NULL PLP value.
pub fn encode_plp_null(dst: &mut impl BufMut) {
    dst.put_u64_le(PLP_NULL);
}

/// Write `data` as a PLP stream using [`PLP_CHUNK_SIZE`] chunks.
pub fn encode_plp(data: &[u8], length: PlpLength, dst: &mut impl BufMut) {
    encode_plp_chunked(data, length, PLP_CHUNK_SIZE, dst);
}

/// Write `data` as a PLP stream with an explicit chunk size.
pub fn encode_plp_chunked(data: &[u8], length: PlpLength, chunk_size: usize, dst: &mut impl BufMut) {
    match length {
        PlpLength::Known => dst.put_u64_le(data.len() as u64),
        PlpLength::Unknown => dst.put_u64_le(PLP_UNKNOWN_LENGTH),
    }
    for chunk in data.chunks(chunk_size.max(1)) {
        dst.put_u32_le(chunk.len() as u32);
        dst.put_slice(chunk);
    }
    dst.put_u32_le(0);
}

/// Read a PLP stream. Returns `None` for NULL.
pub fn decode_plp(src: &mut impl Buf) -> Result<Option<Vec<u8>>, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let total = src.get_u64_le();
    if total == PLP_NULL {
        return Ok(None);
    }

    let mut out = if total == PLP_UNKNOWN_LENGTH {
        Vec::new()
    } else {
        Vec::with_capacity(usize::try_from(total).unwrap_or(0).min(src.remaining()))
    };

    loop {
        if src.remaining() < 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let chunk_len = src.get_u32_le() as usize;
        if chunk_len == 0 {
            break;
        }
        if src.remaining() < chunk_len {
            return Err(ProtocolError::UnexpectedEof);
        }
        out.extend_from_slice(&src.copy_to_bytes(chunk_len));
    }

    if total != PLP_UNKNOWN_LENGTH && out.len() as u64 != total {
        return Err(ProtocolError::InvalidField {
            field: "PLP total length",
            value: u32::try_from(total).unwrap_or(u32::MAX),
        });
    }

    Ok(Some(out))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_plp_single_chunk_layout() {
        let mut buf = BytesMut::new();
        encode_plp(b"abc", PlpLength::Known, &mut buf);
        assert_eq!(
            &buf[..],
            &[3, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, b'a', b'b', b'c', 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_plp_empty_value() {
        let mut buf = BytesMut::new();
        encode_plp(&[], PlpLength::Known, &mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_plp(&mut buf.freeze()).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_plp_multi_chunk_unknown_length() {
        let data: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
        let mut buf = BytesMut::new();
        encode_plp(&data, PlpLength::Unknown, &mut buf);

        assert_eq!(&buf[..8], &PLP_UNKNOWN_LENGTH.to_le_bytes());
        // 8 + 3 chunk headers + data + terminator
        assert_eq!(buf.len(), 8 + 3 * 4 + 20_000 + 4);
        assert_eq!(&buf[8..12], &(PLP_CHUNK_SIZE as u32).to_le_bytes());

        let decoded = decode_plp(&mut buf.freeze()).unwrap().unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_plp_null() {
        let mut buf = BytesMut::new();
        encode_plp_null(&mut buf);
        assert_eq!(&buf[..], &[0xFF; 8]);
        assert_eq!(decode_plp(&mut buf.freeze()).unwrap(), None);
    }

    #[test]
    fn test_plp_length_mismatch_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(5);
        buf.put_u32_le(2);
        buf.put_slice(b"ab");
        buf.put_u32_le(0);
        assert!(decode_plp(&mut buf.freeze()).is_err());
    }

    #[test]
    fn test_plp_truncated_chunk() {
        let raw = [2, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, b'a'];
        assert!(decode_plp(&mut &raw[..]).is_err());
    }
}
