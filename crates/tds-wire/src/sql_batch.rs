//! SQL batch payloads (packet type 0x01).
//!
//! The bulk-load path sends exactly one batch per session: the
//! `INSERT BULK` statement that tells the server which table and columns
//! the following BULK_LOAD message targets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{read_utf16_string, write_utf16_string};
use crate::error::ProtocolError;

/// Size of ALL_HEADERS carrying only a transaction descriptor.
pub const ALL_HEADERS_LEN: usize = 22;

const TRANSACTION_DESCRIPTOR_HEADER: u16 = 0x0002;

/// Encode a SQL batch in auto-commit mode.
///
/// ```
/// use tds_wire::sql_batch::encode_sql_batch;
///
/// let payload = encode_sql_batch("INSERT BULK [dbo].[t] ([id] INT)");
/// assert_eq!(&payload[..4], &[22, 0, 0, 0]);
/// ```
#[must_use]
pub fn encode_sql_batch(sql: &str) -> Bytes {
    encode_sql_batch_with_transaction(sql, 0)
}

/// Encode a SQL batch inside the transaction identified by `transaction_descriptor`.
#[must_use]
pub fn encode_sql_batch_with_transaction(sql: &str, transaction_descriptor: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_LEN + sql.len() * 2);

    buf.put_u32_le(ALL_HEADERS_LEN as u32);
    buf.put_u32_le(18);
    buf.put_u16_le(TRANSACTION_DESCRIPTOR_HEADER);
    buf.put_u64_le(transaction_descriptor);
    // Outstanding request count, 1 without MARS.
    buf.put_u32_le(1);

    write_utf16_string(&mut buf, sql);
    buf.freeze()
}

/// Decode a SQL batch payload back into its statement text.
///
/// Used by test servers; skips whatever ALL_HEADERS the client sent.
pub fn decode_sql_batch(mut src: impl Buf) -> Result<String, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let headers_len = src.get_u32_le() as usize;
    if headers_len < 4 || src.remaining() < headers_len - 4 {
        return Err(ProtocolError::InvalidField {
            field: "ALL_HEADERS length",
            value: headers_len as u32,
        });
    }
    src.advance(headers_len - 4);

    if src.remaining() % 2 != 0 {
        return Err(ProtocolError::StringEncoding("SQL batch"));
    }
    let units = src.remaining() / 2;
    read_utf16_string(&mut src, units).ok_or(ProtocolError::StringEncoding("SQL batch"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sql_batch() {
        let payload = encode_sql_batch("SELECT 1");

        // ALL_HEADERS + 8 UTF-16 code units
        assert_eq!(payload.len(), 38);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[0x02, 0x00]);
        assert_eq!(&payload[18..22], &[1, 0, 0, 0]);
        assert_eq!(&payload[22..24], &[b'S', 0]);
    }

    #[test]
    fn test_transaction_descriptor_written() {
        let payload = encode_sql_batch_with_transaction("", 0x0102_0304_0506_0708);
        assert_eq!(payload.len(), ALL_HEADERS_LEN);
        assert_eq!(&payload[10..18], &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_decode_sql_batch() {
        let sql = "INSERT BULK [t] ([név] NVARCHAR(10))";
        let payload = encode_sql_batch(sql);
        assert_eq!(decode_sql_batch(payload).unwrap(), sql);
    }

    #[test]
    fn test_decode_rejects_bad_headers() {
        let raw = [0xFF, 0x00, 0x00, 0x00, 0x00];
        assert!(decode_sql_batch(&raw[..]).is_err());
    }
}
