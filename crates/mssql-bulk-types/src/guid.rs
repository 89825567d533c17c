//! UNIQUEIDENTIFIER.
//!
//! SQL Server writes the first three GUID fields little-endian and the last
//! eight bytes as-is, so the RFC 4122 byte order is shuffled on the wire.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::{TypeError, ensure_remaining};

/// A GUID in RFC 4122 (natural, big-endian field) byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    /// Wrap RFC-ordered bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Build from the 16 bytes as they appear on the wire.
    #[must_use]
    pub const fn from_wire(wire: [u8; 16]) -> Self {
        Self(reorder(wire))
    }

    /// RFC-ordered bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Bytes in wire order.
    #[must_use]
    pub const fn to_wire(self) -> [u8; 16] {
        reorder(self.0)
    }
}

impl TryFrom<&[u8]> for Guid {
    type Error = TypeError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 16]>::try_from(value)
            .map(Self)
            .map_err(|_| TypeError::InvalidUuid(format!("expected 16 bytes, got {}", value.len())))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for Guid {
    fn from(value: uuid::Uuid) -> Self {
        Self(*value.as_bytes())
    }
}

#[cfg(feature = "uuid")]
impl From<Guid> for uuid::Uuid {
    fn from(value: Guid) -> Self {
        uuid::Uuid::from_bytes(value.0)
    }
}

/// Swap between RFC and wire order. The permutation is its own inverse.
const fn reorder(b: [u8; 16]) -> [u8; 16] {
    [
        b[3], b[2], b[1], b[0], b[5], b[4], b[7], b[6], b[8], b[9], b[10], b[11], b[12], b[13],
        b[14], b[15],
    ]
}

/// Encode a GUID (16 bytes, wire order).
pub fn encode_guid(value: Guid, buf: &mut impl BufMut) {
    buf.put_slice(&value.to_wire());
}

/// Decode a GUID (16 bytes, wire order).
pub fn decode_guid(buf: &mut impl Buf) -> Result<Guid, TypeError> {
    ensure_remaining(buf, 16)?;
    let mut wire = [0u8; 16];
    buf.copy_to_slice(&mut wire);
    Ok(Guid::from_wire(wire))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_wire_order() {
        let guid = Guid::from_bytes([
            0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78, 0x12, 0x34,
            0x56, 0x78,
        ]);
        let mut buf = BytesMut::new();
        encode_guid(guid, &mut buf);
        assert_eq!(
            &buf[..],
            &[
                0x78, 0x56, 0x34, 0x12, // first group reversed
                0x34, 0x12, // second group reversed
                0x78, 0x56, // third group reversed
                0x12, 0x34, 0x56, 0x78, 0x12, 0x34, 0x56, 0x78,
            ]
        );
        assert_eq!(decode_guid(&mut buf.freeze()).unwrap(), guid);
    }

    #[test]
    fn test_display() {
        let wire = [
            0x6F, 0x96, 0x19, 0xFF, 0x8B, 0x86, 0xD0, 0x11, 0xB4, 0x2D, 0x00, 0xC0, 0x4F, 0xC9,
            0x64, 0xFF,
        ];
        assert_eq!(
            Guid::from_wire(wire).to_string(),
            "FF19966F-868B-11D0-B42D-00C04FC964FF"
        );
    }

    #[test]
    fn test_reorder_is_involution() {
        let bytes: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(Guid::from_wire(Guid(bytes).to_wire()), Guid(bytes));
    }

    #[test]
    fn test_slice_length_checked() {
        assert!(Guid::try_from(&[0u8; 15][..]).is_err());
        assert!(Guid::try_from(&[0u8; 16][..]).is_ok());
    }

    #[cfg(feature = "uuid")]
    #[test]
    fn test_uuid_conversion() {
        let uuid = uuid::Uuid::parse_str("12345678-1234-5678-1234-567812345678").unwrap();
        let guid = Guid::from(uuid);
        assert_eq!(guid.to_string(), "12345678-1234-5678-1234-567812345678");
        assert_eq!(uuid::Uuid::from(guid), uuid);
    }
}
