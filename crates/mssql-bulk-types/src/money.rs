//! MONEY and SMALLMONEY.
//!
//! Both are fixed-point integers scaled by 10,000. MONEY goes on the wire
//! as two 32-bit little-endian words, high word first; a plain 64-bit
//! little-endian write puts the words in the wrong order.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::error::{TypeError, ensure_remaining};
use crate::numeric::Numeric;

/// Fractional digits implied by the money types.
pub const MONEY_SCALE: u8 = 4;

const MONEY_FACTOR: u64 = 10_000;

/// A money amount, stored as the amount times 10,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(pub i64);

impl Money {
    /// Smallest SMALLMONEY value (-214,748.3648).
    pub const SMALL_MIN: Money = Money(i32::MIN as i64);
    /// Largest SMALLMONEY value (214,748.3647).
    pub const SMALL_MAX: Money = Money(i32::MAX as i64);

    /// Wrap an already-scaled integer.
    #[must_use]
    pub const fn from_scaled(scaled: i64) -> Self {
        Self(scaled)
    }

    /// Whole currency units, with range checking.
    pub fn from_units(units: i64) -> Result<Self, TypeError> {
        units
            .checked_mul(MONEY_FACTOR as i64)
            .map(Self)
            .ok_or(TypeError::OutOfRange { target_type: "MONEY" })
    }

    /// The scaled integer.
    #[must_use]
    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Whether the amount fits SMALLMONEY.
    #[must_use]
    pub fn fits_small(self) -> bool {
        i32::try_from(self.0).is_ok()
    }

    /// Convert to an exact decimal with scale 4.
    #[must_use]
    pub fn to_numeric(self) -> Numeric {
        Numeric::new(i128::from(self.0), MONEY_SCALE)
    }
}

impl TryFrom<Numeric> for Money {
    type Error = TypeError;

    /// Exact conversion; fails on more than four significant fractional digits.
    fn try_from(value: Numeric) -> Result<Self, Self::Error> {
        let scaled = value.rescale(MONEY_SCALE)?;
        i64::try_from(scaled.value())
            .map(Money)
            .map_err(|_| TypeError::OutOfRange { target_type: "MONEY" })
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:04}",
            magnitude / MONEY_FACTOR,
            magnitude % MONEY_FACTOR
        )
    }
}

impl FromStr for Money {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::try_from(s.parse::<Numeric>()?)
    }
}

/// Encode MONEY (8 bytes).
pub fn encode_money(value: Money, buf: &mut impl BufMut) {
    let raw = value.0;
    buf.put_i32_le((raw >> 32) as i32);
    buf.put_u32_le(raw as u32);
}

/// Decode MONEY (8 bytes).
pub fn decode_money(buf: &mut impl Buf) -> Result<Money, TypeError> {
    ensure_remaining(buf, 8)?;
    let high = i64::from(buf.get_i32_le());
    let low = i64::from(buf.get_u32_le());
    Ok(Money((high << 32) | low))
}

/// Encode SMALLMONEY (4 bytes).
pub fn encode_smallmoney(value: Money, buf: &mut impl BufMut) -> Result<(), TypeError> {
    let raw = i32::try_from(value.0).map_err(|_| TypeError::OutOfRange {
        target_type: "SMALLMONEY",
    })?;
    buf.put_i32_le(raw);
    Ok(())
}

/// Decode SMALLMONEY (4 bytes).
pub fn decode_smallmoney(buf: &mut impl Buf) -> Result<Money, TypeError> {
    ensure_remaining(buf, 4)?;
    Ok(Money(i64::from(buf.get_i32_le())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const WORD_ORDER_SAMPLE: i64 = -0x0102_0304_0506_0708;

    #[test]
    fn test_money_word_order() {
        let mut buf = BytesMut::new();
        encode_money(Money(0x0102_0304_0506_0708), &mut buf);
        assert_eq!(&buf[..], &[0x04, 0x03, 0x02, 0x01, 0x08, 0x07, 0x06, 0x05]);
    }

    #[test]
    fn test_money_negative_word_order() {
        let mut buf = BytesMut::new();
        encode_money(Money(WORD_ORDER_SAMPLE), &mut buf);
        let expected_high = ((WORD_ORDER_SAMPLE >> 32) as i32).to_le_bytes();
        let expected_low = (WORD_ORDER_SAMPLE as u32).to_le_bytes();
        assert_eq!(&buf[..4], &expected_high);
        assert_eq!(&buf[4..], &expected_low);
        assert_eq!(decode_money(&mut buf.freeze()).unwrap(), Money(WORD_ORDER_SAMPLE));
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money(0).to_string(), "0.0000");
        assert_eq!(Money(i64::MAX).to_string(), "922337203685477.5807");
        assert_eq!(Money(i64::MIN).to_string(), "-922337203685477.5808");
        assert_eq!(Money(WORD_ORDER_SAMPLE).to_string(), "-7262385979038.2856");
        assert_eq!(Money(-5).to_string(), "-0.0005");
        assert_eq!(Money(12_345_600).to_string(), "1234.5600");
    }

    #[test]
    fn test_money_extremes_roundtrip() {
        for value in [0, 1, -1, i64::MAX, i64::MIN, WORD_ORDER_SAMPLE] {
            let mut buf = BytesMut::new();
            encode_money(Money(value), &mut buf);
            let decoded = decode_money(&mut buf.freeze()).unwrap();
            assert_eq!(decoded, Money(value));
        }
    }

    #[test]
    fn test_money_parse() {
        assert_eq!("1234.56".parse::<Money>().unwrap(), Money(12_345_600));
        assert_eq!(
            "-922337203685477.5808".parse::<Money>().unwrap(),
            Money(i64::MIN)
        );
        assert!("0.00001".parse::<Money>().is_err());
        assert!("922337203685477.5808".parse::<Money>().is_err());
    }

    #[test]
    fn test_smallmoney() {
        let mut buf = BytesMut::new();
        encode_smallmoney(Money(-12_345_600), &mut buf).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(decode_smallmoney(&mut buf.freeze()).unwrap(), Money(-12_345_600));

        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_smallmoney(Money(i64::from(i32::MAX) + 1), &mut buf),
            Err(TypeError::OutOfRange { .. })
        ));
        assert!(Money::SMALL_MIN.fits_small());
    }

    #[test]
    fn test_short_buffer() {
        let raw = [0u8; 7];
        assert!(matches!(
            decode_money(&mut &raw[..]),
            Err(TypeError::BufferTooSmall { needed: 8, available: 7 })
        ));
    }
}
