//! DECIMAL / NUMERIC.
//!
//! A [`Numeric`] is an unscaled 128-bit integer plus a scale, which covers
//! the full 38-digit range SQL Server allows. On the wire a decimal is a
//! sign byte (1 positive, 0 negative) followed by the magnitude in
//! little-endian order, sized by the column's declared precision.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

use crate::error::{TypeError, ensure_remaining};

/// Largest precision (and scale) SQL Server supports.
pub const MAX_PRECISION: u8 = 38;

const MAX_MAGNITUDE: u128 = 99_999_999_999_999_999_999_999_999_999_999_999_999;

fn pow10(exp: u8) -> i128 {
    10i128.pow(u32::from(exp))
}

/// An exact decimal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Numeric {
    value: i128,
    scale: u8,
}

impl Numeric {
    /// Create a numeric from an unscaled value and scale.
    ///
    /// Values beyond 38 digits or scales beyond 38 are caught when the value
    /// is encoded; use [`Numeric::try_new`] to check eagerly.
    #[must_use]
    pub const fn new(value: i128, scale: u8) -> Self {
        Self { value, scale }
    }

    /// Create a numeric, validating digit count and scale.
    pub fn try_new(value: i128, scale: u8) -> Result<Self, TypeError> {
        if scale > MAX_PRECISION {
            return Err(TypeError::InvalidDecimal(format!(
                "scale {scale} exceeds {MAX_PRECISION}"
            )));
        }
        if value.unsigned_abs() > MAX_MAGNITUDE {
            return Err(TypeError::OutOfRange {
                target_type: "DECIMAL",
            });
        }
        Ok(Self { value, scale })
    }

    /// The unscaled integer.
    #[must_use]
    pub const fn value(&self) -> i128 {
        self.value
    }

    /// Digits after the decimal point.
    #[must_use]
    pub const fn scale(&self) -> u8 {
        self.scale
    }

    /// Number of decimal digits in the unscaled value (at least 1).
    #[must_use]
    pub fn digits(&self) -> u8 {
        let mut magnitude = self.value.unsigned_abs();
        let mut digits = 1;
        while magnitude >= 10 {
            magnitude /= 10;
            digits += 1;
        }
        digits
    }

    /// Change the scale without losing digits.
    ///
    /// Dropping non-zero fractional digits is a [`TypeError::Truncation`].
    pub fn rescale(self, scale: u8) -> Result<Self, TypeError> {
        if scale > MAX_PRECISION {
            return Err(TypeError::InvalidDecimal(format!(
                "scale {scale} exceeds {MAX_PRECISION}"
            )));
        }
        if scale >= self.scale {
            let value = self
                .value
                .checked_mul(pow10(scale - self.scale))
                .filter(|v| v.unsigned_abs() <= MAX_MAGNITUDE)
                .ok_or(TypeError::OutOfRange {
                    target_type: "DECIMAL",
                })?;
            return Ok(Self { value, scale });
        }

        let divisor = pow10(self.scale - scale);
        if self.value % divisor != 0 {
            return Err(TypeError::Truncation(format!(
                "{self} has more than {scale} fractional digits"
            )));
        }
        Ok(Self {
            value: self.value / divisor,
            scale,
        })
    }

    /// Change the scale, rounding half away from zero when digits are dropped.
    pub fn round_to(self, scale: u8) -> Result<Self, TypeError> {
        if scale >= self.scale {
            return self.rescale(scale);
        }
        let divisor = pow10(self.scale - scale);
        let mut value = self.value / divisor;
        let remainder = (self.value % divisor).unsigned_abs();
        if remainder * 2 >= divisor.unsigned_abs() {
            value += self.value.signum();
        }
        Ok(Self { value, scale })
    }

    /// Convert a float, rounded to `scale` fractional digits.
    ///
    /// The float's exact binary value is rounded, so `1234.560001` at scale 2
    /// becomes `1234.56`.
    pub fn from_f64(value: f64, scale: u8) -> Result<Self, TypeError> {
        if !value.is_finite() {
            return Err(TypeError::InvalidDecimal(format!("{value} is not finite")));
        }
        if scale > MAX_PRECISION {
            return Err(TypeError::InvalidDecimal(format!(
                "scale {scale} exceeds {MAX_PRECISION}"
            )));
        }
        format!("{value:.prec$}", prec = scale as usize).parse()
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Self::new(i128::from(value), 0)
    }
}

impl From<i32> for Numeric {
    fn from(value: i32) -> Self {
        Self::new(i128::from(value), 0)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.value < 0 { "-" } else { "" };
        let magnitude = self.value.unsigned_abs();
        if self.scale == 0 {
            return write!(f, "{sign}{magnitude}");
        }
        let divisor = pow10(self.scale).unsigned_abs();
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / divisor,
            magnitude % divisor,
            width = self.scale as usize
        )
    }
}

impl FromStr for Numeric {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TypeError::InvalidDecimal(s.to_string());
        let trimmed = s.trim();
        let (negative, body) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let scale = u8::try_from(frac_part.len())
            .ok()
            .filter(|s| *s <= MAX_PRECISION)
            .ok_or_else(invalid)?;

        let mut value: i128 = 0;
        for c in int_part.chars().chain(frac_part.chars()) {
            let digit = c.to_digit(10).ok_or_else(invalid)?;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i128::from(digit)))
                .filter(|v| v.unsigned_abs() <= MAX_MAGNITUDE)
                .ok_or(TypeError::OutOfRange {
                    target_type: "DECIMAL",
                })?;
        }
        if negative {
            value = -value;
        }
        Ok(Self { value, scale })
    }
}

#[cfg(feature = "decimal")]
impl From<rust_decimal::Decimal> for Numeric {
    fn from(value: rust_decimal::Decimal) -> Self {
        // rust_decimal caps scale at 28 and mantissa at 96 bits.
        Self::new(value.mantissa(), value.scale() as u8)
    }
}

#[cfg(feature = "decimal")]
impl TryFrom<Numeric> for rust_decimal::Decimal {
    type Error = TypeError;

    fn try_from(value: Numeric) -> Result<Self, Self::Error> {
        rust_decimal::Decimal::try_from_i128_with_scale(value.value, u32::from(value.scale))
            .map_err(|e| TypeError::InvalidDecimal(e.to_string()))
    }
}

/// Wire length (sign byte included) for a declared precision.
#[must_use]
pub const fn decimal_byte_length(precision: u8) -> usize {
    match precision {
        0..=9 => 5,
        10..=19 => 9,
        20..=28 => 13,
        _ => 17,
    }
}

/// Encode a decimal for a column of the given precision and scale.
///
/// Writes the sign byte and magnitude, `decimal_byte_length(precision)`
/// bytes in total. The length prefix belongs to the row encoder.
pub fn encode_decimal(
    value: Numeric,
    precision: u8,
    scale: u8,
    buf: &mut impl BufMut,
) -> Result<(), TypeError> {
    if precision == 0 || precision > MAX_PRECISION || scale > precision {
        return Err(TypeError::InvalidDecimal(format!(
            "invalid precision/scale ({precision}, {scale})"
        )));
    }
    let value = value.rescale(scale)?;
    if value.digits() > precision {
        return Err(TypeError::OutOfRange {
            target_type: "DECIMAL",
        });
    }

    buf.put_u8(if value.value < 0 { 0 } else { 1 });
    let magnitude = value.value.unsigned_abs().to_le_bytes();
    buf.put_slice(&magnitude[..decimal_byte_length(precision) - 1]);
    Ok(())
}

/// Decode a decimal of `len` bytes (sign byte included) at the given scale.
pub fn decode_decimal(buf: &mut impl Buf, len: usize, scale: u8) -> Result<Numeric, TypeError> {
    if !matches!(len, 5 | 9 | 13 | 17) {
        return Err(TypeError::InvalidDecimal(format!("invalid length {len}")));
    }
    ensure_remaining(buf, len)?;

    let sign = buf.get_u8();
    let mut magnitude = [0u8; 16];
    buf.copy_to_slice(&mut magnitude[..len - 1]);
    let magnitude = u128::from_le_bytes(magnitude);
    if magnitude > MAX_MAGNITUDE {
        return Err(TypeError::OutOfRange {
            target_type: "DECIMAL",
        });
    }
    // Bounded by MAX_MAGNITUDE, which fits i128.
    let magnitude = magnitude as i128;
    let value = match sign {
        1 => magnitude,
        0 => -magnitude,
        other => {
            return Err(TypeError::InvalidDecimal(format!("invalid sign byte {other}")));
        }
    };
    Ok(Numeric::new(value, scale))
}
