// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Rescaling of Kubernetes resource quantities.
//!
//! The metrics API reports CPU in cores and memory in bytes using the
//! Kubernetes quantity notation (`250m`, `12345n`, `51200Ki`, `1.5e3`). Reports
//! use the same units as `kubectl top pods`: millicores and decimal megabytes.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::QuantityError;

/// Decimal scale a quantity is expressed in, as a power of ten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// 10^-3, used for CPU millicores
    Milli,
    /// 10^6, used for memory megabytes
    Mega,
}

impl Scale {
    pub fn exponent(self) -> i32 {
        match self {
            Scale::Milli => -3,
            Scale::Mega => 6,
        }
    }
}

/// Returns `ceil(quantity / 10^scale)`, saturating at the `i64` bounds.
pub fn scaled_value(quantity: &Quantity, scale: Scale) -> Result<i64, QuantityError> {
    ParsedQuantity::parse(&quantity.0).map(|q| q.scaled(scale.exponent()))
}

/// A quantity decomposed as `mantissa * 10^decimal_exponent * 2^binary_exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedQuantity {
    mantissa: i128,
    decimal_exponent: i32,
    binary_exponent: u32,
}

impl ParsedQuantity {
    fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(input.to_string());

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(invalid)?;
        }
        if negative {
            mantissa = -mantissa;
        }
        let fraction_len = i32::try_from(fraction.len()).map_err(|_| invalid())?;

        let (suffix_exponent, binary_exponent) = parse_suffix(suffix).ok_or_else(invalid)?;

        Ok(Self {
            mantissa,
            decimal_exponent: suffix_exponent.saturating_sub(fraction_len),
            binary_exponent,
        })
    }

    fn scaled(self, scale: i32) -> i64 {
        let saturate = |negative: bool| if negative { i64::MIN } else { i64::MAX };
        let negative = self.mantissa < 0;

        let Some(value) = 1i128
            .checked_shl(self.binary_exponent)
            .and_then(|factor| self.mantissa.checked_mul(factor))
        else {
            return saturate(negative);
        };

        let exponent = self.decimal_exponent.saturating_sub(scale);
        let scaled = if exponent >= 0 {
            match 10i128
                .checked_pow(exponent.unsigned_abs())
                .and_then(|factor| value.checked_mul(factor))
            {
                Some(v) => v,
                None if value == 0 => 0,
                None => return saturate(negative),
            }
        } else {
            match 10i128.checked_pow(exponent.unsigned_abs()) {
                Some(divisor) => {
                    // Truncating division already rounds negative values up.
                    let quotient = value / divisor;
                    if value > 0 && value % divisor != 0 {
                        quotient + 1
                    } else {
                        quotient
                    }
                }
                // |value| is below one unit of the target scale
                None => i128::from(value > 0),
            }
        };

        i64::try_from(scaled).unwrap_or_else(|_| saturate(negative))
    }
}

/// Maps a quantity suffix to `(decimal exponent, binary exponent)`.
fn parse_suffix(suffix: &str) -> Option<(i32, u32)> {
    let decimal = match suffix {
        "" => Some(0),
        "n" => Some(-9),
        "u" => Some(-6),
        "m" => Some(-3),
        "k" => Some(3),
        "M" => Some(6),
        "G" => Some(9),
        "T" => Some(12),
        "P" => Some(15),
        "E" => Some(18),
        _ => None,
    };
    if let Some(exponent) = decimal {
        return Some((exponent, 0));
    }

    let binary = match suffix {
        "Ki" => Some(10),
        "Mi" => Some(20),
        "Gi" => Some(30),
        "Ti" => Some(40),
        "Pi" => Some(50),
        "Ei" => Some(60),
        _ => None,
    };
    if let Some(exponent) = binary {
        return Some((0, exponent));
    }

    let exponent = suffix.strip_prefix(['e', 'E'])?;
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    exponent.parse::<i32>().ok().map(|e| (e, 0))
}
