//! Kubernetes resource quantities as exact integers.
//!
//! Datahub speaks in millicores and bytes; the Kubernetes objects carry
//! `Quantity` strings. Parsing works in nano-units with integer arithmetic so
//! `"1.5Gi"` and `"250m"` convert without float rounding.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::error::{Error, Result};

const NANO: i128 = 1_000_000_000;

/// Parse a quantity into nano-units, rounding any sub-nano remainder up.
fn parse_nanos(s: &str) -> Result<i128> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Quantity(s.to_string()));
    }

    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let num_end = body
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(body.len());
    let (num_str, suffix) = body.split_at(num_end);
    if num_str.is_empty() || num_str == "." {
        return Err(Error::Quantity(s.to_string()));
    }

    let (int_part, frac_part) = num_str.split_once('.').unwrap_or((num_str, ""));
    if frac_part.contains('.') {
        return Err(Error::Quantity(s.to_string()));
    }
    let digits = format!("{int_part}{frac_part}");
    let mantissa: i128 = digits
        .parse()
        .map_err(|_| Error::Quantity(s.to_string()))?;
    let frac_digits =
        i32::try_from(frac_part.len()).map_err(|_| Error::Quantity(s.to_string()))?;

    // (binary multiplier, decimal exponent)
    let (binary, exponent): (i128, i32) = match suffix {
        "" => (1, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        other => match other.strip_prefix(['e', 'E']) {
            Some(exp) => (
                1,
                exp.parse::<i32>()
                    .map_err(|_| Error::Quantity(s.to_string()))?,
            ),
            None => return Err(Error::Quantity(s.to_string())),
        },
    };

    // value = mantissa * binary * 10^(exponent - frac_digits), in nanos: +9
    let shift = exponent
        .checked_sub(frac_digits)
        .and_then(|e| e.checked_add(9))
        .ok_or_else(|| Error::Quantity(s.to_string()))?;
    let scaled = mantissa
        .checked_mul(binary)
        .ok_or_else(|| Error::Quantity(s.to_string()))?;
    let nanos = if shift >= 0 {
        10i128
            .checked_pow(shift.unsigned_abs())
            .and_then(|p| scaled.checked_mul(p))
            .ok_or_else(|| Error::Quantity(s.to_string()))?
    } else {
        let div = 10i128
            .checked_pow(shift.unsigned_abs())
            .ok_or_else(|| Error::Quantity(s.to_string()))?;
        ceil_div(scaled, div)
    };

    Ok(if negative { -nanos } else { nanos })
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d > 0 {
        q + 1
    } else {
        q
    }
}

fn to_i64(v: i128, original: &str) -> Result<i64> {
    i64::try_from(v).map_err(|_| Error::Quantity(original.to_string()))
}

/// The quantity in thousandths of a unit, rounded up (CPU millicores).
pub fn milli_value(q: &Quantity) -> Result<i64> {
    to_i64(ceil_div(parse_nanos(&q.0)?, 1_000_000), &q.0)
}

/// The quantity in whole units, rounded up (memory bytes).
pub fn value(q: &Quantity) -> Result<i64> {
    to_i64(ceil_div(parse_nanos(&q.0)?, NANO), &q.0)
}

/// Canonical CPU quantity: whole cores when exact, otherwise millicores.
pub fn cpu_from_millicores(millis: i64) -> Quantity {
    if millis % 1000 == 0 {
        Quantity((millis / 1000).to_string())
    } else {
        Quantity(format!("{millis}m"))
    }
}

/// Canonical memory quantity using the largest exact binary suffix.
pub fn memory_from_bytes(bytes: i64) -> Quantity {
    const SUFFIXES: [(&str, i64); 4] = [
        ("Ti", 1 << 40),
        ("Gi", 1 << 30),
        ("Mi", 1 << 20),
        ("Ki", 1 << 10),
    ];
    if bytes != 0 {
        for (suffix, unit) in SUFFIXES {
            if bytes % unit == 0 {
                return Quantity(format!("{}{suffix}", bytes / unit));
            }
        }
    }
    Quantity(bytes.to_string())
}

/// Parse a Datahub sample value ("750", "750.0") into an integer.
/// Fractions are truncated toward zero.
pub fn parse_sample_value(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v.abs() < i64::MAX as f64 => Ok(v.trunc() as i64),
        _ => Err(Error::Quantity(raw.to_string())),
    }
}
