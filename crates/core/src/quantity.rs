//! Kubernetes resource quantities ("100Mi", "1500m", "2e3") to milli-units.
//!
//! Arithmetic is exact (integer numerator/denominator) and rounds the milli value away
//! from zero, matching the API server's `MilliValue`. A quantity that does not parse or
//! overflows yields `None`; callers omit the sample.

enum Scale {
    Binary(u32),
    Decimal(i32),
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    let scale = match suffix {
        "" => Scale::Decimal(0),
        "n" => Scale::Decimal(-9),
        "u" => Scale::Decimal(-6),
        "m" => Scale::Decimal(-3),
        "k" => Scale::Decimal(3),
        "M" => Scale::Decimal(6),
        "G" => Scale::Decimal(9),
        "T" => Scale::Decimal(12),
        "P" => Scale::Decimal(15),
        "E" => Scale::Decimal(18),
        "Ki" => Scale::Binary(1),
        "Mi" => Scale::Binary(2),
        "Gi" => Scale::Binary(3),
        "Ti" => Scale::Binary(4),
        "Pi" => Scale::Binary(5),
        "Ei" => Scale::Binary(6),
        s if s.starts_with(['e', 'E']) => Scale::Decimal(s[1..].parse().ok()?),
        _ => return None,
    };
    Some(scale)
}

/// Milli-unit value of a quantity string.
pub fn milli_value(raw: &str) -> Option<i128> {
    let s = raw.trim();
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let end = body.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(body.len());
    let (number, suffix) = body.split_at(end);
    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
        return None;
    }
    if int_part.len() + frac_part.len() > 30 {
        return None;
    }

    let mut mantissa: i128 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        mantissa = mantissa * 10 + i128::from(b - b'0');
    }

    let mut num = mantissa.checked_mul(1000)?;
    let mut den = 10i128.checked_pow(frac_part.len() as u32)?;
    match parse_suffix(suffix)? {
        Scale::Binary(p) => num = num.checked_mul(1024i128.checked_pow(p)?)?,
        Scale::Decimal(e) if e >= 0 => num = num.checked_mul(10i128.checked_pow(e as u32)?)?,
        Scale::Decimal(e) => match 10i128.checked_pow(e.unsigned_abs()).and_then(|p| den.checked_mul(p)) {
            Some(d) => den = d,
            // num has at most 33 digits, so the value is below one milli-unit.
            None => return Some(signed(negative, i128::from(num != 0))),
        },
    }

    Some(signed(negative, num / den + i128::from(num % den != 0)))
}

fn signed(negative: bool, milli: i128) -> i128 {
    if negative { -milli } else { milli }
}

/// Quantity in whole units as a float, taken from the milli value.
pub fn units(raw: &str) -> Option<f64> {
    milli_value(raw).map(|m| m as f64 / 1000.0)
}
