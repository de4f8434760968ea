//! Number coercion rules
//!
//! Strings that look like numbers convert to numbers, numbers convert to
//! strings, and floats with an exact integral value convert to integers.
//! Nothing else coerces.

/// Numeric value parsed from a string
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeral {
    Int(i64),
    Float(f64),
}

/// Exact float to integer conversion
///
/// Fails when the float has a fractional part or lies outside the i64 range.
pub fn float_to_integer(n: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if n.fract() == 0.0 && (-LIMIT..LIMIT).contains(&n) {
        Some(n as i64)
    } else {
        None
    }
}

/// Parse a numeral the way the runtime coerces strings
///
/// Accepts surrounding ASCII whitespace, decimal integers, hexadecimal
/// integers (`0x` prefix, wrapping on overflow) and decimal floats. Words
/// such as `inf` or `nan` are not numerals.
pub fn parse_numeral(bytes: &[u8]) -> Option<Numeral> {
    let text = std::str::from_utf8(bytes).ok()?.trim_ascii();
    if text.is_empty() {
        return None;
    }

    let (negative, unsigned) = match text.as_bytes()[0] {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };

    if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut acc: u64 = 0;
        for digit in hex.bytes() {
            let d = (digit as char).to_digit(16)? as u64;
            acc = acc.wrapping_mul(16).wrapping_add(d);
        }
        let value = acc as i64;
        return Some(Numeral::Int(if negative {
            value.wrapping_neg()
        } else {
            value
        }));
    }

    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }

    if let Ok(i) = text.parse::<i64>() {
        return Some(Numeral::Int(i));
    }
    text.parse::<f64>().ok().map(Numeral::Float)
}

/// Format a float the way the runtime prints numbers
///
/// Fourteen significant digits (`%.14g`), with `.0` appended when the
/// result would otherwise read as an integer.
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let sci = format!("{:.13e}", n);
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let mut out = if (-4..14).contains(&exponent) {
        let decimals = (13 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, n)).to_string()
    } else {
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        )
    };

    if !out.contains(['.', 'e']) {
        out.push_str(".0");
    }
    out
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
