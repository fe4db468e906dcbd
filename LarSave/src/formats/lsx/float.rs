//! Reference-compatible float rendering
//!
//! LSX output must reproduce LSLib's 32-bit float formatting
//! digit for digit: shortest decimal under round-half-to-even that still
//! round-trips through `f32`, switching to scientific notation outside
//! `[1e-4, 1e15)`.

/// Format an `f32` the way LSLib's float-to-string does.
#[must_use]
pub fn format_f32(v: f32) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-Infinity" } else { "Infinity" }.to_string();
    }
    if v == 0.0 || v.is_subnormal() {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let magnitude = f64::from(v).abs();
    if magnitude < 1e-4 || magnitude >= 1e15 {
        scientific(v)
    } else {
        decimal(v)
    }
}

/// Doubles use shortest round-trip rendering.
#[must_use]
pub fn format_f64(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-Infinity" } else { "Infinity" }.to_string();
    }
    format!("{v}")
}

/// Scientific form: the fewest significant digits in 5..=8 that parse
/// back to the same `f32`, uppercase `E`, explicit exponent sign, at
/// least two exponent digits.
fn scientific(v: f32) -> String {
    for digits in 5..=8 {
        let s = render_scientific(v, digits);
        if s.parse::<f32>() == Ok(v) {
            return s;
        }
    }
    render_scientific(v, 9)
}

fn render_scientific(v: f32, digits: usize) -> String {
    let raw = format!("{:.*E}", digits - 1, v);
    let (mantissa, exponent) = raw.split_once('E').unwrap();

    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    let exponent: i32 = exponent.parse().unwrap();
    let sign = if exponent < 0 { '-' } else { '+' };

    format!("{mantissa}E{sign}{:02}", exponent.abs())
}

/// Decimal form: the smallest fractional digit count 0..=15 whose
/// round-half-even rounding still round-trips through `f32`.
fn decimal(v: f32) -> String {
    let exact = f64::from(v);
    for d in 0..=15u32 {
        let scale = 10f64.powi(d as i32);
        let rounded = (exact * scale).round_ties_even();
        if rounded.abs() >= 9.0e18 {
            continue;
        }
        if (rounded / scale) as f32 == v {
            return render_decimal(rounded as i64, d as usize);
        }
    }
    // f32 values in range always terminate within 15 fractional digits.
    format!("{v}")
}

fn render_decimal(rounded: i64, fractional_digits: usize) -> String {
    let negative = rounded < 0;
    let mut digits = rounded.unsigned_abs().to_string();
    if digits.len() <= fractional_digits {
        digits = format!("{:0>width$}", digits, width = fractional_digits + 1);
    }

    let split = digits.len() - fractional_digits;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&digits[..split]);
    if fractional_digits > 0 {
        let fraction = digits[split..].trim_end_matches('0');
        if !fraction.is_empty() {
            out.push('.');
            out.push_str(fraction);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zeros_and_specials() {
        assert_eq!(format_f32(0.0), "0");
        assert_eq!(format_f32(-0.0), "-0");
        assert_eq!(format_f32(1e-40), "0"); // subnormal
        assert_eq!(format_f32(f32::NAN), "NaN");
        assert_eq!(format_f32(f32::INFINITY), "Infinity");
        assert_eq!(format_f32(f32::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn plain_decimals() {
        assert_eq!(format_f32(0.1), "0.1");
        assert_eq!(format_f32(1.0), "1");
        assert_eq!(format_f32(-2.5), "-2.5");
        assert_eq!(format_f32(100.0), "100");
        assert_eq!(format_f32(0.25), "0.25");
        assert_eq!(format_f32(1.5), "1.5");
        assert_eq!(format_f32(3.14159265), "3.1415927");
    }

    #[test]
    fn scientific_boundaries() {
        assert_eq!(format_f32(-3.61999e-6), "-3.61999E-06");
        assert_eq!(format_f32(1e-5), "1E-05");
        assert_eq!(format_f32(2e15), "2E+15");
        assert_eq!(format_f32(0.0001), "0.0001"); // just inside the decimal range
    }

    #[test]
    fn every_rendering_round_trips() {
        for v in [
            0.1f32, -0.1, 1.0, 0.333333, 123456.78, 9.999999e14, 1.0001e-4, -7.77e-7,
            6553.6, 0.0625, 1.25e10,
        ] {
            let s = format_f32(v);
            assert_eq!(s.parse::<f32>().unwrap(), v, "token {s}");
        }
    }
}
