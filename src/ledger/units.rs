//! Fixed-point amount handling.
//!
//! The ledger denominates balances in coins with 8 decimal places. All amounts
//! are carried internally as integer base units so tax math can be done without
//! floats; one coin is [`UNIT_SCALE`] base units.

/// Base units per coin (8 decimal places).
pub const UNIT_SCALE: u64 = 100_000_000;

/// Format base units as a fixed 8-decimal string, e.g. `"10.00000000"`.
///
/// This is the only representation ever sent to the ledger's pay endpoint:
/// exact, and never more precise than the ledger's minimum unit.
pub fn format_units(units: u64) -> String {
    format!("{}.{:08}", units / UNIT_SCALE, units % UNIT_SCALE)
}

/// Parse a decimal string into base units, truncating anything past the 8th
/// fractional digit toward zero.
///
/// Negative amounts clamp to zero (a claim can never owe money); anything that
/// is not a plain decimal number returns `None`.
pub fn parse_units(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (int_part, frac_part) = match text.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (text, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    if negative {
        return Some(0);
    }

    let whole: u64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };

    // Keep at most 8 fractional digits; extra precision is dropped, never
    // rounded up.
    let frac_digits: String = frac_part.chars().take(8).collect();
    let mut frac: u64 = if frac_digits.is_empty() {
        0
    } else {
        frac_digits.parse().ok()?
    };
    for _ in frac_digits.len()..8 {
        frac *= 10;
    }

    whole.checked_mul(UNIT_SCALE)?.checked_add(frac)
}

/// Extract an amount in base units from a JSON value that may be a number or a
/// decimal string. Non-positive values clamp to zero; unparsable input is
/// `None`.
pub fn units_from_json(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => {
            let f = n.as_f64()?;
            if !f.is_finite() {
                return None;
            }
            if f <= 0.0 {
                return Some(0);
            }
            let scaled = f * UNIT_SCALE as f64;
            if scaled >= u64::MAX as f64 {
                return None;
            }
            // f64 cannot carry more than ~15 significant digits, so the wire
            // value is already approximate; round to the nearest base unit.
            Some(scaled.round() as u64)
        }
        serde_json::Value::String(s) => parse_units(s),
        _ => None,
    }
}

/// Tax owed on a claim, in base units, floored.
///
/// `rate_scaled` is the tax fraction times [`UNIT_SCALE`]. Floor division
/// guarantees the result never exceeds `amount × rate`.
pub fn tax_units(amount: u64, rate_scaled: u64) -> u64 {
    ((amount as u128 * rate_scaled as u128) / UNIT_SCALE as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(0), "0.00000000");
        assert_eq!(format_units(1), "0.00000001");
        assert_eq!(format_units(UNIT_SCALE), "1.00000000");
        assert_eq!(format_units(1_050_000_000), "10.50000000");
        assert_eq!(format_units(10 * UNIT_SCALE), "10.00000000");
    }

    #[test]
    fn test_parse_units_exact() {
        assert_eq!(parse_units("10.5"), Some(1_050_000_000));
        assert_eq!(parse_units("0.00000001"), Some(1));
        assert_eq!(parse_units("123"), Some(123 * UNIT_SCALE));
        assert_eq!(parse_units(" 42.0 "), Some(42 * UNIT_SCALE));
        assert_eq!(parse_units(".5"), Some(50_000_000));
        assert_eq!(parse_units("5."), Some(5 * UNIT_SCALE));
    }

    #[test]
    fn test_parse_units_truncates_extra_precision() {
        // 9th digit is dropped, not rounded.
        assert_eq!(parse_units("0.123456789"), Some(12_345_678));
        assert_eq!(parse_units("1.999999999"), Some(199_999_999));
    }

    #[test]
    fn test_parse_units_negative_clamps_to_zero() {
        assert_eq!(parse_units("-3"), Some(0));
        assert_eq!(parse_units("-0.5"), Some(0));
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert_eq!(parse_units(""), None);
        assert_eq!(parse_units("abc"), None);
        assert_eq!(parse_units("1.2.3"), None);
        assert_eq!(parse_units("1e5"), None);
        assert_eq!(parse_units("."), None);
        assert_eq!(parse_units("-"), None);
    }

    #[test]
    fn test_parse_format_round_trip() {
        for text in ["0.00000000", "10.00000000", "0.12345678", "7.00000100"] {
            let units = parse_units(text).unwrap();
            assert_eq!(format_units(units), text);
        }
    }

    #[test]
    fn test_units_from_json() {
        assert_eq!(units_from_json(&json!(100)), Some(100 * UNIT_SCALE));
        assert_eq!(units_from_json(&json!(10.5)), Some(1_050_000_000));
        assert_eq!(units_from_json(&json!("10.5")), Some(1_050_000_000));
        assert_eq!(units_from_json(&json!(0)), Some(0));
        assert_eq!(units_from_json(&json!(-4.2)), Some(0));
        assert_eq!(units_from_json(&json!(null)), None);
        assert_eq!(units_from_json(&json!(true)), None);
        assert_eq!(units_from_json(&json!("rich")), None);
    }

    #[test]
    fn test_tax_units_exact_share() {
        // 100 coins at 10% -> exactly 10 coins.
        let amount = 100 * UNIT_SCALE;
        let tax = tax_units(amount, 10_000_000);
        assert_eq!(tax, 10 * UNIT_SCALE);
        assert_eq!(format_units(tax), "10.00000000");
    }

    #[test]
    fn test_tax_units_never_rounds_up() {
        // 3.33333333 coins at 10% = 0.333333333, floored to 0.33333333.
        assert_eq!(tax_units(333_333_333, 10_000_000), 33_333_333);
        // A single base unit at 10% floors to nothing.
        assert_eq!(tax_units(1, 10_000_000), 0);
        // Zero rate yields zero tax for any amount.
        assert_eq!(tax_units(u64::MAX, 0), 0);
        // Full rate returns the amount untouched.
        assert_eq!(tax_units(123_456_789, UNIT_SCALE), 123_456_789);
    }
}
