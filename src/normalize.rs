//! Time-period normalization for the `days` tool argument.
//!
//! Models pass periods as integers or as free text ("2 weeks", "a month",
//! "10"). [`normalize_days`] maps either form to a whole number of days.
//!
//! Unit keywords are checked in the order week, month, year, day and the
//! first one found decides the unit, so "1 week and 3 days" means one week.
//! The first all-digit token is the multiplier; without one the unit's own
//! length is used. Anything unrecognized becomes [`DEFAULT_DAYS`].

use serde_json::Value;

pub const DEFAULT_DAYS: u32 = 7;

/// Unit keyword and its length in days, in precedence order.
const UNITS: [(&str, u32); 4] = [("week", 7), ("month", 30), ("year", 365), ("day", 1)];

/// Normalize a JSON `days` argument to a non-negative number of days.
pub fn normalize_days(raw: &Value) -> u32 {
    match raw {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u32::try_from(u).unwrap_or(u32::MAX)
            } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0) {
                // Float-to-int `as` saturates.
                f as u32
            } else {
                DEFAULT_DAYS
            }
        }
        Value::String(s) => parse_period(s),
        _ => DEFAULT_DAYS,
    }
}

/// Normalize a free-text period such as `"3 months"` or `"10"`.
pub fn parse_period(text: &str) -> u32 {
    let text = text.trim().to_lowercase();

    for (keyword, factor) in UNITS {
        if !text.contains(keyword) {
            continue;
        }
        let count = text
            .split_whitespace()
            .find(|token| token.chars().all(|c| c.is_ascii_digit()))
            .map(|token| token.parse::<u32>().unwrap_or(u32::MAX));
        return match count {
            Some(n) => n.saturating_mul(factor),
            None => factor,
        };
    }

    text.parse::<u32>().unwrap_or(DEFAULT_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integers_pass_through() {
        assert_eq!(normalize_days(&json!(5)), 5);
        assert_eq!(normalize_days(&json!(0)), 0);
        assert_eq!(normalize_days(&json!(14.0)), 14);
    }

    #[test]
    fn test_unit_phrases() {
        assert_eq!(normalize_days(&json!("2 weeks")), 14);
        assert_eq!(normalize_days(&json!("a month")), 30);
        assert_eq!(normalize_days(&json!("3 Months")), 90);
        assert_eq!(normalize_days(&json!("last year")), 365);
        assert_eq!(normalize_days(&json!("5 days")), 5);
        assert_eq!(normalize_days(&json!("today")), 1);
    }

    #[test]
    fn test_week_takes_precedence_over_day() {
        assert_eq!(parse_period("1 week and 3 days"), 7);
    }

    #[test]
    fn test_digits_must_be_a_whole_token() {
        assert_eq!(parse_period("2weeks"), 7);
    }

    #[test]
    fn test_plain_numbers_and_fallbacks() {
        assert_eq!(normalize_days(&json!("10")), 10);
        assert_eq!(normalize_days(&json!(" 10 ")), 10);
        assert_eq!(normalize_days(&json!("banana")), 7);
        assert_eq!(normalize_days(&json!("")), 7);
        assert_eq!(normalize_days(&json!(-3)), 7);
        assert_eq!(normalize_days(&json!("-3")), 7);
        assert_eq!(normalize_days(&json!(2.5)), 7);
        assert_eq!(normalize_days(&json!(null)), 7);
        assert_eq!(normalize_days(&json!(["7"])), 7);
    }

    #[test]
    fn test_large_values_saturate() {
        assert_eq!(parse_period("99999999999 years"), u32::MAX);
        assert_eq!(normalize_days(&json!(u64::MAX)), u32::MAX);
    }
}
