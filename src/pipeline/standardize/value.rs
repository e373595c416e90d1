use std::sync::LazyLock;

use regex::Regex;

static THOUSANDS_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(?:,\d{3})+$").expect("valid regex"));

static THOUSANDS_DOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(?:\.\d{3}){2,}$").expect("valid regex"));

/// Result of converting a loosely typed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueConversion {
    pub value: f64,
    /// False when the input was irrecoverable and the value was coerced.
    pub converted: bool,
}

/// Convert a JSON value (number or string) to `f64`. Never fails:
/// irrecoverable input becomes 0.0 with `converted == false` and a warning
/// carrying the original string.
pub fn safe_float(raw: &serde_json::Value) -> ValueConversion {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => parse_number(s),
        _ => None,
    };
    match parsed {
        Some(value) => ValueConversion {
            value,
            converted: true,
        },
        None => {
            tracing::warn!(original = %raw, "Value conversion failed, coercing to 0.0");
            ValueConversion {
                value: 0.0,
                converted: false,
            }
        }
    }
}

/// Parse a numeric string such as "1,234.5", " 105 ", "<0.5", "5,4" or
/// "105 mg/dL". Trailing non-numeric text is ignored.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw
        .trim()
        .trim_start_matches(['<', '>', '≤', '≥', '=', '~', '+'])
        .trim_start();

    let numeric: String = trimmed
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || matches!(c, '.' | ',' | ' ' | '\'') || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .filter(|c| !matches!(c, ' ' | '\''))
        .collect();
    let numeric = numeric.trim_end_matches(['.', ',']);
    if !numeric.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = normalize_separators(numeric);
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn normalize_separators(numeric: &str) -> String {
    let has_comma = numeric.contains(',');
    let has_dot = numeric.contains('.');
    match (has_comma, has_dot) {
        (true, true) => {
            // The separator that appears last is the decimal mark
            let last_comma = numeric.rfind(',').unwrap_or(0);
            let last_dot = numeric.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                numeric.replace('.', "").replace(',', ".")
            } else {
                numeric.replace(',', "")
            }
        }
        (true, false) => {
            if THOUSANDS_COMMA_RE.is_match(numeric) {
                numeric.replace(',', "")
            } else {
                numeric.replacen(',', ".", 1).replace(',', "")
            }
        }
        (false, true) if THOUSANDS_DOT_RE.is_match(numeric) => numeric.replace('.', ""),
        _ => numeric.to_string(),
    }
}
