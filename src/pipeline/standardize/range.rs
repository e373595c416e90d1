use std::sync::LazyLock;

use regex::Regex;

use super::value::parse_number;
use crate::pipeline::signatures::UNIT_FRAGMENT;

const NUM: &str = r"-?\d[\d,]*(?:\.\d+)?";

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?P<low>{NUM})\s*(?:-|–|—|to)\s*(?P<high>{NUM})"
    ))
    .expect("valid regex")
});

static UPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:<=?|≤|less\s+than|below|up\s+to)\s*(?P<high>{NUM})"
    ))
    .expect("valid regex")
});

static LOWER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:>=?|≥|greater\s+than|more\s+than|above)\s*(?P<low>{NUM})"
    ))
    .expect("valid regex")
});

static FLAG_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:high|low|abnormal|critical|normal)\b|\b(?:HH|LL|H|L|A)\b")
        .expect("valid regex")
});

static UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){UNIT_FRAGMENT}")).expect("valid regex"));

/// Numeric bounds parsed from reference-range text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParsedRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl ParsedRange {
    pub fn is_empty(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// True when `value` falls outside the bounds that are present.
    pub fn is_outside(&self, value: f64) -> bool {
        self.low.is_some_and(|low| value < low) || self.high.is_some_and(|high| value > high)
    }
}

/// Parse "a-b", "a to b", "<b", "≤b", ">a", "≥a". Returns `None` when no
/// recognised form is present.
pub fn parse_reference_range(text: &str) -> Option<ParsedRange> {
    locate_range(text).map(|(range, _)| range)
}

/// Range plus the matched substring.
fn locate_range(text: &str) -> Option<(ParsedRange, String)> {
    if let Some(caps) = BETWEEN_RE.captures(text) {
        let low = caps.name("low").and_then(|m| parse_number(m.as_str()));
        let high = caps.name("high").and_then(|m| parse_number(m.as_str()));
        if let (Some(low), Some(high)) = (low, high) {
            if low <= high {
                let matched = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
                return Some((
                    ParsedRange {
                        low: Some(low),
                        high: Some(high),
                    },
                    matched,
                ));
            }
        }
    }
    if let Some(caps) = UPPER_RE.captures(text) {
        if let Some(high) = caps.name("high").and_then(|m| parse_number(m.as_str())) {
            let matched = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            return Some((ParsedRange { low: None, high: Some(high) }, matched));
        }
    }
    if let Some(caps) = LOWER_RE.captures(text) {
        if let Some(low) = caps.name("low").and_then(|m| parse_number(m.as_str())) {
            let matched = caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default();
            return Some((ParsedRange { low: Some(low), high: None }, matched));
        }
    }
    None
}

/// Reference range and flag found in the text that follows a measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrailingDetails {
    pub reference_range: Option<String>,
    pub flag: Option<String>,
}

/// Scan the remainder of a line after "name value unit" for a reference
/// range and a result flag.
pub fn scan_trailing(rest: &str) -> TrailingDetails {
    let mut details = TrailingDetails::default();
    let mut remainder = rest.to_string();
    if let Some((_, matched)) = locate_range(rest) {
        details.reference_range = Some(matched.trim().to_string());
        remainder = remainder.replacen(&matched, " ", 1);
    }
    // Units would otherwise produce "L" flags from "mmol/L"
    let remainder = UNIT_RE.replace_all(&remainder, " ");
    details.flag = FLAG_WORD_RE
        .find(&remainder)
        .map(|m| m.as_str().to_string());
    details
}

/// Interpret an upstream flag string.
pub fn flag_is_abnormal(flag: &str) -> Option<bool> {
    match flag.trim().to_lowercase().as_str() {
        "h" | "hh" | "high" | "l" | "ll" | "low" | "a" | "abnormal" | "critical" | "*" => {
            Some(true)
        }
        "n" | "normal" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_forms() {
        let range = parse_reference_range("70-99").unwrap();
        assert_eq!((range.low, range.high), (Some(70.0), Some(99.0)));
        let range = parse_reference_range("3.5 to 5.0 mmol/L").unwrap();
        assert_eq!((range.low, range.high), (Some(3.5), Some(5.0)));
        let range = parse_reference_range("Ref: 135 – 145").unwrap();
        assert_eq!((range.low, range.high), (Some(135.0), Some(145.0)));
    }

    #[test]
    fn one_sided_forms() {
        assert_eq!(
            parse_reference_range("<200"),
            Some(ParsedRange { low: None, high: Some(200.0) })
        );
        assert_eq!(
            parse_reference_range("≤ 5.7"),
            Some(ParsedRange { low: None, high: Some(5.7) })
        );
        assert_eq!(
            parse_reference_range(">40"),
            Some(ParsedRange { low: Some(40.0), high: None })
        );
        assert_eq!(
            parse_reference_range("≥ 60"),
            Some(ParsedRange { low: Some(60.0), high: None })
        );
    }

    #[test]
    fn unrecognised_text() {
        assert_eq!(parse_reference_range("see comment"), None);
        assert_eq!(parse_reference_range(""), None);
    }

    #[test]
    fn inverted_between_not_accepted_as_range() {
        assert_eq!(parse_reference_range("99-70"), None);
    }

    #[test]
    fn outside_checks_present_bounds_only() {
        let range = ParsedRange { low: Some(70.0), high: Some(99.0) };
        assert!(range.is_outside(105.0));
        assert!(range.is_outside(60.0));
        assert!(!range.is_outside(85.0));
        let upper = ParsedRange { low: None, high: Some(200.0) };
        assert!(!upper.is_outside(-5.0));
    }

    #[test]
    fn trailing_range_and_flag() {
        let details = scan_trailing(" 70-99 H");
        assert_eq!(details.reference_range.as_deref(), Some("70-99"));
        assert_eq!(details.flag.as_deref(), Some("H"));

        let details = scan_trailing("  (3.5-5.0 mmol/L)");
        assert_eq!(details.reference_range.as_deref(), Some("3.5-5.0"));
        assert_eq!(details.flag, None);

        let details = scan_trailing(", Normal");
        assert_eq!(details.reference_range, None);
        assert_eq!(details.flag.as_deref(), Some("Normal"));
    }

    #[test]
    fn flags_interpreted() {
        assert_eq!(flag_is_abnormal("H"), Some(true));
        assert_eq!(flag_is_abnormal("low"), Some(true));
        assert_eq!(flag_is_abnormal("Normal"), Some(false));
        assert_eq!(flag_is_abnormal("pending"), None);
    }
}
