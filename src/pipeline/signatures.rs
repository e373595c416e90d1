//! Compiled text signatures shared across pipeline stages.
//!
//! Three families:
//! - biomarker indicators (number + unit, result flags, reference-range text)
//! - administrative patterns (contact details, legal notices, page/version
//!   metadata, addresses, header fields)
//! - the unit vocabulary used to recognise measurements
//!
//! The `regex` crate has no look-around, so unit alternatives that end in a
//! word character carry their own `\b` and `%` is matched separately.

use std::sync::LazyLock;

use regex::Regex;

/// Unit vocabulary as a regex fragment (non-capturing, case-insensitive
/// callers must add `(?i)`).
pub const UNIT_FRAGMENT: &str = r"(?:(?:mg/dL|g/dL|[µμu]g/dL|ng/dL|mg/L|g/L|[µμu]g/L|ng/mL|pg/mL|mmol/L|[µμu]mol/L|nmol/L|pmol/L|mEq/L|mIU/mL|mIU/L|[µμu]IU/mL|IU/mL|IU/L|mU/L|U/L|(?:x\s?)?10\^?\d{1,2}/[µμu]?L|[KM]/[µμu]L|cells/[µμu]L|mL/min(?:/1\.73\s?m2)?|mm/hr?|mmHg|fL|pg|g)\b|%)";

/// Numeric value fragment: optional comparator, sign, thousands separators,
/// decimal part.
pub const NUMBER_FRAGMENT: &str = r"[<>≤≥]?\s?-?\d[\d,]*(?:\.\d+)?";

/// [`NUMBER_FRAGMENT`] restricted to one line: only a blank or tab may
/// follow the comparator.
pub const LINE_NUMBER_FRAGMENT: &str = r"[<>≤≥]?[ \t]?-?\d[\d,]*(?:\.\d+)?";

static MEASUREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){NUMBER_FRAGMENT}\s*{UNIT_FRAGMENT}")).expect("valid regex")
});

static FLAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:high|low|normal|abnormal|critical|elevated|decreased)\b")
        .expect("valid regex")
});

static REFERENCE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:reference\s+(?:range|interval|value)s?|ref\.?\s*range|normal\s+range)\b")
        .expect("valid regex")
});

static UNIT_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)^{UNIT_FRAGMENT}$")).expect("valid regex"));

/// Kind of administrative content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminKind {
    Url,
    Email,
    Phone,
    Legal,
    PageMeta,
    Address,
    HeaderField,
}

impl AdminKind {
    /// Universally safe to strip during compression. Addresses and header
    /// fields only count toward skip decisions.
    pub fn is_strippable(self) -> bool {
        matches!(
            self,
            AdminKind::Url
                | AdminKind::Email
                | AdminKind::Phone
                | AdminKind::Legal
                | AdminKind::PageMeta
        )
    }
}

/// A compiled administrative pattern.
pub struct AdminPattern {
    pub regex: Regex,
    pub kind: AdminKind,
    /// Matches the whole line, so the line can be dropped instead of edited.
    pub whole_line: bool,
}

fn admin(pattern: &str, kind: AdminKind, whole_line: bool) -> AdminPattern {
    AdminPattern {
        regex: Regex::new(pattern).expect("valid regex"),
        kind,
        whole_line,
    }
}

/// Administrative pattern library.
pub static ADMIN_PATTERNS: LazyLock<Vec<AdminPattern>> = LazyLock::new(|| {
    vec![
        admin(r"(?i)\b(?:https?://|www\.)\S+", AdminKind::Url, false),
        admin(r"[\w.+-]+@[\w-]+\.[\w.-]+", AdminKind::Email, false),
        admin(
            r"(?i)\b(?:tel|phone|ph|fax|telephone|mobile|cell)\b\.?\s*(?:no\.?|number)?\s*[:#]?\s*\+?[\d().\s-]{7,}\d",
            AdminKind::Phone,
            false,
        ),
        admin(r"\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b", AdminKind::Phone, false),
        admin(
            r"(?i)(?:©|\(c\)\s*\d{4}|\bcopyright\b|all rights reserved|\bconfidential(?:ity)?\b|\bdisclaimer\b|\bprivileged\b|intended (?:only )?for the|\bHIPAA\b)",
            AdminKind::Legal,
            true,
        ),
        admin(
            r"(?i)\bpage\s+\d+\s*(?:of|/)\s*\d+\b",
            AdminKind::PageMeta,
            false,
        ),
        admin(
            r"(?i)\b(?:version|ver|rev(?:ision)?)\.?\s*:?\s*\d+(?:\.\d+)*\b|\bv\d+(?:\.\d+)+\b",
            AdminKind::PageMeta,
            false,
        ),
        admin(
            r"(?i)\b\d{1,5}\s+(?:[A-Za-z]+\s+){1,4}(?:street|st|avenue|ave|road|rd|boulevard|blvd|suite|ste|drive|dr|lane|ln|way|parkway|pkwy)\b\.?",
            AdminKind::Address,
            false,
        ),
        admin(r"\b[A-Z]{2}\s+\d{5}(?:-\d{4})?\b", AdminKind::Address, false),
        admin(
            r"(?i)^\s*(?:patient\s+(?:name|id)|name|dob|date\s+of\s+birth|sex|gender|account(?:\s+(?:no|number))?|accession|ordering\s+(?:physician|provider)|physician|npi|clia|lab(?:oratory)?\s+director|specimen\s+id|collected|received|reported|printed|requisition|client)\b",
            AdminKind::HeaderField,
            false,
        ),
    ]
});

/// True when the line carries a measurement (number followed by a unit).
pub fn is_measurement_line(line: &str) -> bool {
    MEASUREMENT_RE.is_match(line)
}

/// Biomarker-indicator signature: number+unit, a result flag word, or
/// reference-range wording. Lines matching this are protected everywhere.
pub fn is_indicator_line(line: &str) -> bool {
    is_measurement_line(line) || FLAG_RE.is_match(line) || REFERENCE_RANGE_RE.is_match(line)
}

/// Count measurement occurrences in a text.
pub fn count_measurements(text: &str) -> usize {
    MEASUREMENT_RE.find_iter(text).count()
}

/// Administrative kinds present in a line.
pub fn admin_kinds(line: &str) -> Vec<AdminKind> {
    ADMIN_PATTERNS
        .iter()
        .filter(|p| p.regex.is_match(line))
        .map(|p| p.kind)
        .collect()
}

/// Number of lines in `text` that match any administrative pattern.
pub fn count_admin_lines(text: &str) -> usize {
    text.lines()
        .filter(|line| ADMIN_PATTERNS.iter().any(|p| p.regex.is_match(line)))
        .count()
}

/// Number of indicator lines in `text`.
pub fn count_indicator_lines(text: &str) -> usize {
    text.lines().filter(|line| is_indicator_line(line)).count()
}

/// True when the string is exactly a known unit.
pub fn is_known_unit(unit: &str) -> bool {
    UNIT_ONLY_RE.is_match(unit.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_lines_detected() {
        assert!(is_measurement_line("Glucose: 105 mg/dL"));
        assert!(is_measurement_line("Hemoglobin 13.5 g/dL"));
        assert!(is_measurement_line("HbA1c 5.4 %"));
        assert!(is_measurement_line("WBC    6.2    x10^9/L"));
        assert!(is_measurement_line("Platelets 250 K/uL"));
        assert!(is_measurement_line("Vitamin D 32 ng/mL"));
    }

    #[test]
    fn phone_numbers_are_not_measurements() {
        assert!(!is_measurement_line("Fax: 9876543210"));
        assert!(!is_measurement_line("Phone (555) 123-4567"));
        assert!(!is_measurement_line("Visit us at 12 Main Street"));
    }

    #[test]
    fn unit_requires_word_boundary() {
        // "g" must not match the start of a word
        assert!(!is_measurement_line("Collected 2 given tubes"));
        assert!(!is_measurement_line("Room 12 pgroup"));
    }

    #[test]
    fn indicator_includes_flags_and_reference_text() {
        assert!(is_indicator_line("Result: HIGH"));
        assert!(is_indicator_line("Reference range varies by age"));
        assert!(is_indicator_line("Normal"));
        assert!(!is_indicator_line("Thank you for choosing our laboratory"));
    }

    #[test]
    fn admin_patterns_classify_kinds() {
        assert!(admin_kinds("Visit https://lab.example.com/results").contains(&AdminKind::Url));
        assert!(admin_kinds("Contact: results@lab.example.com").contains(&AdminKind::Email));
        assert!(admin_kinds("Fax: 9876543210").contains(&AdminKind::Phone));
        assert!(admin_kinds("Tel (555) 123-4567").contains(&AdminKind::Phone));
        assert!(admin_kinds("© 2024 Example Labs. All rights reserved.").contains(&AdminKind::Legal));
        assert!(admin_kinds("Page 2 of 5").contains(&AdminKind::PageMeta));
        assert!(admin_kinds("Form version 3.2").contains(&AdminKind::PageMeta));
        assert!(admin_kinds("1200 Market Street Suite 4").contains(&AdminKind::Address));
        assert!(admin_kinds("Patient Name: Jane Doe").contains(&AdminKind::HeaderField));
    }

    #[test]
    fn biomarker_lines_have_no_admin_kinds() {
        assert!(admin_kinds("Glucose: 105 mg/dL").is_empty());
        assert!(admin_kinds("Cholesterol 190 mg/dL 0-200").is_empty());
    }

    #[test]
    fn strippable_kinds() {
        assert!(AdminKind::Url.is_strippable());
        assert!(AdminKind::Legal.is_strippable());
        assert!(!AdminKind::Address.is_strippable());
        assert!(!AdminKind::HeaderField.is_strippable());
    }

    #[test]
    fn counts_lines() {
        let text = "Patient Name: Jane\nFax: 5551234567\nGlucose 98 mg/dL\nLDL 120 mg/dL";
        assert_eq!(count_admin_lines(text), 2);
        assert_eq!(count_indicator_lines(text), 2);
        assert_eq!(count_measurements(text), 2);
    }

    #[test]
    fn known_units() {
        assert!(is_known_unit("mg/dL"));
        assert!(is_known_unit("MG/DL"));
        assert!(is_known_unit("µmol/L"));
        assert!(is_known_unit("%"));
        assert!(!is_known_unit("Normal"));
        assert!(!is_known_unit(""));
    }
}
