//! Regex variations generated from a pattern's aliases.
//!
//! Every variation exposes the named groups `name`, `value` and `unit`.
//! Fields are separated by blanks and tabs only, so a match stays on one
//! line.

use crate::pipeline::signatures::{LINE_NUMBER_FRAGMENT, UNIT_FRAGMENT};

/// Where a "Name: value" field may begin: line start, after a column
/// delimiter, or after a run of blanks.
const FIELD_START: &str = r"(?:^|[;|\t][ \t]*|[ \t]{2,})";

/// Separator between alias words.
const WORD_SEPARATOR: &str = r"[ \t\-,]+";

fn alias_source(alias: &str) -> Option<String> {
    let words: Vec<String> = alias
        .split([' ', '\t', '-', ','])
        .filter(|w| !w.is_empty())
        .map(regex::escape)
        .collect();
    if words.is_empty() {
        return None;
    }
    let mut source = words.join(WORD_SEPARATOR);
    let trimmed = alias.trim();
    if trimmed.chars().next().is_some_and(char::is_alphanumeric) {
        source.insert_str(0, r"\b");
    }
    if trimmed.chars().last().is_some_and(char::is_alphanumeric) {
        source.push_str(r"\b");
    }
    Some(source)
}

/// Alternation of all aliases, longest first so "LDL Cholesterol" wins over
/// "LDL".
pub fn alias_alternation(aliases: &[String]) -> Option<String> {
    let mut sorted: Vec<&String> = aliases.iter().collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    sorted.dedup();
    let sources: Vec<String> = sorted.iter().filter_map(|a| alias_source(a)).collect();
    if sources.is_empty() {
        return None;
    }
    Some(sources.join("|"))
}

/// The four layouts: "Name: value unit", "Name (qualifier): value unit",
/// "value unit Name" and the table row "Name value unit".
pub fn build_variations(aliases: &[String]) -> Vec<String> {
    let Some(alternation) = alias_alternation(aliases) else {
        return Vec::new();
    };
    let name = format!("(?P<name>{alternation})");
    let value = format!("(?P<value>{LINE_NUMBER_FRAGMENT})");
    let unit = format!("(?P<unit>{UNIT_FRAGMENT})");

    vec![
        format!(r"(?im){FIELD_START}{name}[ \t]*[:=][ \t]*{value}[ \t]*{unit}"),
        format!(
            r"(?im){FIELD_START}{name}[ \t]*\([^)\n]{{1,40}}\)[ \t]*[:=]?[ \t]*{value}[ \t]*{unit}"
        ),
        format!(r"(?im)^[ \t]*{value}[ \t]*{unit}[ \t]+{name}[ \t]*$"),
        format!(r"(?im)^[ \t]*{name}[ \t|]+{value}[ \t]*{unit}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn compiled(aliases: &[&str]) -> Vec<Regex> {
        let aliases: Vec<String> = aliases.iter().map(|a| a.to_string()).collect();
        build_variations(&aliases)
            .iter()
            .map(|v| Regex::new(v).unwrap())
            .collect()
    }

    fn first_match<'a>(regexes: &[Regex], text: &'a str) -> Option<(&'a str, &'a str, &'a str)> {
        regexes.iter().find_map(|re| {
            re.captures(text).map(|c| {
                (
                    c.name("name").unwrap().as_str(),
                    c.name("value").unwrap().as_str(),
                    c.name("unit").unwrap().as_str(),
                )
            })
        })
    }

    #[test]
    fn four_layouts_generated() {
        assert_eq!(build_variations(&["Glucose".to_string()]).len(), 4);
        assert!(build_variations(&[" - ".to_string()]).is_empty());
    }

    #[test]
    fn each_layout_matches() {
        let regexes = compiled(&["Glucose", "Fasting Glucose"]);
        assert_eq!(
            first_match(&regexes, "Glucose: 105 mg/dL"),
            Some(("Glucose", "105", "mg/dL"))
        );
        assert_eq!(
            first_match(&regexes, "Fasting Glucose (serum): 92 mg/dL"),
            Some(("Fasting Glucose", "92", "mg/dL"))
        );
        assert_eq!(
            first_match(&regexes, "105 mg/dL Glucose"),
            Some(("Glucose", "105", "mg/dL"))
        );
        assert_eq!(
            first_match(&regexes, "Glucose\t98\tmg/dL\t70-99"),
            Some(("Glucose", "98", "mg/dL"))
        );
    }

    #[test]
    fn alias_words_tolerate_separators() {
        let regexes = compiled(&["LDL Cholesterol"]);
        assert!(first_match(&regexes, "LDL-Cholesterol: 120 mg/dL").is_some());
        assert!(first_match(&regexes, "ldl cholesterol   120 mg/dL").is_some());
    }

    #[test]
    fn name_inside_longer_name_not_matched() {
        let regexes = compiled(&["Cholesterol"]);
        assert!(first_match(&regexes, "HDL Cholesterol: 55 mg/dL").is_none());
        assert!(first_match(&regexes, "Cholesterolemia: 55 mg/dL").is_none());
    }

    #[test]
    fn matches_never_cross_lines() {
        let regexes = compiled(&["Glucose"]);
        assert!(first_match(&regexes, "Glucose:\n105 mg/dL").is_none());
    }

    #[test]
    fn longest_alias_preferred() {
        let alternation = alias_alternation(&["LDL".into(), "LDL Cholesterol".into()]).unwrap();
        assert!(alternation.starts_with(r"\bLDL[ \t\-,]+Cholesterol\b"));
    }

    #[test]
    fn special_characters_escaped() {
        let regexes = compiled(&["Vitamin D (25-OH)"]);
        assert!(first_match(&regexes, "Vitamin D (25-OH): 32 ng/mL").is_some());
    }
}
