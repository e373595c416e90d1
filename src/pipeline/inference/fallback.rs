//! Deterministic regex parser used when inference is unavailable, times out
//! or returns unusable output.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::biomarkers::{lookup, normalize_name};
use crate::pipeline::signatures::{LINE_NUMBER_FRAGMENT, UNIT_FRAGMENT};
use crate::pipeline::standardize::range::scan_trailing;
use crate::pipeline::types::RawBiomarker;

/// Confidence for a name found in the alias dictionary.
const KNOWN_NAME_CONFIDENCE: f32 = 0.75;
/// Confidence for any other name.
const UNKNOWN_NAME_CONFIDENCE: f32 = 0.6;

/// "Name[, qualifier][:=] value unit" with single-space separated name
/// words. Only blanks and tabs separate fields, so a match never spans lines.
static MEASUREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let word = r"[A-Za-z0-9()\-/.'%]";
    Regex::new(&format!(
        r"(?i)(?P<name>[A-Za-z]{word}*(?: {word}+){{0,5}}?)(?:,[ \t]*(?P<qualifier>[A-Za-z]+(?: [A-Za-z]+)?))?(?:[ \t]*[:=][ \t]*|[ \t]+)(?P<value>{LINE_NUMBER_FRAGMENT})[ \t]*(?P<unit>{UNIT_FRAGMENT})"
    ))
    .expect("valid regex")
});

/// Leading words that change which biomarker the rest of the name means.
const NAME_MODIFIERS: &[&str] = &["non", "urine", "urinary"];

/// Drop leading words up to the last one without a letter ("2024-01-01"),
/// then keep the longest trailing run of words the dictionary resolves, so
/// "Sample collected Glucose" becomes "Glucose". Unresolved names are kept
/// whole.
fn clean_name(raw: &str) -> String {
    let words: Vec<&str> = raw.split(' ').filter(|w| !w.is_empty()).collect();
    let start = words
        .iter()
        .rposition(|w| !w.chars().any(char::is_alphabetic))
        .map(|i| i + 1)
        .unwrap_or(0);
    let words = &words[start..];

    let resolved = (0..words.len()).find(|&i| lookup(&words[i..].join(" ")).is_some());
    match resolved {
        Some(i) if i == 0 || !is_modifier(words[i - 1]) => words[i..].join(" "),
        _ => words.join(" "),
    }
}

fn is_modifier(word: &str) -> bool {
    normalize_name(word)
        .split(' ')
        .next()
        .is_some_and(|first| NAME_MODIFIERS.contains(&first))
}

/// "Cholesterol, HDL" keeps its qualifier when the pair is a known spelling;
/// otherwise the qualifier ("Glucose, random") is dropped.
fn with_qualifier(name: String, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) if lookup(&format!("{name}, {q}")).is_some() => format!("{name}, {q}"),
        _ => name,
    }
}

/// Scan text for measurement lines and return one raw entry per match.
pub fn fallback_parse(text: &str) -> Vec<RawBiomarker> {
    let matches: Vec<regex::Captures> = MEASUREMENT_RE.captures_iter(text).collect();
    let mut entries = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(name), Some(value), Some(unit)) =
            (caps.get(0), caps.name("name"), caps.name("value"), caps.name("unit"))
        else {
            continue;
        };

        let name = clean_name(name.as_str());
        if name.is_empty() {
            continue;
        }
        let name = with_qualifier(name, caps.name("qualifier").map(|q| q.as_str()));

        let line_end = text[whole.end()..]
            .find('\n')
            .map(|p| whole.end() + p)
            .unwrap_or(text.len());
        let next_start = matches
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());
        let trailing = scan_trailing(&text[whole.end()..line_end.min(next_start)]);

        let confidence = if lookup(&name).is_some() {
            KNOWN_NAME_CONFIDENCE
        } else {
            UNKNOWN_NAME_CONFIDENCE
        };

        entries.push(RawBiomarker {
            name,
            value: serde_json::Value::String(value.as_str().trim().to_string()),
            unit: Some(unit.as_str().to_string()),
            reference_range: trailing.reference_range,
            flag: trailing.flag,
            confidence: Some(confidence),
            ..RawBiomarker::default()
        });
    }

    tracing::debug!(entries = entries.len(), "Fallback parse complete");
    entries
}
