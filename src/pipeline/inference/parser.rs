//! Response boundary: locate the JSON in a model response, read entries
//! leniently, and repair responses that are not valid JSON.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::pipeline::standardize::value::parse_number;
use crate::pipeline::types::RawBiomarker;

/// Keys a model may put the entry list under.
const ENTRY_KEYS: &[&str] = &["biomarkers", "results", "lab_results"];

/// Extract a JSON block from response text that may carry prose around it.
pub fn extract_json_block(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let after_fence = &trimmed[start + 7..];
        if let Some(end) = after_fence.find("```") {
            return Some(after_fence[..end].trim());
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('{') || block.starts_with('[') {
                return Some(block);
            }
        }
    }

    let (open, close) = match (trimmed.find('{'), trimmed.find('[')) {
        (Some(brace), Some(bracket)) if bracket < brace => ('[', ']'),
        (None, Some(_)) => ('[', ']'),
        _ => ('{', '}'),
    };
    match (trimmed.find(open), trimmed.rfind(close)) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Parse a sanitized response. `None` means the response is malformed.
pub fn parse_response(response: &str) -> Option<Vec<RawBiomarker>> {
    let block = extract_json_block(response)?;
    let value: Value = serde_json::from_str(block).ok()?;
    entries_from_value(value)
}

/// Read the entry list from a parsed JSON value. The model's "skipped" list
/// is advisory and only logged.
fn entries_from_value(value: Value) -> Option<Vec<RawBiomarker>> {
    match value {
        Value::Array(items) => Some(parse_entries(&items)),
        Value::Object(map) => {
            if let Some(Value::Array(skipped)) = map.get("skipped") {
                if !skipped.is_empty() {
                    tracing::debug!(
                        skipped = skipped.len(),
                        "Model reported skipped entries, ignoring"
                    );
                }
            }
            for key in ENTRY_KEYS {
                match map.get(*key) {
                    Some(Value::Array(items)) => return Some(parse_entries(items)),
                    Some(Value::Null) => return Some(Vec::new()),
                    _ => {}
                }
            }
            if map.contains_key("name") {
                return Some(parse_entries(&[Value::Object(map)]));
            }
            None
        }
        _ => None,
    }
}

/// Parse entries leniently: coerce mistyped fields, skip items that still
/// fail to deserialize.
fn parse_entries(items: &[Value]) -> Vec<RawBiomarker> {
    items
        .iter()
        .filter_map(coerce_entry)
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

fn coerce_entry(item: &Value) -> Option<Value> {
    let object = item.as_object()?;
    let mut coerced = Map::new();
    for (key, value) in object {
        let field = match key.as_str() {
            "name" | "test_name" | "biomarker" | "unit" | "reference_range" | "flag"
            | "abnormal_flag" => coerce_text(value),
            "reference_range_low" | "reference_range_high" => coerce_number(value),
            "confidence" => coerce_number(value).map(|v| scale_percentage(&v)),
            "value" => Some(value.clone()),
            _ => None,
        };
        if let Some(field) = field {
            coerced.insert(key.clone(), field);
        }
    }
    Some(Value::Object(coerced))
}

fn coerce_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(_) | Value::Null => Some(value.clone()),
        Value::Number(n) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) | Value::Null => Some(value.clone()),
        Value::String(s) => parse_number(s)
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

/// Confidence reported as a percentage (e.g. 95) becomes 0.95.
fn scale_percentage(value: &Value) -> Value {
    match value.as_f64() {
        Some(c) if c > 1.0 && c <= 100.0 => {
            Number::from_f64(c / 100.0).map(Value::Number).unwrap_or(Value::Null)
        }
        _ => value.clone(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// REPAIR
// ═══════════════════════════════════════════════════════════════════════

static PY_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:None|True|False)\b").expect("valid regex"));

static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

/// Try to recover entries from a malformed response: smart quotes, Python
/// literals, single-quoted strings, trailing commas, trailing prose and
/// truncated output (cut back to the last complete entry).
pub fn repair_malformed(raw: &str) -> Option<Vec<RawBiomarker>> {
    let unfenced = raw.replace("```json", "").replace("```", "");
    let start = unfenced.find(['{', '['])?;
    let fixed = normalize_syntax(&unfenced[start..]);

    let value = first_json_value(&fixed).or_else(|| {
        let closed = close_truncated(&fixed)?;
        first_json_value(&TRAILING_COMMA_RE.replace_all(&closed, "$1"))
    })?;

    let entries = entries_from_value(value)?;
    tracing::info!(entries = entries.len(), "Repaired malformed inference response");
    Some(entries)
}

fn normalize_syntax(text: &str) -> String {
    let mut fixed = text
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    if !fixed.contains('"') {
        fixed = fixed.replace('\'', "\"");
    }
    let fixed = PY_LITERAL_RE.replace_all(&fixed, |caps: &regex::Captures| {
        match &caps[0] {
            "None" => "null",
            "True" => "true",
            _ => "false",
        }
        .to_string()
    });
    TRAILING_COMMA_RE.replace_all(&fixed, "$1").into_owned()
}

/// Parse the first JSON value in `text`, ignoring anything after it.
fn first_json_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Cut truncated JSON back to the last object that completed an array
/// element, then close the brackets still open at that point.
fn close_truncated(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut last_cut: Option<(usize, Vec<char>)> = None;

    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                stack.pop();
                if stack.is_empty() {
                    // Complete value; nothing to close
                    return None;
                }
                if c == '}' && stack.last() == Some(&'[') {
                    last_cut = Some((idx + 1, stack.clone()));
                }
            }
            _ => {}
        }
    }

    let (end, open) = last_cut?;
    let mut closed = text[..end].to_string();
    for bracket in open.iter().rev() {
        closed.push(if *bracket == '{' { '}' } else { ']' });
    }
    Some(closed)
}
