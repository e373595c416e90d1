// Sanitize chunk text before it is sent for inference and strip model
// artifacts from what comes back.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum input length to send to the inference service (characters).
const MAX_INPUT_LENGTH: usize = 50_000;

/// Sanitize text for inference without audit context.
pub fn sanitize_for_llm(raw: &str) -> String {
    sanitize_for_llm_with_audit(raw, None)
}

/// Remove invisible characters and prompt-injection lines, normalize
/// whitespace and truncate. Removed-line counts are logged with `doc_id`,
/// never the removed content.
pub fn sanitize_for_llm_with_audit(raw: &str, doc_id: Option<&str>) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (no_injection, removed_count) = remove_injection_patterns_counted(&cleaned);

    if removed_count > 0 {
        let id = doc_id.unwrap_or("unknown");
        tracing::warn!(
            doc_id = %id,
            removed_lines = removed_count,
            "Injection patterns detected and removed from chunk input"
        );
    }

    let normalized = normalize_whitespace(&no_injection);
    truncate_to_max_length(&normalized, MAX_INPUT_LENGTH)
}

/// Drop zero-width, bidi-override and control characters. Space, tab and
/// line breaks survive.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn is_role_marker(trimmed: &str) -> bool {
    const MARKERS: &[&str] = &[
        "system:",
        "assistant:",
        "user:",
        "[system]",
        "[assistant]",
        "[inst]",
        "[/inst]",
        "<<sys>>",
        "note to ai:",
        "system update:",
    ];
    MARKERS.iter().any(|m| trimmed.starts_with(m))
}

fn is_override_attempt(text: &str) -> bool {
    const PHRASES: &[&str] = &[
        "ignore previous instructions",
        "ignore all instructions",
        "ignore the above instructions",
        "disregard your instructions",
        "disregard all instructions",
        "forget your instructions",
        "forget all instructions",
        "new instructions:",
        "override extraction",
        "please also add",
    ];
    PHRASES.iter().any(|p| text.contains(p))
}

fn is_xml_instruction_tag(trimmed: &str) -> bool {
    trimmed.starts_with("<instruction")
        || trimmed.starts_with("</instruction")
        || trimmed.starts_with("<system")
        || trimmed.starts_with("</system")
        || trimmed.starts_with("</chunk")
        || trimmed.starts_with("<chunk")
}

fn line_matches(trimmed: &str) -> bool {
    is_role_marker(trimmed) || is_override_attempt(trimmed) || is_xml_instruction_tag(trimmed)
}

/// Remove injection lines, including phrases split across two lines.
/// Returns the cleaned text and the number of removed lines.
fn remove_injection_patterns_counted(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut skip_next = false;
    let mut removed = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if skip_next {
            skip_next = false;
            removed += 1;
            continue;
        }

        let trimmed = line.trim().to_lowercase();
        if line_matches(&trimmed) {
            removed += 1;
            continue;
        }

        // A split phrase: neither half matches alone, the join does
        if let Some(next) = lines.get(i + 1) {
            let next_trimmed = next.trim().to_lowercase();
            if !line_matches(&next_trimmed) {
                let joined = format!("{trimmed} {next_trimmed}");
                if is_override_attempt(&joined) {
                    skip_next = true;
                    removed += 1;
                    continue;
                }
            }
        }

        kept.push(line);
    }

    (kept.join("\n"), removed)
}

/// Collapse blank-line runs and trim each line.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_blank {
                lines.push("");
                prev_blank = true;
            }
        } else {
            lines.push(trimmed);
            prev_blank = false;
        }
    }

    while lines.first() == Some(&"") {
        lines.remove(0);
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}

/// Truncate to `max_chars` characters at the last word boundary.
fn truncate_to_max_length(text: &str, max_chars: usize) -> String {
    let cut = match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => byte_idx,
        None => return text.to_string(),
    };
    let truncated = &text[..cut];
    match truncated.rfind(char::is_whitespace) {
        Some(pos) => format!("{}…[TRUNCATED]", &text[..pos]),
        None => format!("{truncated}…[TRUNCATED]"),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OUTPUT SANITIZATION
// ═══════════════════════════════════════════════════════════════════════

static UNUSED_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<unused\d+>").expect("valid regex"));

static THINK_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strip thinking blocks (`<unusedN>thought\n...`, `<think>...</think>`) and
/// stray `<unusedN>` tokens from raw model output.
pub fn sanitize_llm_output(raw: &str) -> String {
    let mut text = raw.to_string();

    if let Some(idx) = text.find("<unused") {
        if let Some(thought_offset) = text[idx..].find("thought\n") {
            text = text[idx + thought_offset + "thought\n".len()..].to_string();
        }
    }

    text = THINK_BLOCK_RE.replace_all(&text, "").into_owned();
    text = UNUSED_TOKEN_RE.replace_all(&text, "").into_owned();
    text.trim().to_string()
}
