use std::collections::{HashMap, HashSet};

use super::{PageZones, ZoneKind};
use crate::pipeline::signatures::is_indicator_line;
use crate::pipeline::types::PageText;

/// Lines at each page edge considered for header/footer classification.
const EDGE_LINES: usize = 3;

/// Minimum pages for repeated-content detection to be meaningful.
const MIN_PAGES_FOR_REPEAT: usize = 2;

/// Normalize a line for repeat detection: digits collapse to '#', so
/// "Page 1 of 3" and "Page 2 of 3" compare equal.
fn repeat_key(line: &str) -> String {
    line.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect()
}

/// Lines that appear on at least half of the non-empty pages.
pub fn repeated_lines(pages: &[PageText]) -> HashSet<String> {
    let non_empty: Vec<&PageText> = pages.iter().filter(|p| !p.text.trim().is_empty()).collect();
    if non_empty.len() < MIN_PAGES_FOR_REPEAT {
        return HashSet::new();
    }

    let mut page_counts: HashMap<String, usize> = HashMap::new();
    for page in &non_empty {
        let keys: HashSet<String> = page
            .text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(repeat_key)
            .collect();
        for key in keys {
            *page_counts.entry(key).or_default() += 1;
        }
    }

    page_counts
        .into_iter()
        .filter(|(_, count)| count * 2 >= non_empty.len() && *count >= MIN_PAGES_FOR_REPEAT)
        .map(|(key, _)| key)
        .collect()
}

/// Classify the lines of one page into header, footer and content zones.
///
/// Edge lines become header/footer unless they carry biomarker indicators;
/// repeated lines become header/footer wherever they sit, by page half.
pub fn classify_page(text: &str, repeated: &HashSet<String>, has_tables: bool) -> PageZones {
    let lines: Vec<&str> = text.lines().collect();
    let non_empty: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i)
        .collect();

    let mut zones = PageZones {
        header_lines: Vec::new(),
        footer_lines: Vec::new(),
        content: if has_tables { ZoneKind::Table } else { ZoneKind::Content },
    };
    if non_empty.is_empty() {
        zones.content = ZoneKind::Content;
        return zones;
    }

    let midpoint = lines.len() / 2;
    let head: HashSet<usize> = non_empty.iter().take(EDGE_LINES).copied().collect();
    let tail: HashSet<usize> = non_empty.iter().rev().take(EDGE_LINES).copied().collect();
    // Short pages: edges would swallow everything
    let use_edges = non_empty.len() > EDGE_LINES * 2;

    for &idx in &non_empty {
        let line = lines[idx];
        let is_repeated = repeated.contains(&repeat_key(line));
        let edge_candidate = use_edges && !is_indicator_line(line);

        if (is_repeated || edge_candidate) && head.contains(&idx) {
            zones.header_lines.push(idx);
        } else if (is_repeated || edge_candidate) && tail.contains(&idx) {
            zones.footer_lines.push(idx);
        } else if is_repeated {
            if idx < midpoint {
                zones.header_lines.push(idx);
            } else {
                zones.footer_lines.push(idx);
            }
        }
    }

    zones
}
