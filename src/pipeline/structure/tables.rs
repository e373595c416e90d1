use super::{RegionSource, TableRegion};
use crate::pipeline::signatures::is_measurement_line;
use crate::pipeline::types::LayoutHints;

/// Minimum number of lines at page boundary to check for table patterns.
const BOUNDARY_LINES: usize = 3;

/// Minimum ratio of tabular lines needed to consider a boundary as tabular.
const TABULAR_THRESHOLD: f64 = 0.60;

/// Minimum consecutive tabular lines forming a region.
const MIN_TABLE_ROWS: usize = 2;

/// Detect table regions on one page, then merge in collaborator hints that
/// do not overlap a detected region.
pub fn detect_tables(text: &str, hints: Option<&LayoutHints>) -> Vec<TableRegion> {
    let lines: Vec<&str> = text.lines().collect();
    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        if is_table_row(line) {
            run_start.get_or_insert(idx);
            continue;
        }
        if let Some(start) = run_start.take() {
            push_region(&mut regions, &lines, start, idx - 1);
        }
    }
    if let Some(start) = run_start {
        push_region(&mut regions, &lines, start, lines.len() - 1);
    }

    if let Some(hints) = hints {
        merge_hints(&mut regions, &lines, hints);
    }
    regions.sort_by_key(|r| r.start_line);
    regions
}

fn push_region(regions: &mut Vec<TableRegion>, lines: &[&str], start: usize, end: usize) {
    if end + 1 - start < MIN_TABLE_ROWS {
        return;
    }
    let column_count = lines[start..=end]
        .iter()
        .map(|l| estimate_columns(l))
        .max()
        .unwrap_or(1);
    regions.push(TableRegion {
        start_line: start,
        end_line: end,
        column_count,
        source: RegionSource::Detected,
    });
}

fn merge_hints(regions: &mut Vec<TableRegion>, lines: &[&str], hints: &LayoutHints) {
    if lines.is_empty() {
        return;
    }
    let last = lines.len() - 1;
    for &(start, end) in &hints.table_line_ranges {
        if start > last || start > end {
            continue;
        }
        let end = end.min(last);
        let overlaps = regions
            .iter()
            .any(|r| start <= r.end_line && end >= r.start_line);
        if overlaps {
            continue;
        }
        let column_count = lines[start..=end]
            .iter()
            .map(|l| estimate_columns(l))
            .max()
            .unwrap_or(1);
        regions.push(TableRegion {
            start_line: start,
            end_line: end,
            column_count,
            source: RegionSource::Hint,
        });
    }
}

/// A line belongs to a table when it is column-aligned, or when it reads as
/// a "name value unit" row.
pub fn is_table_row(line: &str) -> bool {
    is_tabular_line(line) || is_measurement_row(line)
}

/// "Glucose 98 mg/dL 70-99": starts with a letter and carries a measurement.
fn is_measurement_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic())
        && is_measurement_line(trimmed)
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// Patterns detected:
/// - Tab-separated: "Name\tResult\tUnit"
/// - Pipe-separated: "Name | Result | Unit"
/// - Multi-space aligned: "Potassium    4.2    mmol/L"
pub fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() < 5 {
        return false;
    }

    if trimmed.matches('\t').count() >= 2 {
        return true;
    }

    if trimmed.matches('|').count() >= 2 {
        return true;
    }

    count_multi_space_gaps(trimmed) >= 2
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut in_gap = false;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len >= 3 && !in_gap {
                in_gap = true;
                count += 1;
            }
        } else {
            in_gap = false;
            gap_len = 0;
        }
    }

    count
}

/// Column estimate: separator-delimited segments, at least 3 for a
/// measurement row (name, value, unit).
fn estimate_columns(line: &str) -> usize {
    let trimmed = line.trim();
    let segments = if trimmed.contains('\t') {
        trimmed.split('\t').filter(|s| !s.trim().is_empty()).count()
    } else if trimmed.matches('|').count() >= 2 {
        trimmed.split('|').filter(|s| !s.trim().is_empty()).count()
    } else {
        count_multi_space_gaps(trimmed) + 1
    };
    if is_measurement_row(trimmed) {
        segments.max(3)
    } else {
        segments
    }
}

/// True when the last lines of `page` and the first lines of `next` both
/// look tabular.
pub fn continues_table(page: &str, next: &str) -> bool {
    is_tail_tabular(page) && is_head_tabular(next)
}

/// Check if the last BOUNDARY_LINES of the text look tabular.
fn is_tail_tabular(text: &str) -> bool {
    let lines: Vec<&str> = text
        .lines()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(BOUNDARY_LINES)
        .collect();
    boundary_is_tabular(&lines)
}

/// Check if the first BOUNDARY_LINES of the text look tabular.
fn is_head_tabular(text: &str) -> bool {
    let lines: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(BOUNDARY_LINES)
        .collect();
    boundary_is_tabular(&lines)
}

fn boundary_is_tabular(lines: &[&str]) -> bool {
    if lines.is_empty() {
        return false;
    }
    let tabular_count = lines.iter().filter(|l| is_table_row(l)).count();
    tabular_count as f64 / lines.len() as f64 >= TABULAR_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_separated_is_tabular() {
        assert!(is_tabular_line("Name\tResult\tUnit"));
        assert!(is_tabular_line("Potassium\t4.2\tmmol/L\t3.5-5.0"));
    }

    #[test]
    fn pipe_separated_is_tabular() {
        assert!(is_tabular_line("Test | Result | Unit"));
        assert!(is_tabular_line("| K | 4.2 | mmol/L |"));
    }

    #[test]
    fn multi_space_is_tabular() {
        assert!(is_tabular_line("Potassium    4.2    mmol/L"));
        assert!(is_tabular_line("Sodium       140    mmol/L    136-145"));
    }

    #[test]
    fn prose_not_tabular() {
        assert!(!is_tabular_line("This is a normal sentence."));
        assert!(!is_tabular_line("Patient name: Marie Dubois"));
        assert!(!is_tabular_line(""));
        assert!(!is_tabular_line("Hi"));
    }

    #[test]
    fn measurement_rows_count_as_table_rows() {
        assert!(is_table_row("Glucose 98 mg/dL 70-99"));
        assert!(!is_table_row("98 mg/dL was the glucose"));
    }

    #[test]
    fn counts_gaps() {
        assert_eq!(count_multi_space_gaps("A   B   C"), 2);
        assert_eq!(count_multi_space_gaps("Hello   World"), 1);
        assert_eq!(count_multi_space_gaps("Hello World"), 0);
    }

    #[test]
    fn detects_region_with_columns() {
        let text = "LIPID PANEL\nTest     Result     Units\nCholesterol    190    mg/dL\nHDL    55    mg/dL\n\nComments follow.";
        let regions = detect_tables(text, None);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].start_line, 1);
        assert_eq!(regions[0].end_line, 3);
        assert_eq!(regions[0].column_count, 3);
        assert_eq!(regions[0].source, RegionSource::Detected);
    }

    #[test]
    fn single_row_is_not_a_region() {
        let regions = detect_tables("Intro\nGlucose 98 mg/dL\nOutro text here", None);
        assert!(regions.is_empty());
    }

    #[test]
    fn hints_added_when_not_overlapping() {
        let text = "a\nb\nc\nd\nGlucose 98 mg/dL\nLDL 100 mg/dL";
        let hints = LayoutHints {
            table_line_ranges: vec![(0, 1), (4, 5), (10, 12)],
        };
        let regions = detect_tables(text, Some(&hints));
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].source, RegionSource::Hint);
        assert_eq!(regions[1].source, RegionSource::Detected);
    }

    #[test]
    fn table_spanning_pages_detected() {
        let page1 = "Header text\nPotassium\t4.2\tmmol/L\nSodium\t140\tmmol/L\nChloride\t102\tmmol/L";
        let page2 = "Creatinine\t72\tumol/L\nUrea\t5.5\tmmol/L\nGlucose\t5.2\tmmol/L";
        assert!(continues_table(page1, page2));
    }

    #[test]
    fn table_then_prose_not_continuation() {
        let page1 = "Potassium\t4.2\tmmol/L\nSodium\t140\tmmol/L\nChloride\t102\tmmol/L";
        let page2 = "The results above are normal.\nNo further action required.\nSigned: Dr Martin";
        assert!(!continues_table(page1, page2));
    }
}
