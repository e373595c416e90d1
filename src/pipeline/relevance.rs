//! Page relevance filter.
//!
//! Scores each page for biomarker content and drops the ones that clearly
//! carry none. The threshold is low on purpose: a wrongly kept page costs a
//! skipped chunk later, a wrongly dropped page loses results.

use serde::{Deserialize, Serialize};

use super::biomarkers::count_alias_matches;
use super::signatures::count_measurements;
use super::structure::tables::is_table_row;
use super::structure::{DocumentStructure, ZoneKind};
use super::types::PageText;

/// Minimum score for a page to be kept.
pub const RELEVANCE_THRESHOLD: f32 = 1.0;

const ALIAS_WEIGHT: f32 = 0.75;
const MEASUREMENT_WEIGHT: f32 = 1.0;
const TABLE_LINE_WEIGHT: f32 = 0.25;
const TABLE_ZONE_BOOST: f32 = 1.0;
const CONTENT_ZONE_BOOST: f32 = 0.25;
const CONTINUATION_BOOST: f32 = 1.0;

/// Per-page scoring breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScore {
    pub page_number: u32,
    pub alias_hits: usize,
    pub measurement_hits: usize,
    pub table_lines: usize,
    pub structural_boost: f32,
    pub score: f32,
}

/// A page kept for chunking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantPage {
    pub page_number: u32,
    pub text: String,
    pub score: f32,
}

pub fn score_page(page: &PageText, structure: &DocumentStructure) -> PageScore {
    let alias_hits = count_alias_matches(&page.text);
    let measurement_hits = count_measurements(&page.text);
    let table_lines = page.text.lines().filter(|l| is_table_row(l)).count();

    let mut structural_boost = match structure.zone_kind(page.page_number) {
        Some(ZoneKind::Table) => TABLE_ZONE_BOOST,
        Some(ZoneKind::Content) => CONTENT_ZONE_BOOST,
        _ => 0.0,
    };
    if structure.continues_from_previous(page.page_number) {
        structural_boost += CONTINUATION_BOOST;
    }

    let score = alias_hits as f32 * ALIAS_WEIGHT
        + measurement_hits as f32 * MEASUREMENT_WEIGHT
        + table_lines as f32 * TABLE_LINE_WEIGHT
        + structural_boost;

    PageScore {
        page_number: page.page_number,
        alias_hits,
        measurement_hits,
        table_lines,
        structural_boost,
        score,
    }
}

/// Keep pages scoring at or above [`RELEVANCE_THRESHOLD`], in page order.
/// Empty pages are always dropped.
pub fn filter_relevant_pages(
    pages: &[PageText],
    structure: &DocumentStructure,
) -> Vec<RelevantPage> {
    let mut ordered: Vec<&PageText> = pages.iter().collect();
    ordered.sort_by_key(|p| p.page_number);

    let mut kept = Vec::new();
    for page in ordered {
        if page.text.trim().is_empty() {
            tracing::debug!(page = page.page_number, "Dropping empty page");
            continue;
        }
        let score = score_page(page, structure);
        if score.score >= RELEVANCE_THRESHOLD {
            kept.push(RelevantPage {
                page_number: page.page_number,
                text: page.text.clone(),
                score: score.score,
            });
        } else {
            tracing::debug!(
                page = page.page_number,
                score = score.score,
                "Page below relevance threshold"
            );
        }
    }

    tracing::info!(
        pages_total = pages.len(),
        pages_relevant = kept.len(),
        "Page relevance filter complete"
    );
    kept
}
