//! Content optimizer: turns relevant pages into bounded, scored chunks.

pub mod chunker;
pub mod compress;
pub mod skipper;
pub mod tokens;

pub use compress::CompressionStats;
pub use skipper::{skip_chunks, SkipStats};

use serde::{Deserialize, Serialize};

use self::chunker::{split_page, ChunkLine, PackedChunk};
use self::tokens::estimate_tokens;
use super::biomarkers::count_alias_matches;
use super::relevance::RelevantPage;
use super::signatures::count_indicator_lines;
use super::structure::DocumentStructure;
use crate::pipeline_config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionType {
    Table,
    List,
    Text,
}

impl RegionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionType::Table => "table",
            RegionType::List => "list",
            RegionType::Text => "text",
        }
    }
}

/// One extraction unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Position in the document's chunk sequence.
    pub index: usize,
    pub page_number: u32,
    pub text: String,
    pub region: RegionType,
    pub token_estimate: usize,
    /// Likelihood (0–1) that the chunk carries biomarker data.
    pub confidence: f32,
    pub context_note: String,
    pub compression: CompressionStats,
}

/// Biomarker-confidence score from indicator density, alias hits and
/// region type.
pub fn chunk_confidence(text: &str, region: RegionType) -> f32 {
    let non_empty = text.lines().filter(|l| !l.trim().is_empty()).count();
    if non_empty == 0 {
        return 0.0;
    }
    let density = count_indicator_lines(text) as f32 / non_empty as f32;
    let aliases = count_alias_matches(text).min(5) as f32 / 5.0;
    let table_bonus = if region == RegionType::Table { 0.1 } else { 0.0 };
    (0.6 * density + 0.3 * aliases + table_bonus).clamp(0.0, 1.0)
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with('•') {
        return true;
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0
        && digits <= 3
        && trimmed[digits..].starts_with(['.', ')'])
        && trimmed[digits + 1..].starts_with(' ')
}

fn region_of(packed: &PackedChunk) -> RegionType {
    let total = packed.lines.len();
    if total == 0 {
        return RegionType::Text;
    }
    if packed.table_line_count() * 2 > total {
        return RegionType::Table;
    }
    let list_lines = packed.lines.iter().filter(|l| is_list_item(&l.text)).count();
    if list_lines * 2 > total {
        RegionType::List
    } else {
        RegionType::Text
    }
}

fn context_note(
    page: u32,
    region: RegionType,
    piece: usize,
    pieces: usize,
    overlap_lines: usize,
    continued: bool,
) -> String {
    let mut note = format!(
        "Page {page}, {} region, part {} of {pieces}",
        region.as_str(),
        piece + 1
    );
    if continued && piece == 0 {
        note.push_str(&format!(", table continues from page {}", page.saturating_sub(1)));
    }
    if overlap_lines > 0 {
        note.push_str(&format!(", first {overlap_lines} line(s) repeated from previous part"));
    }
    note
}

/// Split relevant pages into chunks, compress them per the mode and score
/// them. Chunks never cross a page, except that a table continuing onto the
/// next page carries the previous page's tail as overlap.
pub fn build_chunks(
    pages: &[RelevantPage],
    structure: &DocumentStructure,
    config: &PipelineConfig,
) -> Vec<ContentChunk> {
    let budget = config.chunk_budget();
    let overlap = config.chunk_overlap();
    let compression = config.profile().compression;

    let mut chunks = Vec::new();
    let mut previous: Option<(u32, Vec<ChunkLine>)> = None;

    for page in pages {
        let continued = structure.continues_from_previous(page.page_number);
        let carry = match previous.take() {
            Some((number, tail)) if continued && number.checked_add(1) == Some(page.page_number) => {
                tail
            }
            _ => Vec::new(),
        };
        let carried = !carry.is_empty();

        let body = structure.strip_edge_lines(page.page_number, &page.text);
        let packed = split_page(
            &body,
            structure.tables_on(page.page_number),
            budget,
            overlap,
            carry,
        );
        let pieces = packed.len();

        for (piece, part) in packed.iter().enumerate() {
            let region = region_of(part);
            let original = part.text();
            let (text, stats) =
                compress::compress(&original, compression, config.max_compression_ratio);
            let token_estimate = estimate_tokens(&text);
            chunks.push(ContentChunk {
                index: chunks.len(),
                page_number: page.page_number,
                confidence: chunk_confidence(&text, region),
                context_note: context_note(
                    page.page_number,
                    region,
                    piece,
                    pieces,
                    part.overlap_lines,
                    carried,
                ),
                text,
                region,
                token_estimate,
                compression: stats,
            });
        }

        previous = packed
            .last()
            .map(|last| (page.page_number, last.tail(overlap)));
    }

    tracing::info!(
        pages = pages.len(),
        chunks = chunks.len(),
        budget,
        overlap,
        compression = ?compression,
        "Chunking complete"
    );
    chunks
}
