//! Structural document analysis.
//!
//! Classifies the document layout, detects table regions and tags page zones
//! (header/footer/content). Analysis never fails: when nothing can be
//! inferred the result is an empty structure with zero confidence, which
//! downstream stages read as "no structural hints".

pub mod layout;
pub mod tables;
pub mod zones;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::signatures::is_indicator_line;
use super::types::PageText;

/// Known report layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    QuestDiagnostics,
    LabCorp,
    HospitalLab,
    GenericLabReport,
    #[default]
    Unknown,
}

/// Zone classification of a page's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Header,
    Footer,
    Content,
    /// Content zone containing at least one table region.
    Table,
}

/// Per-page zones: header/footer line indices, everything else is content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageZones {
    pub header_lines: Vec<usize>,
    pub footer_lines: Vec<usize>,
    pub content: ZoneKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionSource {
    Detected,
    /// Reported by the text-extraction collaborator.
    Hint,
}

/// A run of table rows on one page (0-based line indices, inclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRegion {
    pub start_line: usize,
    pub end_line: usize,
    pub column_count: usize,
    pub source: RegionSource,
}

impl TableRegion {
    pub fn contains(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentStructure {
    pub document_type: DocumentType,
    pub zones: BTreeMap<u32, PageZones>,
    pub tables: BTreeMap<u32, Vec<TableRegion>>,
    /// Pages whose trailing table continues onto the next page.
    pub table_continuations: Vec<u32>,
    pub confidence: f32,
}

impl DocumentStructure {
    /// No structural hints available.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty() && self.tables.is_empty()
    }

    pub fn tables_on(&self, page: u32) -> &[TableRegion] {
        self.tables.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn zone_kind(&self, page: u32) -> Option<ZoneKind> {
        self.zones.get(&page).map(|z| z.content)
    }

    /// True when `line` of `page` is header or footer boilerplate.
    pub fn is_edge_line(&self, page: u32, line: usize) -> bool {
        self.zones
            .get(&page)
            .is_some_and(|z| z.header_lines.contains(&line) || z.footer_lines.contains(&line))
    }

    /// True when the previous page's table runs onto `page`.
    pub fn continues_from_previous(&self, page: u32) -> bool {
        page > 0 && self.table_continuations.contains(&(page - 1))
    }

    /// Page text with header and footer boilerplate blanked. Line positions
    /// are kept so table regions still line up. Table rows and indicator
    /// lines are never blanked.
    pub fn strip_edge_lines(&self, page: u32, text: &str) -> String {
        let tables = self.tables_on(page);
        let mut blanked = 0usize;
        let body = text
            .lines()
            .enumerate()
            .map(|(idx, line)| {
                let boilerplate = self.is_edge_line(page, idx)
                    && !tables.iter().any(|t| t.contains(idx))
                    && !is_indicator_line(line);
                if boilerplate {
                    blanked += 1;
                    ""
                } else {
                    line
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        if blanked > 0 {
            tracing::debug!(page, lines = blanked, "Header and footer lines dropped");
        }
        body
    }
}

/// Analyze page texts into a [`DocumentStructure`].
pub fn analyze_structure(pages: &[PageText]) -> DocumentStructure {
    let with_text: Vec<&PageText> = pages.iter().filter(|p| !p.text.trim().is_empty()).collect();
    if with_text.is_empty() {
        tracing::warn!(
            page_count = pages.len(),
            "Structural analysis found no text, continuing without structural hints"
        );
        return DocumentStructure::empty();
    }

    let repeated = zones::repeated_lines(pages);
    let mut structure = DocumentStructure::empty();

    for page in &with_text {
        let regions = tables::detect_tables(&page.text, page.hints.as_ref());
        let page_zones = zones::classify_page(&page.text, &repeated, !regions.is_empty());
        if !regions.is_empty() {
            structure.tables.insert(page.page_number, regions);
        }
        structure.zones.insert(page.page_number, page_zones);
    }

    for pair in with_text.windows(2) {
        let consecutive = pair[0].page_number.checked_add(1) == Some(pair[1].page_number);
        if consecutive && tables::continues_table(&pair[0].text, &pair[1].text) {
            structure.table_continuations.push(pair[0].page_number);
        }
    }

    let full_text = with_text
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let (document_type, layout_confidence) = layout::classify_layout(&full_text);
    structure.document_type = document_type;

    let text_ratio = with_text.len() as f32 / pages.len() as f32;
    let table_signal = if structure.tables.is_empty() { 0.5 } else { 1.0 };
    structure.confidence =
        (0.5 * layout_confidence + 0.2 * text_ratio + 0.3 * table_signal).clamp(0.0, 1.0);

    tracing::debug!(
        document_type = ?structure.document_type,
        pages_with_tables = structure.tables.len(),
        continuations = structure.table_continuations.len(),
        confidence = structure.confidence,
        "Structural analysis complete"
    );

    structure
}
