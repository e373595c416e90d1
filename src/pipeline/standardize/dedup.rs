use std::collections::HashMap;

use crate::pipeline::types::BiomarkerRecord;

/// A later duplicate replaces the kept record only when its confidence is
/// higher by more than this margin.
pub const MATERIAL_CONFIDENCE_MARGIN: f32 = 0.10;

/// One record per standardized name (case-insensitive). Keeps first-seen
/// order and the first-seen record unless a later one is materially more
/// confident. Returns the records and the number of duplicates merged.
pub fn deduplicate(records: Vec<BiomarkerRecord>) -> (Vec<BiomarkerRecord>, usize) {
    let mut kept: Vec<BiomarkerRecord> = Vec::with_capacity(records.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged = 0;

    for record in records {
        let key = record.standardized_name.to_lowercase();
        match positions.get(&key) {
            Some(&idx) => {
                merged += 1;
                if record.confidence > kept[idx].confidence + MATERIAL_CONFIDENCE_MARGIN {
                    tracing::debug!(
                        name = %record.standardized_name,
                        kept = kept[idx].confidence,
                        replacement = record.confidence,
                        "Replacing duplicate with higher-confidence record"
                    );
                    kept[idx] = record;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(record);
            }
        }
    }

    (kept, merged)
}
