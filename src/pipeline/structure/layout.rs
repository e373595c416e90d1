use super::DocumentType;

/// A known report layout, recognised by marker phrases.
struct LayoutSignature {
    document_type: DocumentType,
    /// At least one must appear (lowercase substring match).
    required: &'static [&'static str],
    supporting: &'static [&'static str],
}

const SIGNATURES: &[LayoutSignature] = &[
    LayoutSignature {
        document_type: DocumentType::QuestDiagnostics,
        required: &["quest diagnostics", "questdiagnostics"],
        supporting: &["specimen:", "client #", "reported:", "in range", "out of range"],
    },
    LayoutSignature {
        document_type: DocumentType::LabCorp,
        required: &["labcorp", "laboratory corporation of america"],
        supporting: &["specimen id", "control id", "date collected", "date reported", "previous result"],
    },
    LayoutSignature {
        document_type: DocumentType::HospitalLab,
        required: &["department of pathology", "clinical laboratory", "hospital", "medical center"],
        supporting: &["mrn", "ward", "inpatient", "outpatient", "attending", "verified by"],
    },
];

/// Markers of a lab report with no recognised vendor layout.
const GENERIC_MARKERS: &[&str] = &[
    "reference range",
    "reference interval",
    "result",
    "units",
    "flag",
    "specimen",
    "collected",
    "test name",
];

const GENERIC_MIN_HITS: usize = 2;

/// Classify document type from the concatenated page text.
/// Returns the type and a 0–1 confidence.
pub fn classify_layout(full_text: &str) -> (DocumentType, f32) {
    let lower = full_text.to_lowercase();

    let best_vendor = SIGNATURES
        .iter()
        .filter(|sig| sig.required.iter().any(|m| lower.contains(m)))
        .map(|sig| {
            let hits = sig.supporting.iter().filter(|m| lower.contains(*m)).count();
            let fraction = hits as f32 / sig.supporting.len().max(1) as f32;
            (sig.document_type, 0.6 + 0.4 * fraction)
        })
        .fold(None, |best: Option<(DocumentType, f32)>, candidate| match best {
            Some(b) if b.1 >= candidate.1 => Some(b),
            _ => Some(candidate),
        });

    if let Some(found) = best_vendor {
        return found;
    }

    let generic_hits = GENERIC_MARKERS.iter().filter(|m| lower.contains(*m)).count();
    if generic_hits >= GENERIC_MIN_HITS {
        let fraction = generic_hits as f32 / GENERIC_MARKERS.len() as f32;
        return (DocumentType::GenericLabReport, 0.4 + 0.4 * fraction);
    }

    (DocumentType::Unknown, 0.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quest_layout_recognised() {
        let text = "Quest Diagnostics Incorporated\nSpecimen: AB123\nReported: 01/02/2024\nIn Range  Out of Range";
        let (kind, confidence) = classify_layout(text);
        assert_eq!(kind, DocumentType::QuestDiagnostics);
        assert!(confidence > 0.8);
    }

    #[test]
    fn labcorp_layout_recognised() {
        let (kind, _) = classify_layout("LabCorp\nSpecimen ID: 1\nControl ID: 2");
        assert_eq!(kind, DocumentType::LabCorp);
    }

    #[test]
    fn hospital_layout_recognised() {
        let (kind, _) = classify_layout("St. Mary Hospital Department of Pathology\nMRN: 123");
        assert_eq!(kind, DocumentType::HospitalLab);
    }

    #[test]
    fn generic_report_needs_two_markers() {
        let (kind, confidence) =
            classify_layout("Test Name   Result   Units   Reference Range");
        assert_eq!(kind, DocumentType::GenericLabReport);
        assert!(confidence >= 0.4 && confidence < 0.8);

        let (kind, _) = classify_layout("Result only");
        assert_eq!(kind, DocumentType::Unknown);
    }

    #[test]
    fn unknown_has_low_confidence() {
        let (kind, confidence) = classify_layout("Dear patient, thank you.");
        assert_eq!(kind, DocumentType::Unknown);
        assert!(confidence < 0.2);
    }
}
