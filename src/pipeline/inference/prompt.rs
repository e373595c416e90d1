pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a laboratory report extraction assistant. Your ONLY role is to copy
biomarker measurements that are explicitly present in the text you are given.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Extract ONLY measurements explicitly stated in the text.
2. NEVER add interpretation, diagnosis or advice.
3. NEVER invent values, units or reference ranges.
4. Ignore phone and fax numbers, addresses, emails, dates, page numbers,
   report identifiers and version strings. They are not measurements.
5. Ignore results without a numeric value (e.g. "Normal", "Negative").
6. Preserve values exactly as written.
7. Output MUST be a single JSON object and nothing else.
"#;

/// Full prompt for one chunk. `already_extracted` lists names found in
/// earlier chunks so the model can skip them.
pub fn build_extraction_prompt(
    chunk_text: &str,
    context_note: &str,
    already_extracted: &[String],
) -> String {
    let known = if already_extracted.is_empty() {
        String::new()
    } else {
        format!(
            "Biomarkers already extracted from earlier parts of this report: {}.\n\
             Do not repeat them unless this text shows a different measurement.\n",
            already_extracted.join(", ")
        )
    };

    format!(
        r#"Context: {context_note}.
{known}
<chunk>
{chunk_text}
</chunk>

Extract every biomarker measurement from the text above into this JSON structure.
Use null for any field that is not present.

```json
{{
  "biomarkers": [
    {{
      "name": "test name as written",
      "value": 0.0,
      "unit": "unit as written or null",
      "reference_range": "range text as written or null",
      "flag": "high | low | normal | abnormal | null",
      "confidence": 0.0
    }}
  ],
  "skipped": ["names you left out because they were already extracted"]
}}
```

Return ONLY the JSON object."#
    )
}

/// Short prompt for the single retry after an unusable response.
pub fn build_simplified_prompt(chunk_text: &str) -> String {
    format!(
        r#"<chunk>
{chunk_text}
</chunk>

List the lab test results in the text above as JSON:
{{"biomarkers": [{{"name": "...", "value": 0.0, "unit": "..."}}]}}
Return ONLY the JSON object."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_chunk_and_note() {
        let prompt = build_extraction_prompt("Glucose 98 mg/dL", "Page 2, table region, part 1 of 1", &[]);
        assert!(prompt.contains("<chunk>\nGlucose 98 mg/dL\n</chunk>"));
        assert!(prompt.contains("Page 2, table region"));
        assert!(!prompt.contains("already extracted from earlier"));
    }

    #[test]
    fn prompt_lists_known_names() {
        let names = vec!["Glucose".to_string(), "LDL Cholesterol".to_string()];
        let prompt = build_extraction_prompt("HDL 55 mg/dL", "Page 1", &names);
        assert!(prompt.contains("Glucose, LDL Cholesterol"));
    }

    #[test]
    fn simplified_prompt_is_shorter() {
        let full = build_extraction_prompt("HDL 55 mg/dL", "Page 1", &[]);
        let simple = build_simplified_prompt("HDL 55 mg/dL");
        assert!(simple.len() < full.len());
        assert!(simple.contains("HDL 55 mg/dL"));
    }

    #[test]
    fn system_prompt_forbids_admin_numbers() {
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("fax"));
        assert!(EXTRACTION_SYSTEM_PROMPT.contains("JSON"));
    }
}
