/// Canonical spellings keyed by a lowercase, whitespace-free form.
const UNIT_TABLE: &[(&str, &str)] = &[
    ("mg/dl", "mg/dL"),
    ("g/dl", "g/dL"),
    ("µg/dl", "µg/dL"),
    ("ug/dl", "µg/dL"),
    ("ng/dl", "ng/dL"),
    ("mg/l", "mg/L"),
    ("g/l", "g/L"),
    ("µg/l", "µg/L"),
    ("ug/l", "µg/L"),
    ("ng/ml", "ng/mL"),
    ("pg/ml", "pg/mL"),
    ("mmol/l", "mmol/L"),
    ("µmol/l", "µmol/L"),
    ("umol/l", "µmol/L"),
    ("nmol/l", "nmol/L"),
    ("pmol/l", "pmol/L"),
    ("meq/l", "mEq/L"),
    ("miu/ml", "mIU/mL"),
    ("miu/l", "mIU/L"),
    ("µiu/ml", "µIU/mL"),
    ("uiu/ml", "µIU/mL"),
    ("iu/ml", "IU/mL"),
    ("iu/l", "IU/L"),
    ("mu/l", "mU/L"),
    ("u/l", "U/L"),
    ("10^9/l", "10^9/L"),
    ("10^12/l", "10^12/L"),
    ("10^3/µl", "10^3/µL"),
    ("10^3/ul", "10^3/µL"),
    ("10^6/µl", "10^6/µL"),
    ("10^6/ul", "10^6/µL"),
    ("k/µl", "K/µL"),
    ("k/ul", "K/µL"),
    ("m/µl", "M/µL"),
    ("m/ul", "M/µL"),
    ("cells/µl", "cells/µL"),
    ("cells/ul", "cells/µL"),
    ("ml/min", "mL/min"),
    ("ml/min/1.73m2", "mL/min/1.73m2"),
    ("mm/hr", "mm/hr"),
    ("mm/h", "mm/hr"),
    ("mmhg", "mmHg"),
    ("fl", "fL"),
    ("pg", "pg"),
    ("g", "g"),
    ("%", "%"),
];

/// Lookup key: lowercase, no whitespace, one micro sign, "x10*9" → "10^9".
fn unit_key(raw: &str) -> String {
    let mut key: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .map(|c| if c == 'μ' { 'µ' } else { c })
        .collect();
    key = key.replace('*', "^");
    if let Some(stripped) = key.strip_prefix('x') {
        if stripped.starts_with("10") {
            key = stripped.to_string();
        }
    }
    if key.starts_with("10") && !key.starts_with("10^") && key.len() > 2 {
        // "109/L" from text extraction that lost the caret
        key = format!("10^{}", &key[2..]);
    }
    key
}

/// Normalize unit spelling. Unknown units are returned trimmed with spacing
/// around '/' removed.
pub fn normalize_unit(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let key = unit_key(trimmed);
    if let Some((_, canonical)) = UNIT_TABLE.iter().find(|(k, _)| *k == key) {
        return (*canonical).to_string();
    }
    trimmed
        .split('/')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("/")
}

/// True when two unit spellings normalize to the same canonical form.
pub fn same_unit(a: &str, b: &str) -> bool {
    normalize_unit(a) == normalize_unit(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_spacing_normalized() {
        assert_eq!(normalize_unit("MG/DL"), "mg/dL");
        assert_eq!(normalize_unit("mg / dl"), "mg/dL");
        assert_eq!(normalize_unit(" mmol/l "), "mmol/L");
    }

    #[test]
    fn micro_sign_variants() {
        assert_eq!(normalize_unit("umol/L"), "µmol/L");
        assert_eq!(normalize_unit("μmol/L"), "µmol/L");
        assert_eq!(normalize_unit("uIU/mL"), "µIU/mL");
    }

    #[test]
    fn exponent_forms() {
        assert_eq!(normalize_unit("x10^9/L"), "10^9/L");
        assert_eq!(normalize_unit("x10*9/L"), "10^9/L");
        assert_eq!(normalize_unit("10^12/l"), "10^12/L");
        assert_eq!(normalize_unit("K/uL"), "K/µL");
    }

    #[test]
    fn unknown_units_cleaned_only() {
        assert_eq!(normalize_unit("copies / mL"), "copies/mL");
        assert_eq!(normalize_unit(""), "");
    }

    #[test]
    fn same_unit_compares_canonical_forms() {
        assert!(same_unit("MG/DL", "mg/dL"));
        assert!(!same_unit("mg/dL", "mmol/L"));
    }
}
