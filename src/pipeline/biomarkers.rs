//! Biomarker reference data: alias dictionary and category lookup.
//!
//! The alias table maps the many spellings found on lab reports to one
//! standardized name. It drives name standardization, category assignment
//! and the page relevance filter.

use std::sync::LazyLock;

use regex::Regex;

/// One known biomarker and the spellings it appears under.
pub struct BiomarkerDefinition {
    pub standardized: &'static str,
    /// Lowercase, punctuation-free spellings.
    pub aliases: &'static [&'static str],
    pub category: &'static str,
}

const fn def(
    standardized: &'static str,
    aliases: &'static [&'static str],
    category: &'static str,
) -> BiomarkerDefinition {
    BiomarkerDefinition {
        standardized,
        aliases,
        category,
    }
}

pub const LIPIDS: &str = "Lipid Panel";
pub const METABOLIC: &str = "Metabolic";
pub const BLOOD_COUNT: &str = "Complete Blood Count";
pub const THYROID: &str = "Thyroid";
pub const LIVER: &str = "Liver Function";
pub const KIDNEY: &str = "Kidney Function";
pub const ELECTROLYTES: &str = "Electrolytes";
pub const VITAMINS: &str = "Vitamins & Minerals";
pub const INFLAMMATION: &str = "Inflammation";
pub const HORMONES: &str = "Hormones";
pub const OTHER: &str = "Other";

pub static BIOMARKERS: &[BiomarkerDefinition] = &[
    def("Glucose", &["glucose", "blood glucose", "fasting glucose", "glucose fasting", "fasting blood sugar", "fbs", "glu", "blood sugar"], METABOLIC),
    def("HbA1c", &["hba1c", "hemoglobin a1c", "haemoglobin a1c", "a1c", "glycated hemoglobin", "glycosylated hemoglobin"], METABOLIC),
    def("Insulin", &["insulin", "fasting insulin"], METABOLIC),
    def("Total Cholesterol", &["cholesterol", "total cholesterol", "cholesterol total", "chol"], LIPIDS),
    def("HDL Cholesterol", &["hdl", "hdl cholesterol", "hdl c", "hdlc", "cholesterol hdl"], LIPIDS),
    def("LDL Cholesterol", &["ldl", "ldl cholesterol", "ldl c", "ldlc", "ldl calculated", "cholesterol ldl"], LIPIDS),
    def("Triglycerides", &["triglycerides", "triglyceride", "trig", "tg"], LIPIDS),
    def("Hemoglobin", &["hemoglobin", "haemoglobin", "hgb", "hb"], BLOOD_COUNT),
    def("Hematocrit", &["hematocrit", "haematocrit", "hct"], BLOOD_COUNT),
    def("White Blood Cells", &["wbc", "white blood cells", "white blood cell count", "leukocytes", "wbc count"], BLOOD_COUNT),
    def("Red Blood Cells", &["rbc", "red blood cells", "red blood cell count", "erythrocytes", "rbc count"], BLOOD_COUNT),
    def("Platelets", &["platelets", "platelet count", "plt", "thrombocytes"], BLOOD_COUNT),
    def("MCV", &["mcv", "mean corpuscular volume"], BLOOD_COUNT),
    def("MCH", &["mch", "mean corpuscular hemoglobin"], BLOOD_COUNT),
    def("MCHC", &["mchc", "mean corpuscular hemoglobin concentration"], BLOOD_COUNT),
    def("Neutrophils", &["neutrophils", "neutrophil count", "neut"], BLOOD_COUNT),
    def("Lymphocytes", &["lymphocytes", "lymphocyte count", "lymph"], BLOOD_COUNT),
    def("TSH", &["tsh", "thyroid stimulating hormone", "thyrotropin"], THYROID),
    def("Free T4", &["free t4", "ft4", "t4 free", "free thyroxine"], THYROID),
    def("Free T3", &["free t3", "ft3", "t3 free", "free triiodothyronine"], THYROID),
    def("ALT", &["alt", "alanine aminotransferase", "sgpt", "alt sgpt"], LIVER),
    def("AST", &["ast", "aspartate aminotransferase", "sgot", "ast sgot"], LIVER),
    def("Alkaline Phosphatase", &["alkaline phosphatase", "alp", "alk phos"], LIVER),
    def("Total Bilirubin", &["bilirubin", "total bilirubin", "bilirubin total", "tbil"], LIVER),
    def("Albumin", &["albumin", "serum albumin"], LIVER),
    def("Creatinine", &["creatinine", "serum creatinine", "creat"], KIDNEY),
    def("BUN", &["bun", "blood urea nitrogen", "urea nitrogen", "urea"], KIDNEY),
    def("eGFR", &["egfr", "estimated gfr", "gfr"], KIDNEY),
    def("Sodium", &["sodium", "na"], ELECTROLYTES),
    def("Potassium", &["potassium", "k"], ELECTROLYTES),
    def("Chloride", &["chloride", "cl"], ELECTROLYTES),
    def("Calcium", &["calcium", "ca"], ELECTROLYTES),
    def("Bicarbonate", &["bicarbonate", "co2", "carbon dioxide", "hco3"], ELECTROLYTES),
    def("Magnesium", &["magnesium", "mg"], ELECTROLYTES),
    def("Vitamin D", &["vitamin d", "25 oh vitamin d", "25 hydroxy vitamin d", "vitamin d 25 oh", "vit d"], VITAMINS),
    def("Vitamin B12", &["vitamin b12", "b12", "cobalamin", "vit b12"], VITAMINS),
    def("Folate", &["folate", "folic acid"], VITAMINS),
    def("Ferritin", &["ferritin", "serum ferritin"], VITAMINS),
    def("Iron", &["iron", "serum iron"], VITAMINS),
    def("CRP", &["crp", "c reactive protein", "hs crp", "hscrp"], INFLAMMATION),
    def("ESR", &["esr", "sed rate", "erythrocyte sedimentation rate"], INFLAMMATION),
    def("Testosterone", &["testosterone", "total testosterone"], HORMONES),
    def("Cortisol", &["cortisol"], HORMONES),
    def("PSA", &["psa", "prostate specific antigen"], HORMONES),
];

/// Keyword → category fallback for names outside the alias table.
const CATEGORY_KEYWORDS: &[(&str, &str)] = &[
    ("cholesterol", LIPIDS),
    ("lipid", LIPIDS),
    ("triglycer", LIPIDS),
    ("glucose", METABOLIC),
    ("insulin", METABOLIC),
    ("hemoglobin", BLOOD_COUNT),
    ("haemoglobin", BLOOD_COUNT),
    ("cell", BLOOD_COUNT),
    ("platelet", BLOOD_COUNT),
    ("phil", BLOOD_COUNT),
    ("cyte", BLOOD_COUNT),
    ("thyro", THYROID),
    ("bilirubin", LIVER),
    ("transferase", LIVER),
    ("phosphatase", LIVER),
    ("protein", LIVER),
    ("kidney", KIDNEY),
    ("renal", KIDNEY),
    ("creatin", KIDNEY),
    ("urea", KIDNEY),
    ("sodium", ELECTROLYTES),
    ("potassium", ELECTROLYTES),
    ("vitamin", VITAMINS),
    ("iron", VITAMINS),
    ("zinc", VITAMINS),
    ("reactive", INFLAMMATION),
    ("sedimentation", INFLAMMATION),
    ("hormone", HORMONES),
    ("estradiol", HORMONES),
    ("progesterone", HORMONES),
];

/// Aliases long enough to search for in free text.
const MIN_SEARCH_ALIAS_LEN: usize = 3;

static ALIAS_SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    let mut aliases: Vec<&str> = BIOMARKERS
        .iter()
        .flat_map(|d| d.aliases.iter().copied())
        .filter(|a| a.len() >= MIN_SEARCH_ALIAS_LEN)
        .collect();
    // Longest first so "hdl cholesterol" wins over "cholesterol"
    aliases.sort_by_key(|a| std::cmp::Reverse(a.len()));
    let alternation = aliases
        .iter()
        .map(|a| regex::escape(a).replace(' ', r"[\s\-]+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("valid regex")
});

static QUALIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid regex"));

/// Lowercase, strip bracketed qualifiers and punctuation, collapse spaces.
pub fn normalize_name(raw: &str) -> String {
    let without_qualifiers = QUALIFIER_RE.replace_all(raw, " ");
    without_qualifiers
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Find the definition whose alias equals the normalized name. Also tries the
/// full name with qualifiers kept, so "Vitamin D (25-OH)" still resolves.
pub fn lookup(raw_name: &str) -> Option<&'static BiomarkerDefinition> {
    let normalized = normalize_name(raw_name);
    let with_qualifiers: String = raw_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    BIOMARKERS.iter().find(|d| {
        d.aliases
            .iter()
            .any(|a| *a == normalized || *a == with_qualifiers)
    })
}

/// Canonical identifier used for deduplication and cross-document comparison.
pub fn standardize_name(raw_name: &str) -> String {
    if let Some(definition) = lookup(raw_name) {
        return definition.standardized.to_string();
    }
    title_case(&normalize_name(raw_name))
}

/// Category for a (standardized or raw) name, "Other" when nothing matches.
pub fn category_for(name: &str) -> &'static str {
    if let Some(definition) = lookup(name) {
        return definition.category;
    }
    let lower = name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(OTHER)
}

/// Count alias-dictionary hits in free text.
pub fn count_alias_matches(text: &str) -> usize {
    ALIAS_SEARCH_RE.find_iter(text).count()
}

/// Title-case each word, keeping short all-consonant tokens (e.g. "ldh")
/// upper-cased as abbreviations.
fn title_case(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .map(|word| {
            let is_abbreviation = word.len() <= 4
                && !word.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
            if is_abbreviation {
                word.to_uppercase()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
