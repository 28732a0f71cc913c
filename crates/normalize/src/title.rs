use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Z0-9\s]+").unwrap());

// Dosage-form vocabulary observed on Indonesian drug packaging; mixed
// Indonesian/English because labels mix both.
static DOSAGE_FORMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(TAB(LET)?|KAPLET|KAPSUL(ES)?|SIRUP|SYRUP|SUSP(ENSI)?|INJEKSI|SAL(AP)?|KRIM|CREAM|OINTMENT|GEL|DROP|SPRAY)\b",
    )
    .unwrap()
});

static UNITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(MG|ML|MCG|GRAM|G|KG)\b").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical form of a product title for search.
///
/// Uppercases, replaces non-alphanumerics with spaces, strips dosage-form
/// and unit tokens, and collapses whitespace. `"Paracetamol 500 mg Tablet"`
/// becomes `"PARACETAMOL 500"`.
pub fn normalize_title(raw: &str) -> String {
    let s = raw.to_uppercase();
    let s = NON_ALNUM.replace_all(&s, " ");
    let s = DOSAGE_FORMS.replace_all(&s, " ");
    let s = UNITS.replace_all(&s, " ");
    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Canonical form of a registration code: alphanumerics only, uppercased.
pub fn clean_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}
