use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Known registration-code prefixes followed by at least 3 code characters.
static CODE_PAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(NA|NB|NC|ND|NE|NR|TR|SD|ML|DBL|DKL|AKL)[A-Z0-9\-\./]{3,}").unwrap()
});

// Stricter shape used when lifting a code out of arbitrary prose.
static EMBEDDED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([A-Z]{2,3}\d{8,12})\b").unwrap());

static DOSE_PAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(\d+\s?(?:MG|MCG|ML))").unwrap());

/// Whether the trimmed query resembles a registration code, the gate for
/// the router's exact tier.
pub fn looks_like_code(query: &str) -> bool {
    CODE_PAT.is_match(query.trim())
}

/// Whether the query is too garbled for lexical search to be trusted:
/// non-alphanumeric (non-space) ratio above 15%, or shorter than 3 chars.
pub fn is_noisy(query: &str) -> bool {
    let len = query.chars().count();
    if len < 3 {
        return true;
    }
    let non_alnum = query
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    (non_alnum as f32 / len as f32) > 0.15
}

/// Coarse classification of what the user typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Code,
    Manufacturer,
    Title,
}

/// Structured view of a free-form query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub kind: QueryKind,
    pub code: Option<String>,
    pub title: Option<String>,
    pub manufacturer: Option<String>,
    pub dose: Option<String>,
    pub raw: String,
}

/// Lift light structure out of free text: an embedded registration code, a
/// `PT <name>` manufacturer chunk, and a dose token. Heuristics only; the
/// retrieval tiers do the real matching downstream.
pub fn parse_query(text: &str) -> ParsedQuery {
    let despaced: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let code = EMBEDDED_CODE
        .captures(&despaced)
        .map(|c| c[1].to_uppercase());

    let lower = text.to_lowercase();
    let manufacturer = lower.split_once("pt ").and_then(|(_, rest)| {
        let name = rest.split_whitespace().next()?;
        let mut chars = name.chars();
        let first = chars.next()?;
        Some(format!("PT {}{}", first.to_uppercase(), chars.as_str()))
    });

    let dose = DOSE_PAT
        .captures(text)
        .map(|c| c[1].to_uppercase().replace(' ', ""));

    // Title = input with any trailing manufacturer clause removed. The
    // byte index comes from the lowercased copy, so slice defensively:
    // lowercasing can shift byte offsets for some scripts.
    let title = match lower.find("pt ") {
        Some(pos) => text.get(..pos).unwrap_or(text).trim(),
        None => text.trim(),
    };

    let kind = if code.is_some() {
        QueryKind::Code
    } else if manufacturer.is_some() {
        QueryKind::Manufacturer
    } else {
        QueryKind::Title
    };

    ParsedQuery {
        kind,
        code,
        title: (!title.is_empty()).then(|| title.to_string()),
        manufacturer,
        dose,
        raw: text.to_string(),
    }
}
