//! Name normalization shared by every ingestion path.

/// Enumeration separators inside a multi-value symptom field. Full-width and
/// half-width forms are equivalent.
pub const SYMPTOM_SEPARATORS: [char; 5] = ['、', '，', ',', '；', ';'];

/// Normalize a raw cell into a node identity.
///
/// Embedded tabs and line breaks are removed, surrounding whitespace
/// (including U+3000) is trimmed. Returns `None` when nothing remains.
pub fn normalize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a symptom field into normalized, de-duplicated names in first-seen
/// order. A value without separators yields at most one name.
pub fn split_symptoms(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for piece in raw.split(|c| SYMPTOM_SEPARATORS.contains(&c)) {
        if let Some(name) = normalize_name(piece) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}
