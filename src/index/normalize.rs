//! Title normalization shared by the index builder, the relationship writer
//! and the query client.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize a title for lookup.
///
/// Lowercases, decomposes (NFKD), drops combining marks, maps `_` to a space,
/// collapses runs of whitespace and trims. Idempotent:
/// `normalize_title(normalize_title(x)) == normalize_title(x)`.
pub fn normalize_title(title: &str) -> String {
    // Lowercasing can produce decomposable characters and NFKD can produce
    // uppercase ones, so lowercase on both sides of the decomposition.
    let folded: String = title
        .to_lowercase()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c == '_' { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(folded.len());
    for word in folded.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}
