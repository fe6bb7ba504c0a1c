//! Text normalisation shared by the keyword indexes.
//!
//! The manual and most queries are Spanish, so matching must ignore case
//! and accents: `"vacación"`, `"Vacacion"` and `"VACACIÓN"` all fold to
//! `"vacacion"`. The in-memory BM25 index and the SQLite FTS query
//! builder both tokenize through [`tokenize`] so they agree on terms.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lower-case `s` and strip diacritics (NFD, then drop combining marks).
pub fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split `s` into folded alphanumeric terms.
///
/// Punctuation (including `¿` and `¡`) separates terms and is dropped.
pub fn tokenize(s: &str) -> Vec<String> {
    fold(s)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// First `max_chars` characters of `text`, cut back to a word boundary and
/// suffixed with `...` when truncated.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Vacación"), "vacacion");
        assert_eq!(fold("NÓMINA"), "nomina");
        assert_eq!(fold("Año"), "ano");
    }

    #[test]
    fn test_tokenize_drops_spanish_punctuation() {
        let terms = tokenize("¿Cuántos días de vacaciones tengo?");
        assert_eq!(terms, vec!["cuantos", "dias", "de", "vacaciones", "tengo"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("  ¿? ").is_empty());
    }

    #[test]
    fn test_snippet_truncates_on_word_boundary() {
        let s = snippet("uno dos tres cuatro", 9);
        assert_eq!(s, "uno dos...");
        assert_eq!(snippet("corto", 100), "corto");
    }
}
