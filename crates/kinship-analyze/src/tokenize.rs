//! Name and content tokenization.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;

/// Words carrying no grouping signal.
const STOP_WORDS: &[&str] = &[
    "about", "also", "and", "are", "been", "but", "can", "copy", "could", "each", "for", "from",
    "had", "has", "have", "her", "his", "into", "its", "more", "new", "not", "one", "only",
    "other", "our", "out", "over", "should", "some", "such", "than", "that", "the", "their",
    "them", "then", "there", "these", "they", "this", "those", "very", "was", "were", "what",
    "when", "where", "which", "while", "who", "will", "with", "would", "you", "your",
];

static CONTENT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]{4,}").expect("content word pattern"));

/// Maximum number of content terms kept per file.
pub const MAX_TERMS: usize = 20;

/// Whether a lowercase word is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Split a name on separators, camelCase humps and letter/digit boundaries.
///
/// Returns raw lowercase pieces, digits included.
pub fn split_name(name: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if !c.is_alphanumeric() {
            flush(&mut current, &mut pieces);
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            let hump = p.is_lowercase() && c.is_uppercase();
            let boundary = p.is_alphabetic() != c.is_alphabetic();
            if hump || boundary {
                flush(&mut current, &mut pieces);
            }
        }
        current.extend(c.to_lowercase());
        prev = Some(c);
    }
    flush(&mut current, &mut pieces);
    pieces
}

fn flush(current: &mut String, pieces: &mut Vec<String>) {
    if !current.is_empty() {
        pieces.push(std::mem::take(current));
    }
}

/// Meaningful tokens of a file stem: alphabetic, at least three characters,
/// not a stop word.
pub fn name_tokens(stem: &str) -> BTreeSet<String> {
    split_name(stem)
        .into_iter()
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| t.chars().all(char::is_alphabetic))
        .filter(|t| !is_stop_word(t))
        .collect()
}

/// Split a stem into its normalized key and trailing sequence number.
///
/// `Midnight_Song1` and `Midnight Song (2)` both yield the key
/// `midnight_song`. A stem that is only digits keeps them as its key.
pub fn split_sequence(stem: &str) -> (String, Option<u32>) {
    let pieces = split_name(stem);
    let Some(last) = pieces.last() else {
        return (String::new(), None);
    };

    if pieces.len() > 1 && last.chars().all(|c| c.is_ascii_digit()) {
        let sequence = last.parse::<u32>().ok();
        let key = pieces[..pieces.len() - 1].join("_");
        return (key, sequence);
    }
    (pieces.join("_"), None)
}

/// Top content terms of a text, weighted by frequency relative to the most
/// frequent term. Ties are broken alphabetically.
pub fn content_terms(text: &str, limit: usize) -> BTreeMap<String, f64> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for m in CONTENT_WORD.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if !is_stop_word(&word) {
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);

    let top = ranked.first().map(|(_, c)| *c).unwrap_or(1).max(1) as f64;
    ranked
        .into_iter()
        .map(|(word, count)| (word, f64::from(count) / top))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_words_sorted() {
        let mut sorted = STOP_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOP_WORDS);
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Midnight_Song1"), vec!["midnight", "song", "1"]);
        assert_eq!(split_name("albumCoverArt"), vec!["album", "cover", "art"]);
        assert_eq!(split_name("IMG-2023 beach.trip"), vec!["img", "2023", "beach", "trip"]);
    }

    #[test]
    fn test_name_tokens() {
        let tokens = name_tokens("Midnight_Song1");
        assert_eq!(
            tokens.into_iter().collect::<Vec<_>>(),
            vec!["midnight", "song"]
        );
        assert!(name_tokens("the_of_IMG_01").contains("img"));
        assert!(!name_tokens("the_of_IMG_01").contains("the"));
    }

    #[test]
    fn test_split_sequence() {
        assert_eq!(
            split_sequence("Midnight_Song1"),
            ("midnight_song".to_string(), Some(1))
        );
        assert_eq!(
            split_sequence("Midnight Song (2)"),
            ("midnight_song".to_string(), Some(2))
        );
        assert_eq!(
            split_sequence("Midnight_Cover"),
            ("midnight_cover".to_string(), None)
        );
        assert_eq!(split_sequence("2024"), ("2024".to_string(), None));
        assert_eq!(split_sequence(""), (String::new(), None));
    }

    #[test]
    fn test_content_terms() {
        let terms = content_terms(
            "The midnight session. Midnight lyrics, midnight chorus and the chorus again.",
            MAX_TERMS,
        );
        assert_eq!(terms.get("midnight"), Some(&1.0));
        assert!((terms["chorus"] - 2.0 / 3.0).abs() < 1e-9);
        assert!(!terms.contains_key("the"));
        assert!(!terms.contains_key("and"));
    }

    #[test]
    fn test_content_terms_limit() {
        let text = "alpha bravo charlie delta echoes foxtrot";
        let terms = content_terms(text, 3);
        assert_eq!(
            terms.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["alpha", "bravo", "charlie"]
        );
    }
}
