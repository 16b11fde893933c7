//! Text helpers shared by the analysis and narration stages.

/// Common English stop words excluded from keyword ranking.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "that",
    "with", "have", "this", "will", "your", "from", "they", "know", "want", "been", "good",
    "much", "some", "time", "very", "when", "come", "here", "just", "like", "long", "make",
    "many", "more", "only", "over", "such", "take", "than", "them", "well", "were", "what",
    "which", "their", "would", "there", "about", "could", "other", "after", "first", "these",
    "also", "into", "each", "because", "between", "through", "during", "before", "where",
    "while", "should",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into sentences on terminal punctuation, trimming whitespace
/// and dropping empty fragments.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(|c| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercased alphanumeric words of a text, punctuation stripped.
pub fn normalized_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(|c| c.to_lowercase())
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whether a line is entirely upper-case (ignoring digits and punctuation).
/// Lines with no letters at all do not count.
pub fn is_all_caps(line: &str) -> bool {
    let mut has_letter = false;
    for c in line.chars() {
        if c.is_alphabetic() {
            has_letter = true;
            if c.is_lowercase() {
                return false;
            }
        }
    }
    has_letter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let s = split_sentences("One. Two! Three? ");
        assert_eq!(s, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn sentences_skip_empty_fragments() {
        assert_eq!(split_sentences("Hi... there."), vec!["Hi", "there"]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn normalized_words_strip_punctuation_and_case() {
        assert_eq!(
            normalized_words("Hello, World! (twice)"),
            vec!["hello", "world", "twice"]
        );
    }

    #[test]
    fn all_caps_requires_letters() {
        assert!(is_all_caps("SAFETY NOTICE"));
        assert!(is_all_caps("SECTION 2"));
        assert!(!is_all_caps("Safety Notice"));
        assert!(!is_all_caps("1234"));
    }

    #[test]
    fn stop_words_are_filtered() {
        assert!(is_stop_word("the"));
        assert!(!is_stop_word("pipeline"));
    }
}
