//! Whole-document content analysis.
//!
//! Produces the derived document fields consumed by downstream timing
//! decisions: summary, ranked topics, estimated narration duration, and a
//! complexity classification. Deterministic for a given ingestion output.

use std::collections::HashMap;

use crate::config::AnalysisSettings;
use crate::models::{Complexity, Page};
use crate::utils::text::{is_stop_word, normalized_words, split_sentences};

/// Derived analysis fields for a document.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub summary: String,
    pub key_topics: Vec<String>,
    pub estimated_duration: f64,
    pub complexity: Complexity,
}

pub struct ContentAnalyzer {
    opts: AnalysisSettings,
}

impl ContentAnalyzer {
    pub fn new(opts: AnalysisSettings) -> Self {
        Self { opts }
    }

    pub fn analyze(&self, pages: &[Page]) -> AnalysisReport {
        AnalysisReport {
            summary: self.summarize(pages),
            key_topics: self.rank_topics(pages),
            estimated_duration: self.estimate_duration(pages),
            complexity: self.classify_complexity(pages),
        }
    }

    /// First meaningful sentences across all pages, in page order.
    fn summarize(&self, pages: &[Page]) -> String {
        let mut sentences = Vec::new();
        for page in pages {
            for sentence in split_sentences(&page.text) {
                if sentence.len() > self.opts.min_sentence_length {
                    sentences.push(sentence);
                    if sentences.len() >= self.opts.summary_sentences {
                        return format!("{}.", sentences.join(". "));
                    }
                }
            }
        }
        if sentences.is_empty() {
            String::new()
        } else {
            format!("{}.", sentences.join(". "))
        }
    }

    /// Top words by frequency after stop-word and length filters. Ties are
    /// broken by first appearance in the document.
    fn rank_topics(&self, pages: &[Page]) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut first_seen: Vec<String> = Vec::new();

        for page in pages {
            for word in normalized_words(&page.text) {
                if word.len() < self.opts.min_topic_length || is_stop_word(&word) {
                    continue;
                }
                if !counts.contains_key(&word) {
                    first_seen.push(word.clone());
                }
                *counts.entry(word).or_insert(0) += 1;
            }
        }

        // Stable sort over first-seen order keeps ties deterministic.
        let mut ranked = first_seen;
        ranked.sort_by_key(|w| std::cmp::Reverse(counts[w]));
        ranked.truncate(self.opts.topic_count);
        ranked
    }

    /// Speaking time for all words plus a fixed per-slide overhead.
    fn estimate_duration(&self, pages: &[Page]) -> f64 {
        let words: usize = pages.iter().map(Page::word_count).sum();
        (words as f64 / self.opts.words_per_minute) * 60.0
            + pages.len() as f64 * self.opts.per_slide_seconds
    }

    /// Threshold on average element density and total image count.
    fn classify_complexity(&self, pages: &[Page]) -> Complexity {
        if pages.is_empty() {
            return Complexity::Simple;
        }
        let elements: usize = pages.iter().map(|p| p.layout.elements.len()).sum();
        let images: usize = pages.iter().map(|p| p.images.len()).sum();
        let avg_elements = elements as f64 / pages.len() as f64;

        if avg_elements < 5.0 && images == 0 {
            Complexity::Simple
        } else if avg_elements < 15.0 && images <= 5 {
            Complexity::Medium
        } else {
            Complexity::Complex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestSettings;
    use crate::pipeline::ingest::{infer_layout, ShapeClassifier};
    use crate::models::Layout;

    fn page_with_text(n: u32, text: &str) -> Page {
        let layout = infer_layout(
            &ShapeClassifier::default(),
            text,
            (1275, 1650),
            &IngestSettings::default(),
        );
        Page {
            page_number: n,
            text: text.to_string(),
            images: Vec::new(),
            layout,
        }
    }

    fn analyzer() -> ContentAnalyzer {
        ContentAnalyzer::new(AnalysisSettings::default())
    }

    #[test]
    fn summary_takes_first_meaningful_sentences_in_page_order() {
        let p1 = page_with_text(
            1,
            "Short. The first long sentence of the document describes the overall purpose here. Tiny.",
        );
        let p2 = page_with_text(
            2,
            "The second long sentence continues the description with additional detail for readers.",
        );
        let report = analyzer().analyze(&[p1, p2]);
        assert!(report.summary.starts_with("The first long sentence"));
        assert!(report.summary.contains("The second long sentence"));
        assert!(!report.summary.contains("Short"));
    }

    #[test]
    fn topics_rank_by_frequency_with_first_seen_tie_break() {
        let page = page_with_text(
            1,
            "turbine turbine turbine rotor rotor stator blade blade blade rotor",
        );
        let topics = analyzer().analyze(&[page]).key_topics;
        // turbine, rotor, and blade all appear three times; first-seen
        // order decides the tie.
        assert_eq!(topics[0], "turbine");
        assert_eq!(topics[1], "rotor");
        assert_eq!(topics[2], "blade");
    }

    #[test]
    fn stop_words_and_short_words_are_excluded() {
        let page = page_with_text(1, "the the the and and cat cat pipeline");
        let topics = analyzer().analyze(&[page]).key_topics;
        assert!(!topics.contains(&"the".to_string()));
        assert!(!topics.contains(&"cat".to_string()));
        assert!(topics.contains(&"pipeline".to_string()));
    }

    #[test]
    fn duration_estimate_is_monotone_in_word_count() {
        let a = analyzer().analyze(&[page_with_text(1, "alpha beta gamma delta")]);
        let b = analyzer().analyze(&[page_with_text(
            1,
            "alpha beta gamma delta epsilon zeta eta theta",
        )]);
        assert!(b.estimated_duration > a.estimated_duration);
    }

    #[test]
    fn duration_includes_per_slide_overhead() {
        let report = analyzer().analyze(&[page_with_text(1, ""), page_with_text(2, "")]);
        assert_eq!(report.estimated_duration, 10.0);
    }

    #[test]
    fn complexity_thresholds() {
        let sparse = page_with_text(1, "ONE HEADING\n");
        assert_eq!(analyzer().analyze(&[sparse]).complexity, Complexity::Simple);

        let mid_text = (0..8)
            .map(|i| format!("This is sentence number {} with enough words in it to be prose.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let mid = page_with_text(1, &mid_text);
        assert_eq!(analyzer().analyze(&[mid]).complexity, Complexity::Medium);

        let dense_text = (0..30)
            .map(|i| format!("This is sentence number {} with enough words in it to be prose.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let dense = page_with_text(1, &dense_text);
        assert_eq!(analyzer().analyze(&[dense]).complexity, Complexity::Complex);
    }

    #[test]
    fn image_heavy_documents_are_not_simple() {
        let mut page = page_with_text(1, "A HEADING\n");
        page.images = vec!["aGVsbG8=".to_string()];
        let report = analyzer().analyze(&[page]);
        assert_ne!(report.complexity, Complexity::Simple);
    }

    #[test]
    fn empty_page_set_is_simple_and_silent() {
        let report = analyzer().analyze(&[]);
        assert_eq!(report.complexity, Complexity::Simple);
        assert!(report.summary.is_empty());
        assert!(report.key_topics.is_empty());
    }

    #[test]
    fn zero_element_pages_still_analyze() {
        let page = Page {
            page_number: 1,
            text: String::new(),
            images: Vec::new(),
            layout: Layout::empty(800, 600),
        };
        let report = analyzer().analyze(&[page]);
        assert_eq!(report.estimated_duration, 5.0);
    }
}
