use crate::models::{ContentType, UNKNOWN_CHAPTER};
use regex::Regex;

/// Layout information a reader backend may attach to a text span.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutHint {
    pub font_size: Option<f32>,
}

/// Rule-based content classifier for S1000D specification text.
///
/// The classification and importance rules are visible contracts of the
/// ranking behaviour downstream, so they are deliberately simple and
/// deterministic: first matching rule wins for the content type, and
/// importance is a pure function of the type, the text, and chapter-marker
/// presence.
pub struct ContentClassifier {
    chapter_pattern: Regex,
    section_pattern: Regex,
    list_pattern: Regex,
    heading_font_size: f32,
    important_keywords: Vec<String>,
}

impl ContentClassifier {
    pub fn new(heading_font_size: f32, important_keywords: Vec<String>) -> Self {
        Self {
            chapter_pattern: Regex::new(r"Chapter\s+(\d+\.?\d*\.?\d*\.?\d*)")
                .expect("chapter pattern is valid"),
            section_pattern: Regex::new(r"(\d+\.?\d*\.?\d*\.?\d*)\s+[A-Z]")
                .expect("section pattern is valid"),
            list_pattern: Regex::new(r"^\s*[\d\-•*]\s+").expect("list pattern is valid"),
            heading_font_size,
            important_keywords: important_keywords
                .into_iter()
                .map(|keyword| keyword.to_lowercase())
                .collect(),
        }
    }

    /// Classify a text span and compute its importance in one pass.
    pub fn classify(&self, text: &str, hint: Option<LayoutHint>) -> (ContentType, u8) {
        let content_type = self.detect_content_type(text, hint);
        (content_type, self.score_importance(text, content_type))
    }

    fn detect_content_type(&self, text: &str, hint: Option<LayoutHint>) -> ContentType {
        if text.trim().chars().count() < 3 {
            return ContentType::Text;
        }

        let large_font = hint
            .and_then(|hint| hint.font_size)
            .is_some_and(|size| size > self.heading_font_size);

        if text.chars().count() < 100
            && (self.chapter_pattern.is_match(text)
                || self.section_pattern.is_match(text)
                || is_all_uppercase(text)
                || large_font)
        {
            return ContentType::Heading;
        }

        let trimmed_start = text.trim_start();
        if self.list_pattern.is_match(text)
            || trimmed_start.starts_with("- ")
            || trimmed_start.starts_with("• ")
            || trimmed_start.starts_with("* ")
        {
            return ContentType::List;
        }

        if text.contains('\t') || text.matches('|').count() > 3 {
            return ContentType::Table;
        }

        ContentType::Text
    }

    /// Importance rules, applied in order: base 1; headings 4; any chapter
    /// marker 5; each distinct configured keyword adds 1 capped at 5;
    /// tables and OCR-derived diagrams floor at 3.
    pub fn score_importance(&self, text: &str, content_type: ContentType) -> u8 {
        let mut importance: u8 = 1;

        if content_type == ContentType::Heading {
            importance = 4;
        }

        if self.chapter_pattern.is_match(text) {
            importance = 5;
        }

        let lowered = text.to_lowercase();
        let keyword_count = self
            .important_keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .count();
        if keyword_count > 0 {
            importance = (importance + keyword_count as u8).min(5);
        }

        if matches!(content_type, ContentType::Table | ContentType::Diagram) {
            importance = importance.max(3);
        }

        importance
    }

    /// Extract a chapter identifier from text, falling back to the carried
    /// chapter context when no marker is present.
    pub fn extract_chapter(&self, text: &str, current: &str) -> String {
        if let Some(capture) = self.chapter_pattern.captures(text) {
            return capture[1].to_string();
        }
        if let Some(capture) = self.section_pattern.captures(text) {
            return capture[1].to_string();
        }
        current.to_string()
    }

    pub fn has_chapter_marker(&self, text: &str) -> bool {
        self.chapter_pattern.is_match(text) || self.section_pattern.is_match(text)
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        let config = crate::config::IndexConfig::default();
        Self::new(config.heading_font_size, config.important_keywords)
    }
}

/// Python `str.isupper` semantics: at least one cased character and no
/// lowercase characters anywhere.
fn is_all_uppercase(text: &str) -> bool {
    let mut has_cased = false;
    for character in text.chars() {
        if character.is_lowercase() {
            return false;
        }
        if character.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_marker_classifies_as_heading_with_top_importance() {
        let classifier = ContentClassifier::default();
        let (content_type, importance) = classifier.classify("Chapter 2.5.2", None);

        assert_eq!(content_type, ContentType::Heading);
        assert_eq!(importance, 5);
        assert_eq!(classifier.extract_chapter("Chapter 2.5.2", UNKNOWN_CHAPTER), "2.5.2");
    }

    #[test]
    fn all_uppercase_short_spans_are_headings() {
        let classifier = ContentClassifier::default();
        let (content_type, importance) = classifier.classify("GENERAL REQUIREMENTS", None);

        assert_eq!(content_type, ContentType::Heading);
        assert_eq!(importance, 4);
    }

    #[test]
    fn large_font_hint_promotes_short_spans_to_headings() {
        let classifier = ContentClassifier::default();
        let hint = LayoutHint {
            font_size: Some(18.0),
        };
        let (content_type, _) = classifier.classify("Producing business rules", Some(hint));
        assert_eq!(content_type, ContentType::Heading);
    }

    #[test]
    fn bullet_markers_classify_as_lists() {
        let classifier = ContentClassifier::default();
        let long_tail = "continue with the remaining items of the maintenance planning \
                         information until each applicable condition has been reviewed";

        let (dash, _) = classifier.classify(&format!("- first item, {long_tail}"), None);
        let (bullet, _) = classifier.classify(&format!("• second item, {long_tail}"), None);
        assert_eq!(dash, ContentType::List);
        assert_eq!(bullet, ContentType::List);
    }

    #[test]
    fn pipe_heavy_text_is_a_table_with_floored_importance() {
        let classifier = ContentClassifier::default();
        let row = "code | description | applicability | issue | remarks and further notes on the data module coding scheme";
        let (content_type, importance) = classifier.classify(row, None);

        assert_eq!(content_type, ContentType::Table);
        assert!(importance >= 3);
    }

    #[test]
    fn importance_is_monotonic_in_keyword_count() {
        let classifier = ContentClassifier::default();
        let base = "The module describes procedures for producing technical content across the \
                    whole project and its partner organisations in a common exchange format.";
        let mut previous = 0;

        for extension in [
            "",
            " It references business rules.",
            " It references business rules and the data module structure.",
            " It references business rules, the data module structure and applicability.",
        ] {
            let text = format!("{base}{extension}");
            let (_, importance) = classifier.classify(&text, None);
            assert!(importance >= previous, "importance dropped for {text:?}");
            previous = importance;
        }
    }

    #[test]
    fn tiny_spans_fall_back_to_plain_text() {
        let classifier = ContentClassifier::default();
        let (content_type, importance) = classifier.classify(" a ", None);
        assert_eq!(content_type, ContentType::Text);
        assert_eq!(importance, 1);
    }

    #[test]
    fn section_numbering_without_chapter_keyword_still_resolves() {
        let classifier = ContentClassifier::default();
        assert_eq!(
            classifier.extract_chapter("3.9.5 Data module coding", UNKNOWN_CHAPTER),
            "3.9.5"
        );
        assert_eq!(
            classifier.extract_chapter("no markers here", "2.1"),
            "2.1"
        );
    }
}
