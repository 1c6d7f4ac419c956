//! Trigger-keyword lookup in word-level transcripts.

use std::collections::{BTreeMap, HashSet};
use ugc_models::{synonyms_for, KeywordTiming, OverlayRequest, Transcript};

/// Lower-case, trim and drop trailing punctuation. Leading inverted
/// marks (`¡`, `¿`) and opening quotes are dropped too.
pub fn normalize_word(word: &str) -> String {
    word.trim()
        .trim_start_matches(['¡', '¿', '«', '"', '\''])
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || matches!(c, '…' | '»'))
        .to_lowercase()
}

/// Case-insensitive set of trigger words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordMatcher {
    keywords: HashSet<String>,
}

impl KeywordMatcher {
    /// Trigger set = `keywords` plus the synonyms configured for `language`.
    pub fn new(keywords: &[String], language: Option<&str>, synonyms: &BTreeMap<String, Vec<String>>) -> Self {
        let extra = language.map(|l| synonyms_for(synonyms, l)).unwrap_or(&[]);
        let keywords = keywords
            .iter()
            .chain(extra)
            .map(|k| normalize_word(k))
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn from_request(request: &OverlayRequest) -> Self {
        Self::new(
            &request.trigger_keywords,
            request.language.as_deref(),
            &request.language_synonyms,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn matches(&self, word: &str) -> bool {
        self.keywords.contains(&normalize_word(word))
    }
}

/// Window starting at the first spoken trigger word.
///
/// Returns `None` when no trigger word is spoken; that is a normal skip.
pub fn product_mention_times(
    transcript: &Transcript,
    matcher: &KeywordMatcher,
    desired_duration: f64,
) -> Option<KeywordTiming> {
    let duration = if desired_duration.is_finite() && desired_duration > 0.0 {
        desired_duration
    } else {
        ugc_models::overlay::DEFAULT_OVERLAY_DURATION
    };
    transcript
        .words()
        .find(|w| matcher.matches(&w.word))
        .map(|w| KeywordTiming {
            keyword: normalize_word(&w.word),
            start: w.start,
            end: w.start + duration,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugc_models::{default_language_synonyms, TranscriptSegment, TranscriptWord};

    fn transcript(words: &[(&str, f64)]) -> Transcript {
        Transcript {
            language: None,
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 10.0,
                text: String::new(),
                words: words
                    .iter()
                    .map(|(w, s)| TranscriptWord {
                        word: w.to_string(),
                        start: *s,
                        end: s + 0.3,
                    })
                    .collect(),
            }],
        }
    }

    fn matcher(keywords: &[&str]) -> KeywordMatcher {
        let keywords: Vec<String> = keywords.iter().map(|s| s.to_string()).collect();
        KeywordMatcher::new(&keywords, None, &BTreeMap::new())
    }

    #[test]
    fn test_first_match_wins() {
        let t = transcript(&[("You", 0.5), ("should", 1.0), ("buy", 2.0), ("it,", 2.3), ("buy", 5.0)]);
        let timing = product_mention_times(&t, &matcher(&["buy"]), 5.0).unwrap();
        assert_eq!(timing.start, 2.0);
        assert_eq!(timing.end, 7.0);
        assert_eq!(timing.keyword, "buy");
    }

    #[test]
    fn test_absent_keyword_is_none() {
        let t = transcript(&[("hello", 0.5), ("world", 1.0)]);
        assert!(product_mention_times(&t, &matcher(&["buy"]), 5.0).is_none());
    }

    #[test]
    fn test_window_from_trigger_time() {
        let t = transcript(&[("just", 2.9), ("BUY!", 3.2)]);
        let timing = product_mention_times(&t, &matcher(&["buy"]), 5.0).unwrap();
        assert!((timing.start - 3.2).abs() < 1e-9);
        assert!((timing.end - 8.2).abs() < 1e-9);
    }

    #[test]
    fn test_punctuation_and_case_are_ignored() {
        let m = matcher(&[" Shop "]);
        assert!(m.matches("shop."));
        assert!(m.matches("SHOP?!"));
        assert!(!m.matches("shopping"));
    }

    #[test]
    fn test_language_synonyms_extend_the_set() {
        let keywords = vec!["buy".to_string()];
        let synonyms = default_language_synonyms();
        let spanish = KeywordMatcher::new(&keywords, Some("Spanish"), &synonyms);
        assert!(spanish.matches("¡compra"));
        assert!(spanish.matches("Compra."));
        let english = KeywordMatcher::new(&keywords, Some("english"), &synonyms);
        assert!(!english.matches("compra"));
    }

    #[test]
    fn test_capitalized_synonym_key_is_found() {
        let keywords = vec!["buy".to_string()];
        let mut synonyms = BTreeMap::new();
        synonyms.insert("Spanish".to_string(), vec!["Compra".to_string()]);
        let m = KeywordMatcher::new(&keywords, Some("spanish"), &synonyms);
        assert!(m.matches("compra"));
        assert!(m.matches("buy"));
    }

    #[test]
    fn test_invalid_duration_uses_default() {
        let t = transcript(&[("buy", 1.0)]);
        let timing = product_mention_times(&t, &matcher(&["buy"]), -1.0).unwrap();
        assert!((timing.duration() - 5.0).abs() < 1e-9);
    }
}
