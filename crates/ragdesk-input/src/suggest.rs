//! Autocomplete suggestions for partial chat input

use std::sync::Arc;
use std::time::Duration;

use ragdesk_common::Debouncer;
use tokio::sync::watch;
use tracing::trace;

/// Suggestions are offered only below this many characters
pub const SUGGESTION_MAX_INPUT: usize = 20;

/// At most this many suggestions are returned
pub const SUGGESTION_LIMIT: usize = 3;

/// Quiet period before suggestions are computed
pub const DEFAULT_SUGGESTION_DEBOUNCE: Duration = Duration::from_millis(300);

const DEFAULT_DICTIONARY: &[&str] = &[
    "What is",
    "What are the key points of",
    "How do I",
    "How does",
    "Explain",
    "Explain step by step",
    "Summarize",
    "Summarize this document",
    "Compare",
    "List the",
    "Show me",
    "Find documents about",
    "Why does",
    "Can you",
    "Tell me about",
    "Give me an example of",
    "Define",
    "Translate",
];

/// Prefix-matching suggester over a fixed dictionary
#[derive(Debug, Clone)]
pub struct SuggestionEngine {
    dictionary: Vec<String>,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self::with_dictionary(DEFAULT_DICTIONARY.iter().map(|s| s.to_string()))
    }
}

impl SuggestionEngine {
    pub fn with_dictionary<I>(dictionary: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            dictionary: dictionary.into_iter().collect(),
        }
    }

    /// Case-insensitive prefix matches in dictionary order
    ///
    /// Empty when the trimmed input is empty or at least
    /// [`SUGGESTION_MAX_INPUT`] characters long. Exact matches are skipped.
    pub fn suggest(&self, input: &str) -> Vec<String> {
        let trimmed = input.trim();
        let len = trimmed.chars().count();
        if len == 0 || len >= SUGGESTION_MAX_INPUT {
            return Vec::new();
        }

        let needle = trimmed.to_lowercase();
        self.dictionary
            .iter()
            .filter(|entry| {
                let entry = entry.to_lowercase();
                entry.starts_with(&needle) && entry != needle
            })
            .take(SUGGESTION_LIMIT)
            .cloned()
            .collect()
    }
}

/// Runs the engine once input has been quiet for the debounce period
///
/// Results are published through a watch channel.
pub struct DebouncedSuggestions {
    engine: Arc<SuggestionEngine>,
    debouncer: Debouncer,
    latest: Arc<watch::Sender<Vec<String>>>,
}

impl DebouncedSuggestions {
    pub fn new(engine: SuggestionEngine, delay: Duration) -> Self {
        let (latest, _) = watch::channel(Vec::new());
        Self {
            engine: Arc::new(engine),
            debouncer: Debouncer::new(delay),
            latest: Arc::new(latest),
        }
    }

    /// Report the current input
    ///
    /// Blank input clears suggestions at once; anything else is computed
    /// after the quiet period. Must be called inside a tokio runtime.
    pub fn input_changed(&self, input: &str) {
        if input.trim().is_empty() {
            self.clear();
            return;
        }
        let engine = self.engine.clone();
        let latest = self.latest.clone();
        let input = input.to_string();
        self.debouncer.schedule(async move {
            let suggestions = engine.suggest(&input);
            trace!("{} suggestions for {:?}", suggestions.len(), input);
            latest.send_replace(suggestions);
        });
    }

    /// Drop pending work and current suggestions
    pub fn clear(&self) {
        self.debouncer.cancel();
        self.latest.send_replace(Vec::new());
    }

    pub fn current(&self) -> Vec<String> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.latest.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_matches_capped() {
        let engine = SuggestionEngine::default();
        assert_eq!(
            engine.suggest("exp"),
            vec!["Explain".to_string(), "Explain step by step".to_string()]
        );
        assert_eq!(engine.suggest("s").len(), SUGGESTION_LIMIT);
        assert_eq!(engine.suggest("  what ").len(), 2);
    }

    #[test]
    fn test_no_suggestions_outside_window() {
        let engine = SuggestionEngine::default();
        assert!(engine.suggest("").is_empty());
        assert!(engine.suggest("    ").is_empty());
        assert!(engine.suggest("What are the key poi").is_empty());
        assert!(engine.suggest("zzz").is_empty());
    }

    #[test]
    fn test_exact_match_skipped() {
        let engine = SuggestionEngine::with_dictionary(vec!["Define".to_string()]);
        assert!(engine.suggest("define").is_empty());
        assert_eq!(engine.suggest("def"), vec!["Define".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_suggestions() {
        let suggestions =
            DebouncedSuggestions::new(SuggestionEngine::default(), DEFAULT_SUGGESTION_DEBOUNCE);
        let mut updates = suggestions.subscribe();

        suggestions.input_changed("e");
        tokio::time::sleep(Duration::from_millis(100)).await;
        suggestions.input_changed("exp");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(suggestions.current().is_empty());
        assert!(suggestions.is_pending());

        updates.changed().await.unwrap();
        assert_eq!(suggestions.current().len(), 2);
        assert_eq!(suggestions.current()[0], "Explain");

        suggestions.input_changed("");
        assert!(suggestions.current().is_empty());
        assert!(!suggestions.is_pending());
    }
}
