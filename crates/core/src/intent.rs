use std::collections::HashSet;

use crate::config::NlpConfig;
use crate::models::ClassificationResult;
use crate::tokenize::{set_similarity, tokenize};

/// Added to a phrase's Jaccard score when the phrase occurs verbatim in the
/// message. Scores above 1.0 are therefore possible.
pub const SUBSTRING_BONUS: f64 = 0.5;

#[derive(Debug, Clone)]
struct TriggerPhrase {
    phrase: String,
    tokens: HashSet<String>,
}

#[derive(Debug, Clone)]
struct ScoredIntent {
    label: String,
    phrases: Vec<TriggerPhrase>,
}

/// Scores messages against every trigger phrase of the catalogue and keeps
/// the single best one.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    intents: Vec<ScoredIntent>,
}

impl IntentClassifier {
    pub fn new(config: &NlpConfig) -> Self {
        let intents = config
            .intents
            .iter()
            .map(|intent| ScoredIntent {
                label: intent.label.clone(),
                phrases: intent
                    .patterns
                    .iter()
                    .map(|pattern| TriggerPhrase {
                        phrase: pattern.to_lowercase(),
                        tokens: tokenize(pattern).into_iter().collect(),
                    })
                    .collect(),
            })
            .collect();

        Self { intents }
    }

    /// Ties keep the earliest (intent, phrase) pair in catalogue order.
    pub fn classify(&self, message: &str) -> ClassificationResult {
        let tokens = tokenize(message).into_iter().collect::<HashSet<_>>();
        let lower = message.to_lowercase();

        let mut best_label: Option<&str> = None;
        let mut best_score = 0.0_f64;

        for intent in &self.intents {
            for trigger in &intent.phrases {
                let mut score = set_similarity(&tokens, &trigger.tokens);
                if lower.contains(trigger.phrase.as_str()) {
                    score += SUBSTRING_BONUS;
                }

                if score > best_score {
                    best_score = score;
                    best_label = Some(intent.label.as_str());
                }
            }
        }

        match best_label {
            Some(label) => ClassificationResult {
                intent: Some(label.to_string()),
                confidence: best_score,
            },
            None => ClassificationResult::unmatched(),
        }
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(&NlpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntentDefinition;

    #[test]
    fn classifies_greeting() {
        let result = IntentClassifier::default().classify("hello there");
        assert_eq!(result.intent.as_deref(), Some("greeting"));
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn classifies_thanks() {
        let result = IntentClassifier::default().classify("thank you so much");
        assert_eq!(result.intent.as_deref(), Some("thanks"));
    }

    #[test]
    fn unknown_words_stay_unmatched() {
        let result = IntentClassifier::default().classify("xyzzy plugh");
        assert_eq!(result, ClassificationResult::unmatched());
    }

    #[test]
    fn empty_message_is_unmatched() {
        let result = IntentClassifier::default().classify("");
        assert_eq!(result.intent, None);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn exact_phrase_earns_the_bonus() {
        let classifier = IntentClassifier::default();
        let exact = classifier.classify("good morning");
        let shuffled = classifier.classify("morning good");

        assert_eq!(exact.intent.as_deref(), Some("greeting"));
        assert_eq!(shuffled.intent.as_deref(), Some("greeting"));
        assert!(exact.confidence - shuffled.confidence >= SUBSTRING_BONUS);
        assert!(exact.confidence > 1.0);
    }

    #[test]
    fn reports_the_response_label_not_the_name() {
        let result = IntentClassifier::default().classify("list");
        assert_eq!(result.intent.as_deref(), Some("list"));

        let result = IntentClassifier::default().classify("recommend");
        assert_eq!(result.intent.as_deref(), Some("recommendation"));
    }

    #[test]
    fn ties_keep_the_earliest_intent() {
        let mut config = NlpConfig::default();
        config.intents = vec![
            IntentDefinition {
                name: "first".to_string(),
                label: "first".to_string(),
                patterns: vec!["reach".to_string()],
            },
            IntentDefinition {
                name: "second".to_string(),
                label: "second".to_string(),
                patterns: vec!["reach".to_string()],
            },
        ];

        let result = IntentClassifier::new(&config).classify("reach");
        assert_eq!(result.intent.as_deref(), Some("first"));
    }

    #[test]
    fn non_ascii_words_do_not_dilute_the_score() {
        let result = IntentClassifier::default().classify("hi நன்றி");
        assert_eq!(result.intent.as_deref(), Some("greeting"));
        assert_eq!(result.confidence, 1.0 + SUBSTRING_BONUS);
    }

    #[test]
    fn confidence_is_never_negative() {
        let classifier = IntentClassifier::default();
        for message in ["", "?!", "bus 570", "take me to the airport please", "¿qué?"] {
            assert!(classifier.classify(message).confidence >= 0.0);
        }
    }
}
