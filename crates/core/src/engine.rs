use std::sync::Arc;

use crate::config::NlpConfig;
use crate::entities::EntityExtractor;
use crate::intent::IntentClassifier;
use crate::models::{ClassificationResult, EntityBag, NlpResult};

/// Classifier and extractor over one shared, read-only configuration.
///
/// Holds no mutable state, so a single engine can serve concurrent requests
/// behind an `Arc` without locking.
#[derive(Debug, Clone)]
pub struct NlpEngine {
    classifier: IntentClassifier,
    extractor: EntityExtractor,
}

impl NlpEngine {
    pub fn new(config: NlpConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<NlpConfig>) -> Self {
        Self {
            classifier: IntentClassifier::new(&config),
            extractor: EntityExtractor::new(config),
        }
    }

    pub fn classify(&self, message: &str) -> ClassificationResult {
        self.classifier.classify(message)
    }

    pub fn extract_entities(&self, message: &str) -> EntityBag {
        self.extractor.extract(message)
    }

    pub fn process(&self, message: &str) -> NlpResult {
        let ClassificationResult { intent, confidence } = self.classify(message);

        NlpResult {
            intent,
            confidence,
            entities: self.extract_entities(message),
            original_message: message.to_string(),
        }
    }
}

impl Default for NlpEngine {
    fn default() -> Self {
        Self::new(NlpConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::models::CrowdPreference;

    #[test]
    fn processes_crowd_question_end_to_end() {
        let engine = NlpEngine::default();
        let message = "Which bus has less people going to Airport?";
        let result = engine.process(message);

        assert_eq!(result.entities.crowd_preference, Some(CrowdPreference::Least));
        assert!(result.entities.locations.iter().any(|loc| loc == "airport"));
        assert_eq!(result.entities.to_location.as_deref(), Some("airport"));
        assert!(matches!(
            result.intent.as_deref(),
            Some("crowd_query") | Some("route_planning")
        ));
        assert_eq!(result.original_message, message);
    }

    #[test]
    fn empty_message_is_fully_empty() {
        let result = NlpEngine::default().process("");
        assert_eq!(result.intent, None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.entities, EntityBag::default());
    }

    #[test]
    fn shared_engine_serves_threads() {
        let engine = Arc::new(NlpEngine::default());
        let handles = (0..4)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || engine.process("hello, is 12A crowded?"))
            })
            .collect::<Vec<_>>();

        let results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(results[0].entities.bus_ids, vec!["12A"]);
    }
}
