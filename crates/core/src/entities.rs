use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::NlpConfig;
use crate::models::{CrowdPreference, EntityBag};
use crate::tokenize::tokenize;

static BUS_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)\b([0-9]+[a-z]?|[a-z]+[0-9]+)\b").expect("valid bus id regex")
});

/// Strategies for `from_location`, tried in order: a keyword such as "from"
/// before the place, then "<place> to ...".
const FROM_PATTERNS: &[&str] = &[
    r"(?i)(?:from|starting|leaving)\s+([a-z\s.]+?)(?:\s+to|\s+going|\s+and|$)",
    r"(?i)([a-z\s.]+?)\s+to\s+",
];

/// Strategies for `to_location`, tried in order.
const TO_PATTERNS: &[&str] = &[
    r"(?i)(?:to|towards|going to|reach|get to)\s+(?:the\s+)?([a-z\s.]+?)(?:\s|$|[?,!])",
    r"(?i)\s+to\s+([a-z\s.]+?)(?:\s|$|[?,!])",
    r"(?i)(?:take me)\s+to\s+(?:the\s+)?([a-z\s.]+?)(?:\s|$|[?,!])",
];

#[derive(Debug, Clone)]
struct CaptureStrategy(Regex);

impl CaptureStrategy {
    fn compile(patterns: &[&str]) -> Vec<Self> {
        patterns
            .iter()
            .map(|pattern| Self(Regex::new(pattern).expect("valid location strategy regex")))
            .collect()
    }

    fn capture<'m>(&self, message: &'m str) -> Option<&'m str> {
        self.0
            .captures(message)
            .and_then(|captures| captures.get(1))
            .map(|group| group.as_str().trim())
    }
}

/// Pulls bus ids, known places, a from/to pair and a crowd preference out of
/// a free-text message. Every field is extracted independently.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    config: Arc<NlpConfig>,
    least_terms: HashSet<String>,
    most_terms: HashSet<String>,
    from_strategies: Vec<CaptureStrategy>,
    to_strategies: Vec<CaptureStrategy>,
}

impl EntityExtractor {
    pub fn new(config: Arc<NlpConfig>) -> Self {
        let least_terms = config.crowd_terms.least.iter().cloned().collect();
        let most_terms = config.crowd_terms.most.iter().cloned().collect();

        Self {
            config,
            least_terms,
            most_terms,
            from_strategies: CaptureStrategy::compile(FROM_PATTERNS),
            to_strategies: CaptureStrategy::compile(TO_PATTERNS),
        }
    }

    pub fn extract(&self, message: &str) -> EntityBag {
        EntityBag {
            locations: self.locations(message),
            bus_ids: bus_ids(message),
            from_location: self.from_location(message),
            to_location: self.to_location(message),
            crowd_preference: self.crowd_preference(message),
        }
    }

    /// Lexicon entries found in the message, in lexicon order.
    pub fn locations(&self, message: &str) -> Vec<String> {
        let lower = message.to_lowercase();
        self.config
            .locations
            .iter()
            .filter(|location| lower.contains(location.as_str()))
            .cloned()
            .collect()
    }

    /// Keeps the raw captured text rather than the lexicon entry.
    ///
    /// NOTE: `to_location` stores the normalized lexicon entry instead. The
    /// two fields are inconsistent and callers must not assume either shape
    /// for the other.
    pub fn from_location(&self, message: &str) -> Option<String> {
        self.from_strategies.iter().find_map(|strategy| {
            let captured = strategy.capture(message)?;
            self.known_location_in(captured)?;
            Some(captured.to_string())
        })
    }

    /// Returns the lexicon entry found inside the first accepted capture.
    pub fn to_location(&self, message: &str) -> Option<String> {
        self.to_strategies.iter().find_map(|strategy| {
            let captured = strategy.capture(message)?;
            self.known_location_in(captured).map(ToString::to_string)
        })
    }

    pub fn crowd_preference(&self, message: &str) -> Option<CrowdPreference> {
        let tokens = tokenize(message);
        let has_phrase = self
            .config
            .crowd_terms
            .least_phrases
            .iter()
            .any(|phrase| message.contains(phrase.as_str()));

        if has_phrase || tokens.iter().any(|token| self.least_terms.contains(token)) {
            Some(CrowdPreference::Least)
        } else if tokens.iter().any(|token| self.most_terms.contains(token)) {
            Some(CrowdPreference::Most)
        } else {
            None
        }
    }

    fn known_location_in(&self, captured: &str) -> Option<&str> {
        let lower = captured.to_lowercase();
        self.config
            .locations
            .iter()
            .find(|location| lower.contains(location.as_str()))
            .map(String::as_str)
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(Arc::new(NlpConfig::default()))
    }
}

/// Every bus-id-shaped word, upper-cased, in message order.
pub fn bus_ids(message: &str) -> Vec<String> {
    BUS_ID
        .find_iter(message)
        .map(|found| found.as_str().to_uppercase())
        .collect()
}
