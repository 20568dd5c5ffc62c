use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading nlp config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid nlp config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("intent `{0}` is defined more than once")]
    DuplicateIntent(String),

    #[error("intent `{0}` has an empty response label")]
    EmptyLabel(String),

    #[error("intent `{0}` has an empty trigger phrase")]
    EmptyPattern(String),
}

/// One catalogue entry: a unique name, the label reported by `classify`,
/// and the trigger phrases scored against incoming messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub name: String,
    pub label: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdLexicon {
    pub least: Vec<String>,
    pub most: Vec<String>,
    /// Raw substrings that also signal a `least` preference.
    #[serde(default = "default_least_phrases")]
    pub least_phrases: Vec<String>,
}

impl Default for CrowdLexicon {
    fn default() -> Self {
        Self {
            least: words(&[
                "least",
                "less",
                "not",
                "empty",
                "less crowded",
                "emptiest",
                "fewer",
            ]),
            most: words(&["most", "very", "too", "packed", "full", "crowded"]),
            least_phrases: default_least_phrases(),
        }
    }
}

fn default_least_phrases() -> Vec<String> {
    words(&["less people", "fewer people"])
}

/// Catalogue and lexicons shared by the classifier and the extractor.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpConfig {
    pub intents: Vec<IntentDefinition>,
    #[serde(default)]
    pub crowd_terms: CrowdLexicon,
    pub locations: Vec<String>,
}

impl NlpConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validated()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Checks catalogue invariants and lower-cases every lexicon entry.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();

        for intent in &mut self.intents {
            if !seen.insert(intent.name.clone()) {
                return Err(ConfigError::DuplicateIntent(intent.name.clone()));
            }
            if intent.label.trim().is_empty() {
                return Err(ConfigError::EmptyLabel(intent.name.clone()));
            }
            if intent.patterns.iter().any(|pattern| pattern.trim().is_empty()) {
                return Err(ConfigError::EmptyPattern(intent.name.clone()));
            }
            lowercase_all(&mut intent.patterns);
        }

        lowercase_all(&mut self.crowd_terms.least);
        lowercase_all(&mut self.crowd_terms.most);
        lowercase_all(&mut self.crowd_terms.least_phrases);
        lowercase_all(&mut self.locations);
        self.locations.retain(|location| !location.is_empty());

        Ok(self)
    }

    pub fn intent(&self, name: &str) -> Option<&IntentDefinition> {
        self.intents.iter().find(|intent| intent.name == name)
    }
}

impl Default for NlpConfig {
    fn default() -> Self {
        Self {
            intents: vec![
                intent(
                    "greeting",
                    "greeting",
                    &[
                        "hello",
                        "hi",
                        "hey",
                        "greetings",
                        "good morning",
                        "good evening",
                        "sup",
                        "yo",
                    ],
                ),
                intent(
                    "thanks",
                    "thanks",
                    &["thank", "thanks", "appreciate", "grateful"],
                ),
                intent(
                    "route_planning",
                    "route_planning",
                    &[
                        "how to",
                        "how do i",
                        "get to",
                        "go to",
                        "reach",
                        "travel to",
                        "way to",
                        "route to",
                        "bus to",
                        "take me",
                    ],
                ),
                intent(
                    "crowd_query",
                    "crowd_query",
                    &[
                        "crowded",
                        "crowd",
                        "busy",
                        "full",
                        "empty",
                        "packed",
                        "people",
                        "space",
                        "less people",
                        "fewer people",
                    ],
                ),
                intent(
                    "best_recommendation",
                    "recommendation",
                    &[
                        "best",
                        "recommend",
                        "suggest",
                        "should i",
                        "which one",
                        "what bus",
                        "better",
                        "prefer",
                    ],
                ),
                intent(
                    "timing",
                    "timing",
                    &[
                        "when",
                        "time",
                        "arrive",
                        "eta",
                        "reach",
                        "departure",
                        "schedule",
                    ],
                ),
                intent(
                    "ticket",
                    "ticket",
                    &[
                        "ticket", "buy", "purchase", "book", "fare", "price", "cost", "pay",
                    ],
                ),
                intent(
                    "list_buses",
                    "list",
                    &["all buses", "list", "show", "available", "display"],
                ),
            ],
            crowd_terms: CrowdLexicon::default(),
            locations: words(&[
                "central",
                "tech park",
                "airport",
                "koyambedu",
                "adyar",
                "t.nagar",
                "tambaram",
                "broadway",
                "guindy",
                "cmbt",
                "siruseri",
                "kelambakkam",
                "perambur",
                "anna nagar",
            ]),
        }
    }
}

fn intent(name: &str, label: &str, patterns: &[&str]) -> IntentDefinition {
    IntentDefinition {
        name: name.to_string(),
        label: label.to_string(),
        patterns: words(patterns),
    }
}

fn words(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn lowercase_all(values: &mut [String]) {
    for value in values.iter_mut() {
        *value = value.trim().to_lowercase();
    }
}
