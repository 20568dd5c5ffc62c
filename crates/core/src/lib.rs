pub mod config;
pub mod engine;
pub mod entities;
pub mod intent;
pub mod models;
pub mod policy;
pub mod tokenize;

pub use config::{ConfigError, CrowdLexicon, IntentDefinition, NlpConfig};
pub use engine::NlpEngine;
pub use entities::EntityExtractor;
pub use intent::{IntentClassifier, SUBSTRING_BONUS};
pub use models::*;
pub use policy::{compose_reply, stop_search_target, ReplyContext, ReplyDecision};
pub use tokenize::{similarity, tokenize};
