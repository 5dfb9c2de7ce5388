pub mod composer;
pub mod error;
pub mod intent;
pub mod models;

pub use composer::{clarification_reply, compose_reply, format_distance};
pub use error::{QueryError, QueryWarning, RuleError};
pub use intent::{default_rules, normalize_text, IntentClassifier, IntentRule, MatchTier};
pub use models::*;
