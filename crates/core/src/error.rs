use std::fmt;

use thiserror::Error;

use crate::models::{DataSource, EntityKind};

/// Errors that abort a voice query. Every other problem degrades into a reply plus warnings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("speech recognition failed: {0}")]
    RecognitionFailure(String),
    #[error("caller location ({lat}, {lon}) is outside the service area")]
    InvalidLocation { lat: f64, lon: f64 },
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RecognitionFailure(_) => "recognition_failure",
            Self::InvalidLocation { .. } => "invalid_location",
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {id} has an invalid pattern: {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule {0} has no terms")]
    EmptyTerms(String),
    #[error("duplicate rule id {0}")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryWarning {
    LowConfidenceClassification { confidence: f32 },
    MissingEntity(EntityKind),
    ExternalUnavailable(DataSource),
    ExternalTimeout(DataSource),
    PartialAnswer(DataSource),
    SynthesisFailure(String),
}

impl fmt::Display for QueryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidenceClassification { confidence } => {
                write!(f, "low_confidence_classification:{confidence:.2}")
            }
            Self::MissingEntity(kind) => write!(f, "missing_entity:{kind}"),
            Self::ExternalUnavailable(source) => write!(f, "external_unavailable:{source}"),
            Self::ExternalTimeout(source) => write!(f, "external_timeout:{source}"),
            Self::PartialAnswer(source) => write!(f, "partial_answer:{source}"),
            Self::SynthesisFailure(detail) => write!(f, "synthesis_failure:{detail}"),
        }
    }
}
