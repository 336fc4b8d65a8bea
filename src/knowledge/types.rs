//! Data types for the temporal knowledge pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fact type tags
// ---------------------------------------------------------------------------

pub const CHALLENGE_DOMAIN: &str = "challenge_domain";
pub const CHALLENGE_DIFFICULTY: &str = "challenge_difficulty";
pub const CHALLENGE_COMPLEXITY: &str = "challenge_complexity";
pub const SOLUTION_AGENT: &str = "solution_agent";
pub const SOLUTION_CONFIDENCE: &str = "solution_confidence";
pub const SOLUTION_EFFICIENCY: &str = "solution_efficiency";
pub const LEARNING_IMPROVEMENT: &str = "learning_improvement";
pub const LEARNING_UNCERTAINTY: &str = "learning_uncertainty";
pub const LEARNING_EFFICIENCY: &str = "learning_efficiency";

// ---------------------------------------------------------------------------
// FactValue
// ---------------------------------------------------------------------------

/// Scalar or string payload of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Text(String),
}

impl FactValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for FactValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl std::fmt::Display for FactValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fact
// ---------------------------------------------------------------------------

/// The smallest independently-timestamped unit of extracted knowledge.
///
/// Facts are never mutated once created. Newer facts supersede older ones
/// through [`ExpiredFact`] records, and merges produce a fresh fact that
/// lists its sources in `merged_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: String,
    pub fact_type: String,
    pub value: FactValue,
    pub domain: String,
    pub challenge_key: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// Confidence of the observation this fact was drawn from.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,
    /// Set once the fact has been stored in the knowledge base.
    #[serde(default)]
    pub stored_at: Option<DateTime<Utc>>,
}

impl Fact {
    pub fn new(
        fact_type: impl Into<String>,
        value: impl Into<FactValue>,
        domain: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            fact_id: uuid::Uuid::new_v4().to_string(),
            fact_type: fact_type.into(),
            value: value.into(),
            domain: domain.into(),
            challenge_key: None,
            timestamp,
            source: source.into(),
            confidence: 1.0,
            merged_from: Vec::new(),
            stored_at: None,
        }
    }

    pub fn with_challenge_key(mut self, challenge_key: impl Into<String>) -> Self {
        self.challenge_key = Some(challenge_key.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = crate::learning::clamp_unit(confidence);
        self
    }

    /// The (type, domain, challenge-key) triple contradictions are keyed on.
    pub fn contradiction_key(&self) -> FactKey {
        FactKey {
            fact_type: self.fact_type.clone(),
            domain: self.domain.clone(),
            challenge_key: self.challenge_key.clone(),
        }
    }
}

/// Identity of a fact for contradiction purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub fact_type: String,
    pub domain: String,
    pub challenge_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Invalidation
// ---------------------------------------------------------------------------

/// A fact that has been superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiredFact {
    pub invalidation_id: String,
    pub original: Fact,
    pub expired_at: DateTime<Utc>,
    pub reason: String,
    pub replacement: Option<Fact>,
}

/// Why the newer side of a contradiction is preferred, if it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// The new fact is more recent.
    TemporalSupersession,
    /// Same age or older, but the new fact is more confident.
    ConfidenceSupersession,
    /// Neither side wins; both are kept.
    ConflictingEvidence,
}

impl ContradictionKind {
    /// Whether the old side should be expired in favour of the new one.
    pub fn supersedes(self) -> bool {
        matches!(self, Self::TemporalSupersession | Self::ConfidenceSupersession)
    }
}

impl std::fmt::Display for ContradictionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TemporalSupersession => write!(f, "temporal_supersession"),
            Self::ConfidenceSupersession => write!(f, "confidence_supersession"),
            Self::ConflictingEvidence => write!(f, "conflicting_evidence"),
        }
    }
}

/// A detected conflict between a new and an existing fact. Query result only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contradiction {
    pub new_fact: Fact,
    pub old_fact: Fact,
    pub kind: ContradictionKind,
    pub new_confidence: f64,
    pub old_confidence: f64,
    /// Set when the pair also trips the numeric confidence-gap rule.
    pub numeric_divergence: bool,
    pub detected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
