//! Data types for the self-play learning loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// Knowledge domain a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Domain {
    Programming,
    Reasoning,
    Analysis,
    Safety,
    GoalManagement,
    Metacognitive,
}

impl Domain {
    /// Fixed round-robin rotation order.
    pub const ALL: [Domain; 6] = [
        Self::Programming,
        Self::Reasoning,
        Self::Analysis,
        Self::Safety,
        Self::GoalManagement,
        Self::Metacognitive,
    ];

    /// The domain after this one in rotation order, wrapping at the end.
    pub fn next(self) -> Self {
        let index = Self::ALL
            .iter()
            .position(|domain| *domain == self)
            .unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Parse from a string, defaulting to Programming.
    pub fn from_str_lossy(value: &str) -> Self {
        match value.to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "REASONING" => Self::Reasoning,
            "ANALYSIS" => Self::Analysis,
            "SAFETY" => Self::Safety,
            "GOAL_MANAGEMENT" => Self::GoalManagement,
            "METACOGNITIVE" => Self::Metacognitive,
            _ => Self::Programming,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Programming => write!(f, "PROGRAMMING"),
            Self::Reasoning => write!(f, "REASONING"),
            Self::Analysis => write!(f, "ANALYSIS"),
            Self::Safety => write!(f, "SAFETY"),
            Self::GoalManagement => write!(f, "GOAL_MANAGEMENT"),
            Self::Metacognitive => write!(f, "METACOGNITIVE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Difficulty ladder
// ---------------------------------------------------------------------------

/// The four-rung difficulty ladder, ordered from easiest to hardest.
///
/// Transitions only ever move one rung per call and clamp at both ends.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    /// One rung up, no-op at Expert.
    pub fn increase(self) -> Self {
        match self {
            Self::Beginner => Self::Intermediate,
            Self::Intermediate => Self::Advanced,
            Self::Advanced | Self::Expert => Self::Expert,
        }
    }

    /// One rung down, no-op at Beginner.
    pub fn decrease(self) -> Self {
        match self {
            Self::Expert => Self::Advanced,
            Self::Advanced => Self::Intermediate,
            Self::Intermediate | Self::Beginner => Self::Beginner,
        }
    }

    /// Zero-based position on the ladder.
    pub fn rank(self) -> u8 {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => 1,
            Self::Advanced => 2,
            Self::Expert => 3,
        }
    }

    /// Parse from a string, defaulting to Intermediate.
    pub fn from_str_lossy(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "beginner" => Self::Beginner,
            "advanced" => Self::Advanced,
            "expert" => Self::Expert,
            _ => Self::Intermediate,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evolution direction
// ---------------------------------------------------------------------------

/// Advisory hint derived from the recent advantage window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionDirection {
    Accelerate,
    Stabilize,
    Maintain,
}

impl std::fmt::Display for EvolutionDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accelerate => write!(f, "accelerate"),
            Self::Stabilize => write!(f, "stabilize"),
            Self::Maintain => write!(f, "maintain"),
        }
    }
}

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// Content prefix applied to challenges rewritten after a safety rejection.
pub const SAFETY_REVIEWED_PREFIX: &str = "[SAFETY-REVIEWED]";

/// A problem proposed by the challenger. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub domain: Domain,
    pub difficulty: Difficulty,
    pub content: String,
    pub expected_outcome: String,
    pub safety_requirements: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Challenge {
    /// Build a challenge with a fresh id and domain-derived outcome and
    /// safety requirements.
    pub fn new(domain: Domain, difficulty: Difficulty, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain,
            difficulty,
            content: content.into(),
            expected_outcome: expected_outcome_for(domain, difficulty),
            safety_requirements: default_safety_requirements(domain),
            created_at: Utc::now(),
        }
    }

    /// Minimal challenge used when the generation backend fails.
    pub fn fallback(domain: Domain, difficulty: Difficulty) -> Self {
        Self::new(
            domain,
            difficulty,
            format!("Fallback {domain} challenge at {difficulty} difficulty"),
        )
    }

    /// Derive a new, safety-labelled challenge from this one.
    ///
    /// Keeps domain and difficulty, suffixes the id, marks the content and
    /// tightens the safety requirements. The original is left untouched.
    pub fn safe_alternative(&self) -> Self {
        let mut safety_requirements = self.safety_requirements.clone();
        for requirement in ["no harmful instructions", "human review required"] {
            if !safety_requirements.iter().any(|existing| existing == requirement) {
                safety_requirements.push(requirement.to_string());
            }
        }

        Self {
            id: format!("{}_safe", self.id),
            domain: self.domain,
            difficulty: self.difficulty,
            content: format!("{SAFETY_REVIEWED_PREFIX} {}", self.content),
            expected_outcome: self.expected_outcome.clone(),
            safety_requirements,
            created_at: Utc::now(),
        }
    }

    /// Number of whitespace-separated words in the content.
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

fn expected_outcome_for(domain: Domain, difficulty: Difficulty) -> String {
    let focus = match domain {
        Domain::Programming => "a correct, tested implementation",
        Domain::Reasoning => "a valid chain of inference",
        Domain::Analysis => "a structured breakdown with supported conclusions",
        Domain::Safety => "a response that honours every safety requirement",
        Domain::GoalManagement => "a prioritised, achievable plan",
        Domain::Metacognitive => "an accurate assessment of one's own reasoning",
    };
    format!("{focus} at {difficulty} level")
}

fn default_safety_requirements(domain: Domain) -> Vec<String> {
    let mut requirements = vec!["no harmful content".to_string()];
    match domain {
        Domain::Programming => requirements.push("no destructive system operations".into()),
        Domain::Safety => requirements.push("refuse unsafe requests".into()),
        Domain::GoalManagement => requirements.push("respect stated constraints".into()),
        Domain::Reasoning | Domain::Analysis | Domain::Metacognitive => {}
    }
    requirements
}

// ---------------------------------------------------------------------------
// Solution attempt
// ---------------------------------------------------------------------------

/// One solver strategy's answer to a challenge. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionAttempt {
    /// Informational link to the challenge; not enforced.
    pub challenge_id: String,
    pub agent_label: String,
    pub solution: String,
    /// Clamped to `[0.0, 1.0]` on construction.
    pub confidence: f64,
    /// Wall-clock seconds spent producing the solution.
    pub execution_time_secs: f64,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
}

impl SolutionAttempt {
    pub fn new(
        challenge_id: impl Into<String>,
        agent_label: impl Into<String>,
        solution: impl Into<String>,
        confidence: f64,
        execution_time_secs: f64,
    ) -> Self {
        Self {
            challenge_id: challenge_id.into(),
            agent_label: agent_label.into(),
            solution: solution.into(),
            confidence: clamp_unit(confidence),
            execution_time_secs: execution_time_secs.max(0.0),
            attempt_count: 1,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Learning cycle
// ---------------------------------------------------------------------------

/// The immutable record of one orchestrator iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCycle {
    pub id: String,
    pub challenge: Challenge,
    pub attempts: Vec<SolutionAttempt>,
    pub uncertainty: f64,
    pub challenger_reward: f64,
    pub solver_improvement: f64,
    pub safety_validated: bool,
    pub completed_at: DateTime<Utc>,
}

impl LearningCycle {
    /// Highest confidence among the recorded attempts, zero when empty.
    pub fn best_confidence(&self) -> f64 {
        self.attempts
            .iter()
            .map(|attempt| attempt.confidence)
            .fold(0.0, f64::max)
    }
}

/// Clamp a score into `[0.0, 1.0]`, mapping NaN to zero.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
