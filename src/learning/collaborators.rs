//! Capability interfaces for the text backend and the safety policy, plus the
//! production implementations shipped with the crate.
//!
//! The core never inspects how text is produced. It only needs challenge
//! text, a solution with a self-reported confidence, and advisory guidance.
//! Every method may fail; the orchestrator turns failures into safe defaults.

use crate::learning::{Challenge, Difficulty, Domain};

use anyhow::Result;

use std::future::Future;

/// A solver's answer as returned by the backend, before it is timed and
/// wrapped into a [`crate::learning::SolutionAttempt`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionDraft {
    pub text: String,
    pub confidence: f64,
}

/// Text generation backend for both self-play roles.
pub trait ChallengeGenerator: Send + Sync {
    /// Produce challenge text for a domain and difficulty. `context` carries
    /// advisory hints such as the evolution direction.
    fn generate_challenge_text(
        &self,
        domain: Domain,
        difficulty: Difficulty,
        context: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Answer a challenge using the named strategy.
    fn generate_solution(
        &self,
        challenge: &Challenge,
        agent_label: &str,
    ) -> impl Future<Output = Result<SolutionDraft>> + Send;

    /// Free-form guidance for a prompt. Side-effect free from the core's view.
    fn generate_evolution_guidance(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Outcome of a safety review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reason: String,
}

impl SafetyVerdict {
    pub fn approved() -> Self {
        Self {
            is_safe: true,
            reason: "approved".into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: reason.into(),
        }
    }
}

/// Content policy that approves or rewrites challenges.
pub trait SafetyPolicy: Send + Sync {
    fn validate(&self, challenge: &Challenge) -> impl Future<Output = Result<SafetyVerdict>> + Send;

    /// Build a safe replacement for a rejected challenge. The original is
    /// never modified.
    fn derive_safe_alternative(&self, challenge: &Challenge) -> Challenge {
        challenge.safe_alternative()
    }
}

// ---------------------------------------------------------------------------
// TemplateBackend
// ---------------------------------------------------------------------------

/// Deterministic template-driven backend.
///
/// Challenge text comes from a per-domain template, solutions report a
/// confidence that falls with difficulty and varies by strategy, and guidance
/// is a condensed echo of the prompt. Useful as the default backend when no
/// model is wired in.
#[derive(Debug, Clone, Default)]
pub struct TemplateBackend;

impl TemplateBackend {
    pub fn new() -> Self {
        Self
    }

    fn template_for(domain: Domain) -> &'static str {
        match domain {
            Domain::Programming => "Implement a function that solves the following task",
            Domain::Reasoning => "Work through the following logical puzzle",
            Domain::Analysis => "Break down and evaluate the following scenario",
            Domain::Safety => "Identify the risks in the following request and respond safely",
            Domain::GoalManagement => "Plan the steps needed to reach the following goal",
            Domain::Metacognitive => "Reflect on how you would approach the following problem",
        }
    }

    fn base_confidence(difficulty: Difficulty) -> f64 {
        match difficulty {
            Difficulty::Beginner => 0.9,
            Difficulty::Intermediate => 0.75,
            Difficulty::Advanced => 0.55,
            Difficulty::Expert => 0.35,
        }
    }

    fn strategy_offset(agent_label: &str) -> f64 {
        // Stable per-label spread in [-0.1, 0.1].
        let checksum: u32 = agent_label.bytes().map(u32::from).sum();
        (f64::from(checksum % 21) - 10.0) / 100.0
    }
}

impl ChallengeGenerator for TemplateBackend {
    async fn generate_challenge_text(
        &self,
        domain: Domain,
        difficulty: Difficulty,
        context: &str,
    ) -> Result<String> {
        let mut text = format!(
            "{} ({difficulty} level, {domain}).",
            Self::template_for(domain)
        );
        if !context.is_empty() {
            text.push_str(" Focus: ");
            text.push_str(context);
        }
        Ok(text)
    }

    async fn generate_solution(
        &self,
        challenge: &Challenge,
        agent_label: &str,
    ) -> Result<SolutionDraft> {
        let confidence = (Self::base_confidence(challenge.difficulty)
            + Self::strategy_offset(agent_label))
        .clamp(0.0, 1.0);
        Ok(SolutionDraft {
            text: format!("[{agent_label}] response to: {}", challenge.content),
            confidence,
        })
    }

    async fn generate_evolution_guidance(&self, prompt: &str) -> Result<String> {
        let summary: String = prompt.split_whitespace().take(24).collect::<Vec<_>>().join(" ");
        Ok(format!("guidance: {summary}"))
    }
}

// ---------------------------------------------------------------------------
// KeywordSafetyPolicy
// ---------------------------------------------------------------------------

const DEFAULT_BLOCKED_TERMS: &[&str] = &[
    "malware",
    "exploit",
    "weapon",
    "self-harm",
    "credential theft",
    "bypass authentication",
];

/// Rejects challenges whose content mentions a blocked term.
#[derive(Debug, Clone)]
pub struct KeywordSafetyPolicy {
    blocked_terms: Vec<String>,
}

impl KeywordSafetyPolicy {
    pub fn new(blocked_terms: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            blocked_terms: blocked_terms
                .into_iter()
                .map(|term| term.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordSafetyPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_TERMS.iter().copied())
    }
}

impl SafetyPolicy for KeywordSafetyPolicy {
    async fn validate(&self, challenge: &Challenge) -> Result<SafetyVerdict> {
        let content = challenge.content.to_lowercase();
        match self.blocked_terms.iter().find(|term| content.contains(term.as_str())) {
            Some(term) => Ok(SafetyVerdict::rejected(format!("mentions blocked term '{term}'"))),
            None => Ok(SafetyVerdict::approved()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
