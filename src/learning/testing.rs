//! Deterministic collaborator fakes for tests.

use crate::learning::collaborators::{ChallengeGenerator, SafetyPolicy, SafetyVerdict, SolutionDraft};
use crate::learning::{Challenge, Difficulty, Domain};

use anyhow::{Result, anyhow};

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Generator with scripted per-strategy confidences, failures and delays.
#[derive(Debug, Default)]
pub(crate) struct ScriptedGenerator {
    default_confidence: f64,
    confidences: HashMap<String, f64>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    challenge_text: Option<String>,
    fail_challenges: bool,
    fail_guidance: bool,
    contexts: Mutex<Vec<String>>,
    guidance_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub(crate) fn new(default_confidence: f64) -> Self {
        Self {
            default_confidence,
            ..Self::default()
        }
    }

    pub(crate) fn with_confidence(mut self, label: &str, confidence: f64) -> Self {
        self.confidences.insert(label.to_string(), confidence);
        self
    }

    pub(crate) fn failing(mut self, label: &str) -> Self {
        self.failing.insert(label.to_string());
        self
    }

    pub(crate) fn delayed(mut self, label: &str, delay: Duration) -> Self {
        self.delays.insert(label.to_string(), delay);
        self
    }

    pub(crate) fn with_challenge_text(mut self, text: &str) -> Self {
        self.challenge_text = Some(text.to_string());
        self
    }

    pub(crate) fn failing_challenges(mut self) -> Self {
        self.fail_challenges = true;
        self
    }

    pub(crate) fn failing_guidance(mut self) -> Self {
        self.fail_guidance = true;
        self
    }

    /// Contexts passed to challenge generation, oldest first.
    pub(crate) fn contexts(&self) -> Vec<String> {
        self.contexts.lock().map(|contexts| contexts.clone()).unwrap_or_default()
    }

    pub(crate) fn guidance_calls(&self) -> usize {
        self.guidance_calls.load(Ordering::SeqCst)
    }
}

impl ChallengeGenerator for ScriptedGenerator {
    async fn generate_challenge_text(
        &self,
        domain: Domain,
        difficulty: Difficulty,
        context: &str,
    ) -> Result<String> {
        if let Ok(mut contexts) = self.contexts.lock() {
            contexts.push(context.to_string());
        }
        if self.fail_challenges {
            return Err(anyhow!("challenge backend unavailable"));
        }
        Ok(self
            .challenge_text
            .clone()
            .unwrap_or_else(|| format!("scripted {domain} task at {difficulty}")))
    }

    async fn generate_solution(&self, challenge: &Challenge, agent_label: &str) -> Result<SolutionDraft> {
        if let Some(delay) = self.delays.get(agent_label) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(agent_label) {
            return Err(anyhow!("strategy {agent_label} crashed"));
        }
        let confidence = self
            .confidences
            .get(agent_label)
            .copied()
            .unwrap_or(self.default_confidence);
        Ok(SolutionDraft {
            text: format!("{agent_label} answer for {}", challenge.id),
            confidence,
        })
    }

    async fn generate_evolution_guidance(&self, prompt: &str) -> Result<String> {
        self.guidance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_guidance {
            return Err(anyhow!("guidance backend unavailable"));
        }
        Ok(format!("ack: {prompt}"))
    }
}

/// Safety policy with scripted rejections.
#[derive(Debug, Default)]
pub(crate) struct ScriptedSafety {
    blocked_term: Option<String>,
    reject_first: usize,
    erroring: bool,
    calls: AtomicUsize,
}

impl ScriptedSafety {
    pub(crate) fn approving() -> Self {
        Self::default()
    }

    /// Reject any content containing `term`, including safe alternatives.
    pub(crate) fn blocking(term: &str) -> Self {
        Self {
            blocked_term: Some(term.to_string()),
            ..Self::default()
        }
    }

    /// Reject the first `count` validations, approve the rest.
    pub(crate) fn rejecting_first(count: usize) -> Self {
        Self {
            reject_first: count,
            ..Self::default()
        }
    }

    pub(crate) fn erroring() -> Self {
        Self {
            erroring: true,
            ..Self::default()
        }
    }
}

impl SafetyPolicy for ScriptedSafety {
    async fn validate(&self, challenge: &Challenge) -> Result<SafetyVerdict> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.erroring {
            return Err(anyhow!("safety service offline"));
        }
        if call < self.reject_first {
            return Ok(SafetyVerdict::rejected("scripted rejection"));
        }
        if let Some(term) = &self.blocked_term
            && challenge.content.contains(term.as_str())
        {
            return Ok(SafetyVerdict::rejected(format!("contains {term}")));
        }
        Ok(SafetyVerdict::approved())
    }
}
