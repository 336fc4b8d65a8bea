//! Entity resolution: merges facts that describe the same concept.
//!
//! A per-type registry holds the current representative of each entity. An
//! incoming fact is compared against every registered fact of its type using
//! normalised edit-distance similarity; the best match at or above the
//! threshold absorbs it, otherwise the fact becomes a new entity.

use crate::knowledge::KnowledgeConfig;
use crate::knowledge::types::{Fact, FactValue};

use chrono::{DateTime, Utc};
use serde::Serialize;

use std::collections::{HashMap, VecDeque};

/// Audit record for one merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeEvent {
    pub merged_id: String,
    pub merged_from: Vec<String>,
    pub fact_type: String,
    pub similarity: f64,
    pub merged_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EntityResolutionEngine {
    threshold: f64,
    registry: HashMap<String, Vec<Fact>>,
    /// Most recent merges, oldest dropped past `history_cap`.
    merge_history: VecDeque<MergeEvent>,
    history_cap: usize,
}

impl EntityResolutionEngine {
    pub fn new(config: &KnowledgeConfig) -> Self {
        Self {
            threshold: config.similarity_threshold,
            registry: HashMap::new(),
            merge_history: VecDeque::new(),
            history_cap: config.max_history_size.max(1),
        }
    }

    /// Resolve each incoming fact against the registry, in order.
    ///
    /// Returns one fact per input: the merged representative on a match, or
    /// the input itself when it was registered as a new entity. Facts later
    /// in the batch can merge with ones registered earlier in it.
    pub fn resolve(&mut self, facts: Vec<Fact>) -> Vec<Fact> {
        let threshold = self.threshold;
        let mut resolved = Vec::with_capacity(facts.len());

        for fact in facts {
            let entities = self.registry.entry(fact.fact_type.clone()).or_default();

            let best = entities
                .iter()
                .enumerate()
                .map(|(index, existing)| (index, fact_similarity(&existing.value, &fact.value)))
                .filter(|(_, similarity)| *similarity >= threshold)
                .max_by(|(_, a), (_, b)| a.total_cmp(b));

            match best {
                Some((index, similarity)) => {
                    let existing = entities.remove(index);
                    let merged = merge_facts(&existing, &fact);
                    entities.retain(|entity| !merged.merged_from.contains(&entity.fact_id));
                    entities.push(merged.clone());

                    tracing::debug!(
                        fact_type = %merged.fact_type,
                        similarity,
                        "merged fact into existing entity"
                    );
                    self.merge_history.push_back(MergeEvent {
                        merged_id: merged.fact_id.clone(),
                        merged_from: merged.merged_from.clone(),
                        fact_type: merged.fact_type.clone(),
                        similarity,
                        merged_at: Utc::now(),
                    });
                    if self.merge_history.len() > self.history_cap {
                        self.merge_history.pop_front();
                    }
                    resolved.push(merged);
                }
                None => {
                    entities.push(fact.clone());
                    resolved.push(fact);
                }
            }
        }

        resolved
    }

    /// Drop a fact from the registry so later facts cannot merge into it.
    /// Returns false if it was not registered.
    pub fn forget(&mut self, fact_id: &str) -> bool {
        for entities in self.registry.values_mut() {
            if let Some(index) = entities.iter().position(|entity| entity.fact_id == fact_id) {
                entities.remove(index);
                return true;
            }
        }
        false
    }

    /// Keep only the registered facts accepted by `keep`. Returns how many
    /// were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Fact) -> bool) -> usize {
        let before = self.entity_count();
        for entities in self.registry.values_mut() {
            entities.retain(|entity| keep(entity));
        }
        self.registry.retain(|_, entities| !entities.is_empty());
        before - self.entity_count()
    }

    /// Current representatives for a fact type.
    pub fn entities(&self, fact_type: &str) -> &[Fact] {
        self.registry.get(fact_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entity_count(&self) -> usize {
        self.registry.values().map(Vec::len).sum()
    }

    /// Retained merges, oldest first.
    pub fn merge_history(&self) -> impl ExactSizeIterator<Item = &MergeEvent> {
        self.merge_history.iter()
    }
}

/// Combine two matching facts into a fresh fact.
///
/// The later timestamp wins, sources are concatenated, differing values are
/// joined, and both source ids are recorded. Domain and challenge key follow
/// the newer fact.
fn merge_facts(existing: &Fact, incoming: &Fact) -> Fact {
    let (older, newer) = if incoming.timestamp >= existing.timestamp {
        (existing, incoming)
    } else {
        (incoming, existing)
    };

    let value = if existing.value == incoming.value {
        incoming.value.clone()
    } else {
        FactValue::Text(format!("{} | {}", existing.value, incoming.value))
    };

    let source = if existing.source == incoming.source {
        incoming.source.clone()
    } else {
        format!("{}+{}", existing.source, incoming.source)
    };

    Fact {
        fact_id: uuid::Uuid::new_v4().to_string(),
        fact_type: incoming.fact_type.clone(),
        value,
        domain: newer.domain.clone(),
        challenge_key: newer.challenge_key.clone(),
        timestamp: newer.timestamp,
        source,
        confidence: older.confidence.max(newer.confidence),
        merged_from: vec![existing.fact_id.clone(), incoming.fact_id.clone()],
        stored_at: None,
    }
}

/// `1 - levenshtein / max_len` over the values' string forms.
///
/// Identical values score 1.0; an empty value on either side scores 0.0.
pub fn fact_similarity(a: &FactValue, b: &FactValue) -> f64 {
    if a == b {
        return 1.0;
    }
    string_similarity(&a.to_string(), &b.to_string())
}

pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let distance = levenshtein(&a, &b);
    1.0 - distance as f64 / a.len().max(b.len()) as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::{CHALLENGE_DOMAIN, SOLUTION_AGENT, SOLUTION_CONFIDENCE};

    use chrono::Duration;

    fn engine() -> EntityResolutionEngine {
        EntityResolutionEngine::new(&KnowledgeConfig::default())
    }

    #[test]
    fn levenshtein_matches_known_distances() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars("flaw"), &chars("lawn")), 2);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn similarity_edges() {
        assert_eq!(string_similarity("abc", "abc"), 1.0);
        assert_eq!(string_similarity("", "abc"), 0.0);
        assert_eq!(string_similarity("abc", ""), 0.0);
        assert!((string_similarity("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn identical_values_merge_with_later_timestamp() {
        let mut engine = engine();
        let earlier = Utc::now() - Duration::hours(1);
        let later = Utc::now();
        let first = Fact::new(CHALLENGE_DOMAIN, "PROGRAMMING", "PROGRAMMING", earlier, "challenge_extraction");
        let second = Fact::new(CHALLENGE_DOMAIN, "PROGRAMMING", "PROGRAMMING", later, "challenge_extraction");
        let (first_id, second_id) = (first.fact_id.clone(), second.fact_id.clone());

        engine.resolve(vec![first]);
        let resolved = engine.resolve(vec![second]);

        assert_eq!(resolved.len(), 1);
        let entities = engine.entities(CHALLENGE_DOMAIN);
        assert_eq!(entities.len(), 1);
        let merged = &entities[0];
        assert_eq!(merged.timestamp, later);
        assert_eq!(merged.merged_from, vec![first_id, second_id]);
        assert_eq!(merged.value, FactValue::from("PROGRAMMING"));
        assert_eq!(merged.source, "challenge_extraction");
        assert_eq!(engine.merge_history().len(), 1);
    }

    #[test]
    fn similar_values_are_concatenated() {
        let mut engine = engine();
        let now = Utc::now();
        engine.resolve(vec![Fact::new(SOLUTION_AGENT, "step_by_step", "REASONING", now, "a")]);
        let resolved = engine.resolve(vec![Fact::new(SOLUTION_AGENT, "step_by_steps", "REASONING", now, "b")]);

        assert_eq!(resolved[0].value, FactValue::from("step_by_step | step_by_steps"));
        assert_eq!(resolved[0].source, "a+b");
        assert_eq!(engine.entity_count(), 1);
    }

    #[test]
    fn dissimilar_values_become_new_entities() {
        let mut engine = engine();
        let now = Utc::now();
        engine.resolve(vec![
            Fact::new(SOLUTION_CONFIDENCE, 0.7, "PROGRAMMING", now, "s"),
            Fact::new(SOLUTION_CONFIDENCE, 0.25, "PROGRAMMING", now, "s"),
        ]);
        assert_eq!(engine.entities(SOLUTION_CONFIDENCE).len(), 2);
        assert_eq!(engine.merge_history().count(), 0);
    }

    #[test]
    fn different_types_never_merge() {
        let mut engine = engine();
        let now = Utc::now();
        engine.resolve(vec![
            Fact::new(CHALLENGE_DOMAIN, "SAFETY", "SAFETY", now, "s"),
            Fact::new(SOLUTION_AGENT, "SAFETY", "SAFETY", now, "s"),
        ]);
        assert_eq!(engine.entity_count(), 2);
    }

    #[test]
    fn merges_chain_within_one_batch() {
        let mut engine = engine();
        let now = Utc::now();
        let resolved = engine.resolve(vec![
            Fact::new(CHALLENGE_DOMAIN, "ANALYSIS", "ANALYSIS", now, "s"),
            Fact::new(CHALLENGE_DOMAIN, "ANALYSIS", "ANALYSIS", now, "s"),
            Fact::new(CHALLENGE_DOMAIN, "ANALYSIS", "ANALYSIS", now, "s"),
        ]);
        assert_eq!(resolved.len(), 3);
        assert_eq!(engine.entities(CHALLENGE_DOMAIN).len(), 1);
        assert_eq!(engine.merge_history().len(), 2);
        // The last merge absorbs the previous merged fact, not the originals.
        assert_eq!(resolved[2].merged_from[0], resolved[1].fact_id);
    }

    #[test]
    fn forgotten_facts_no_longer_absorb_matches() {
        let mut engine = engine();
        let now = Utc::now();
        let first = engine.resolve(vec![Fact::new(SOLUTION_AGENT, "step_by_step", "REASONING", now, "s")]);

        assert!(engine.forget(&first[0].fact_id));
        assert!(!engine.forget(&first[0].fact_id));

        let next = engine.resolve(vec![Fact::new(SOLUTION_AGENT, "step_by_steps", "REASONING", now, "s")]);
        assert!(next[0].merged_from.is_empty());
        assert_eq!(engine.entities(SOLUTION_AGENT).len(), 1);
    }

    #[test]
    fn retain_prunes_across_types() {
        let mut engine = engine();
        let now = Utc::now();
        let resolved = engine.resolve(vec![
            Fact::new(CHALLENGE_DOMAIN, "SAFETY", "SAFETY", now, "s"),
            Fact::new(SOLUTION_AGENT, "direct", "SAFETY", now, "s"),
            Fact::new(SOLUTION_CONFIDENCE, 0.4, "SAFETY", now, "s"),
        ]);
        let keep = resolved[1].fact_id.clone();

        assert_eq!(engine.retain(|fact| fact.fact_id == keep), 2);
        assert_eq!(engine.entity_count(), 1);
        assert!(engine.entities(CHALLENGE_DOMAIN).is_empty());
    }
}
