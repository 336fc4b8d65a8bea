//! Evolving knowledge base: append-only fact log with retirement.

use crate::knowledge::types::Fact;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet, HashSet};

/// One calendar day of the evolution timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineBucket {
    pub period: NaiveDate,
    pub fact_count: usize,
    pub domains: BTreeSet<String>,
}

/// Append-only fact log with retirement and pruning.
///
/// Retired facts stay in the log but drop out of query results. Pruning
/// removes facts from the log entirely and folds them into per-day counts,
/// so the timeline still covers everything ever stored.
#[derive(Debug, Clone, Default)]
pub struct EvolvingKnowledgeBase {
    facts: Vec<Fact>,
    ids: HashSet<String>,
    retired: HashSet<String>,
    pruned: BTreeMap<NaiveDate, BTreeMap<String, usize>>,
}

impl EvolvingKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append facts, stamping each with the storage time. Returns the stored
    /// copies.
    pub fn store(&mut self, facts: Vec<Fact>) -> Vec<Fact> {
        let stored_at = Utc::now();
        let stored: Vec<Fact> = facts
            .into_iter()
            .map(|mut fact| {
                fact.stored_at = Some(stored_at);
                fact
            })
            .collect();
        self.ids.extend(stored.iter().map(|fact| fact.fact_id.clone()));
        self.facts.extend(stored.iter().cloned());
        stored
    }

    /// Active facts matching every supplied filter, in storage order.
    pub fn query(
        &self,
        fact_type: Option<&str>,
        domain: Option<&str>,
        challenge_key: Option<&str>,
    ) -> Vec<Fact> {
        self.active_facts()
            .filter(|fact| fact_type.is_none_or(|wanted| fact.fact_type == wanted))
            .filter(|fact| domain.is_none_or(|wanted| fact.domain == wanted))
            .filter(|fact| {
                challenge_key.is_none_or(|wanted| fact.challenge_key.as_deref() == Some(wanted))
            })
            .cloned()
            .collect()
    }

    /// Hide a fact from queries. Returns false if the id is unknown or was
    /// already retired.
    pub fn retire(&mut self, fact_id: &str) -> bool {
        if !self.ids.contains(fact_id) {
            return false;
        }
        self.retired.insert(fact_id.to_string())
    }

    /// Drop every retired fact, and every active fact `keep` rejects, from
    /// the log. Returns how many facts were removed.
    pub fn prune(&mut self, mut keep: impl FnMut(&Fact) -> bool) -> usize {
        let before = self.facts.len();
        let mut removed = Vec::new();
        self.facts.retain(|fact| {
            let kept = !self.retired.contains(&fact.fact_id) && keep(fact);
            if !kept {
                removed.push((fact.timestamp.date_naive(), fact.domain.clone(), fact.fact_id.clone()));
            }
            kept
        });

        for (period, domain, fact_id) in removed {
            *self.pruned.entry(period).or_default().entry(domain).or_insert(0) += 1;
            self.ids.remove(&fact_id);
            self.retired.remove(&fact_id);
        }
        before - self.facts.len()
    }

    pub fn is_retired(&self, fact_id: &str) -> bool {
        self.retired.contains(fact_id)
    }

    pub fn all_facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn active_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts
            .iter()
            .filter(|fact| !self.retired.contains(&fact.fact_id))
    }

    pub fn active_count(&self) -> usize {
        self.facts.len() - self.retired.len()
    }

    /// Facts currently in the log, retired ones included.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Facts grouped by the calendar day of their timestamp, oldest first.
    ///
    /// Covers the whole log, pruned facts included, so superseded knowledge
    /// still shows up in the history.
    pub fn timeline(&self, domain: Option<&str>) -> Vec<TimelineBucket> {
        let mut buckets: BTreeMap<NaiveDate, TimelineBucket> = BTreeMap::new();
        for (period, counts) in &self.pruned {
            for (fact_domain, count) in counts {
                if domain.is_some_and(|wanted| fact_domain != wanted) {
                    continue;
                }
                let bucket = buckets.entry(*period).or_insert_with(|| TimelineBucket {
                    period: *period,
                    fact_count: 0,
                    domains: BTreeSet::new(),
                });
                bucket.fact_count += count;
                bucket.domains.insert(fact_domain.clone());
            }
        }
        for fact in &self.facts {
            if domain.is_some_and(|wanted| fact.domain != wanted) {
                continue;
            }
            let period = fact.timestamp.date_naive();
            let bucket = buckets.entry(period).or_insert_with(|| TimelineBucket {
                period,
                fact_count: 0,
                domains: BTreeSet::new(),
            });
            bucket.fact_count += 1;
            bucket.domains.insert(fact.domain.clone());
        }
        buckets.into_values().collect()
    }
}
