//! Reconciliation of untrusted label proposals against extracted candidates.
//!
//! The oracle may invent numbers. Only values that can be traced back to an
//! [`AmountCandidate`] within `epsilon` reach the [`LabeledRecord`], and the
//! stored value is always the candidate's, never the proposal's.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::config::ReconcileConfig;
use crate::models::record::{AmountCandidate, AmountSource, Label, LabelProposal, LabeledRecord};

/// Output of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub record: LabeledRecord,
    /// Provenance per labeled value, in label order.
    pub sources: Vec<AmountSource>,
    /// Whether the record comes from the largest-amount fallback.
    pub used_fallback: bool,
}

/// Candidate-anchored proposal winner for one label.
#[derive(Debug, Clone, Copy)]
struct Choice<'a> {
    candidate: &'a AmountCandidate,
    rank: (bool, usize, usize),
}

pub struct ReconciliationEngine {
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// Merge `proposals` into a labeled record using `candidates` as ground truth.
    pub fn reconcile(
        &self,
        candidates: &[AmountCandidate],
        proposals: &[LabelProposal],
    ) -> Reconciled {
        let mut chosen: BTreeMap<Label, Choice<'_>> = BTreeMap::new();

        for (index, proposal) in proposals.iter().enumerate() {
            let Some(anchor) = self.anchor(candidates, proposal.value) else {
                debug!(
                    "dropping {} = {}: no matching candidate",
                    proposal.raw_label, proposal.value
                );
                continue;
            };

            let rank = (!anchor.indicator_adjacent, anchor.start(), index);
            match chosen.get(&proposal.label) {
                Some(existing) if existing.rank <= rank => {
                    debug!(
                        "{} = {} loses to {} for the same label",
                        proposal.raw_label, proposal.value, existing.candidate.value
                    );
                }
                _ => {
                    chosen.insert(
                        proposal.label,
                        Choice {
                            candidate: anchor,
                            rank,
                        },
                    );
                }
            }
        }

        if chosen.is_empty() {
            return self.fallback(candidates);
        }

        let mut record = LabeledRecord::new();
        let mut sources = Vec::with_capacity(chosen.len());
        for (label, choice) in chosen {
            record.insert(label, choice.candidate.value);
            sources.push(source_for(label, choice.candidate));
        }

        Reconciled {
            record,
            sources,
            used_fallback: false,
        }
    }

    /// The candidate a proposed value refers to. Indicator-adjacent matches win,
    /// then the closest value, then the earliest position.
    fn anchor<'a>(
        &self,
        candidates: &'a [AmountCandidate],
        value: Decimal,
    ) -> Option<&'a AmountCandidate> {
        candidates
            .iter()
            .filter_map(|c| {
                // Out-of-range differences cannot be within epsilon.
                let distance = c.value.checked_sub(value)?.abs();
                (distance <= self.config.epsilon).then_some((c, distance))
            })
            .min_by_key(|(c, distance)| (!c.indicator_adjacent, *distance, c.start()))
            .map(|(c, _)| c)
    }

    fn fallback(&self, candidates: &[AmountCandidate]) -> Reconciled {
        if !self.config.fallback_to_largest {
            return Reconciled::default();
        }

        let mut largest: Option<&AmountCandidate> = None;
        for candidate in candidates.iter().filter(|c| c.value > Decimal::ZERO) {
            if largest.is_none_or(|l| candidate.value > l.value) {
                largest = Some(candidate);
            }
        }

        let Some(largest) = largest else {
            return Reconciled::default();
        };

        debug!("falling back to largest candidate {} as amount_due", largest.value);
        let mut record = LabeledRecord::new();
        record.insert(Label::AmountDue, largest.value);

        Reconciled {
            record,
            sources: vec![source_for(Label::AmountDue, largest)],
            used_fallback: true,
        }
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

fn source_for(label: Label, candidate: &AmountCandidate) -> AmountSource {
    let source = match &candidate.context {
        Some(context) => format!("text: '{}: {}'", context, candidate.raw.trim()),
        None => format!("text: '{}'", candidate.raw.trim()),
    };
    AmountSource {
        label,
        value: candidate.value,
        source,
    }
}
