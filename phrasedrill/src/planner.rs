//! Partitions a corpus into contiguous, size-bounded batches of texts.
//!
//! The planner is greedy and single-pass: it keeps extending the current
//! batch while the phrase total stays within `max_phrases`, and closes it as
//! soon as the next text would overflow. A batch closed below `min_phrases`
//! is the accepted under-minimum exception, not an error. Texts are never
//! split, so a single text larger than `max_phrases` stands alone.

use crate::common::{Batch, TextNumber};
use crate::config::BatchPolicy;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Why a stored plan does not describe the current corpus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Batch {index} is empty")]
    EmptyBatch { index: usize },

    #[error("Text {text} does not exist in a corpus of {texts} texts")]
    UnknownText { text: TextNumber, texts: usize },

    #[error("Text {text} appears in more than one batch")]
    DuplicateText { text: TextNumber },

    #[error("Text {expected} is missing or out of order (found {found})")]
    OutOfOrder { expected: TextNumber, found: TextNumber },

    #[error("Texts {from}..={to} are not covered by any batch")]
    Uncovered { from: TextNumber, to: TextNumber },
}

/// Plans batches over per-text phrase counts (`counts[i]` belongs to text `i + 1`).
pub fn plan_batches(counts: &[usize], policy: &BatchPolicy) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<TextNumber> = Vec::new();
    let mut total = 0;

    for (index, &count) in counts.iter().enumerate() {
        let text = index + 1;
        if !current.is_empty() && total + count > policy.max_phrases {
            close(&mut batches, &mut current, total, policy);
            total = 0;
        }
        current.push(text);
        total += count;
    }
    if !current.is_empty() {
        close(&mut batches, &mut current, total, policy);
    }
    batches
}

fn close(batches: &mut Vec<Batch>, current: &mut Vec<TextNumber>, total: usize, policy: &BatchPolicy) {
    if total < policy.min_phrases {
        debug!(texts = ?current, total, "closing batch under minimum");
    }
    batches.push(Batch::new(std::mem::take(current)));
}

/// Checks that `plan` partitions texts `1..=counts.len()` into contiguous,
/// ascending batches.
pub fn validate_plan(counts: &[usize], plan: &[Batch]) -> Result<(), PlanError> {
    let texts = counts.len();
    let mut seen = HashSet::new();
    let mut expected = 1;

    for (index, batch) in plan.iter().enumerate() {
        if batch.is_empty() {
            return Err(PlanError::EmptyBatch { index });
        }
        for &text in batch.texts() {
            if text == 0 || text > texts {
                return Err(PlanError::UnknownText { text, texts });
            }
            if !seen.insert(text) {
                return Err(PlanError::DuplicateText { text });
            }
            if text != expected {
                return Err(PlanError::OutOfOrder { expected, found: text });
            }
            expected += 1;
        }
    }
    if expected <= texts {
        return Err(PlanError::Uncovered { from: expected, to: texts });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plan(counts: &[usize]) -> Vec<Vec<TextNumber>> {
        plan_batches(counts, &BatchPolicy::default())
            .into_iter()
            .map(|b| b.0)
            .collect()
    }

    #[test]
    fn worked_trace_splits_before_overflow() {
        // 4 + 5 = 9 fits, adding 3 would make 12; the remainder stands alone.
        assert_eq!(plan(&[4, 5, 3]), vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn worked_trace_with_unmergeable_middle_batch() {
        // [3] cannot take the 8 without reaching 11, so it closes under minimum.
        assert_eq!(plan(&[4, 5, 3, 8]), vec![vec![1, 2], vec![3], vec![4]]);
    }

    #[test]
    fn keeps_extending_past_minimum_while_under_ceiling() {
        assert_eq!(plan(&[3, 3, 2, 2, 5]), vec![vec![1, 2, 3, 4], vec![5]]);
        assert_eq!(plan(&[10, 1]), vec![vec![1], vec![2]]);
    }

    #[test]
    fn oversized_text_stands_alone() {
        assert_eq!(plan(&[2, 12, 3]), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn validate_rejects_gaps_duplicates_and_disorder() {
        let counts = [4, 5, 3];
        assert_eq!(
            validate_plan(&counts, &[Batch::new(vec![1, 2])]),
            Err(PlanError::Uncovered { from: 3, to: 3 })
        );
        assert_eq!(
            validate_plan(&counts, &[Batch::new(vec![1, 2]), Batch::new(vec![2, 3])]),
            Err(PlanError::DuplicateText { text: 2 })
        );
        assert_eq!(
            validate_plan(&counts, &[Batch::new(vec![2, 1]), Batch::new(vec![3])]),
            Err(PlanError::OutOfOrder { expected: 1, found: 2 })
        );
        assert_eq!(
            validate_plan(&counts, &[Batch::new(vec![1, 2, 3, 4])]),
            Err(PlanError::UnknownText { text: 4, texts: 3 })
        );
        assert_eq!(
            validate_plan(&counts, &[Batch::new(vec![1, 2]), Batch::new(vec![])]),
            Err(PlanError::EmptyBatch { index: 1 })
        );
    }

    proptest! {
        #[test]
        fn plans_partition_and_respect_bounds(counts in prop::collection::vec(1usize..=12, 1..40)) {
            let policy = BatchPolicy::default();
            let batches = plan_batches(&counts, &policy);

            prop_assert!(validate_plan(&counts, &batches).is_ok());
            let planned: usize = batches.iter().map(|b| b.total(&counts)).sum();
            prop_assert_eq!(planned, counts.iter().sum::<usize>());

            for (i, batch) in batches.iter().enumerate() {
                let total = batch.total(&counts);
                if batch.len() > 1 {
                    prop_assert!(total <= policy.max_phrases);
                }
                let is_last = i + 1 == batches.len();
                if total < policy.min_phrases && !is_last {
                    // Under minimum only when the next text could not be absorbed.
                    let next = batches[i + 1].first().unwrap();
                    prop_assert!(total + counts[next - 1] > policy.max_phrases);
                }
            }
        }

        #[test]
        fn planning_is_deterministic(counts in prop::collection::vec(1usize..=10, 1..30)) {
            let policy = BatchPolicy::default();
            prop_assert_eq!(plan_batches(&counts, &policy), plan_batches(&counts, &policy));
        }
    }
}
