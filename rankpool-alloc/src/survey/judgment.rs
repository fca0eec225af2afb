//! Batches, labels and per-batch judgment records

use rankpool_common::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::types::{BatchLabel, Rank, ResourceId};

/// Rank submission problems (local, user-correctable)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JudgmentError {
    #[error("label {0} is not part of this batch")]
    UnknownLabel(BatchLabel),

    #[error("image {0} has no rank")]
    Incomplete(BatchLabel),

    #[error("rank {rank} for image {label} is outside 1..={max}")]
    OutOfRange { label: BatchLabel, rank: Rank, max: usize },

    #[error("rank {0} is used more than once")]
    DuplicateRank(Rank),
}

/// Split an assignment into contiguous batches of `set_size`
pub fn chunk(ids: &[ResourceId], set_size: usize) -> Vec<Vec<ResourceId>> {
    if set_size == 0 {
        return Vec::new();
    }
    ids.chunks(set_size).map(|c| c.to_vec()).collect()
}

/// Labels `A`, `B`, ... for a batch of `len` images
pub fn batch_labels(len: usize) -> Vec<BatchLabel> {
    (b'A'..=b'Z')
        .take(len)
        .map(|c| char::from(c).to_string())
        .collect()
}

/// Check that the ranks form a permutation of `1..=labels.len()`
///
/// Returns the labels ordered best (rank 1) to worst.
pub fn validate_ranks(
    labels: &[BatchLabel],
    label_to_rank: &BTreeMap<BatchLabel, Option<Rank>>,
) -> Result<Vec<BatchLabel>, JudgmentError> {
    if let Some(unknown) = label_to_rank.keys().find(|l| !labels.contains(l)) {
        return Err(JudgmentError::UnknownLabel(unknown.clone()));
    }

    let max = labels.len();
    let mut seen = BTreeSet::new();
    let mut ranked: Vec<(Rank, BatchLabel)> = Vec::with_capacity(max);

    for label in labels {
        let rank = label_to_rank
            .get(label)
            .copied()
            .flatten()
            .ok_or_else(|| JudgmentError::Incomplete(label.clone()))?;

        if rank == 0 || usize::from(rank) > max {
            return Err(JudgmentError::OutOfRange {
                label: label.clone(),
                rank,
                max,
            });
        }
        if !seen.insert(rank) {
            return Err(JudgmentError::DuplicateRank(rank));
        }
        ranked.push((rank, label.clone()));
    }

    ranked.sort();
    Ok(ranked.into_iter().map(|(_, label)| label).collect())
}

/// One batch's ranking submission
///
/// `ranked_labels` / `ranked_ids` are `None` until the ranks form a full
/// permutation; a record with them set is a completed judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgmentRecord {
    pub session_id: SessionId,
    pub set_idx: usize,
    pub image_labels: Vec<BatchLabel>,
    pub image_ids_by_label: BTreeMap<BatchLabel, ResourceId>,
    pub label_to_rank: BTreeMap<BatchLabel, Option<Rank>>,
    pub ranked_labels: Option<Vec<BatchLabel>>,
    pub ranked_ids: Option<Vec<ResourceId>>,
}

impl JudgmentRecord {
    /// Build a record for `batch` from a (possibly partial) selection
    ///
    /// Labels the selection does not mention are recorded as unranked.
    /// Entries for labels outside the batch are dropped.
    pub fn new(
        session_id: SessionId,
        set_idx: usize,
        batch: &[ResourceId],
        selection: &BTreeMap<BatchLabel, Option<Rank>>,
    ) -> Self {
        let image_labels = batch_labels(batch.len());
        let image_ids_by_label: BTreeMap<BatchLabel, ResourceId> = image_labels
            .iter()
            .cloned()
            .zip(batch.iter().cloned())
            .collect();
        let label_to_rank: BTreeMap<BatchLabel, Option<Rank>> = image_labels
            .iter()
            .map(|l| (l.clone(), selection.get(l).copied().flatten()))
            .collect();

        let ranked_labels = validate_ranks(&image_labels, selection).ok();
        let ranked_ids = ranked_labels.as_ref().map(|labels| {
            labels
                .iter()
                .filter_map(|l| image_ids_by_label.get(l).cloned())
                .collect()
        });

        Self {
            session_id,
            set_idx,
            image_labels,
            image_ids_by_label,
            label_to_rank,
            ranked_labels,
            ranked_ids,
        }
    }

    /// Both best-to-worst orderings are present
    pub fn is_complete(&self) -> bool {
        self.ranked_labels.is_some() && self.ranked_ids.is_some()
    }
}

/// True iff every batch `0..num_sets` has a completed judgment
pub fn all_sets_valid(answers: &BTreeMap<usize, JudgmentRecord>, num_sets: usize) -> bool {
    if answers.len() < num_sets {
        return false;
    }
    (0..num_sets).all(|idx| answers.get(&idx).is_some_and(JudgmentRecord::is_complete))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionId {
        SessionId::parse("judgment-test").unwrap()
    }

    fn batch() -> Vec<ResourceId> {
        ["p.jpg", "q.jpg", "r.jpg", "s.jpg", "t.jpg"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn ranks(values: &[Option<Rank>]) -> BTreeMap<BatchLabel, Option<Rank>> {
        batch_labels(values.len())
            .into_iter()
            .zip(values.iter().copied())
            .collect()
    }

    #[test]
    fn test_chunk_and_labels() {
        let ids: Vec<ResourceId> = (0..12).map(|i| format!("{}.jpg", i)).collect();
        let batches = chunk(&ids, 5);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2], vec!["10.jpg", "11.jpg"]);

        assert_eq!(batch_labels(5), vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_valid_permutation_orders_best_to_worst() {
        let record = JudgmentRecord::new(
            session(),
            0,
            &batch(),
            &ranks(&[Some(3), Some(1), Some(5), Some(2), Some(4)]),
        );

        assert!(record.is_complete());
        assert_eq!(
            record.ranked_labels.unwrap(),
            vec!["B", "D", "A", "E", "C"]
        );
        assert_eq!(
            record.ranked_ids.unwrap(),
            vec!["q.jpg", "s.jpg", "p.jpg", "t.jpg", "r.jpg"]
        );
    }

    #[test]
    fn test_missing_rank_is_incomplete() {
        let selection = ranks(&[Some(1), None, Some(3), Some(2), Some(4)]);
        let labels = batch_labels(5);

        assert_eq!(
            validate_ranks(&labels, &selection),
            Err(JudgmentError::Incomplete("B".to_string()))
        );

        let record = JudgmentRecord::new(session(), 0, &batch(), &selection);
        assert!(!record.is_complete());
        assert_eq!(record.label_to_rank["B"], None);
    }

    #[test]
    fn test_duplicate_rank_rejected() {
        let selection = ranks(&[Some(1), Some(1), Some(3), Some(2), Some(4)]);
        assert_eq!(
            validate_ranks(&batch_labels(5), &selection),
            Err(JudgmentError::DuplicateRank(1))
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        let selection = ranks(&[Some(1), Some(6), Some(3), Some(2), Some(4)]);
        assert!(matches!(
            validate_ranks(&batch_labels(5), &selection),
            Err(JudgmentError::OutOfRange { rank: 6, .. })
        ));

        let zero = ranks(&[Some(0), Some(1), Some(3), Some(2), Some(4)]);
        assert!(matches!(
            validate_ranks(&batch_labels(5), &zero),
            Err(JudgmentError::OutOfRange { rank: 0, .. })
        ));
    }

    #[test]
    fn test_unknown_label_rejected() {
        let mut selection = ranks(&[Some(1), Some(2), Some(3), Some(4), Some(5)]);
        selection.insert("F".to_string(), Some(6));
        assert_eq!(
            validate_ranks(&batch_labels(5), &selection),
            Err(JudgmentError::UnknownLabel("F".to_string()))
        );
    }

    #[test]
    fn test_all_sets_valid() {
        let full = ranks(&[Some(1), Some(2), Some(3), Some(4), Some(5)]);
        let mut answers = BTreeMap::new();
        assert!(!all_sets_valid(&answers, 2));

        answers.insert(0, JudgmentRecord::new(session(), 0, &batch(), &full));
        assert!(!all_sets_valid(&answers, 2));

        let partial = ranks(&[Some(1), None, None, None, None]);
        answers.insert(1, JudgmentRecord::new(session(), 1, &batch(), &partial));
        assert!(!all_sets_valid(&answers, 2));

        answers.insert(1, JudgmentRecord::new(session(), 1, &batch(), &full));
        assert!(all_sets_valid(&answers, 2));
    }

    #[test]
    fn test_all_sets_valid_ignores_key_gaps() {
        // Two records, but batch 1 missing
        let full = ranks(&[Some(1), Some(2), Some(3), Some(4), Some(5)]);
        let mut answers = BTreeMap::new();
        answers.insert(0, JudgmentRecord::new(session(), 0, &batch(), &full));
        answers.insert(2, JudgmentRecord::new(session(), 2, &batch(), &full));
        assert!(!all_sets_valid(&answers, 2));
    }
}
