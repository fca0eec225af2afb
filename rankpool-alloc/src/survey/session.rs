//! Per-participant survey state
//!
//! A [`SurveySession`] walks one assignment batch by batch. Draft
//! selections are always kept, so navigating back shows what was entered.
//! After a successful submit the session is terminal: every mutation
//! fails with [`SurveyError::AlreadySubmitted`].

use rankpool_common::SessionId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::services::export_results;
use crate::survey::judgment::{
    all_sets_valid, batch_labels, chunk, validate_ranks, JudgmentError, JudgmentRecord,
};
use crate::types::{BatchLabel, Rank, ResourceId};

/// Survey navigation and submission errors
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error(transparent)]
    Judgment(#[from] JudgmentError),

    #[error("Batch {index} does not exist (session has {num_sets} batches)")]
    BatchOutOfRange { index: usize, num_sets: usize },

    #[error("Batch {0} must be fully ranked before moving on")]
    CurrentBatchIncomplete(usize),

    #[error("Already at the last batch")]
    AtLastBatch,

    #[error("Already at the first batch")]
    AtFirstBatch,

    #[error("Submission requires the last batch to be open and every batch ranked")]
    NotReadyToSubmit,

    #[error("Session already submitted")]
    AlreadySubmitted,

    #[error("Export failed: {0}")]
    Export(#[from] rankpool_common::Error),
}

/// Survey progress for one session
#[derive(Debug, Clone)]
pub struct SurveySession {
    session_id: SessionId,
    batches: Vec<Vec<ResourceId>>,
    current: usize,
    answers: BTreeMap<usize, JudgmentRecord>,
    submitted: Option<PathBuf>,
}

/// Serializable snapshot handed to clients
#[derive(Debug, Clone, Serialize)]
pub struct SurveyView {
    pub session_id: SessionId,
    pub num_sets: usize,
    pub current_index: usize,
    pub labels: Vec<BatchLabel>,
    pub current_batch: Vec<ResourceId>,
    pub current_ranks: BTreeMap<BatchLabel, Option<Rank>>,
    pub completed_sets: usize,
    pub can_submit: bool,
    pub submitted: bool,
}

impl SurveySession {
    /// Start a survey over `assignment` split into batches of `set_size`
    pub fn new(session_id: SessionId, assignment: &[ResourceId], set_size: usize) -> Self {
        Self {
            session_id,
            batches: chunk(assignment, set_size),
            current: 0,
            answers: BTreeMap::new(),
            submitted: None,
        }
    }

    /// Rebuild a survey whose results were already exported to `path`
    ///
    /// The session is terminal from the start.
    pub fn submitted_at(
        session_id: SessionId,
        assignment: &[ResourceId],
        set_size: usize,
        path: PathBuf,
    ) -> Self {
        Self {
            submitted: Some(path),
            ..Self::new(session_id, assignment, set_size)
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn num_sets(&self) -> usize {
        self.batches.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_batch(&self) -> &[ResourceId] {
        self.batches.get(self.current).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn answers(&self) -> &BTreeMap<usize, JudgmentRecord> {
        &self.answers
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }

    fn ensure_open(&self) -> Result<(), SurveyError> {
        if self.is_submitted() {
            return Err(SurveyError::AlreadySubmitted);
        }
        Ok(())
    }

    fn is_last(&self) -> bool {
        self.current + 1 >= self.batches.len()
    }

    fn batch_is_complete(&self, index: usize) -> bool {
        self.answers.get(&index).is_some_and(JudgmentRecord::is_complete)
    }

    /// Store the selection for batch `set_idx`
    ///
    /// The draft is saved even when invalid; the validation outcome is
    /// returned so callers can report it.
    pub fn record_ranking(
        &mut self,
        set_idx: usize,
        selection: BTreeMap<BatchLabel, Option<Rank>>,
    ) -> Result<&JudgmentRecord, SurveyError> {
        self.ensure_open()?;

        let batch = self.batches.get(set_idx).ok_or(SurveyError::BatchOutOfRange {
            index: set_idx,
            num_sets: self.batches.len(),
        })?;

        let outcome = validate_ranks(&batch_labels(batch.len()), &selection);
        let record = JudgmentRecord::new(self.session_id.clone(), set_idx, batch, &selection);
        self.answers.insert(set_idx, record);

        outcome?;
        Ok(&self.answers[&set_idx])
    }

    /// Advance to the next batch; the current one must be fully ranked
    pub fn next(&mut self) -> Result<usize, SurveyError> {
        self.ensure_open()?;
        if self.is_last() {
            return Err(SurveyError::AtLastBatch);
        }
        if !self.batch_is_complete(self.current) {
            return Err(SurveyError::CurrentBatchIncomplete(self.current));
        }
        self.current += 1;
        Ok(self.current)
    }

    pub fn previous(&mut self) -> Result<usize, SurveyError> {
        self.ensure_open()?;
        if self.current == 0 {
            return Err(SurveyError::AtFirstBatch);
        }
        self.current -= 1;
        Ok(self.current)
    }

    /// Back to the first batch, keeping recorded answers
    pub fn restart(&mut self) -> Result<usize, SurveyError> {
        self.ensure_open()?;
        self.current = 0;
        Ok(self.current)
    }

    pub fn can_submit(&self) -> bool {
        !self.is_submitted() && self.is_last() && all_sets_valid(&self.answers, self.num_sets())
    }

    /// Answers to export, if the session may be submitted now
    ///
    /// Lets a caller write the export without holding the session, then
    /// close it with [`finish_submit`](Self::finish_submit).
    pub fn submission(&self) -> Result<BTreeMap<usize, JudgmentRecord>, SurveyError> {
        self.ensure_open()?;
        if !self.can_submit() {
            return Err(SurveyError::NotReadyToSubmit);
        }
        Ok(self.answers.clone())
    }

    /// Close the session after `exported` was written to `path`
    ///
    /// Fails if the answers changed since [`submission`](Self::submission)
    /// was taken, so the closed session always matches its export.
    pub fn finish_submit(
        &mut self,
        exported: &BTreeMap<usize, JudgmentRecord>,
        path: PathBuf,
    ) -> Result<PathBuf, SurveyError> {
        self.ensure_open()?;
        if !self.can_submit() || self.answers != *exported {
            return Err(SurveyError::NotReadyToSubmit);
        }
        self.submitted = Some(path.clone());
        Ok(path)
    }

    /// Export results and close the session
    pub fn submit(&mut self, output_dir: &Path) -> Result<PathBuf, SurveyError> {
        let answers = self.submission()?;
        let path = export_results(&answers, &self.session_id, output_dir)?;
        self.finish_submit(&answers, path)
    }

    pub fn view(&self) -> SurveyView {
        let batch = self.current_batch().to_vec();
        let labels = batch_labels(batch.len());
        let current_ranks = match self.answers.get(&self.current) {
            Some(record) => record.label_to_rank.clone(),
            None => labels.iter().map(|l| (l.clone(), None)).collect(),
        };

        SurveyView {
            session_id: self.session_id.clone(),
            num_sets: self.num_sets(),
            current_index: self.current,
            labels,
            current_batch: batch,
            current_ranks,
            completed_sets: self.answers.values().filter(|r| r.is_complete()).count(),
            can_submit: self.can_submit(),
            submitted: self.is_submitted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn survey(n_total: usize, set_size: usize) -> SurveySession {
        let ids: Vec<ResourceId> = (0..n_total).map(|i| format!("{:02}.jpg", i)).collect();
        SurveySession::new(SessionId::parse("survey-test").unwrap(), &ids, set_size)
    }

    fn full_ranks(len: usize) -> BTreeMap<BatchLabel, Option<Rank>> {
        batch_labels(len)
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l, Some((len - i) as Rank)))
            .collect()
    }

    #[test]
    fn test_batches_partition_assignment() {
        let s = survey(10, 5);
        assert_eq!(s.num_sets(), 2);
        assert_eq!(s.current_batch(), &["00.jpg", "01.jpg", "02.jpg", "03.jpg", "04.jpg"]);
    }

    #[test]
    fn test_next_requires_complete_batch() {
        let mut s = survey(10, 5);
        assert!(matches!(s.next(), Err(SurveyError::CurrentBatchIncomplete(0))));

        let mut partial = full_ranks(5);
        partial.insert("C".to_string(), None);
        assert!(matches!(
            s.record_ranking(0, partial),
            Err(SurveyError::Judgment(JudgmentError::Incomplete(_)))
        ));
        // Draft is kept
        assert_eq!(s.answers()[&0].label_to_rank["C"], None);
        assert!(s.next().is_err());

        s.record_ranking(0, full_ranks(5)).unwrap();
        assert_eq!(s.next().unwrap(), 1);
        assert!(matches!(s.next(), Err(SurveyError::AtLastBatch)));
    }

    #[test]
    fn test_previous_and_restart() {
        let mut s = survey(15, 5);
        assert!(matches!(s.previous(), Err(SurveyError::AtFirstBatch)));

        s.record_ranking(0, full_ranks(5)).unwrap();
        s.next().unwrap();
        s.record_ranking(1, full_ranks(5)).unwrap();
        s.next().unwrap();
        assert_eq!(s.previous().unwrap(), 1);
        assert_eq!(s.restart().unwrap(), 0);
        assert_eq!(s.answers().len(), 2);
    }

    #[test]
    fn test_record_ranking_out_of_range_batch() {
        let mut s = survey(10, 5);
        assert!(matches!(
            s.record_ranking(2, full_ranks(5)),
            Err(SurveyError::BatchOutOfRange { index: 2, num_sets: 2 })
        ));
    }

    #[test]
    fn test_submit_flow_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let mut s = survey(10, 5);

        s.record_ranking(0, full_ranks(5)).unwrap();
        assert!(!s.can_submit());
        s.next().unwrap();
        assert!(!s.can_submit());
        assert!(matches!(s.submit(temp_dir.path()), Err(SurveyError::NotReadyToSubmit)));

        s.record_ranking(1, full_ranks(5)).unwrap();
        assert!(s.can_submit());

        let path = s.submit(temp_dir.path()).unwrap();
        assert!(path.exists());
        assert!(s.is_submitted());
        assert!(!s.can_submit());

        assert!(matches!(s.submit(temp_dir.path()), Err(SurveyError::AlreadySubmitted)));
        assert!(matches!(s.previous(), Err(SurveyError::AlreadySubmitted)));
        assert!(matches!(s.restart(), Err(SurveyError::AlreadySubmitted)));
        assert!(matches!(
            s.record_ranking(0, full_ranks(5)),
            Err(SurveyError::AlreadySubmitted)
        ));
    }

    #[test]
    fn test_finish_submit_rejects_changed_answers() {
        let mut s = survey(5, 5);
        s.record_ranking(0, full_ranks(5)).unwrap();

        let snapshot = s.submission().unwrap();
        let mut reordered = full_ranks(5);
        reordered.insert("A".to_string(), Some(1));
        reordered.insert("E".to_string(), Some(5));
        s.record_ranking(0, reordered).unwrap();

        assert!(matches!(
            s.finish_submit(&snapshot, PathBuf::from("ranking_survey-test.json")),
            Err(SurveyError::NotReadyToSubmit)
        ));
        assert!(!s.is_submitted());

        let snapshot = s.submission().unwrap();
        s.finish_submit(&snapshot, PathBuf::from("ranking_survey-test.json"))
            .unwrap();
        assert!(s.is_submitted());
    }

    #[test]
    fn test_submitted_at_is_terminal() {
        let ids: Vec<ResourceId> = (0..10).map(|i| format!("{:02}.jpg", i)).collect();
        let mut s = SurveySession::submitted_at(
            SessionId::parse("done").unwrap(),
            &ids,
            5,
            PathBuf::from("outputs/ranking_done.json"),
        );

        assert!(s.view().submitted);
        assert!(!s.can_submit());
        assert!(matches!(
            s.record_ranking(0, full_ranks(5)),
            Err(SurveyError::AlreadySubmitted)
        ));
        assert!(matches!(s.restart(), Err(SurveyError::AlreadySubmitted)));
    }

    #[test]
    fn test_view_reflects_draft() {
        let mut s = survey(10, 5);
        let mut partial = BTreeMap::new();
        partial.insert("A".to_string(), Some(2));
        let _ = s.record_ranking(0, partial);

        let view = s.view();
        assert_eq!(view.num_sets, 2);
        assert_eq!(view.current_ranks["A"], Some(2));
        assert_eq!(view.current_ranks["B"], None);
        assert_eq!(view.completed_sets, 0);
        assert!(!view.can_submit);
    }
}
