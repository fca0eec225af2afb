//! End-to-end survey flow: allocate, rank every batch, submit, read export

use std::collections::{BTreeMap, HashSet};

use rankpool_alloc::db::AssignmentStore;
use rankpool_alloc::services::Allocator;
use rankpool_alloc::survey::{batch_labels, SurveyError, SurveySession};
use rankpool_alloc::types::{BatchLabel, Rank, ResourceId};
use rankpool_common::db::init_database;
use rankpool_common::SessionId;
use serde_json::Value;
use tempfile::TempDir;

fn reversed_ranks(len: usize) -> BTreeMap<BatchLabel, Option<Rank>> {
    batch_labels(len)
        .into_iter()
        .enumerate()
        .map(|(i, label)| (label, Some((len - i) as Rank)))
        .collect()
}

#[tokio::test]
async fn test_full_survey_exports_every_batch() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("assignments.db"))
        .await
        .unwrap();
    let allocator = Allocator::new(AssignmentStore::new(pool, 5000));

    let ids: Vec<ResourceId> = (0..40).map(|i| format!("sampled_{:02}.png", i)).collect();
    let session = SessionId::parse("participant-7").unwrap();
    let assignment = allocator
        .get_or_create_assignment(&session, &ids, 25, 123)
        .await
        .unwrap();

    let mut survey = SurveySession::new(session.clone(), &assignment, 5);
    assert_eq!(survey.num_sets(), 5);

    for idx in 0..5 {
        assert_eq!(survey.current_index(), idx);
        survey.record_ranking(idx, reversed_ranks(5)).unwrap();
        if idx < 4 {
            survey.next().unwrap();
        }
    }
    assert!(survey.can_submit());

    let out_dir = temp_dir.path().join("outputs");
    let path = survey.submit(&out_dir).unwrap();
    assert_eq!(path, out_dir.join("ranking_participant-7.json"));
    assert!(matches!(survey.next(), Err(SurveyError::AlreadySubmitted)));

    let exported: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(exported["session_id"], "participant-7");
    assert_eq!(exported["num_sets"], 5);

    let answers = exported["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 5);

    let mut ranked: Vec<String> = Vec::new();
    for (idx, answer) in answers.iter().enumerate() {
        assert_eq!(answer["set_idx"], idx);
        // Reversed ranks put the last label first
        assert_eq!(answer["ranked_labels"][0], "E");
        assert_eq!(answer["ranked_ids"][0], assignment[idx * 5 + 4].as_str());
        for id in answer["ranked_ids"].as_array().unwrap() {
            ranked.push(id.as_str().unwrap().to_string());
        }
    }

    let ranked: HashSet<_> = ranked.into_iter().collect();
    let assigned: HashSet<_> = assignment.into_iter().collect();
    assert_eq!(ranked, assigned);
}

#[tokio::test]
async fn test_revisiting_batch_keeps_draft() {
    let ids: Vec<ResourceId> = (0..10).map(|i| format!("{}.jpg", i)).collect();
    let mut survey = SurveySession::new(SessionId::parse("drafts").unwrap(), &ids, 5);

    survey.record_ranking(0, reversed_ranks(5)).unwrap();
    survey.next().unwrap();

    let mut partial = BTreeMap::new();
    partial.insert("A".to_string(), Some(1));
    assert!(survey.record_ranking(1, partial).is_err());

    survey.previous().unwrap();
    survey.next().unwrap();
    assert_eq!(survey.view().current_ranks["A"], Some(1));
    assert!(!survey.can_submit());
}
