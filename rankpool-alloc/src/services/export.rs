//! Result export
//!
//! Writes a session's judgments to `ranking_<session>.json`. The file is
//! written to a temporary name first and renamed into place, so readers
//! never observe a partial document.

use rankpool_common::{Error, Result, SessionId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::survey::JudgmentRecord;

/// Exported document layout
#[derive(Debug, Serialize)]
struct ExportDocument<'a> {
    session_id: &'a SessionId,
    num_sets: usize,
    answers: Vec<&'a JudgmentRecord>,
}

/// File name used for a session's export
pub fn export_file_name(session: &SessionId) -> String {
    format!("ranking_{}.json", session)
}

/// Serialize `answers` (ordered by batch index) into `output_dir`
///
/// Creates `output_dir` if needed and overwrites an earlier export of the
/// same session. Returns the path written.
pub fn export_results(
    answers: &BTreeMap<usize, JudgmentRecord>,
    session: &SessionId,
    output_dir: &Path,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let document = ExportDocument {
        session_id: session,
        num_sets: answers.len(),
        answers: answers.values().collect(),
    };
    let body = serde_json::to_vec_pretty(&document)
        .map_err(|e| Error::Internal(format!("Serialize results failed: {}", e)))?;

    let target = output_dir.join(export_file_name(session));
    let tmp = output_dir.join(format!(".{}.tmp", export_file_name(session)));
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, &target)?;

    tracing::info!(
        session = %session,
        num_sets = answers.len(),
        path = %target.display(),
        "Results exported"
    );

    Ok(target)
}
