//! Survey workflow: batching, rank validation, navigation and submission

pub mod judgment;
pub mod registry;
pub mod session;

pub use judgment::{
    all_sets_valid, batch_labels, chunk, validate_ranks, JudgmentError, JudgmentRecord,
};
pub use registry::SurveyRegistry;
pub use session::{SurveyError, SurveySession, SurveyView};
