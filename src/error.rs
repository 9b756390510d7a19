// Per-item skip reasons. None of these abort a run.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    #[error("item has no publication timestamp")]
    MissingTimestamp,

    #[error("unparseable publication timestamp: {0:?}")]
    UnparseableTimestamp(String),

    #[error("publication timestamp has no timezone: {0:?}")]
    NaiveTimestamp(String),
}
