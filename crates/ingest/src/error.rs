use thiserror::Error;

use bugwatch_connector::RemoteError;
use bugwatch_storage::StoreError;

/// Why a pipeline run did not complete.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("remote search failed for saved search {search_id}: {source}")]
    SearchFailed {
        search_id: i64,
        #[source]
        source: RemoteError,
    },

    #[error("remote detail fetch failed for saved search {search_id}: {source}")]
    FetchFailed {
        search_id: i64,
        #[source]
        source: RemoteError,
    },

    #[error("saved search not found: {0}")]
    SearchNotFound(i64),

    #[error("too many unfinished manual runs (limit {0})")]
    TooManyRuns(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SearchFailed { .. } | Self::FetchFailed { .. } => 502,
            Self::SearchNotFound(_) => 404,
            Self::TooManyRuns(_) => 429,
            Self::Store(e) => e.status_code(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("workplace not found: {0}")]
    WorkplaceNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for ViewError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(StoreError::Database(e))
    }
}

impl ViewError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::WorkplaceNotFound(_) => 404,
            Self::Store(e) => e.status_code(),
        }
    }
}
