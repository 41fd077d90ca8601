//! Archive exchange error types
//!
//! Only failures that abort a whole export or import are errors; a single
//! document or payload failing is recorded in the transfer report instead.

use polaris_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive has no '{name}' entry")]
    MissingManifest { name: String },

    #[error("Manifest could not be parsed: {0}")]
    InvalidManifest(#[source] serde_json::Error),

    #[error("Archive could not be read: {message}")]
    InvalidArchive { message: String },

    #[error("Failed to fetch proposal {proposal_id}: {source}")]
    ProposalFetch {
        proposal_id: i64,
        #[source]
        source: AppError,
    },

    #[error("Failed to list {what} of proposal {proposal_id}: {source}")]
    Listing {
        what: &'static str,
        proposal_id: i64,
        #[source]
        source: AppError,
    },

    #[error("Overview rendering failed: {message}")]
    Overview { message: String },

    #[error("Proposal creation failed: {0}")]
    ProposalCreation(#[source] AppError),

    #[error("Proposal service returned a proposal without an id")]
    MissingIdentifier,

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Whether the failure happened before any service call could be made
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ArchiveError::MissingManifest { .. }
                | ArchiveError::InvalidManifest(_)
                | ArchiveError::InvalidArchive { .. }
        )
    }
}
