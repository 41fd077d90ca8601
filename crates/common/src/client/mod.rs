//! Service abstractions over the proposal tool
//!
//! Three collaborators are consumed by the archive exchange:
//! - `ProposalService`: the proposal aggregate itself
//! - `DocumentStore`: supporting documents attached to a proposal
//! - `InstrumentBridge`: per-observation instrument payloads
//!
//! `PolarisClient` implements all three over HTTP; `InMemoryPolaris` is the
//! in-process double used by tests.

mod http;
mod memory;

pub use http::PolarisClient;
pub use memory::InMemoryPolaris;

use crate::auth::Credential;
use crate::errors::Result;
use crate::models::{
    DocumentId, InstrumentPayload, ObjectIdentifier, ObservationId, ObservingProposal, PayloadKey,
    ProposalId,
};
use async_trait::async_trait;

/// Create and read proposal aggregates
#[async_trait]
pub trait ProposalService: Send + Sync {
    /// Read the full aggregate in its exportable form
    async fn fetch_proposal(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<ObservingProposal>;

    /// Store `proposal` as a brand-new aggregate.
    ///
    /// The returned copy carries server-assigned ids for the proposal and for
    /// every observation, in the order they were submitted.
    async fn create_proposal(
        &self,
        credential: &Credential,
        proposal: &ObservingProposal,
    ) -> Result<ObservingProposal>;
}

/// Supporting documents attached to a proposal
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObjectIdentifier>>;

    async fn download_document(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
        document_id: DocumentId,
    ) -> Result<Vec<u8>>;

    async fn upload_document(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
        title: &str,
        content: Vec<u8>,
    ) -> Result<ObjectIdentifier>;
}

/// Per-observation instrument payloads, keyed by (proposal, observation)
#[async_trait]
pub trait InstrumentBridge: Send + Sync {
    /// Observations of `proposal_id` that have a stored payload
    async fn list_observation_ids(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObservationId>>;

    async fn load_payload(
        &self,
        credential: &Credential,
        key: PayloadKey,
    ) -> Result<InstrumentPayload>;

    async fn save_payload(
        &self,
        credential: &Credential,
        payload: &InstrumentPayload,
    ) -> Result<()>;
}
