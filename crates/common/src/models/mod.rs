//! Proposal tool data model
//!
//! Transient client-side copies of the entities owned by the proposal tool.

mod instrument;
mod proposal;

pub use instrument::{InstrumentPayload, PayloadKey};
pub use proposal::{
    Justification,
    ObjectIdentifier,
    Observation,
    ObservationKind,
    ObservingProposal,
};

/// Server-assigned proposal identifier
pub type ProposalId = i64;

/// Server-assigned observation identifier
pub type ObservationId = i64;

/// Server-assigned supporting document identifier
pub type DocumentId = i64;
