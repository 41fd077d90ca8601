//! Old→new observation identity mapping after import
//!
//! The proposal service re-identifies every observation on create and hands
//! the list back in submission order, so the k-th submitted observation is
//! the k-th created one. Everything that correlation relies on is checked
//! here, so a service that reorders or drops observations is detected instead
//! of silently attaching payloads to the wrong observation.

use polaris_common::models::{Observation, ObservationId, ObservationKind};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemapError {
    #[error("submitted {submitted} observations but the service returned {created}")]
    CountMismatch { submitted: usize, created: usize },

    #[error("created observation at position {position} has no id")]
    MissingCreatedId { position: usize },

    #[error("service assigned id {id} to more than one observation")]
    DuplicateCreatedId { id: ObservationId },

    #[error("observation at position {position} was submitted as {submitted:?} but created as {created:?}")]
    KindMismatch {
        position: usize,
        submitted: ObservationKind,
        created: ObservationKind,
    },

    #[error("submitted observation id {id} appears more than once")]
    DuplicateSubmittedId { id: ObservationId },
}

/// Bijection between submitted and created observation ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservationRemap {
    by_original: HashMap<ObservationId, ObservationId>,
    pairs: Vec<(Option<ObservationId>, ObservationId)>,
}

impl ObservationRemap {
    /// Pair `submitted[k]` with `created[k]` for every k.
    ///
    /// Submitted observations without an id take part in the checks but can
    /// never be looked up.
    pub fn positional(
        submitted: &[Observation],
        created: &[Observation],
    ) -> Result<Self, RemapError> {
        if submitted.len() != created.len() {
            return Err(RemapError::CountMismatch {
                submitted: submitted.len(),
                created: created.len(),
            });
        }

        let mut by_original = HashMap::with_capacity(submitted.len());
        let mut pairs = Vec::with_capacity(submitted.len());
        let mut seen_new = HashSet::with_capacity(created.len());

        for (position, (old, new)) in submitted.iter().zip(created).enumerate() {
            let new_id = new.id.ok_or(RemapError::MissingCreatedId { position })?;
            if !seen_new.insert(new_id) {
                return Err(RemapError::DuplicateCreatedId { id: new_id });
            }
            if old.kind() != new.kind() {
                return Err(RemapError::KindMismatch {
                    position,
                    submitted: old.kind(),
                    created: new.kind(),
                });
            }
            if let Some(old_id) = old.id {
                if by_original.insert(old_id, new_id).is_some() {
                    return Err(RemapError::DuplicateSubmittedId { id: old_id });
                }
            }
            pairs.push((old.id, new_id));
        }

        Ok(Self { by_original, pairs })
    }

    /// New id of the observation that had `original` in the submitted list
    pub fn resolve(&self, original: ObservationId) -> Option<ObservationId> {
        self.by_original.get(&original).copied()
    }

    /// (submitted id, created id) in list order
    pub fn pairs(&self) -> &[(Option<ObservationId>, ObservationId)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
