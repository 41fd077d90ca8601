//! Observing proposal aggregate

use super::{DocumentId, ObservationId, ProposalId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Aggregate root describing a proposed set of observations.
///
/// Fields the client does not model are kept in `extra` so that a proposal
/// read from the service and written back out loses nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservingProposal {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProposalId>,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Order is significant: it is the only correlation between an exported
    /// copy and the copy the service creates on import.
    #[serde(default)]
    pub observations: Vec<Observation>,

    #[serde(default)]
    pub supporting_documents: Vec<ObjectIdentifier>,

    #[serde(default)]
    pub investigators: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_justification: Option<Justification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_justification: Option<Justification>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObservingProposal {
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Identifiers of the observations, in list order
    pub fn observation_ids(&self) -> Vec<Option<ObservationId>> {
        self.observations.iter().map(|o| o.id).collect()
    }

    /// Index of the observation carrying `id`
    pub fn position_of(&self, id: ObservationId) -> Option<usize> {
        self.observations.iter().position(|o| o.id == Some(id))
    }
}

/// Discriminator between target and calibration observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Target,
    Calibration,
}

impl ObservationKind {
    /// Type tag used by the proposal tool
    pub fn type_tag(&self) -> &'static str {
        match self {
            ObservationKind::Target => "proposal:TargetObservation",
            ObservationKind::Calibration => "proposal:CalibrationObservation",
        }
    }
}

/// A single requested measurement within a proposal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<String>,

    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObservationId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_goal: Option<Value>,

    /// Calibration intent, only present on calibration observations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Observation {
    pub fn new(kind: ObservationKind) -> Self {
        Self {
            type_tag: Some(kind.type_tag().to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: ObservationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Anything not tagged as a calibration is a target observation
    pub fn kind(&self) -> ObservationKind {
        match self.type_tag.as_deref() {
            Some(tag) if tag.contains("Calibration") => ObservationKind::Calibration,
            _ => ObservationKind::Target,
        }
    }
}

/// Lightweight listing entry (supporting documents, proposals in a cycle)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectIdentifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbid: Option<DocumentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ObjectIdentifier {
    pub fn new(dbid: DocumentId, name: impl Into<String>) -> Self {
        Self {
            dbid: Some(dbid),
            name: Some(name.into()),
            code: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    #[serde(default)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
