//! In-memory proposal tool, for tests and local experiments

use super::{DocumentStore, InstrumentBridge, ProposalService};
use crate::auth::Credential;
use crate::errors::{AppError, Result};
use crate::models::{
    DocumentId, InstrumentPayload, ObjectIdentifier, ObservationId, ObservingProposal, PayloadKey,
    ProposalId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    next_id: i64,
    proposals: BTreeMap<ProposalId, ObservingProposal>,
    documents: BTreeMap<(ProposalId, DocumentId), (String, Vec<u8>)>,
    payloads: BTreeMap<(ProposalId, ObservationId), InstrumentPayload>,
    create_calls: usize,
    failing_downloads: HashSet<DocumentId>,
    failing_uploads: HashSet<String>,
    failing_saves: HashSet<ObservationId>,
    failing_loads: HashSet<ObservationId>,
    reverse_on_create: bool,
    fail_create: bool,
    strip_created_id: bool,
}

impl State {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Proposal, document and instrument services backed by in-process maps.
///
/// Ids come from one shared counter, so proposals, observations and
/// documents never share an id. Failures can be injected per item.
pub struct InMemoryPolaris {
    state: Mutex<State>,
}

impl Default for InMemoryPolaris {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPolaris {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Start id allocation after `offset`
    pub fn starting_at(offset: i64) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: offset,
                ..Default::default()
            }),
        }
    }

    /// Store a proposal as-is, assigning ids to it and to any observation without one
    pub async fn seed_proposal(&self, mut proposal: ObservingProposal) -> ObservingProposal {
        let mut state = self.state.lock().await;
        let id = match proposal.id {
            Some(id) => id,
            None => state.allocate(),
        };
        proposal.id = Some(id);
        for observation in &mut proposal.observations {
            if observation.id.is_none() {
                observation.id = Some(state.allocate());
            }
        }
        state.next_id = state.next_id.max(id);
        state.proposals.insert(id, proposal.clone());
        proposal
    }

    pub async fn seed_document(
        &self,
        proposal_id: ProposalId,
        title: &str,
        content: &[u8],
    ) -> DocumentId {
        let mut state = self.state.lock().await;
        let id = state.allocate();
        state
            .documents
            .insert((proposal_id, id), (title.to_string(), content.to_vec()));
        id
    }

    pub async fn seed_payload(&self, payload: InstrumentPayload) {
        let key = payload.primary_key;
        let mut state = self.state.lock().await;
        state
            .payloads
            .insert((key.proposal_id, key.observation_id), payload);
    }

    pub async fn fail_download_of(&self, document_id: DocumentId) {
        self.state.lock().await.failing_downloads.insert(document_id);
    }

    pub async fn fail_upload_of(&self, title: &str) {
        self.state.lock().await.failing_uploads.insert(title.to_string());
    }

    /// Fail saves whose key names `observation_id`
    pub async fn fail_save_for(&self, observation_id: ObservationId) {
        self.state.lock().await.failing_saves.insert(observation_id);
    }

    pub async fn fail_load_for(&self, observation_id: ObservationId) {
        self.state.lock().await.failing_loads.insert(observation_id);
    }

    /// Return created observations in reverse order, like a service that does
    /// not preserve submission order
    pub async fn reverse_observations_on_create(&self) {
        self.state.lock().await.reverse_on_create = true;
    }

    /// Reject every create call with an upstream error
    pub async fn fail_create(&self) {
        self.state.lock().await.fail_create = true;
    }

    /// Return created proposals without their id
    pub async fn strip_created_id(&self) {
        self.state.lock().await.strip_created_id = true;
    }

    pub async fn create_calls(&self) -> usize {
        self.state.lock().await.create_calls
    }

    pub async fn proposal(&self, proposal_id: ProposalId) -> Option<ObservingProposal> {
        self.state.lock().await.proposals.get(&proposal_id).cloned()
    }

    pub async fn proposal_count(&self) -> usize {
        self.state.lock().await.proposals.len()
    }

    /// (title, content) of every document attached to `proposal_id`
    pub async fn documents_of(&self, proposal_id: ProposalId) -> Vec<(String, Vec<u8>)> {
        let state = self.state.lock().await;
        state
            .documents
            .iter()
            .filter(|((pid, _), _)| *pid == proposal_id)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    pub async fn payloads_of(&self, proposal_id: ProposalId) -> Vec<InstrumentPayload> {
        let state = self.state.lock().await;
        state
            .payloads
            .iter()
            .filter(|((pid, _), _)| *pid == proposal_id)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

fn injected(what: &str) -> AppError {
    AppError::Upstream {
        status: 500,
        message: format!("injected failure: {}", what),
    }
}

#[async_trait]
impl ProposalService for InMemoryPolaris {
    async fn fetch_proposal(
        &self,
        _credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<ObservingProposal> {
        let state = self.state.lock().await;
        let mut proposal = state
            .proposals
            .get(&proposal_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                resource_type: "proposal".to_string(),
                id: proposal_id.to_string(),
            })?;
        proposal.supporting_documents = state
            .documents
            .iter()
            .filter(|((pid, _), _)| *pid == proposal_id)
            .map(|((_, id), (title, _))| ObjectIdentifier::new(*id, title.clone()))
            .collect();
        Ok(proposal)
    }

    async fn create_proposal(
        &self,
        _credential: &Credential,
        proposal: &ObservingProposal,
    ) -> Result<ObservingProposal> {
        let mut state = self.state.lock().await;
        state.create_calls += 1;
        if state.fail_create {
            return Err(injected("proposal create"));
        }

        let mut created = proposal.clone();
        created.id = Some(state.allocate());
        created.supporting_documents.clear();
        for observation in &mut created.observations {
            observation.id = Some(state.allocate());
        }
        if state.reverse_on_create {
            created.observations.reverse();
        }

        if let Some(id) = created.id {
            state.proposals.insert(id, created.clone());
        }
        if state.strip_created_id {
            created.id = None;
        }
        Ok(created)
    }
}

#[async_trait]
impl DocumentStore for InMemoryPolaris {
    async fn list_documents(
        &self,
        _credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObjectIdentifier>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .iter()
            .filter(|((pid, _), _)| *pid == proposal_id)
            .map(|((_, id), (title, _))| ObjectIdentifier::new(*id, title.clone()))
            .collect())
    }

    async fn download_document(
        &self,
        _credential: &Credential,
        proposal_id: ProposalId,
        document_id: DocumentId,
    ) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        if state.failing_downloads.contains(&document_id) {
            return Err(injected("document download"));
        }
        state
            .documents
            .get(&(proposal_id, document_id))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| AppError::NotFound {
                resource_type: "supporting document".to_string(),
                id: document_id.to_string(),
            })
    }

    async fn upload_document(
        &self,
        _credential: &Credential,
        proposal_id: ProposalId,
        title: &str,
        content: Vec<u8>,
    ) -> Result<ObjectIdentifier> {
        let mut state = self.state.lock().await;
        if state.failing_uploads.contains(title) {
            return Err(injected("document upload"));
        }
        if !state.proposals.contains_key(&proposal_id) {
            return Err(AppError::NotFound {
                resource_type: "proposal".to_string(),
                id: proposal_id.to_string(),
            });
        }
        let id = state.allocate();
        state
            .documents
            .insert((proposal_id, id), (title.to_string(), content));
        Ok(ObjectIdentifier::new(id, title))
    }
}

#[async_trait]
impl InstrumentBridge for InMemoryPolaris {
    async fn list_observation_ids(
        &self,
        _credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObservationId>> {
        let state = self.state.lock().await;
        Ok(state
            .payloads
            .keys()
            .filter(|(pid, _)| *pid == proposal_id)
            .map(|(_, oid)| *oid)
            .collect())
    }

    async fn load_payload(
        &self,
        _credential: &Credential,
        key: PayloadKey,
    ) -> Result<InstrumentPayload> {
        let state = self.state.lock().await;
        if state.failing_loads.contains(&key.observation_id) {
            return Err(injected("payload load"));
        }
        state
            .payloads
            .get(&(key.proposal_id, key.observation_id))
            .cloned()
            .ok_or_else(|| AppError::NotFound {
                resource_type: "instrument payload".to_string(),
                id: format!("{}/{}", key.proposal_id, key.observation_id),
            })
    }

    async fn save_payload(
        &self,
        _credential: &Credential,
        payload: &InstrumentPayload,
    ) -> Result<()> {
        let key = payload.primary_key;
        let mut state = self.state.lock().await;
        if state.failing_saves.contains(&key.observation_id) {
            return Err(injected("payload save"));
        }
        let observation_exists = state
            .proposals
            .get(&key.proposal_id)
            .map(|p| p.position_of(key.observation_id).is_some())
            .unwrap_or(false);
        if !observation_exists {
            return Err(AppError::NotFound {
                resource_type: "observation".to_string(),
                id: format!("{}/{}", key.proposal_id, key.observation_id),
            });
        }
        state
            .payloads
            .insert((key.proposal_id, key.observation_id), payload.clone());
        Ok(())
    }
}
