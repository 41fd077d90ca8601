//! REST client for the proposal tool API

use super::{DocumentStore, InstrumentBridge, ProposalService};
use crate::auth::Credential;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::{
    DocumentId, InstrumentPayload, ObjectIdentifier, ObservationId, ObservingProposal, PayloadKey,
    ProposalId,
};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

/// HTTP implementation of the proposal, document and instrument services
#[derive(Clone)]
pub struct PolarisClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl PolarisClient {
    /// Create a client rooted at `config.api.base_url`
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self::with_client(client, &config.api.base_url))
    }

    /// Create with an existing reqwest client
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turn a non-success response into the matching `AppError`
    async fn check(response: Response, resource_type: &str, id: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::from_status(status.as_u16(), resource_type, id, body))
    }
}

#[async_trait]
impl ProposalService for PolarisClient {
    #[instrument(skip(self, credential))]
    async fn fetch_proposal(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<ObservingProposal> {
        let url = self.endpoint(&format!("proposals/{}/export", proposal_id));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.header_value())
            .send()
            .await?;
        let response = Self::check(response, "proposal", &proposal_id.to_string()).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, credential, proposal), fields(title = %proposal.title))]
    async fn create_proposal(
        &self,
        credential: &Credential,
        proposal: &ObservingProposal,
    ) -> Result<ObservingProposal> {
        let url = self.endpoint("proposals/import");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .json(proposal)
            .send()
            .await?;
        let response = Self::check(response, "proposal", "import").await?;
        let created: ObservingProposal = response.json().await?;
        debug!(proposal_id = ?created.id, "Proposal created");
        Ok(created)
    }
}

#[async_trait]
impl DocumentStore for PolarisClient {
    async fn list_documents(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObjectIdentifier>> {
        let url = self.endpoint(&format!("proposals/{}/supportingDocuments", proposal_id));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.header_value())
            .send()
            .await?;
        let response = Self::check(response, "proposal", &proposal_id.to_string()).await?;
        Ok(response.json().await?)
    }

    async fn download_document(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
        document_id: DocumentId,
    ) -> Result<Vec<u8>> {
        let url = self.endpoint(&format!(
            "proposals/{}/supportingDocuments/{}/file",
            proposal_id, document_id
        ));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, credential.header_value())
            .send()
            .await?;
        let response =
            Self::check(response, "supporting document", &document_id.to_string()).await?;
        Ok(response.bytes().await?.to_vec())
    }

    #[instrument(skip(self, credential, content), fields(size = content.len()))]
    async fn upload_document(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
        title: &str,
        content: Vec<u8>,
    ) -> Result<ObjectIdentifier> {
        let url = self.endpoint(&format!("proposals/{}/supportingDocuments", proposal_id));
        let form = Form::new()
            .text("title", title.to_string())
            .part("document", Part::bytes(content).file_name(title.to_string()));
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response, "proposal", &proposal_id.to_string()).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl InstrumentBridge for PolarisClient {
    async fn list_observation_ids(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<Vec<ObservationId>> {
        let url = self.endpoint("opticalTelescopes/proposal");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .json(&json!({ "proposalID": proposal_id.to_string() }))
            .send()
            .await?;
        let response = Self::check(response, "proposal", &proposal_id.to_string()).await?;
        let raw: Vec<RawId> = response.json().await?;

        raw.into_iter()
            .map(|id| match id {
                RawId::Number(n) => Ok(n),
                RawId::Text(s) => s.trim().parse().map_err(|_| AppError::InvalidFormat {
                    message: format!("observation id {:?} is not numeric", s),
                }),
            })
            .collect()
    }

    async fn load_payload(
        &self,
        credential: &Credential,
        key: PayloadKey,
    ) -> Result<InstrumentPayload> {
        let url = self.endpoint("opticalTelescopes/load");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .json(&key)
            .send()
            .await?;
        let id = format!("{}/{}", key.proposal_id, key.observation_id);
        let response = Self::check(response, "instrument payload", &id).await?;
        Ok(response.json().await?)
    }

    #[instrument(skip(self, credential, payload), fields(observation_id = payload.primary_key.observation_id))]
    async fn save_payload(
        &self,
        credential: &Credential,
        payload: &InstrumentPayload,
    ) -> Result<()> {
        let url = self.endpoint("opticalTelescopes/save");
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential.header_value())
            .json(payload)
            .send()
            .await?;
        let key = payload.primary_key;
        let id = format!("{}/{}", key.proposal_id, key.observation_id);
        Self::check(response, "instrument payload", &id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_paths() {
        let client = PolarisClient::with_client(reqwest::Client::new(), "http://host/pst/api/");
        assert_eq!(client.base_url(), "http://host/pst/api");
        assert_eq!(
            client.endpoint("/proposals/3/supportingDocuments"),
            "http://host/pst/api/proposals/3/supportingDocuments"
        );
    }

    #[test]
    fn test_new_from_default_config() {
        let client = PolarisClient::new(&AppConfig::default()).unwrap();
        assert_eq!(client.base_url(), crate::DEFAULT_API_BASE);
    }
}
