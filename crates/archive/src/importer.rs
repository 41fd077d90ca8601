//! Archive → new proposal
//!
//! The archive is read and its manifest parsed before anything is sent, so a
//! malformed archive never creates a proposal. Once the proposal service has
//! created the new aggregate, documents and instrument payloads are attached
//! to it independently; each attachment settles on its own and ends up in the
//! report. Nothing is rolled back.

use crate::container::{ArchiveContents, ArchiveEntry, PayloadEntry};
use crate::errors::ArchiveError;
use crate::layout::EntryKind;
use crate::remap::ObservationRemap;
use crate::report::{ItemKind, ItemOutcome, TransferReport};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use polaris_common::config::ArchiveConfig;
use polaris_common::errors::AppError;
use polaris_common::metrics::OperationMetrics;
use polaris_common::models::{InstrumentPayload, ObservingProposal, PayloadKey, ProposalId};
use polaris_common::{Credential, DocumentStore, InstrumentBridge, ProposalService};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Result of a completed import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub operation_id: Uuid,
    /// Id of the newly created proposal
    pub proposal_id: ProposalId,
    pub title: String,
    /// Verified old→new observation mapping; `None` when verification failed
    pub remap: Option<ObservationRemap>,
    pub completed_at: DateTime<Utc>,
    pub items: TransferReport,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        self.items.summary()
    }

    pub fn is_complete(&self) -> bool {
        self.items.is_complete()
    }
}

/// Creates proposals from archives
pub struct ArchiveImporter {
    proposals: Arc<dyn ProposalService>,
    documents: Arc<dyn DocumentStore>,
    instruments: Arc<dyn InstrumentBridge>,
    max_document_size_bytes: usize,
    max_concurrent_transfers: usize,
}

/// One attachment to make against the new proposal
enum Upload {
    Document(ArchiveEntry),
    Payload {
        entry_name: String,
        payload: InstrumentPayload,
    },
}

impl ArchiveImporter {
    pub fn new(
        proposals: Arc<dyn ProposalService>,
        documents: Arc<dyn DocumentStore>,
        instruments: Arc<dyn InstrumentBridge>,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            proposals,
            documents,
            instruments,
            max_document_size_bytes: config.max_document_size_bytes,
            max_concurrent_transfers: config.max_concurrent_transfers.max(1),
        }
    }

    /// Import `archive` as a brand-new proposal.
    ///
    /// Fails when the archive or manifest is unusable or the proposal cannot
    /// be created; attachment failures are in the returned report.
    #[instrument(skip(self, credential, archive), fields(size = archive.len(), operation_id = tracing::field::Empty))]
    pub async fn import(
        &self,
        credential: &Credential,
        archive: &[u8],
    ) -> Result<ImportReport, ArchiveError> {
        let operation_id = Uuid::new_v4();
        tracing::Span::current().record("operation_id", tracing::field::display(&operation_id));

        let metrics = OperationMetrics::start("import");
        let result = self.run(credential, archive, operation_id).await;
        match &result {
            Ok(report) => {
                report.items.record("import");
                metrics.finish(report.items.outcome());
            }
            Err(e) => {
                warn!(error = %e, "Import failed");
                metrics.finish("failed");
            }
        }
        result
    }

    async fn run(
        &self,
        credential: &Credential,
        archive: &[u8],
        operation_id: Uuid,
    ) -> Result<ImportReport, ArchiveError> {
        let contents = ArchiveContents::read(archive, self.max_document_size_bytes)?;
        let submitted: ObservingProposal =
            serde_json::from_slice(&contents.manifest).map_err(ArchiveError::InvalidManifest)?;
        debug!(
            documents = contents.documents.len(),
            payloads = contents.payloads.len(),
            ignored = contents.ignored.len(),
            "Archive read"
        );

        let created = self
            .proposals
            .create_proposal(credential, &submitted)
            .await
            .map_err(ArchiveError::ProposalCreation)?;
        let proposal_id = created.id.ok_or(ArchiveError::MissingIdentifier)?;
        info!(proposal_id, title = %created.title, "Proposal created");

        let remap = match ObservationRemap::positional(&submitted.observations, &created.observations)
        {
            Ok(remap) => Some(remap),
            Err(e) => {
                warn!(proposal_id, error = %e, "Observation ids could not be remapped");
                None
            }
        };

        let mut items = TransferReport::new();
        for name in &contents.invalid_instrument {
            items.push(ItemOutcome::skipped(
                ItemKind::InstrumentPayload,
                name.as_str(),
                "not an instrument payload file name",
            ));
        }

        for entry in &contents.oversized {
            let kind = match entry.kind {
                EntryKind::InstrumentPayload { .. } => ItemKind::InstrumentPayload,
                _ => ItemKind::Document,
            };
            let error = AppError::PayloadTooLarge {
                size: usize::try_from(entry.size).unwrap_or(usize::MAX),
                limit: self.max_document_size_bytes,
            };
            warn!(entry = %entry.name, error = %error, "Entry over size limit not uploaded");
            items.push(ItemOutcome::failed(kind, entry.name.as_str(), error));
        }

        let mut uploads = Vec::with_capacity(contents.documents.len() + contents.payloads.len());
        uploads.extend(contents.documents.into_iter().map(Upload::Document));
        for entry in contents.payloads {
            match self.prepare_payload(proposal_id, remap.as_ref(), &entry) {
                Ok(payload) => uploads.push(Upload::Payload {
                    entry_name: entry.name,
                    payload,
                }),
                Err(outcome) => {
                    warn!(entry = %outcome.name, status = ?outcome.status, "Payload not saved");
                    items.push(outcome);
                }
            }
        }

        let tasks: Vec<BoxFuture<'_, ItemOutcome>> = uploads
            .into_iter()
            .map(|upload| self.upload(credential, proposal_id, upload))
            .collect();
        let settled: Vec<ItemOutcome> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent_transfers)
            .collect()
            .await;
        items.extend(settled);

        info!(proposal_id, summary = %items.summary(), "Import finished");
        Ok(ImportReport {
            operation_id,
            proposal_id,
            title: created.title,
            remap,
            completed_at: Utc::now(),
            items,
        })
    }

    /// Parse and re-key one payload entry, or say why it cannot be saved
    fn prepare_payload(
        &self,
        proposal_id: ProposalId,
        remap: Option<&ObservationRemap>,
        entry: &PayloadEntry,
    ) -> Result<InstrumentPayload, ItemOutcome> {
        let kind = ItemKind::InstrumentPayload;
        let remap = remap.ok_or_else(|| {
            ItemOutcome::failed(kind, entry.name.as_str(), "observation ids could not be remapped")
        })?;
        let observation_id = remap.resolve(entry.original_observation_id).ok_or_else(|| {
            ItemOutcome::skipped(
                kind,
                entry.name.as_str(),
                format!(
                    "observation {} is not part of the proposal",
                    entry.original_observation_id
                ),
            )
        })?;
        let payload: InstrumentPayload = serde_json::from_slice(&entry.content).map_err(|e| {
            ItemOutcome::failed(kind, entry.name.as_str(), format!("invalid payload: {}", e))
        })?;
        Ok(payload.rekeyed(PayloadKey::new(proposal_id, observation_id)))
    }

    fn upload<'a>(
        &'a self,
        credential: &'a Credential,
        proposal_id: ProposalId,
        upload: Upload,
    ) -> BoxFuture<'a, ItemOutcome> {
        async move {
            match upload {
                Upload::Document(document) => {
                    match self
                        .documents
                        .upload_document(credential, proposal_id, &document.name, document.content)
                        .await
                    {
                        Ok(_) => ItemOutcome::succeeded(ItemKind::Document, document.name),
                        Err(e) => {
                            warn!(entry = %document.name, error = %e, "Document upload failed");
                            ItemOutcome::failed(ItemKind::Document, document.name, e)
                        }
                    }
                }
                Upload::Payload {
                    entry_name,
                    payload,
                } => match self.instruments.save_payload(credential, &payload).await {
                    Ok(()) => ItemOutcome::succeeded(ItemKind::InstrumentPayload, entry_name),
                    Err(e) => {
                        warn!(entry = %entry_name, error = %e, "Payload save failed");
                        ItemOutcome::failed(ItemKind::InstrumentPayload, entry_name, e)
                    }
                },
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ArchiveWriter;
    use crate::layout::{instrument_entry_name, MANIFEST_FILE_NAME, OVERVIEW_FILE_NAME};
    use crate::report::ItemStatus;
    use polaris_common::client::InMemoryPolaris;
    use polaris_common::models::{Observation, ObservationKind};
    use serde_json::json;

    fn importer(service: &Arc<InMemoryPolaris>, config: &ArchiveConfig) -> ArchiveImporter {
        ArchiveImporter::new(service.clone(), service.clone(), service.clone(), config)
    }

    fn manifest() -> ObservingProposal {
        let mut proposal = ObservingProposal::new("Dust in M31", "Mapping dust lanes");
        proposal.id = Some(1);
        proposal.observations = vec![
            Observation::new(ObservationKind::Target).with_id(10),
            Observation::new(ObservationKind::Calibration).with_id(11),
        ];
        proposal
    }

    fn payload_json(observation_id: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "primaryKey": {"proposalID": "1", "observationID": observation_id.to_string()},
            "telescopeName": "WHT",
            "instrumentName": "WEAVE"
        }))
        .unwrap()
    }

    fn archive_with(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(true);
        writer
            .add(MANIFEST_FILE_NAME, &serde_json::to_vec(&manifest()).unwrap())
            .unwrap();
        writer.add(OVERVIEW_FILE_NAME, b"%PDF").unwrap();
        for (name, content) in entries {
            writer.add(name, content).unwrap();
        }
        writer.finish().unwrap()
    }

    #[tokio::test]
    async fn test_import_rekeys_payloads_to_new_ids() {
        let service = Arc::new(InMemoryPolaris::starting_at(100));
        let archive = archive_with(&[
            ("notes.txt", b"some notes".to_vec()),
            (&instrument_entry_name(11), payload_json(11)),
        ]);

        let report = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        assert!(report.is_complete());
        let created = service.proposal(report.proposal_id).await.unwrap();
        let new_calibration = created.observations[1].id.unwrap();
        assert_ne!(new_calibration, 11);

        let payloads = service.payloads_of(report.proposal_id).await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(
            payloads[0].primary_key,
            PayloadKey::new(report.proposal_id, new_calibration)
        );
        assert_eq!(payloads[0].body["instrumentName"], "WEAVE");

        let documents = service.documents_of(report.proposal_id).await;
        assert_eq!(documents, vec![("notes.txt".to_string(), b"some notes".to_vec())]);
    }

    #[tokio::test]
    async fn test_missing_manifest_creates_nothing() {
        let service = Arc::new(InMemoryPolaris::new());
        let mut writer = ArchiveWriter::new(true);
        writer.add("notes.txt", b"some notes").unwrap();
        let archive = writer.finish().unwrap();

        let err = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(service.create_calls().await, 0);
    }

    #[tokio::test]
    async fn test_unparsable_manifest_creates_nothing() {
        let service = Arc::new(InMemoryPolaris::new());
        let mut writer = ArchiveWriter::new(true);
        writer.add(MANIFEST_FILE_NAME, b"{not json").unwrap();
        let archive = writer.finish().unwrap();

        let err = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::InvalidManifest(_)));
        assert_eq!(service.create_calls().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_observation_payload_is_skipped() {
        let service = Arc::new(InMemoryPolaris::new());
        let archive = archive_with(&[(&instrument_entry_name(99), payload_json(99))]);

        let report = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        assert!(service.payloads_of(report.proposal_id).await.is_empty());
        assert!(matches!(report.items.items[0].status, ItemStatus::Skipped { .. }));
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_oversized_document_is_reported() {
        let service = Arc::new(InMemoryPolaris::new());
        let config = ArchiveConfig {
            max_document_size_bytes: 4,
            ..ArchiveConfig::default()
        };
        let archive = archive_with(&[
            ("big.bin", vec![0u8; 5]),
            ("small.txt", b"ok".to_vec()),
        ]);

        let report = importer(&service, &config)
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        assert_eq!(report.summary(), "1/2 documents failed, 0/0 instrument payloads attached");
        let documents = service.documents_of(report.proposal_id).await;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, "small.txt");
    }

    #[tokio::test]
    async fn test_compressed_oversized_entries_fail_without_upload() {
        let service = Arc::new(InMemoryPolaris::new());
        let config = ArchiveConfig {
            max_document_size_bytes: 64 * 1024,
            ..ArchiveConfig::default()
        };
        let archive = archive_with(&[
            ("zeros.bin", vec![0u8; 8 * 1024 * 1024]),
            (&instrument_entry_name(10), vec![b' '; 128 * 1024]),
            ("notes.txt", b"some notes".to_vec()),
        ]);
        assert!(archive.len() < 64 * 1024);

        let report = importer(&service, &config)
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        assert_eq!(
            report.summary(),
            "1/2 documents failed, 1/1 instrument payloads failed"
        );
        let failed: Vec<_> = report.items.failures().map(|item| item.name.as_str()).collect();
        assert_eq!(failed, vec!["zeros.bin", "telescopes/observation_10.json"]);
        match &report.items.items[0].status {
            ItemStatus::Failed { reason } => assert!(reason.contains("8388608 bytes")),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(service.payloads_of(report.proposal_id).await.is_empty());
        assert_eq!(service.documents_of(report.proposal_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_is_fatal() {
        let service = Arc::new(InMemoryPolaris::new());
        service.fail_create().await;
        let archive = archive_with(&[
            ("notes.txt", b"some notes".to_vec()),
            (&instrument_entry_name(10), payload_json(10)),
        ]);

        let err = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ArchiveError::ProposalCreation(AppError::Upstream { status: 500, .. })
        ));
        assert!(!err.is_precondition());
        assert_eq!(service.create_calls().await, 1);
        assert_eq!(service.proposal_count().await, 0);
    }

    #[tokio::test]
    async fn test_created_proposal_without_id_is_fatal() {
        let service = Arc::new(InMemoryPolaris::new());
        service.strip_created_id().await;
        let archive = archive_with(&[
            ("notes.txt", b"some notes".to_vec()),
            (&instrument_entry_name(10), payload_json(10)),
        ]);

        let err = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap_err();

        assert!(matches!(err, ArchiveError::MissingIdentifier));
        // the service stored the proposal under id 1 but nothing was attached to it
        assert_eq!(service.proposal_count().await, 1);
        assert!(service.documents_of(1).await.is_empty());
        assert!(service.payloads_of(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payload_json_and_stray_entries() {
        let service = Arc::new(InMemoryPolaris::new());
        let archive = archive_with(&[
            (&instrument_entry_name(10), b"[]".to_vec()),
            ("telescopes/readme.txt", b"?".to_vec()),
            ("__MACOSX/._notes.txt", b"".to_vec()),
        ]);

        let report = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        let tally = report.items.tally(ItemKind::InstrumentPayload);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.skipped, 1);
        assert_eq!(report.items.tally(ItemKind::Document).total(), 0);
    }

    #[tokio::test]
    async fn test_reordering_service_fails_payloads_but_keeps_documents() {
        let service = Arc::new(InMemoryPolaris::new());
        service.reverse_observations_on_create().await;
        let archive = archive_with(&[
            ("notes.txt", b"some notes".to_vec()),
            (&instrument_entry_name(10), payload_json(10)),
        ]);

        let report = importer(&service, &ArchiveConfig::default())
            .import(&Credential::bearer("t"), &archive)
            .await
            .unwrap();

        assert!(report.remap.is_none());
        assert_eq!(report.summary(), "1/1 documents attached, 1/1 instrument payloads failed");
        assert!(service.payloads_of(report.proposal_id).await.is_empty());
    }
}
