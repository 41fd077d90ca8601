//! Proposal → archive
//!
//! One export reads a snapshot of the proposal (aggregate, document listing
//! and instrument listing) and renders the overview from that same aggregate.
//! It then downloads every document and
//! instrument payload with a bounded fan-out. A failing download is recorded
//! in the report and left out of the archive; everything else still lands.

use crate::container::{digest, ArchiveWriter};
use crate::errors::ArchiveError;
use crate::layout::{
    archive_file_name, instrument_entry_name, EntryNames, MANIFEST_FILE_NAME, OVERVIEW_FILE_NAME,
};
use crate::overview::OverviewRenderer;
use crate::report::{ItemKind, ItemOutcome, TransferReport};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use polaris_common::config::ArchiveConfig;
use polaris_common::errors::AppError;
use polaris_common::metrics::OperationMetrics;
use polaris_common::models::{DocumentId, ObservationId, PayloadKey, ProposalId};
use polaris_common::{Credential, DocumentStore, InstrumentBridge, ProposalService};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// A finished proposal archive
#[derive(Debug, Clone)]
pub struct ExportedArchive {
    pub operation_id: Uuid,
    pub proposal_id: ProposalId,
    /// Suggested download name, e.g. `DustinM31.zip`
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Hex sha256 of `bytes`
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub report: TransferReport,
}

/// Builds proposal archives from the live services
pub struct ArchiveExporter {
    proposals: Arc<dyn ProposalService>,
    documents: Arc<dyn DocumentStore>,
    instruments: Arc<dyn InstrumentBridge>,
    overview: Arc<dyn OverviewRenderer>,
    max_concurrent_transfers: usize,
    compress: bool,
}

/// One download to run
enum Transfer {
    Document {
        entry_name: String,
        document_id: DocumentId,
    },
    Payload {
        observation_id: ObservationId,
    },
}

/// A settled download, tagged with its write position
struct Fetched {
    order: usize,
    kind: ItemKind,
    entry_name: String,
    content: Result<Vec<u8>, AppError>,
}

impl ArchiveExporter {
    pub fn new(
        proposals: Arc<dyn ProposalService>,
        documents: Arc<dyn DocumentStore>,
        instruments: Arc<dyn InstrumentBridge>,
        overview: Arc<dyn OverviewRenderer>,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            proposals,
            documents,
            instruments,
            overview,
            max_concurrent_transfers: config.max_concurrent_transfers.max(1),
            compress: config.compress,
        }
    }

    /// Export one proposal.
    ///
    /// Fails only when the snapshot cannot be read; per-item download
    /// failures are in the returned report.
    #[instrument(skip(self, credential), fields(operation_id = tracing::field::Empty))]
    pub async fn export(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
    ) -> Result<ExportedArchive, ArchiveError> {
        let operation_id = Uuid::new_v4();
        tracing::Span::current().record("operation_id", tracing::field::display(&operation_id));

        let metrics = OperationMetrics::start("export");
        let result = self.build(credential, proposal_id, operation_id).await;
        match &result {
            Ok(archive) => {
                archive.report.record("export");
                metrics.finish(archive.report.outcome());
            }
            Err(e) => {
                warn!(error = %e, "Export failed");
                metrics.finish("failed");
            }
        }
        result
    }

    async fn build(
        &self,
        credential: &Credential,
        proposal_id: ProposalId,
        operation_id: Uuid,
    ) -> Result<ExportedArchive, ArchiveError> {
        // Snapshot: all three reads are required
        let (proposal, listed, mut observation_ids) = tokio::try_join!(
            async {
                self.proposals
                    .fetch_proposal(credential, proposal_id)
                    .await
                    .map_err(|source| ArchiveError::ProposalFetch {
                        proposal_id,
                        source,
                    })
            },
            async {
                self.documents
                    .list_documents(credential, proposal_id)
                    .await
                    .map_err(|source| ArchiveError::Listing {
                        what: "supporting documents",
                        proposal_id,
                        source,
                    })
            },
            async {
                self.instruments
                    .list_observation_ids(credential, proposal_id)
                    .await
                    .map_err(|source| ArchiveError::Listing {
                        what: "instrument payloads",
                        proposal_id,
                        source,
                    })
            },
        )?;
        info!(
            title = %proposal.title,
            documents = listed.len(),
            payloads = observation_ids.len(),
            "Proposal snapshot read"
        );
        let overview = self.overview.render(&proposal).await?;

        let mut writer = ArchiveWriter::new(self.compress);
        writer.add(MANIFEST_FILE_NAME, &serde_json::to_vec_pretty(&proposal)?)?;
        writer.add(OVERVIEW_FILE_NAME, &overview)?;

        let mut report = TransferReport::new();
        let mut names = EntryNames::new();
        let mut transfers = Vec::with_capacity(listed.len() + observation_ids.len());

        for document in &listed {
            match (document.dbid, document.name.as_deref()) {
                (Some(document_id), Some(title)) => transfers.push(Transfer::Document {
                    entry_name: names.claim_document(title),
                    document_id,
                }),
                (dbid, title) => {
                    let label = title
                        .map(str::to_string)
                        .or_else(|| dbid.map(|id| format!("document {}", id)))
                        .unwrap_or_else(|| "unnamed document".to_string());
                    report.push(ItemOutcome::skipped(
                        ItemKind::Document,
                        label,
                        "listing entry has no id or title",
                    ));
                }
            }
        }

        observation_ids.sort_unstable();
        observation_ids.dedup();
        transfers.extend(
            observation_ids
                .iter()
                .map(|&observation_id| Transfer::Payload { observation_id }),
        );

        let tasks: Vec<BoxFuture<'_, Fetched>> = transfers
            .into_iter()
            .enumerate()
            .map(|(order, transfer)| self.fetch(credential, proposal_id, order, transfer))
            .collect();
        let mut fetched: Vec<Fetched> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent_transfers)
            .collect()
            .await;
        fetched.sort_by_key(|item| item.order);

        for item in fetched {
            match item.content {
                Ok(content) => {
                    writer.add(&item.entry_name, &content)?;
                    report.push(ItemOutcome::succeeded(item.kind, item.entry_name));
                }
                Err(e) => {
                    warn!(entry = %item.entry_name, error = %e, "Download failed, entry left out");
                    report.push(ItemOutcome::failed(item.kind, item.entry_name, e));
                }
            }
        }

        let entries = writer.entry_count();
        let bytes = writer.finish()?;
        let sha256 = digest(&bytes);
        info!(
            entries,
            size = bytes.len(),
            sha256 = %sha256,
            summary = %report.summary(),
            "Archive built"
        );

        Ok(ExportedArchive {
            operation_id,
            proposal_id,
            file_name: archive_file_name(&proposal.title),
            bytes,
            sha256,
            created_at: Utc::now(),
            report,
        })
    }

    fn fetch<'a>(
        &'a self,
        credential: &'a Credential,
        proposal_id: ProposalId,
        order: usize,
        transfer: Transfer,
    ) -> BoxFuture<'a, Fetched> {
        async move {
            match transfer {
                Transfer::Document {
                    entry_name,
                    document_id,
                } => {
                    let content = self
                        .documents
                        .download_document(credential, proposal_id, document_id)
                        .await;
                    debug!(entry = %entry_name, ok = content.is_ok(), "Document downloaded");
                    Fetched {
                        order,
                        kind: ItemKind::Document,
                        entry_name,
                        content,
                    }
                }
                Transfer::Payload { observation_id } => {
                    let content = self
                        .instruments
                        .load_payload(credential, PayloadKey::new(proposal_id, observation_id))
                        .await
                        .and_then(|payload| Ok(serde_json::to_vec_pretty(&payload)?));
                    Fetched {
                        order,
                        kind: ItemKind::InstrumentPayload,
                        entry_name: instrument_entry_name(observation_id),
                        content,
                    }
                }
            }
        }
        .boxed()
    }
}
