//! Several proposals in one download
//!
//! Proposals are exported one after another, so the transfer limit of a
//! single export also bounds the whole bundle. Each archive is nested,
//! unchanged, into an outer zip. A proposal that cannot be exported is listed in
//! `failures` and left out.

use crate::container::{digest, ArchiveWriter};
use crate::errors::ArchiveError;
use crate::exporter::{ArchiveExporter, ExportedArchive};
use crate::layout::{archive_file_name, EntryNames};
use crate::report::TransferReport;
use polaris_common::metrics::OperationMetrics;
use polaris_common::models::{ObjectIdentifier, ProposalId};
use polaris_common::Credential;
use tracing::{info, instrument, warn};

/// A proposal archive nested in a bundle
#[derive(Debug, Clone)]
pub struct BundleMember {
    pub proposal_id: ProposalId,
    pub entry_name: String,
    pub sha256: String,
    pub report: TransferReport,
}

#[derive(Debug, Clone)]
pub struct BundleFailure {
    pub proposal: ObjectIdentifier,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ExportedBundle {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub sha256: String,
    pub members: Vec<BundleMember>,
    pub failures: Vec<BundleFailure>,
}

impl ExportedBundle {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.members.iter().all(|m| m.report.is_complete())
    }
}

impl ArchiveExporter {
    /// Export every listed proposal into one outer archive named after `bundle_name`
    #[instrument(skip(self, credential, proposals), fields(count = proposals.len()))]
    pub async fn export_bundle(
        &self,
        credential: &Credential,
        bundle_name: &str,
        proposals: &[ObjectIdentifier],
    ) -> Result<ExportedBundle, ArchiveError> {
        let metrics = OperationMetrics::start("bundle");

        let mut settled: Vec<Result<ExportedArchive, ArchiveError>> =
            Vec::with_capacity(proposals.len());
        for listed in proposals {
            let result = match listed.dbid {
                Some(proposal_id) => self.export(credential, proposal_id).await,
                None => Err(ArchiveError::InvalidArchive {
                    message: "proposal listing entry has no id".to_string(),
                }),
            };
            settled.push(result);
        }

        let mut writer = ArchiveWriter::new(false);
        let mut names = EntryNames::unreserved();
        let mut members = Vec::new();
        let mut failures = Vec::new();

        for (listed, result) in proposals.iter().zip(settled) {
            match result {
                Ok(archive) => {
                    let stem = archive
                        .file_name
                        .strip_suffix(".zip")
                        .unwrap_or(&archive.file_name);
                    let entry_name = format!("{}.zip", names.claim(stem));
                    writer.add(&entry_name, &archive.bytes)?;
                    members.push(BundleMember {
                        proposal_id: archive.proposal_id,
                        entry_name,
                        sha256: archive.sha256,
                        report: archive.report,
                    });
                }
                Err(e) => {
                    let proposal = listed.clone();
                    warn!(proposal = ?proposal.dbid, error = %e, "Proposal left out of bundle");
                    failures.push(BundleFailure {
                        proposal,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let bytes = writer.finish()?;
        let sha256 = digest(&bytes);
        info!(
            members = members.len(),
            failures = failures.len(),
            size = bytes.len(),
            "Bundle built"
        );

        let bundle = ExportedBundle {
            file_name: archive_file_name(bundle_name),
            bytes,
            sha256,
            members,
            failures,
        };
        metrics.finish(if bundle.is_complete() { "complete" } else { "partial" });
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ArchiveContents;
    use crate::overview::OverviewRenderer;
    use async_trait::async_trait;
    use polaris_common::client::InMemoryPolaris;
    use polaris_common::config::ArchiveConfig;
    use polaris_common::models::ObservingProposal;
    use std::io::{Cursor, Read};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Tracks how many renders overlap
    #[derive(Default)]
    struct CountingOverview {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl OverviewRenderer for CountingOverview {
        async fn render(&self, _: &ObservingProposal) -> Result<Vec<u8>, ArchiveError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(b"%PDF".to_vec())
        }
    }

    #[tokio::test]
    async fn test_bundle_nests_each_proposal_archive() {
        let service = Arc::new(InMemoryPolaris::new());
        let a = service.seed_proposal(ObservingProposal::new("Same Title", "a")).await;
        let b = service.seed_proposal(ObservingProposal::new("Same Title", "b")).await;
        let exporter = ArchiveExporter::new(
            service.clone(),
            service.clone(),
            service.clone(),
            Arc::new(CountingOverview::default()),
            &ArchiveConfig::default(),
        );

        let listing = vec![
            ObjectIdentifier::new(a.id.unwrap(), "Same Title"),
            ObjectIdentifier::new(b.id.unwrap(), "Same Title"),
            ObjectIdentifier::new(999, "Gone"),
        ];
        let bundle = exporter
            .export_bundle(&Credential::bearer("t"), "Cycle 2026A", &listing)
            .await
            .unwrap();

        assert_eq!(bundle.file_name, "Cycle2026A.zip");
        assert_eq!(bundle.members.len(), 2);
        assert_eq!(bundle.members[0].entry_name, "SameTitle.zip");
        assert_eq!(bundle.members[1].entry_name, "SameTitle1.zip");
        assert_eq!(bundle.failures.len(), 1);
        assert_eq!(bundle.failures[0].proposal.dbid, Some(999));
        assert!(!bundle.is_complete());

        let mut outer = zip::ZipArchive::new(Cursor::new(bundle.bytes)).unwrap();
        let mut inner = Vec::new();
        outer
            .by_name("SameTitle1.zip")
            .unwrap()
            .read_to_end(&mut inner)
            .unwrap();
        let contents = ArchiveContents::read(&inner, usize::MAX).unwrap();
        let manifest: ObservingProposal = serde_json::from_slice(&contents.manifest).unwrap();
        assert_eq!(manifest.summary, "b");
    }

    #[tokio::test]
    async fn test_bundle_members_are_exported_one_at_a_time() {
        let service = Arc::new(InMemoryPolaris::new());
        let mut listing = Vec::new();
        for i in 0..4 {
            let stored = service
                .seed_proposal(ObservingProposal::new(format!("P{}", i), "s"))
                .await;
            listing.push(ObjectIdentifier::new(stored.id.unwrap(), format!("P{}", i)));
        }
        let overview = Arc::new(CountingOverview::default());
        let exporter = ArchiveExporter::new(
            service.clone(),
            service.clone(),
            service.clone(),
            overview.clone(),
            &ArchiveConfig::default(),
        );

        let bundle = exporter
            .export_bundle(&Credential::bearer("t"), "Cycle", &listing)
            .await
            .unwrap();

        assert_eq!(bundle.members.len(), 4);
        assert_eq!(overview.peak.load(Ordering::SeqCst), 1);
    }
}
