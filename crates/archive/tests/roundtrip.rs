//! Export → import against the in-memory proposal tool

use polaris_archive::layout::instrument_entry_name;
use polaris_archive::{
    ArchiveError, ArchiveExporter, ArchiveImporter, ItemKind, ItemStatus, PdfOverviewRenderer,
};
use polaris_common::client::InMemoryPolaris;
use polaris_common::config::ArchiveConfig;
use polaris_common::models::{
    InstrumentPayload, Observation, ObservationKind, ObservingProposal, PayloadKey,
};
use polaris_common::Credential;
use serde_json::json;
use std::io::{Cursor, Write};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn credential() -> Credential {
    Credential::bearer("test-token")
}

fn exporter(service: &Arc<InMemoryPolaris>) -> ArchiveExporter {
    ArchiveExporter::new(
        service.clone(),
        service.clone(),
        service.clone(),
        Arc::new(PdfOverviewRenderer::new()),
        &ArchiveConfig::default(),
    )
}

fn importer(service: &Arc<InMemoryPolaris>) -> ArchiveImporter {
    ArchiveImporter::new(
        service.clone(),
        service.clone(),
        service.clone(),
        &ArchiveConfig::default(),
    )
}

fn instrument_body() -> serde_json::Map<String, serde_json::Value> {
    json!({
        "telescopeName": "WHT",
        "instrumentName": "WEAVE",
        "choices": {"mode": "LIFU", "exposure": "1200"}
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Proposal with a target and a calibration observation, one document and
/// instrument data for the calibration only
async fn seed(service: &InMemoryPolaris) -> ObservingProposal {
    let mut proposal = ObservingProposal::new("Dust in M31", "Mapping dust lanes in the disc");
    proposal.kind = Some("STANDARD".to_string());
    proposal.observations = vec![
        Observation::new(ObservationKind::Target),
        Observation::new(ObservationKind::Calibration),
    ];
    let stored = service.seed_proposal(proposal).await;
    let pid = stored.id.unwrap();
    service.seed_document(pid, "notes.txt", b"some notes").await;
    service
        .seed_payload(InstrumentPayload::new(
            PayloadKey::new(pid, stored.observations[1].id.unwrap()),
            instrument_body(),
        ))
        .await;
    stored
}

#[tokio::test]
async fn test_round_trip_creates_independent_copy() {
    let service = Arc::new(InMemoryPolaris::new());
    let original = seed(&service).await;
    let original_id = original.id.unwrap();

    let archive = assert_ok!(exporter(&service).export(&credential(), original_id).await);
    assert!(archive.report.is_complete());

    let report = assert_ok!(importer(&service).import(&credential(), &archive.bytes).await);
    assert!(report.is_complete());
    assert_eq!(
        report.summary(),
        "1/1 documents attached, 1/1 instrument payloads attached"
    );
    assert_ne!(report.proposal_id, original_id);

    let copy = service.proposal(report.proposal_id).await.unwrap();
    assert_eq!(copy.title, original.title);
    assert_eq!(copy.summary, original.summary);
    assert_eq!(copy.kind, original.kind);
    assert_eq!(copy.observations.len(), 2);
    for (old, new) in original.observations.iter().zip(&copy.observations) {
        assert_ne!(old.id, new.id);
        assert_eq!(old.kind(), new.kind());
    }

    let documents = service.documents_of(report.proposal_id).await;
    assert_eq!(documents, vec![("notes.txt".to_string(), b"some notes".to_vec())]);

    // payload follows the observation at the same position
    let payloads = service.payloads_of(report.proposal_id).await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0].primary_key,
        PayloadKey::new(report.proposal_id, copy.observations[1].id.unwrap())
    );
    assert_eq!(payloads[0].body, instrument_body());

    // the exported proposal is untouched
    assert_eq!(service.payloads_of(original_id).await.len(), 1);
    assert_eq!(service.documents_of(original_id).await.len(), 1);
}

#[tokio::test]
async fn test_remap_covers_every_observation() {
    let service = Arc::new(InMemoryPolaris::new());
    let original = seed(&service).await;

    let archive = assert_ok!(exporter(&service).export(&credential(), original.id.unwrap()).await);
    let report = assert_ok!(importer(&service).import(&credential(), &archive.bytes).await);

    let remap = report.remap.expect("positional remap verified");
    let copy = service.proposal(report.proposal_id).await.unwrap();
    for (k, old) in original.observations.iter().enumerate() {
        assert_eq!(remap.resolve(old.id.unwrap()), copy.observations[k].id);
    }
}

#[tokio::test]
async fn test_archive_without_manifest_creates_nothing() {
    let service = Arc::new(InMemoryPolaris::new());

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("notes.txt", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(b"some notes").unwrap();
    let bytes = zip.finish().unwrap().into_inner();

    let err = assert_err!(importer(&service).import(&credential(), &bytes).await);
    assert!(matches!(err, ArchiveError::MissingManifest { .. }));
    assert_eq!(service.create_calls().await, 0);
    assert_eq!(service.proposal_count().await, 0);
}

#[tokio::test]
async fn test_payload_for_unknown_observation_is_not_written() {
    let service = Arc::new(InMemoryPolaris::new());
    let original = seed(&service).await;
    let archive = assert_ok!(exporter(&service).export(&credential(), original.id.unwrap()).await);

    // add a payload keyed to an observation the manifest does not know
    let mut contents = zip::ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
    let mut rebuilt = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for index in 0..contents.len() {
        let file = contents.by_index(index).unwrap();
        rebuilt.raw_copy_file(file).unwrap();
    }
    rebuilt
        .start_file(instrument_entry_name(424242), zip::write::FileOptions::default())
        .unwrap();
    rebuilt
        .write_all(br#"{"primaryKey":{"proposalID":"1","observationID":"424242"}}"#)
        .unwrap();
    let bytes = rebuilt.finish().unwrap().into_inner();

    let report = assert_ok!(importer(&service).import(&credential(), &bytes).await);

    let skipped: Vec<_> = report
        .items
        .items
        .iter()
        .filter(|item| matches!(item.status, ItemStatus::Skipped { .. }))
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].name, instrument_entry_name(424242));
    assert_eq!(service.payloads_of(report.proposal_id).await.len(), 1);
}

#[tokio::test]
async fn test_partial_import_reports_each_failure() {
    let service = Arc::new(InMemoryPolaris::new());
    let original = seed(&service).await;
    service
        .seed_document(original.id.unwrap(), "figure.png", b"\x89PNG")
        .await;
    let archive = assert_ok!(exporter(&service).export(&credential(), original.id.unwrap()).await);

    service.fail_upload_of("figure.png").await;
    let report = assert_ok!(importer(&service).import(&credential(), &archive.bytes).await);

    assert!(!report.is_complete());
    assert_eq!(
        report.summary(),
        "1/2 documents failed, 1/1 instrument payloads attached"
    );
    let failed: Vec<_> = report.items.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, ItemKind::Document);
    assert_eq!(failed[0].name, "figure.png");

    // no rollback: the new proposal stays with what did attach
    let documents = service.documents_of(report.proposal_id).await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].0, "notes.txt");
}

#[tokio::test]
async fn test_reordering_service_is_detected() {
    let service = Arc::new(InMemoryPolaris::new());
    let original = seed(&service).await;
    let archive = assert_ok!(exporter(&service).export(&credential(), original.id.unwrap()).await);

    service.reverse_observations_on_create().await;
    let report = assert_ok!(importer(&service).import(&credential(), &archive.bytes).await);

    assert!(report.remap.is_none());
    assert_eq!(report.items.tally(ItemKind::InstrumentPayload).failed, 1);
    assert!(service.payloads_of(report.proposal_id).await.is_empty());
    assert_eq!(service.documents_of(report.proposal_id).await.len(), 1);
}
