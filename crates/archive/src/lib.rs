//! Polaris Archive
//!
//! Moves an observing proposal out of the proposal tool as a single zip
//! archive and back in as a brand-new proposal:
//! - `exporter`: proposal → archive (and several proposals → bundle)
//! - `importer`: archive → new proposal, with observation ids remapped
//! - `layout`: entry naming conventions shared by both directions
//! - `report`: per-document / per-payload outcomes

pub mod bundle;
pub mod container;
pub mod errors;
pub mod exporter;
pub mod importer;
pub mod layout;
pub mod overview;
pub mod remap;
pub mod report;

pub use bundle::{BundleFailure, BundleMember, ExportedBundle};
pub use errors::ArchiveError;
pub use exporter::{ArchiveExporter, ExportedArchive};
pub use importer::{ArchiveImporter, ImportReport};
pub use overview::{OverviewRenderer, PdfOverviewRenderer};
pub use remap::{ObservationRemap, RemapError};
pub use report::{ItemKind, ItemOutcome, ItemStatus, TransferReport};

use polaris_common::{AppConfig, PolarisClient};
use std::sync::Arc;

/// Exporter and importer wired to one REST client
pub struct ArchiveService {
    pub exporter: ArchiveExporter,
    pub importer: ArchiveImporter,
}

impl ArchiveService {
    /// Build both directions against the proposal tool at `config.api.base_url`
    pub fn from_config(config: &AppConfig) -> polaris_common::Result<Self> {
        polaris_common::metrics::register_metrics();
        let client = Arc::new(PolarisClient::new(config)?);
        let overview = Arc::new(PdfOverviewRenderer::new());
        Ok(Self {
            exporter: ArchiveExporter::new(
                client.clone(),
                client.clone(),
                client.clone(),
                overview,
                &config.archive,
            ),
            importer: ArchiveImporter::new(client.clone(), client.clone(), client, &config.archive),
        })
    }
}
