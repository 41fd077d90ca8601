//! Overview document rendering
//!
//! The overview is a human-readable rendition of the proposal stored next to
//! the manifest, drawn from the same aggregate the manifest holds. It is never
//! read back on import.

use crate::errors::ArchiveError;
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use polaris_common::models::{ObservationKind, ObservingProposal};
use tracing::debug;

/// Produces the overview bytes for a proposal
#[async_trait]
pub trait OverviewRenderer: Send + Sync {
    async fn render(&self, proposal: &ObservingProposal) -> Result<Vec<u8>, ArchiveError>;
}

/// One-page PDF summary drawn with lopdf
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfOverviewRenderer;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const FONT_SIZE: i64 = 11;
const LINE_HEIGHT: i64 = 15;
const WRAP_COLUMNS: usize = 80;

impl PdfOverviewRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Lines of text shown on the overview page
    pub fn overview_lines(proposal: &ObservingProposal) -> Vec<String> {
        let calibrations = proposal
            .observations
            .iter()
            .filter(|o| o.kind() == ObservationKind::Calibration)
            .count();

        let mut lines = vec![
            format!("Proposal: {}", proposal.title),
            format!("Kind: {}", proposal.kind.as_deref().unwrap_or("unspecified")),
            format!(
                "Observations: {} ({} target, {} calibration)",
                proposal.observations.len(),
                proposal.observations.len() - calibrations,
                calibrations
            ),
            format!("Investigators: {}", proposal.investigators.len()),
            format!("Supporting documents: {}", proposal.supporting_documents.len()),
            String::new(),
            "Summary:".to_string(),
        ];
        lines.extend(wrap(&proposal.summary, WRAP_COLUMNS));
        lines
    }

    /// Draw `lines` onto a single A4 page
    pub fn render_pdf(lines: &[String]) -> Result<Vec<u8>, ArchiveError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(FONT_SIZE)]),
            Operation::new("TL", vec![Object::Integer(LINE_HEIGHT)]),
            Operation::new(
                "Td",
                vec![Object::Integer(MARGIN), Object::Integer(PAGE_HEIGHT - MARGIN)],
            ),
        ];
        let max_lines = ((PAGE_HEIGHT - 2 * MARGIN) / LINE_HEIGHT) as usize;
        for line in lines.iter().take(max_lines) {
            operations.push(Operation::new("Tj", vec![Object::string_literal(line.as_str())]));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let encoded = content.encode().map_err(|e| ArchiveError::Overview {
            message: format!("Failed to encode page content: {}", e),
        })?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(|e| ArchiveError::Overview {
            message: format!("Failed to write PDF: {}", e),
        })?;
        Ok(bytes)
    }
}

#[async_trait]
impl OverviewRenderer for PdfOverviewRenderer {
    async fn render(&self, proposal: &ObservingProposal) -> Result<Vec<u8>, ArchiveError> {
        let bytes = Self::render_pdf(&Self::overview_lines(proposal))?;
        debug!(proposal_id = ?proposal.id, size = bytes.len(), "Overview rendered");
        Ok(bytes)
    }
}

/// Greedy word wrap
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}
