//! Per-item outcomes of an export or import
//!
//! Every document and instrument payload gets exactly one outcome, collected
//! after all transfers have settled.

use polaris_common::metrics::record_items;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Document,
    InstrumentPayload,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Document => "document",
            ItemKind::InstrumentPayload => "instrument_payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed { reason: String },
    Skipped { reason: String },
}

impl ItemStatus {
    fn label(&self) -> &'static str {
        match self {
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed { .. } => "failed",
            ItemStatus::Skipped { .. } => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub kind: ItemKind,
    /// Archive entry name of the item
    pub name: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub fn succeeded(kind: ItemKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            status: ItemStatus::Succeeded,
        }
    }

    pub fn failed(kind: ItemKind, name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            name: name.into(),
            status: ItemStatus::Failed {
                reason: reason.to_string(),
            },
        }
    }

    pub fn skipped(kind: ItemKind, name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            name: name.into(),
            status: ItemStatus::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ItemStatus::Failed { .. })
    }
}

/// Counts for one item kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Settled outcomes of every item in one operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub items: Vec<ItemOutcome>,
}

impl TransferReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: ItemOutcome) {
        self.items.push(outcome);
    }

    pub fn extend(&mut self, outcomes: impl IntoIterator<Item = ItemOutcome>) {
        self.items.extend(outcomes);
    }

    pub fn tally(&self, kind: ItemKind) -> Tally {
        self.items
            .iter()
            .filter(|item| item.kind == kind)
            .fold(Tally::default(), |mut tally, item| {
                match item.status {
                    ItemStatus::Succeeded => tally.succeeded += 1,
                    ItemStatus::Failed { .. } => tally.failed += 1,
                    ItemStatus::Skipped { .. } => tally.skipped += 1,
                }
                tally
            })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(|item| item.is_failure())
    }

    /// True when no item failed; skips do not count against completeness
    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// One-line account, e.g. `3/3 documents attached, 1/2 instrument payloads failed`
    pub fn summary(&self) -> String {
        [
            (ItemKind::Document, "documents"),
            (ItemKind::InstrumentPayload, "instrument payloads"),
        ]
        .iter()
        .map(|(kind, noun)| describe(self.tally(*kind), noun))
        .collect::<Vec<_>>()
        .join(", ")
    }

    /// Publish item counts for `operation` ("export" or "import")
    pub fn record(&self, operation: &'static str) {
        for kind in [ItemKind::Document, ItemKind::InstrumentPayload] {
            let tally = self.tally(kind);
            record_items(operation, kind.as_str(), "succeeded", tally.succeeded);
            record_items(operation, kind.as_str(), "failed", tally.failed);
            record_items(operation, kind.as_str(), "skipped", tally.skipped);
        }
    }

    /// Outcome label for operation metrics
    pub fn outcome(&self) -> &'static str {
        if self.is_complete() {
            "complete"
        } else {
            "partial"
        }
    }
}

fn describe(tally: Tally, noun: &str) -> String {
    let mut text = if tally.failed > 0 {
        format!("{}/{} {} failed", tally.failed, tally.total(), noun)
    } else {
        format!("{}/{} {} attached", tally.succeeded, tally.total(), noun)
    };
    if tally.skipped > 0 {
        text.push_str(&format!(" ({} skipped)", tally.skipped));
    }
    text
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        for item in &self.items {
            match &item.status {
                ItemStatus::Succeeded => {}
                ItemStatus::Failed { reason } | ItemStatus::Skipped { reason } => {
                    write!(f, "\n  {} {} '{}': {}", item.status.label(), item.kind.as_str(), item.name, reason)?;
                }
            }
        }
        Ok(())
    }
}
