//! In-memory zip container: writing archives and reading them back

use crate::errors::ArchiveError;
use crate::layout::{classify, EntryKind, MANIFEST_FILE_NAME, MAX_MANIFEST_BYTES};
use polaris_common::models::ObservationId;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::FileOptions;
use zip::read::ZipFile;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Builds a zip archive in memory. Entry names are write-once.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
    written: HashSet<String>,
}

impl ArchiveWriter {
    pub fn new(compress: bool) -> Self {
        let method = if compress {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: FileOptions::default().compression_method(method),
            written: HashSet::new(),
        }
    }

    /// Write one entry; a name can only be written once
    pub fn add(&mut self, name: &str, content: &[u8]) -> Result<(), ArchiveError> {
        if !self.written.insert(name.to_string()) {
            return Err(ArchiveError::InvalidArchive {
                message: format!("entry '{}' written twice", name),
            });
        }
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(content)?;
        debug!(entry = name, size = content.len(), "Archive entry written");
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.written.len()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ArchiveError> {
        let cursor = self.zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Hex sha256 of archive bytes
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A named file read out of an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: Vec<u8>,
}

/// An instrument payload file read out of an archive
#[derive(Debug, Clone)]
pub struct PayloadEntry {
    pub name: String,
    /// Observation id in the exported proposal, taken from the entry name
    pub original_observation_id: ObservationId,
    pub content: Vec<u8>,
}

/// An entry left unread because it is larger than the entry size limit
#[derive(Debug, Clone)]
pub struct OversizedEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Declared size, or the bytes seen before reading stopped
    pub size: u64,
}

/// Archive entries sorted by kind
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    pub manifest: Vec<u8>,
    pub has_overview: bool,
    pub documents: Vec<ArchiveEntry>,
    pub payloads: Vec<PayloadEntry>,
    /// Documents and payloads over the entry size limit
    pub oversized: Vec<OversizedEntry>,
    /// Directory entries and desktop archiver leftovers
    pub ignored: Vec<String>,
    /// Entries under the instrument folder with an unexpected name
    pub invalid_instrument: Vec<String>,
}

impl ArchiveContents {
    /// Read and classify every entry; fails when the manifest is absent.
    ///
    /// No document or payload is inflated past `max_entry_size` bytes; those
    /// over it are listed in `oversized`. A manifest over
    /// `MAX_MANIFEST_BYTES` makes the archive unreadable.
    pub fn read(bytes: &[u8], max_entry_size: usize) -> Result<Self, ArchiveError> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| ArchiveError::InvalidArchive {
                message: e.to_string(),
            })?;
        let limit = max_entry_size as u64;

        let mut manifest = None;
        let mut has_overview = false;
        let mut documents = Vec::new();
        let mut payloads = Vec::new();
        let mut oversized = Vec::new();
        let mut ignored = Vec::new();
        let mut invalid_instrument = Vec::new();

        for index in 0..archive.len() {
            let mut file = archive.by_index(index)?;
            let name = file.name().to_string();
            let kind = if file.is_dir() {
                EntryKind::Ignored
            } else {
                classify(&name)
            };

            match kind {
                EntryKind::Manifest => match read_limited(&mut file, MAX_MANIFEST_BYTES as u64)? {
                    Ok(content) => manifest = Some(content),
                    Err(size) => {
                        return Err(ArchiveError::InvalidArchive {
                            message: format!(
                                "manifest is {} bytes, limit is {}",
                                size, MAX_MANIFEST_BYTES
                            ),
                        })
                    }
                },
                EntryKind::Overview => has_overview = true,
                EntryKind::Document | EntryKind::InstrumentPayload { .. } => {
                    match read_limited(&mut file, limit)? {
                        Ok(content) => match kind {
                            EntryKind::InstrumentPayload { observation_id } => {
                                payloads.push(PayloadEntry {
                                    name,
                                    original_observation_id: observation_id,
                                    content,
                                })
                            }
                            _ => documents.push(ArchiveEntry { name, content }),
                        },
                        Err(size) => {
                            debug!(entry = %name, size, "Entry over size limit left unread");
                            oversized.push(OversizedEntry { name, kind, size });
                        }
                    }
                }
                EntryKind::InvalidInstrument => invalid_instrument.push(name),
                EntryKind::Ignored => ignored.push(name),
            }
        }

        let manifest = manifest.ok_or_else(|| ArchiveError::MissingManifest {
            name: MANIFEST_FILE_NAME.to_string(),
        })?;

        Ok(Self {
            manifest,
            has_overview,
            documents,
            payloads,
            oversized,
            ignored,
            invalid_instrument,
        })
    }
}

/// Inflate at most `limit` bytes of `file`.
///
/// The inner `Err` carries the size that broke the limit; the declared size
/// is checked first, then the bytes actually inflated.
fn read_limited(file: &mut ZipFile<'_>, limit: u64) -> Result<Result<Vec<u8>, u64>, ArchiveError> {
    if file.size() > limit {
        return Ok(Err(file.size()));
    }
    let mut content = Vec::with_capacity(file.size() as usize);
    file.by_ref()
        .take(limit.saturating_add(1))
        .read_to_end(&mut content)?;
    if content.len() as u64 > limit {
        return Ok(Err(content.len() as u64));
    }
    Ok(Ok(content))
}
