//! Archive layout conventions
//!
//! Every entry of a proposal archive is classified by its name alone:
//! - `proposal.json`: the manifest (serialized proposal)
//! - `overview.pdf`: the rendered overview
//! - `telescopes/observation_<id>.json`: instrument payload of the
//!   observation that had `<id>` in the exported proposal
//! - anything else: a supporting document, named by its title

use polaris_common::models::ObservationId;
use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Manifest entry holding the serialized proposal
pub const MANIFEST_FILE_NAME: &str = "proposal.json";

/// Entry holding the rendered overview document
pub const OVERVIEW_FILE_NAME: &str = "overview.pdf";

/// Top-level folder holding instrument payloads
pub const INSTRUMENT_FOLDER: &str = "telescopes";

/// File name prefix of instrument payload entries
pub const INSTRUMENT_FILE_PREFIX: &str = "observation";

/// File extension of instrument payload entries
pub const INSTRUMENT_FILE_EXTENSION: &str = "json";

/// Largest manifest an archive may carry
pub const MAX_MANIFEST_BYTES: usize = 16 * 1024 * 1024;

/// Names no supporting document may take
pub const RESERVED_NAMES: [&str; 2] = [MANIFEST_FILE_NAME, OVERVIEW_FILE_NAME];

/// Suffix appended to a colliding document name until it is unique
pub const COLLISION_SUFFIX: char = '1';

/// Download name used when a proposal has no usable title
pub const UNNAMED_ARCHIVE: &str = "UnNamedProposal";

const MAX_ARCHIVE_STEM_CHARS: usize = 31;

/// What an archive entry is, judged by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Manifest,
    Overview,
    Document,
    InstrumentPayload { observation_id: ObservationId },
    /// Under the instrument folder but not named `observation_<id>.json`
    InvalidInstrument,
    /// Directory entries and files added by desktop archivers
    Ignored,
}

fn platform_junk() -> &'static Regex {
    static JUNK: OnceLock<Regex> = OnceLock::new();
    JUNK.get_or_init(|| {
        Regex::new(r"^Thumbs\.db$|^__MACOSX|^\.DS_Store$").expect("platform junk pattern is valid")
    })
}

fn instrument_file() -> &'static Regex {
    static FILE: OnceLock<Regex> = OnceLock::new();
    FILE.get_or_init(|| {
        let pattern = format!(
            r"^{}_(-?\d+)\.{}$",
            INSTRUMENT_FILE_PREFIX, INSTRUMENT_FILE_EXTENSION
        );
        Regex::new(&pattern).expect("instrument file pattern is valid")
    })
}

fn is_platform_junk(name: &str) -> bool {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    platform_junk().is_match(name) || platform_junk().is_match(file_name)
}

/// Classify an entry name
pub fn classify(name: &str) -> EntryKind {
    if name.ends_with('/') || is_platform_junk(name) {
        return EntryKind::Ignored;
    }
    if name == MANIFEST_FILE_NAME {
        return EntryKind::Manifest;
    }
    if name == OVERVIEW_FILE_NAME {
        return EntryKind::Overview;
    }
    if let Some(rest) = name
        .strip_prefix(INSTRUMENT_FOLDER)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        return instrument_file()
            .captures(rest)
            .and_then(|caps| caps.get(1))
            .and_then(|id| id.as_str().parse().ok())
            .map(|observation_id| EntryKind::InstrumentPayload { observation_id })
            .unwrap_or(EntryKind::InvalidInstrument);
    }
    EntryKind::Document
}

/// Entry name of the payload for the observation originally identified by `observation_id`
pub fn instrument_entry_name(observation_id: ObservationId) -> String {
    format!(
        "{}/{}_{}.{}",
        INSTRUMENT_FOLDER, INSTRUMENT_FILE_PREFIX, observation_id, INSTRUMENT_FILE_EXTENSION
    )
}

/// File name offered when downloading a proposal archive
pub fn archive_file_name(title: &str) -> String {
    let stem: String = title
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(MAX_ARCHIVE_STEM_CHARS)
        .collect();
    if stem.is_empty() {
        format!("{}.zip", UNNAMED_ARCHIVE)
    } else {
        format!("{}.zip", stem)
    }
}

/// Make a document title usable as a top-level entry name
fn sanitize_title(title: &str) -> String {
    let mut name: String = title
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if name.trim().is_empty() {
        name = "document".to_string();
    }
    // appending a suffix cannot move a name out of a prefix match
    if name.starts_with("__MACOSX") {
        name.insert(0, '_');
    }
    name
}

/// Names already taken in an archive under construction
#[derive(Debug, Clone)]
pub struct EntryNames {
    claimed: HashSet<String>,
}

impl Default for EntryNames {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryNames {
    /// Start with the reserved names already taken
    pub fn new() -> Self {
        Self {
            claimed: RESERVED_NAMES.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Start with nothing taken, for archives without reserved entries
    pub fn unreserved() -> Self {
        Self {
            claimed: HashSet::new(),
        }
    }

    /// Claim an entry name for a document titled `title`.
    ///
    /// The result is unique in this archive and reads back as a document.
    pub fn claim_document(&mut self, title: &str) -> String {
        let mut name = sanitize_title(title);
        while self.claimed.contains(&name) || classify(&name) != EntryKind::Document {
            name.push(COLLISION_SUFFIX);
        }
        self.claimed.insert(name.clone());
        name
    }

    /// Claim `name` verbatim, appending the collision suffix while taken
    pub fn claim(&mut self, name: &str) -> String {
        let mut name = name.to_string();
        while self.claimed.contains(&name) {
            name.push(COLLISION_SUFFIX);
        }
        self.claimed.insert(name.clone());
        name
    }
}
