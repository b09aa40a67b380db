// ─── Sync Report ───
// Non-fatal findings and per-mod failures, surfaced together at the end of sync.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::core::error::ServerError;

/// Always non-fatal, always shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityWarning {
    /// Mod ships no `keys` directory; clients will not be verified for it.
    MissingKeys { mod_dir: PathBuf },
    /// Two mods shipped a key file with the same name; the later one was kept.
    DuplicateKey {
        file_name: String,
        previous: PathBuf,
        replaced_by: PathBuf,
        identical: bool,
    },
    /// A presentation entry points at something that no longer exists.
    DanglingLink { link: PathBuf, target: PathBuf },
    /// A registered mod has no cache directory to link to.
    MissingCache {
        display_name: String,
        id: String,
        expected: PathBuf,
    },
    /// Two workshop ids share a display name; the later one owns the name.
    NameCollision {
        display_name: String,
        previous_id: String,
        id: String,
    },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityWarning::MissingKeys { mod_dir } => {
                write!(f, "Missing keys: {:?}", mod_dir.join("keys"))
            }
            IntegrityWarning::DuplicateKey {
                file_name,
                previous,
                replaced_by,
                identical,
            } => write!(
                f,
                "Key '{}' from {:?} replaced by {:?}{}",
                file_name,
                previous,
                replaced_by,
                if *identical { " (identical content)" } else { "" }
            ),
            IntegrityWarning::DanglingLink { link, target } => {
                write!(f, "Dangling link {:?} -> {:?}", link, target)
            }
            IntegrityWarning::MissingCache {
                display_name,
                id,
                expected,
            } => write!(
                f,
                "Mod '{}' does not exist! ({}, expected {:?})",
                display_name, id, expected
            ),
            IntegrityWarning::NameCollision {
                display_name,
                previous_id,
                id,
            } => write!(
                f,
                "Display name '{}' used by {} and {}; {} wins",
                display_name, previous_id, id, id
            ),
        }
    }
}

/// A failure scoped to one mod (or one fetch batch when `id` is `None`).
#[derive(Debug)]
pub struct ModFailure {
    pub id: Option<String>,
    pub error: ServerError,
}

/// Aggregated outcome of the synchronization phase.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub warnings: Vec<IntegrityWarning>,
    pub failures: Vec<ModFailure>,
    /// Workshop ids handed to the fetch tool this run.
    pub fetched: Vec<String>,
    /// Total renames performed by path normalization.
    pub renamed: usize,
}

impl SyncReport {
    pub fn warn(&mut self, warning: IntegrityWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = IntegrityWarning>) {
        for warning in warnings {
            self.warn(warning);
        }
    }

    pub fn fail(&mut self, id: Option<&str>, error: ServerError) {
        match id {
            Some(id) => error!("Workshop item {}: {}", id, error),
            None => error!("{}", error),
        }
        self.failures.push(ModFailure {
            id: id.map(str::to_string),
            error,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.failures.is_empty()
    }

    /// Logs the end-of-sync summary.
    pub fn log_summary(&self) {
        if self.is_clean() {
            info!(
                "Workshop sync finished: {} fetched, {} renamed, no issues",
                self.fetched.len(),
                self.renamed
            );
            return;
        }

        warn!(
            "Workshop sync finished with {} failure(s) and {} warning(s); {} fetched",
            self.failures.len(),
            self.warnings.len(),
            self.fetched.len()
        );
        for failure in &self.failures {
            match &failure.id {
                Some(id) => warn!("  failed {}: {}", id, failure.error),
                None => warn!("  failed: {}", failure.error),
            }
        }
        for warning in &self.warnings {
            warn!("  {}", warning);
        }
    }
}
