use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{ServerError, ServerResult};

/// What the changelog page tells us about one workshop item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModMetadata {
    pub id: String,
    /// Human-facing name; becomes the `@<name>` presentation entry.
    pub display_name: String,
    /// Newest update announcement, if the item ever had one.
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// On-disk materialization of a downloaded workshop item.
///
/// "Directory exists" is treated as "download complete"; SteamCMD is trusted
/// not to leave partial trees behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModCacheEntry {
    pub id: String,
    pub directory: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl ModCacheEntry {
    /// Looks up the cache directory for `id`. `Ok(None)` when it does not exist.
    pub fn inspect(workshop_content: &Path, id: &str) -> ServerResult<Option<Self>> {
        let directory = workshop_content.join(id);
        let metadata = match std::fs::metadata(&directory) {
            Ok(meta) if meta.is_dir() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ServerError::io(&directory, e)),
        };

        Ok(Some(Self {
            id: id.to_string(),
            created_at: directory_timestamp(&metadata)
                .ok_or_else(|| ServerError::Other(format!("No timestamp for {:?}", directory)))?,
            directory,
        }))
    }

    /// Removes the cached tree so the next fetch starts clean.
    pub fn invalidate(&self) -> ServerResult<()> {
        std::fs::remove_dir_all(&self.directory).map_err(|e| ServerError::io(&self.directory, e))
    }
}

/// Inode change time on unix (what the cache age has always been measured by).
#[cfg(unix)]
fn directory_timestamp(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    Utc.timestamp_opt(metadata.ctime(), metadata.ctime_nsec() as u32)
        .single()
}

#[cfg(not(unix))]
fn directory_timestamp(metadata: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Display name → workshop id, threaded from probing into linking and launch.
///
/// At most one id per name: a later registration replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModRegistry {
    by_name: BTreeMap<String, String>,
}

impl ModRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name → id`. Returns the id it displaced, if it was a different one.
    pub fn register(&mut self, name: &str, id: &str) -> Option<String> {
        self.by_name
            .insert(name.to_string(), id.to_string())
            .filter(|previous| previous != id)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// Entries ordered by display name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_name.iter().map(|(n, id)| (n.as_str(), id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
