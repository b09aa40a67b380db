pub mod parser;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::downloader::DocumentSource;
use crate::core::error::{ServerError, ServerResult};

pub use parser::{Catalog, CatalogIds};

/// Where the list of required workshop items comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// No mods required.
    None,
    Url(String),
    File(PathBuf),
}

impl CatalogSource {
    /// Interprets the configured value: empty means none, `http…` means remote.
    pub fn from_setting(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => CatalogSource::None,
            Some(value) if value.starts_with("http") => CatalogSource::Url(value.to_string()),
            Some(value) => CatalogSource::File(PathBuf::from(value)),
        }
    }

    /// Resolves the source into a parsed catalog.
    ///
    /// A remote catalog is saved to `preset_path` before parsing. Failing to
    /// retrieve it is fatal: a partial catalog would unlink mods.
    pub async fn load(
        &self,
        documents: &dyn DocumentSource,
        preset_path: &Path,
    ) -> ServerResult<Option<Catalog>> {
        match self {
            CatalogSource::None => {
                debug!("WORKSHOP_MODS not set, nothing to do.");
                Ok(None)
            }
            CatalogSource::Url(url) => {
                info!("Downloading workshop catalog from {}", url);
                let bytes = documents.fetch(url).await?;
                if let Some(parent) = preset_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| ServerError::io(parent, e))?;
                }
                tokio::fs::write(preset_path, &bytes)
                    .await
                    .map_err(|e| ServerError::io(preset_path, e))?;
                Ok(Some(Catalog::from_bytes(&bytes)))
            }
            CatalogSource::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        ServerError::Configuration(format!(
                            "Unable to load WORKSHOP_MODS file {:?}; it should be added to the volume in the server directory",
                            path
                        ))
                    } else {
                        ServerError::io(path, e)
                    }
                })?;
                Ok(Some(Catalog::from_bytes(&bytes)))
            }
        }
    }
}
