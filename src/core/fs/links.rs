// ─── Link Reconciler ───
// Maintains the `@<display name>` entries the server loads workshop mods from.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::config::LinkStrategy;
use crate::core::error::{ServerError, ServerResult};
use crate::core::report::IntegrityWarning;
use crate::core::workshop::ModRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Symbolic,
    /// A real directory whose files are hard links into the cache.
    Hard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationLink {
    pub id: String,
    pub presentation_path: PathBuf,
    pub target: PathBuf,
    pub kind: LinkKind,
}

#[derive(Debug, Default)]
pub struct Reconciled {
    pub links: Vec<PresentationLink>,
    pub warnings: Vec<IntegrityWarning>,
    /// Per-mod problems that kept an entry from being created.
    pub conflicts: Vec<(String, ServerError)>,
}

pub struct LinkReconciler {
    presentation: PathBuf,
    strategy: LinkStrategy,
}

impl LinkReconciler {
    pub fn new(presentation: impl Into<PathBuf>, strategy: LinkStrategy) -> Self {
        Self {
            presentation: presentation.into(),
            strategy,
        }
    }

    pub fn presentation(&self) -> &Path {
        &self.presentation
    }

    pub fn link_path(&self, display_name: &str) -> PathBuf {
        self.presentation.join(format!("@{}", display_name))
    }

    /// Start-of-run housekeeping. Rebuild wipes the presentation directory.
    pub fn prepare(&self) -> ServerResult<()> {
        if self.strategy == LinkStrategy::Rebuild {
            info!("Removing workshop mod links from {:?}", self.presentation);
            match std::fs::remove_dir_all(&self.presentation) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ServerError::io(&self.presentation, e)),
            }
        }
        std::fs::create_dir_all(&self.presentation)
            .map_err(|e| ServerError::io(&self.presentation, e))
    }

    /// Creates presentation entries for every registered mod whose cache
    /// directory exists below `workshop_content`.
    pub fn reconcile(
        &self,
        registry: &ModRegistry,
        workshop_content: &Path,
    ) -> ServerResult<Reconciled> {
        std::fs::create_dir_all(&self.presentation)
            .map_err(|e| ServerError::io(&self.presentation, e))?;

        let mut result = Reconciled::default();

        for (display_name, id) in registry.iter() {
            let target = workshop_content.join(id);
            if !target.is_dir() {
                result.warnings.push(IntegrityWarning::MissingCache {
                    display_name: display_name.to_string(),
                    id: id.to_string(),
                    expected: target,
                });
                continue;
            }

            let link = self.link_path(display_name);
            let outcome = match self.strategy {
                LinkStrategy::Rebuild => symlink_entry(&target, &link).map(|_| LinkKind::Symbolic),
                LinkStrategy::Incremental => hard_link_tree(&target, &link).map(|_| LinkKind::Hard),
            };

            match outcome {
                Ok(kind) => {
                    debug!("Linked {:?} -> {:?}", link, target);
                    result.links.push(PresentationLink {
                        id: id.to_string(),
                        presentation_path: link,
                        target,
                        kind,
                    });
                }
                Err(e) => result.conflicts.push((id.to_string(), e)),
            }
        }

        if self.strategy == LinkStrategy::Incremental {
            result.warnings.extend(self.dangling_links());
        }

        Ok(result)
    }

    /// Symlinks below the presentation directory whose target is gone.
    pub fn dangling_links(&self) -> Vec<IntegrityWarning> {
        WalkDir::new(&self.presentation)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.path_is_symlink())
            .filter(|entry| std::fs::metadata(entry.path()).is_err())
            .map(|entry| IntegrityWarning::DanglingLink {
                target: std::fs::read_link(entry.path()).unwrap_or_default(),
                link: entry.into_path(),
            })
            .collect()
    }
}

fn symlink_entry(target: &Path, link: &Path) -> ServerResult<()> {
    match std::fs::symlink_metadata(link) {
        Ok(meta) if meta.file_type().is_symlink() => {
            std::fs::remove_file(link).map_err(|e| ServerError::io(link, e))?;
        }
        Ok(_) => {
            return Err(ServerError::Conflict {
                path: link.to_path_buf(),
                reason: "a non-link entry already occupies this name".into(),
            });
        }
        Err(_) => {}
    }

    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(target, link);
    #[cfg(windows)]
    let created = std::os::windows::fs::symlink_dir(target, link);

    created.map_err(|e| ServerError::io(link, e))
}

/// Mirrors `source` into `dest` with hard links, leaving existing entries alone.
fn hard_link_tree(source: &Path, dest: &Path) -> ServerResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|e| ServerError::io(source, e.into()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| ServerError::Other(e.to_string()))?;
        let destination = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .map_err(|e| ServerError::io(&destination, e))?;
            continue;
        }

        if destination.symlink_metadata().is_ok() {
            continue;
        }
        std::fs::hard_link(entry.path(), &destination)
            .map_err(|e| ServerError::io(&destination, e))?;
    }
    Ok(())
}
