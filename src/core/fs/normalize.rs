// ─── Path Normalizer ───
// Lowercases every path segment below a mod directory, deepest entries first.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::error::{ServerError, ServerResult};

#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    pub renamed: usize,
    /// Entries left alone because the lowercase name was already taken.
    pub conflicts: Vec<ServerError>,
}

/// Renames everything below `root` to lowercase. `root` itself keeps its name.
///
/// Running it twice is a no-op the second time.
pub fn normalize_tree(root: &Path) -> ServerResult<NormalizeOutcome> {
    // Collect up front: renaming while walking would invalidate the iterator.
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            ServerError::io(path, e.into())
        })?;
        entries.push(entry.into_path());
    }

    let mut outcome = NormalizeOutcome::default();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_lowercase();
        if lower == name {
            continue;
        }

        let Some(parent) = path.parent() else {
            continue;
        };
        let target = parent.join(&lower);
        if target.symlink_metadata().is_ok() {
            warn!("Cannot rename {:?}: {:?} already exists", path, target);
            outcome.conflicts.push(ServerError::Conflict {
                path: path.clone(),
                reason: format!("lowercase name {:?} already exists", lower),
            });
            continue;
        }

        std::fs::rename(&path, &target).map_err(|e| ServerError::io(&path, e))?;
        outcome.renamed += 1;
    }

    debug!("Normalized {:?}: {} rename(s)", root, outcome.renamed);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn listing(root: &Path) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| {
                e.unwrap()
                    .path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn lowercases_nested_paths_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("450814997");
        fs::create_dir_all(root.join("Addons/Sub")).unwrap();
        fs::create_dir_all(root.join("Keys")).unwrap();
        fs::write(root.join("Addons/Sub/CBA_Main.PBO"), b"pbo").unwrap();
        fs::write(root.join("Keys/CBA_3.15.bikey"), b"key").unwrap();
        fs::write(root.join("mod.cpp"), b"cpp").unwrap();

        let first = normalize_tree(&root).unwrap();
        assert_eq!(first.renamed, 5);
        assert!(first.conflicts.is_empty());
        assert_eq!(
            listing(&root),
            vec![
                "addons",
                "addons/sub",
                "addons/sub/cba_main.pbo",
                "keys",
                "keys/cba_3.15.bikey",
                "mod.cpp",
            ]
        );
        assert_eq!(fs::read(root.join("addons/sub/cba_main.pbo")).unwrap(), b"pbo");

        let before = listing(&root);
        let second = normalize_tree(&root).unwrap();
        assert_eq!(second.renamed, 0);
        assert_eq!(listing(&root), before);
    }

    #[test]
    fn root_name_is_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("MixedCase");
        fs::create_dir_all(&root).unwrap();
        normalize_tree(&root).unwrap();
        assert!(root.is_dir());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sibling_collision_is_recorded_and_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("1");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Readme.txt"), b"upper").unwrap();
        fs::write(root.join("readme.txt"), b"lower").unwrap();
        fs::write(root.join("Other.txt"), b"other").unwrap();

        let outcome = normalize_tree(&root).unwrap();
        assert_eq!(outcome.renamed, 1);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(matches!(
            &outcome.conflicts[0],
            ServerError::Conflict { path, .. } if path.ends_with("Readme.txt")
        ));
        assert_eq!(fs::read(root.join("readme.txt")).unwrap(), b"lower");
        assert!(root.join("other.txt").is_file());
    }
}
