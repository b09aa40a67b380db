// ─── Key Propagation ───
// Flattens each mod's `keys/**` files into the server-wide key directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::core::config::LinkStrategy;
use crate::core::error::{ServerError, ServerResult};
use crate::core::report::IntegrityWarning;

/// How key files reach the key directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Copy,
    /// Hard link, falling back to a copy across filesystems.
    HardLink,
}

impl From<LinkStrategy> for KeyMode {
    fn from(strategy: LinkStrategy) -> Self {
        match strategy {
            LinkStrategy::Rebuild => KeyMode::Copy,
            LinkStrategy::Incremental => KeyMode::HardLink,
        }
    }
}

struct KeyOrigin {
    mod_dir: PathBuf,
    source: PathBuf,
}

/// The server key directory plus a record of which mod supplied each file
/// during this run.
pub struct KeyStore {
    dir: PathBuf,
    mode: KeyMode,
    origins: HashMap<String, KeyOrigin>,
}

impl KeyStore {
    pub fn new(dir: impl Into<PathBuf>, mode: KeyMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
            origins: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deletes and recreates the key directory.
    pub fn reset(&mut self) -> ServerResult<()> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ServerError::io(&self.dir, e)),
        }
        self.origins.clear();
        self.ensure_dir()
    }

    pub fn ensure_dir(&self) -> ServerResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ServerError::io(&self.dir, e))
    }

    /// Places every file below `<mod_dir>/keys` into the key directory.
    ///
    /// Returns the warnings raised along the way: a missing `keys` directory or
    /// a file name another mod already supplied.
    pub fn propagate(&mut self, mod_dir: &Path) -> ServerResult<Vec<IntegrityWarning>> {
        let Some(keys_dir) = find_keys_dir(mod_dir) else {
            return Ok(vec![IntegrityWarning::MissingKeys {
                mod_dir: mod_dir.to_path_buf(),
            }]);
        };

        self.ensure_dir()?;
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&keys_dir).follow_links(true).min_depth(1) {
            let entry = entry.map_err(|e| ServerError::io(&keys_dir, e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let source = entry.path();
            let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let destination = self.dir.join(file_name);

            if let Some(previous) = self.origins.get(file_name) {
                if previous.mod_dir != mod_dir {
                    warnings.push(IntegrityWarning::DuplicateKey {
                        file_name: file_name.to_string(),
                        previous: previous.source.clone(),
                        replaced_by: source.to_path_buf(),
                        identical: same_contents(&previous.source, source),
                    });
                }
            }

            self.place(source, &destination)?;
            self.origins.insert(
                file_name.to_string(),
                KeyOrigin {
                    mod_dir: mod_dir.to_path_buf(),
                    source: source.to_path_buf(),
                },
            );
        }

        Ok(warnings)
    }

    fn place(&self, source: &Path, destination: &Path) -> ServerResult<()> {
        // Unlink first: writing through an existing hard link would modify
        // the other mod's cached key.
        match std::fs::remove_file(destination) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(ServerError::io(destination, e)),
        }

        if self.mode == KeyMode::HardLink {
            match std::fs::hard_link(source, destination) {
                Ok(()) => return Ok(()),
                Err(e) => debug!("Hard link {:?} failed ({}), copying instead", source, e),
            }
        }

        std::fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| ServerError::io(destination, e))
    }
}

/// `keys` below `mod_dir`, matched case-insensitively for unnormalized local mods.
fn find_keys_dir(mod_dir: &Path) -> Option<PathBuf> {
    let exact = mod_dir.join("keys");
    if exact.is_dir() {
        return Some(exact);
    }
    std::fs::read_dir(mod_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .find(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case("keys"))
        })
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (std::fs::read(a), std::fs::read(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_mod(root: &Path, name: &str, keys: &[(&str, &str)]) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("keys")).unwrap();
        for (file, body) in keys {
            let path = dir.join("keys").join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, body).unwrap();
        }
        dir
    }

    #[test]
    fn nested_keys_are_flattened() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = make_mod(tmp.path(), "1", &[("a.bikey", "a"), ("old/b.bikey", "b")]);
        let mut store = KeyStore::new(tmp.path().join("server/keys"), KeyMode::Copy);

        let warnings = store.propagate(&mod_dir).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(fs::read_to_string(store.dir().join("a.bikey")).unwrap(), "a");
        assert_eq!(fs::read_to_string(store.dir().join("b.bikey")).unwrap(), "b");
    }

    #[test]
    fn missing_keys_directory_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = tmp.path().join("2");
        fs::create_dir_all(mod_dir.join("addons")).unwrap();
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::Copy);

        let warnings = store.propagate(&mod_dir).unwrap();
        assert_eq!(warnings, vec![IntegrityWarning::MissingKeys { mod_dir }]);
    }

    #[test]
    fn uppercase_keys_directory_is_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = tmp.path().join("@local");
        fs::create_dir_all(mod_dir.join("Keys")).unwrap();
        fs::write(mod_dir.join("Keys/local.bikey"), "l").unwrap();
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::Copy);

        assert!(store.propagate(&mod_dir).unwrap().is_empty());
        assert!(store.dir().join("local.bikey").is_file());
    }

    #[test]
    fn cross_mod_collision_keeps_last_and_warns_once() {
        let tmp = tempfile::tempdir().unwrap();
        let first = make_mod(tmp.path(), "1", &[("server.bikey", "first")]);
        let second = make_mod(tmp.path(), "2", &[("server.bikey", "second")]);
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::Copy);

        assert!(store.propagate(&first).unwrap().is_empty());
        let warnings = store.propagate(&second).unwrap();

        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            IntegrityWarning::DuplicateKey { file_name, identical: false, .. }
                if file_name == "server.bikey"
        ));
        let files: Vec<_> = fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(
            fs::read_to_string(store.dir().join("server.bikey")).unwrap(),
            "second"
        );
    }

    #[test]
    fn propagation_order_only_changes_the_collision_winner() {
        let tmp = tempfile::tempdir().unwrap();
        let a = make_mod(tmp.path(), "a", &[("server.bikey", "a"), ("a.bikey", "a")]);
        let b = make_mod(tmp.path(), "b", &[("server.bikey", "b"), ("b.bikey", "b")]);

        let run = |order: [&Path; 2], dir: &str| {
            let mut store = KeyStore::new(tmp.path().join(dir), KeyMode::Copy);
            for mod_dir in order {
                store.propagate(mod_dir).unwrap();
            }
            let mut names: Vec<_> = fs::read_dir(store.dir())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
            names.sort();
            let winner = fs::read_to_string(store.dir().join("server.bikey")).unwrap();
            (names, winner)
        };

        let (forward, forward_winner) = run([a.as_path(), b.as_path()], "keys-forward");
        let (reverse, reverse_winner) = run([b.as_path(), a.as_path()], "keys-reverse");
        assert_eq!(forward, reverse);
        assert_eq!(forward, vec!["a.bikey", "b.bikey", "server.bikey"]);
        assert_eq!(forward_winner, "b");
        assert_eq!(reverse_winner, "a");
    }

    #[test]
    fn propagation_is_idempotent_for_the_same_mod() {
        let tmp = tempfile::tempdir().unwrap();
        let mod_dir = make_mod(tmp.path(), "1", &[("a.bikey", "a")]);
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::HardLink);

        store.propagate(&mod_dir).unwrap();
        assert!(store.propagate(&mod_dir).unwrap().is_empty());
        assert_eq!(fs::read_to_string(store.dir().join("a.bikey")).unwrap(), "a");
    }

    #[test]
    fn hard_linked_key_is_not_written_through() {
        let tmp = tempfile::tempdir().unwrap();
        let first = make_mod(tmp.path(), "1", &[("server.bikey", "first")]);
        let second = make_mod(tmp.path(), "2", &[("server.bikey", "second")]);
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::HardLink);

        store.propagate(&first).unwrap();
        store.propagate(&second).unwrap();

        assert_eq!(
            fs::read_to_string(first.join("keys/server.bikey")).unwrap(),
            "first"
        );
        assert_eq!(
            fs::read_to_string(store.dir().join("server.bikey")).unwrap(),
            "second"
        );
    }

    #[test]
    fn reset_clears_previous_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = KeyStore::new(tmp.path().join("keys"), KeyMode::Copy);
        store.ensure_dir().unwrap();
        fs::write(store.dir().join("stale.bikey"), "x").unwrap();

        store.reset().unwrap();
        assert!(store.dir().is_dir());
        assert_eq!(fs::read_dir(store.dir()).unwrap().count(), 0);
    }
}
