use std::path::{Path, PathBuf};

use super::settings::ServerSettings;

/// Directory layout below the server installation.
#[derive(Debug, Clone)]
pub struct ServerPaths {
    server_dir: PathBuf,
    workshop_content: PathBuf,
    presentation: PathBuf,
    local_mods: PathBuf,
    server_mods: PathBuf,
    keys: PathBuf,
    configs: PathBuf,
}

impl ServerPaths {
    pub fn new(settings: &ServerSettings) -> Self {
        let root = settings.server_dir.clone();
        Self {
            workshop_content: root
                .join("steamapps")
                .join("workshop")
                .join("content")
                .join(&settings.workshop_app_id),
            presentation: root.join("workshop"),
            local_mods: root.join("mods"),
            server_mods: root.join("servermods"),
            keys: root.join("keys"),
            configs: root.join("configs"),
            server_dir: root,
        }
    }

    pub fn server_dir(&self) -> &Path {
        &self.server_dir
    }

    /// Where SteamCMD materializes `<workshop_content>/<id>`.
    pub fn workshop_content(&self) -> &Path {
        &self.workshop_content
    }

    /// Cache directory of one workshop item.
    pub fn cache_dir(&self, id: &str) -> PathBuf {
        self.workshop_content.join(id)
    }

    /// `@<display name>` entries the server loads workshop mods from.
    pub fn presentation(&self) -> &Path {
        &self.presentation
    }

    pub fn local_mods(&self) -> &Path {
        &self.local_mods
    }

    pub fn server_mods(&self) -> &Path {
        &self.server_mods
    }

    pub fn keys(&self) -> &Path {
        &self.keys
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.configs.join(name)
    }

    pub fn profiles(&self) -> PathBuf {
        self.configs.join("profiles")
    }

    /// Local copy of a remotely fetched catalog.
    pub fn preset_file(&self) -> PathBuf {
        self.server_dir.join("preset.html")
    }

    /// `path` relative to the server directory, as the server expects mod paths.
    pub fn relative_to_server(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.server_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
