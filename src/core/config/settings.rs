use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{ServerError, ServerResult};

const APP_DIR_NAME: &str = "armaserver";
const SETTINGS_FILE: &str = "settings.json";

/// How the presentation directory is brought in line with the cache.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LinkStrategy {
    /// Wipe presentation and key directories, then symlink everything again.
    #[default]
    Rebuild,
    /// Never wipe; hard-link files that are missing from the presentation tree.
    Incremental,
}

impl FromStr for LinkStrategy {
    type Err = ServerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "rebuild" | "symlink" => Ok(Self::Rebuild),
            "incremental" | "hardlink" => Ok(Self::Incremental),
            other => Err(ServerError::Configuration(format!(
                "unknown link strategy '{other}' (expected 'rebuild' or 'incremental')"
            ))),
        }
    }
}

impl fmt::Display for LinkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStrategy::Rebuild => write!(f, "rebuild"),
            LinkStrategy::Incremental => write!(f, "incremental"),
        }
    }
}

/// Credentials and switches handed to SteamCMD.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub branch: Option<String>,
    pub branch_password: Option<String>,
    pub validate: bool,
}

impl fmt::Debug for SteamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamSettings")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("branch", &self.branch)
            .field(
                "branch_password",
                &self.branch_password.as_ref().map(|_| "<redacted>"),
            )
            .field("validate", &self.validate)
            .finish()
    }
}

/// Values that end up on the server command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Server executable; defaults to `<server_dir>/arma3server_x64`.
    pub binary: Option<PathBuf>,
    pub limit_fps: u32,
    pub world: String,
    /// DLC folder names, passed through as `-mod=<name>`.
    pub cdlc: Vec<String>,
    /// Free-form extra flags, split shell-style.
    pub params: Option<String>,
    /// File name below `<server_dir>/configs`.
    pub config: String,
    pub port: u16,
    pub profile: String,
    pub headless_clients: u32,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            binary: None,
            limit_fps: 1000,
            world: "empty".into(),
            cdlc: Vec::new(),
            params: None,
            config: "server.cfg".into(),
            port: 2302,
            profile: "arma3".into(),
            headless_clients: 0,
        }
    }
}

/// Timeouts and limits for network probes and the external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub http_timeout_secs: u64,
    pub http_retries: u32,
    pub probe_concurrency: usize,
    pub fetch_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            http_retries: 2,
            probe_concurrency: 4,
            fetch_timeout_secs: 3600,
        }
    }
}

impl NetworkSettings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Full configuration for one sync + launch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub server_dir: PathBuf,
    pub server_app_id: String,
    pub workshop_app_id: String,
    pub steamcmd_path: PathBuf,
    pub steam: SteamSettings,
    /// Catalog source: empty for none, `http...` for a remote preset, otherwise a local file.
    pub workshop_mods: Option<String>,
    pub force_download: bool,
    pub update_server: bool,
    pub link_strategy: LinkStrategy,
    pub launch: LaunchSettings,
    pub network: NetworkSettings,
    pub debug: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            server_dir: PathBuf::from("/arma3"),
            server_app_id: "233780".into(),
            workshop_app_id: "107410".into(),
            steamcmd_path: PathBuf::from("/steamcmd/steamcmd.sh"),
            steam: SteamSettings::default(),
            workshop_mods: None,
            force_download: false,
            update_server: true,
            link_strategy: LinkStrategy::default(),
            launch: LaunchSettings::default(),
            network: NetworkSettings::default(),
            debug: false,
        }
    }
}

impl ServerSettings {
    /// Loads a JSON settings file. Missing keys fall back to defaults.
    pub fn load_file(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ServerError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Settings file location used when `--settings` is not given.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE))
    }

    /// Layers the process environment over `self`.
    pub fn apply_process_env(&mut self) -> ServerResult<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Layers environment values over `self`. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> ServerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = get("ARMA_DIR") {
            self.server_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("STEAMCMD_PATH") {
            self.steamcmd_path = PathBuf::from(path);
        }
        if let Some(user) = get("STEAM_USERNAME") {
            self.steam.username = Some(user);
        }
        if let Some(password) = get("STEAM_PASSWORD") {
            self.steam.password = Some(password);
        }
        if let Some(branch) = get("STEAM_BRANCH") {
            self.steam.branch = Some(branch);
        }
        if let Some(password) = get("STEAM_BRANCH_PASSWORD") {
            self.steam.branch_password = Some(password);
        }
        if let Some(flag) = get("STEAM_VALIDATE") {
            self.steam.validate = parse_flag(&flag);
        }
        if let Some(source) = get("WORKSHOP_MODS") {
            self.workshop_mods = Some(source);
        }
        if let Some(flag) = get("FORCE_DOWNLOAD_WORKSHOP") {
            self.force_download = parse_flag(&flag);
        }
        if let Some(strategy) = get("MODS_LINK_STRATEGY") {
            self.link_strategy = strategy.parse()?;
        }
        if let Some(flag) = get("DEBUG") {
            self.debug = parse_flag(&flag);
        }
        if let Some(binary) = get("ARMA_BINARY") {
            self.launch.binary = Some(PathBuf::from(binary));
        }
        if let Some(fps) = get("ARMA_LIMITFPS") {
            self.launch.limit_fps = parse_number("ARMA_LIMITFPS", &fps)?;
        }
        if let Some(world) = get("ARMA_WORLD") {
            self.launch.world = world;
        }
        if let Some(cdlc) = get("ARMA_CDLC") {
            self.launch.cdlc = split_list(&cdlc);
        }
        if let Some(params) = get("ARMA_PARAMS") {
            self.launch.params = Some(params);
        }
        if let Some(config) = get("ARMA_CONFIG") {
            self.launch.config = config;
        }
        if let Some(port) = get("PORT") {
            self.launch.port = parse_number("PORT", &port)?;
        }
        if let Some(profile) = get("ARMA_PROFILE") {
            self.launch.profile = profile;
        }
        if let Some(count) = get("HEADLESS_CLIENTS") {
            self.launch.headless_clients = parse_number("HEADLESS_CLIENTS", &count)?;
        }

        debug!("Settings after environment overlay: {:?}", self);
        Ok(())
    }

    /// Server executable, defaulting to the dedicated 64-bit binary.
    pub fn server_binary(&self) -> PathBuf {
        self.launch
            .binary
            .clone()
            .unwrap_or_else(|| self.server_dir.join("arma3server_x64"))
    }

    /// True when a non-empty catalog source is configured.
    pub fn has_catalog(&self) -> bool {
        self.workshop_mods
            .as_deref()
            .is_some_and(|source| !source.trim().is_empty())
    }

    /// Checks everything the sync phase needs. Runs before any mutation.
    pub fn validate_for_sync(&self) -> ServerResult<()> {
        let needs_steam = self.update_server || self.has_catalog();
        if needs_steam {
            if self.steam.username.is_none() {
                return Err(ServerError::Configuration(
                    "STEAM_USERNAME is required to update the server or download workshop mods"
                        .into(),
                ));
            }
            if self.steam.password.is_none() {
                return Err(ServerError::Configuration(
                    "STEAM_PASSWORD is required to update the server or download workshop mods"
                        .into(),
                ));
            }
        }
        if self.network.probe_concurrency == 0 {
            return Err(ServerError::Configuration(
                "probe_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Checks everything the launch phase needs.
    pub fn validate_for_launch(&self) -> ServerResult<()> {
        if self.launch.config.trim().is_empty() {
            return Err(ServerError::Configuration("ARMA_CONFIG must not be empty".into()));
        }
        if self.launch.profile.trim().is_empty() {
            return Err(ServerError::Configuration("ARMA_PROFILE must not be empty".into()));
        }
        if self.launch.world.trim().is_empty() {
            return Err(ServerError::Configuration("ARMA_WORLD must not be empty".into()));
        }
        if self.launch.port == 0 {
            return Err(ServerError::Configuration("PORT must not be 0".into()));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> ServerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ServerError::Configuration(format!("{key} must be a number, got '{raw}'")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_overlay_maps_original_variable_names() {
        let vars = env(&[
            ("STEAM_USERNAME", "operator"),
            ("STEAM_PASSWORD", "hunter2"),
            ("STEAM_VALIDATE", "1"),
            ("WORKSHOP_MODS", "https://example.com/preset.html"),
            ("FORCE_DOWNLOAD_WORKSHOP", "0"),
            ("ARMA_BINARY", "/arma3/arma3server"),
            ("ARMA_LIMITFPS", "120"),
            ("ARMA_WORLD", "altis"),
            ("ARMA_CDLC", "gm;vn;"),
            ("ARMA_CONFIG", "main.cfg"),
            ("PORT", "2402"),
            ("ARMA_PROFILE", "main"),
            ("HEADLESS_CLIENTS", "2"),
            ("MODS_LINK_STRATEGY", "incremental"),
        ]);

        let mut settings = ServerSettings::default();
        settings.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(settings.steam.username.as_deref(), Some("operator"));
        assert!(settings.steam.validate);
        assert!(!settings.force_download);
        assert_eq!(settings.server_binary(), PathBuf::from("/arma3/arma3server"));
        assert_eq!(settings.launch.limit_fps, 120);
        assert_eq!(settings.launch.world, "altis");
        assert_eq!(settings.launch.cdlc, vec!["gm", "vn"]);
        assert_eq!(settings.launch.port, 2402);
        assert_eq!(settings.launch.headless_clients, 2);
        assert_eq!(settings.link_strategy, LinkStrategy::Incremental);
        assert!(settings.has_catalog());
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let vars = env(&[("WORKSHOP_MODS", ""), ("ARMA_WORLD", "  ")]);
        let mut settings = ServerSettings::default();
        settings.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert!(!settings.has_catalog());
        assert_eq!(settings.launch.world, "empty");
    }

    #[test]
    fn malformed_port_is_a_configuration_error() {
        let vars = env(&[("PORT", "twenty")]);
        let mut settings = ServerSettings::default();
        let err = settings.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ServerError::Configuration(_)));
    }

    #[test]
    fn sync_requires_credentials_only_when_steam_is_used() {
        let mut settings = ServerSettings::default();
        settings.update_server = false;
        assert!(settings.validate_for_sync().is_ok());

        settings.workshop_mods = Some("preset.html".into());
        assert!(matches!(
            settings.validate_for_sync(),
            Err(ServerError::Configuration(_))
        ));

        settings.steam.username = Some("operator".into());
        settings.steam.password = Some("secret".into());
        assert!(settings.validate_for_sync().is_ok());
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let mut settings = ServerSettings::default();
        settings.steam.password = Some("hunter2".into());
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn json_file_fills_missing_fields_with_defaults() {
        let json = r#"{ "server_dir": "/srv/arma", "launch": { "port": 2500 } }"#;
        let settings: ServerSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.server_dir, PathBuf::from("/srv/arma"));
        assert_eq!(settings.launch.port, 2500);
        assert_eq!(settings.launch.world, "empty");
        assert_eq!(settings.workshop_app_id, "107410");
    }

    #[test]
    fn link_strategy_parses_aliases() {
        assert_eq!("hardlink".parse::<LinkStrategy>().unwrap(), LinkStrategy::Incremental);
        assert_eq!("Rebuild".parse::<LinkStrategy>().unwrap(), LinkStrategy::Rebuild);
        assert!("copy".parse::<LinkStrategy>().is_err());
    }
}
