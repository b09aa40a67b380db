// ─── Workshop Fetcher ───
// Batched downloads through SteamCMD, plus server updates and bootstrap.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::config::SteamSettings;
use crate::core::downloader::Downloader;
use crate::core::error::{ServerError, ServerResult};

pub const STEAMCMD_ARCHIVE_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

const REDACTED: &str = "<redacted>";

/// Where and how a batch of workshop items gets materialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// `force_install_dir`; items land in `steamapps/workshop/content/<app_id>`.
    pub install_dir: PathBuf,
    pub app_id: String,
    pub validate: bool,
}

impl FetchOptions {
    pub fn content_dir(&self) -> PathBuf {
        self.install_dir
            .join("steamapps")
            .join("workshop")
            .join("content")
            .join(&self.app_id)
    }
}

/// Downloads workshop items into their cache directories.
///
/// Implementations must leave `<content_dir>/<id>` in place for every id on
/// success.
#[async_trait]
pub trait ModFetcher: Send + Sync {
    async fn fetch(&self, ids: &[String], options: &FetchOptions) -> ServerResult<()>;
}

/// SteamCMD command-line driver.
#[derive(Debug, Clone)]
pub struct SteamCmd {
    program: PathBuf,
    steam: SteamSettings,
    timeout: Duration,
}

impl SteamCmd {
    pub fn new(program: impl Into<PathBuf>, steam: SteamSettings, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            steam,
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn login_args(&self) -> Vec<String> {
        let mut args = vec!["+login".to_string()];
        match &self.steam.username {
            Some(user) => {
                args.push(user.clone());
                if let Some(password) = &self.steam.password {
                    args.push(password.clone());
                }
            }
            None => args.push("anonymous".to_string()),
        }
        args
    }

    /// Arguments for a single batched workshop download.
    pub fn workshop_args(&self, ids: &[String], options: &FetchOptions) -> Vec<String> {
        let mut args = vec![
            "+force_install_dir".to_string(),
            options.install_dir.to_string_lossy().into_owned(),
        ];
        args.extend(self.login_args());
        for id in ids {
            args.push("+workshop_download_item".to_string());
            args.push(options.app_id.clone());
            args.push(id.clone());
            if options.validate {
                args.push("validate".to_string());
            }
        }
        args.push("+quit".to_string());
        args
    }

    /// Arguments for installing or updating the dedicated server itself.
    pub fn app_update_args(&self, install_dir: &Path, app_id: &str) -> Vec<String> {
        let mut args = vec![
            "+force_install_dir".to_string(),
            install_dir.to_string_lossy().into_owned(),
        ];
        args.extend(self.login_args());
        args.push("+app_update".to_string());
        args.push(app_id.to_string());
        if let Some(branch) = &self.steam.branch {
            args.push("-beta".to_string());
            args.push(branch.clone());
        }
        if let Some(branch_password) = &self.steam.branch_password {
            args.push("-betapassword".to_string());
            args.push(branch_password.clone());
        }
        if self.steam.validate {
            args.push("validate".to_string());
        }
        args.push("+quit".to_string());
        args
    }

    pub async fn update_server(&self, install_dir: &Path, app_id: &str) -> ServerResult<()> {
        info!("Updating server (app {}) in {:?}", app_id, install_dir);
        let args = self.app_update_args(install_dir, app_id);
        self.run(&args)
            .await
            .map_err(|reason| ServerError::FetchTool {
                ids: vec![app_id.to_string()],
                reason,
            })
    }

    /// Downloads and unpacks SteamCMD next to `program` when it is missing.
    pub async fn ensure_installed(&self, downloader: &Downloader) -> ServerResult<()> {
        if self.program.exists() {
            return Ok(());
        }

        let target_dir = self
            .program
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                ServerError::Configuration(format!(
                    "SteamCMD path {:?} has no parent directory",
                    self.program
                ))
            })?;

        info!("SteamCMD not found at {:?}, installing", self.program);
        let archive = target_dir.join("steamcmd_linux.tar.gz");
        downloader.download_file(STEAMCMD_ARCHIVE_URL, &archive).await?;

        let unpack_archive = archive.clone();
        let unpack_dir = target_dir;
        tokio::task::spawn_blocking(move || unpack_tar_gz(&unpack_archive, &unpack_dir))
            .await
            .map_err(|e| ServerError::Other(format!("SteamCMD unpack task failed: {}", e)))??;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            debug!("Could not remove {:?}: {}", archive, e);
        }

        if !self.program.exists() {
            return Err(ServerError::Configuration(format!(
                "SteamCMD archive did not contain {:?}",
                self.program
            )));
        }
        Ok(())
    }

    /// Runs SteamCMD; `Err` carries a human-readable reason.
    async fn run(&self, args: &[String]) -> Result<(), String> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(
            "Command (copy/paste): {}",
            format_command_for_logs(&self.program, args, &self.secrets())
        );

        let status = match tokio::time::timeout(self.timeout, cmd.status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(format!("could not start {:?}: {}", self.program, e)),
            Err(_) => return Err(format!("timed out after {:?}", self.timeout)),
        };

        if status.success() {
            Ok(())
        } else {
            Err(format!("exited with {:?}", status.code()))
        }
    }

    fn secrets(&self) -> Vec<&str> {
        [&self.steam.password, &self.steam.branch_password]
            .into_iter()
            .filter_map(|s| s.as_deref())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[async_trait]
impl ModFetcher for SteamCmd {
    async fn fetch(&self, ids: &[String], options: &FetchOptions) -> ServerResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        info!("Downloading {} workshop item(s)", ids.len());
        let args = self.workshop_args(ids, options);
        if let Err(reason) = self.run(&args).await {
            // SteamCMD often exits non-zero after partial success; the
            // directory check below is authoritative.
            warn!("SteamCMD {}", reason);
        }

        let content_dir = options.content_dir();
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !content_dir.join(id.as_str()).is_dir())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServerError::FetchTool {
                ids: missing,
                reason: format!("no directory under {:?} after download", content_dir),
            })
        }
    }
}

fn unpack_tar_gz(archive: &Path, dest: &Path) -> ServerResult<()> {
    let file = std::fs::File::open(archive).map_err(|e| ServerError::io(archive, e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);
    tarball
        .unpack(dest)
        .map_err(|e| ServerError::io(dest, e))
}

/// Renders a command line for the log with secrets replaced.
pub fn format_command_for_logs(program: &Path, args: &[String], secrets: &[&str]) -> String {
    let program = shell_escape(&program.to_string_lossy());
    let args = args
        .iter()
        .map(|arg| {
            if secrets.contains(&arg.as_str()) {
                REDACTED.to_string()
            } else {
                shell_escape(arg)
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if args.is_empty() {
        program
    } else {
        format!("{} {}", program, args)
    }
}

pub fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=' | '+' | '@')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
