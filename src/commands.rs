use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use crate::core::config::{LinkStrategy, ServerPaths, ServerSettings};
use crate::core::downloader::Downloader;
use crate::core::error::{ServerError, ServerResult};
use crate::core::http::build_http_client;
use crate::core::launch::{self, ProcessSpawner, SystemSpawner};
use crate::core::sync::{ensure_server_stopped, SyncOutcome, SyncPipeline};
use crate::core::workshop::SteamCmd;

/// Keeps a dedicated server's workshop mods in sync and launches it.
#[derive(Debug, Parser)]
#[command(name = "armaserver", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub options: GlobalOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Synchronize mods, then start the server (default).
    Run,
    /// Synchronize mods only.
    Sync,
    /// Start the server with whatever is currently on disk.
    Launch,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalOptions {
    /// JSON settings file; environment variables override its values.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Re-download every workshop mod that already has a cache.
    #[arg(long, global = true)]
    pub force_refresh: bool,

    /// How the presentation directory is reconciled.
    #[arg(long, value_enum, global = true)]
    pub strategy: Option<LinkStrategy>,

    /// Do not run SteamCMD app_update for the server itself.
    #[arg(long, global = true)]
    pub skip_server_update: bool,

    /// Print the composed command lines instead of starting anything.
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Run)
    }

    /// Settings file, then environment, then flags.
    pub fn load_settings(&self) -> ServerResult<ServerSettings> {
        let mut settings = match &self.options.settings {
            Some(path) => ServerSettings::load_file(path)?,
            None => match ServerSettings::default_path().filter(|p| p.is_file()) {
                Some(path) => {
                    info!("Loading settings from {:?}", path);
                    ServerSettings::load_file(&path)?
                }
                None => ServerSettings::default(),
            },
        };
        settings.apply_process_env()?;
        self.options.apply(&mut settings);
        Ok(settings)
    }
}

impl GlobalOptions {
    pub fn apply(&self, settings: &mut ServerSettings) {
        if self.force_refresh {
            settings.force_download = true;
        }
        if let Some(strategy) = self.strategy {
            settings.link_strategy = strategy;
        }
        if self.skip_server_update {
            settings.update_server = false;
        }
        if self.verbose {
            settings.debug = true;
        }
    }
}

/// Runs the selected command. Returns the process exit code.
pub async fn execute(cli: &Cli, settings: &ServerSettings) -> ServerResult<i32> {
    match cli.command() {
        Command::Sync => {
            sync(settings).await?;
            Ok(0)
        }
        Command::Launch => start(settings, cli.options.dry_run, &SystemSpawner).await,
        Command::Run => {
            sync(settings).await?;
            start(settings, cli.options.dry_run, &SystemSpawner).await
        }
    }
}

/// Updates the server installation and synchronizes workshop mods.
pub async fn sync(settings: &ServerSettings) -> ServerResult<SyncOutcome> {
    settings.validate_for_sync()?;
    ensure_server_stopped(&settings.server_binary())?;

    let client = build_http_client(settings.network.http_timeout())?;
    let downloader = Downloader::new(client).with_retries(settings.network.http_retries);
    let steamcmd = SteamCmd::new(
        &settings.steamcmd_path,
        settings.steam.clone(),
        settings.network.fetch_timeout(),
    );

    if settings.update_server || settings.has_catalog() {
        steamcmd.ensure_installed(&downloader).await?;
    }

    if settings.update_server {
        info!("Updating server ({})", settings.server_app_id);
        if let Err(e) = steamcmd
            .update_server(&settings.server_dir, &settings.server_app_id)
            .await
        {
            error!("Server update failed, continuing with the installed server: {}", e);
        }
    }

    info!("Checking workshop mods");
    SyncPipeline::new(settings, &downloader, &steamcmd).run().await
}

/// Starts the server and headless clients, then waits for the server to exit.
pub async fn start(
    settings: &ServerSettings,
    dry_run: bool,
    spawner: &dyn ProcessSpawner,
) -> ServerResult<i32> {
    let paths = ServerPaths::new(settings);

    if dry_run {
        settings.validate_for_launch()?;
        let plan = launch::compose(settings, &paths)?;
        println!("{}", plan.server.command_line());
        for client in &plan.headless {
            println!("{}", client.command_line());
        }
        return Ok(0);
    }

    info!("Launching server");
    let mut server = launch::launch(settings, &paths, spawner).await?;
    match server.wait().await? {
        Some(code) => {
            info!("Server exited with code {}", code);
            Ok(code)
        }
        None => Err(ServerError::Other(
            "Server was terminated by a signal".into(),
        )),
    }
}
