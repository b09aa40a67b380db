// ─── Launch Task ───
// Spawns the dedicated server and its headless clients.

use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::args::{compose, LaunchPlan, LaunchSpec};
use crate::core::config::{ServerPaths, ServerSettings};
use crate::core::error::{ServerError, ServerResult};

/// A started process the caller may wait on.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Waits for exit; `None` when the process was terminated by a signal.
    async fn wait(&mut self) -> ServerResult<Option<i32>>;
}

/// Starts processes from a [`LaunchSpec`].
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, spec: &LaunchSpec) -> ServerResult<Box<dyn ProcessHandle>>;
}

/// Spawns real child processes with inherited stdout/stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSpawner;

struct ChildHandle {
    child: tokio::process::Child,
    program: std::path::PathBuf,
}

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn wait(&mut self) -> ServerResult<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ServerError::io(&self.program, e))?;
        Ok(status.code())
    }
}

#[async_trait]
impl ProcessSpawner for SystemSpawner {
    async fn spawn(&self, spec: &LaunchSpec) -> ServerResult<Box<dyn ProcessHandle>> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null());

        debug!("Command (copy/paste): {}", spec.command_line());

        let child = cmd.spawn().map_err(|source| ServerError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        Ok(Box::new(ChildHandle {
            child,
            program: spec.program.clone(),
        }))
    }
}

/// Starts the server, then every headless client.
///
/// Client handles are dropped right away and a client that fails to start
/// is only logged; the server's handle is always returned once it runs.
pub async fn start(
    plan: &LaunchPlan,
    spawner: &dyn ProcessSpawner,
) -> ServerResult<Box<dyn ProcessHandle>> {
    info!("Launching server: {}", plan.server.command_line());
    let server = spawner.spawn(&plan.server).await?;

    for (index, client) in plan.headless.iter().enumerate() {
        info!("Launching headless client {}: {}", index + 1, client.command_line());
        if let Err(e) = spawner.spawn(client).await {
            warn!("Headless client {} failed to start: {}", index + 1, e);
        }
    }

    Ok(server)
}

/// Composes the launch plan for the current state and starts it.
pub async fn launch(
    settings: &ServerSettings,
    paths: &ServerPaths,
    spawner: &dyn ProcessSpawner,
) -> ServerResult<Box<dyn ProcessHandle>> {
    settings.validate_for_launch()?;
    let plan = compose(settings, paths)?;
    start(&plan, spawner).await
}
