use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{ServerError, ServerResult};

/// Refuses to continue while a process runs from `binary`.
///
/// Rewriting keys and mod links under a live server corrupts its view of them.
pub fn ensure_server_stopped(binary: &Path) -> ServerResult<()> {
    if let Some(pid) = running_instance(binary) {
        return Err(ServerError::Configuration(format!(
            "Server binary {:?} is running (pid {}); stop it before synchronizing mods",
            binary, pid
        )));
    }
    Ok(())
}

fn running_instance(binary: &Path) -> Option<u32> {
    let wanted: PathBuf = binary.canonicalize().unwrap_or_else(|_| binary.to_path_buf());

    let mut system = sysinfo::System::new_all();
    system.refresh_all();
    let found = system
        .processes()
        .iter()
        .find(|(_, process)| process.exe().is_some_and(|exe| exe == wanted.as_path()))
        .map(|(pid, _)| pid.as_u32());

    debug!("Running-server check for {:?}: {:?}", wanted, found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_binary_is_not_running() {
        let tmp = tempfile::tempdir().unwrap();
        ensure_server_stopped(&tmp.path().join("arma3server_x64")).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn current_executable_is_detected() {
        let me = std::env::current_exe().unwrap();
        let err = ensure_server_stopped(&me).unwrap_err();
        assert!(matches!(err, ServerError::Configuration(_)));
    }
}
