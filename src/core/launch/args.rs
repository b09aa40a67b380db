// ─── Launch Composer ───
// Builds the ordered command lines for the server and its headless clients.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::server_config::ServerConfig;
use crate::core::config::{ServerPaths, ServerSettings};
use crate::core::error::{ServerError, ServerResult};
use crate::core::workshop::fetcher::shell_escape;

/// One process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Mod paths are relative, so processes run from the server directory.
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    /// Copy/paste form for logs and dry runs.
    pub fn command_line(&self) -> String {
        std::iter::once(shell_escape(&self.program.to_string_lossy()))
            .chain(self.args.iter().map(|arg| shell_escape(arg)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub server: LaunchSpec,
    pub headless: Vec<LaunchSpec>,
}

/// Composes a [`LaunchPlan`] from settings and the current directory state.
pub fn compose(settings: &ServerSettings, paths: &ServerPaths) -> ServerResult<LaunchPlan> {
    let launch = &settings.launch;
    let config_path = paths.config_file(&launch.config);

    // Checked before anything else so a bad headless setup never half-starts.
    let server_config = if launch.headless_clients > 0 {
        let config = ServerConfig::load(&config_path)?;
        for directive in ["headlessClients[]", "localClient[]"] {
            if !config.contains(directive) {
                return Err(ServerError::Configuration(format!(
                    "{} headless client(s) requested but {:?} has no {} entry",
                    launch.headless_clients, config_path, directive
                )));
            }
        }
        Some(config)
    } else {
        None
    };

    let mut base = vec![
        format!("-limitFPS={}", launch.limit_fps),
        format!("-world={}", launch.world),
    ];

    for mod_dir in discover_mods(paths.presentation())? {
        base.push(format!("-mod={}", paths.relative_to_server(&mod_dir).display()));
    }
    for mod_dir in discover_mods(paths.local_mods())? {
        base.push(format!("-mod={}", paths.relative_to_server(&mod_dir).display()));
    }
    for mod_dir in discover_mods(paths.server_mods())? {
        base.push(format!(
            "-serverMod={}",
            paths.relative_to_server(&mod_dir).display()
        ));
    }
    for dlc in launch.cdlc.iter().map(|d| d.trim()).filter(|d| !d.is_empty()) {
        base.push(format!("-mod={}", dlc));
    }
    if let Some(params) = &launch.params {
        base.extend(split_params(params)?);
    }

    let program = settings.server_binary();
    let working_dir = paths.server_dir().to_path_buf();

    let mut server_args = base.clone();
    server_args.push(format!("-config={}", config_path.display()));
    server_args.push(format!("-port={}", launch.port));
    server_args.push(format!("-name={}", launch.profile));
    server_args.push(format!("-profiles={}", paths.profiles().display()));

    let headless = match &server_config {
        Some(config) => {
            let password = config.string("password").filter(|p| !p.is_empty());
            (1..=launch.headless_clients)
                .map(|index| {
                    let mut args = base.clone();
                    args.push("-client".to_string());
                    args.push("-connect=127.0.0.1".to_string());
                    args.push(format!("-port={}", launch.port));
                    if let Some(password) = password {
                        args.push(format!("-password={}", password));
                    }
                    args.push(format!("-name={}-hc-{}", launch.profile, index));
                    LaunchSpec {
                        program: program.clone(),
                        args,
                        working_dir: working_dir.clone(),
                    }
                })
                .collect()
        }
        None => Vec::new(),
    };

    let plan = LaunchPlan {
        server: LaunchSpec {
            program,
            args: server_args,
            working_dir,
        },
        headless,
    };
    debug!(
        "Composed launch plan: server + {} headless client(s)",
        plan.headless.len()
    );
    Ok(plan)
}

/// Mod directories directly below `dir`, sorted by name. A missing `dir` has none.
pub fn discover_mods(dir: &Path) -> ServerResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ServerError::io(dir, e)),
    };

    let mut mods = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ServerError::io(dir, e))?.path();
        if path.is_dir() {
            debug!("Found mod {:?}", path.file_name().unwrap_or_default());
            mods.push(path);
        }
    }
    mods.sort();
    Ok(mods)
}

/// Splits a free-form parameter string on whitespace, keeping quoted runs
/// together and dropping the quotes.
pub fn split_params(raw: &str) -> ServerResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some('"') if ch == '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => current.push('\\'),
            },
            Some(_) => current.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                in_token = true;
            }
            None if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ServerError::Configuration(format!(
            "ARMA_PARAMS has an unterminated quote: {}",
            raw
        )));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn settings(root: &Path) -> ServerSettings {
        let mut settings = ServerSettings::default();
        settings.server_dir = root.to_path_buf();
        settings
    }

    #[test]
    fn params_respect_quotes() {
        assert_eq!(
            split_params(r#"-autoInit -loadMissionToMemory "-serverMod=@my mod" -x='a b'"#).unwrap(),
            vec!["-autoInit", "-loadMissionToMemory", "-serverMod=@my mod", "-x=a b"]
        );
        assert_eq!(split_params("   ").unwrap(), Vec::<String>::new());
        assert_eq!(split_params(r#""""#).unwrap(), vec![""]);
        assert!(split_params(r#"-name="open"#).is_err());
    }

    #[test]
    fn tokens_follow_the_documented_order() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("workshop/@ace")).unwrap();
        fs::create_dir_all(root.join("workshop/@CBA_A3")).unwrap();
        fs::create_dir_all(root.join("mods/@local")).unwrap();
        fs::create_dir_all(root.join("servermods/@admin")).unwrap();
        fs::write(root.join("workshop/readme.txt"), "not a mod").unwrap();

        let mut settings = settings(root);
        settings.launch.cdlc = vec!["gm".into(), "vn".into()];
        settings.launch.params = Some("-autoInit".into());
        let paths = ServerPaths::new(&settings);

        let plan = compose(&settings, &paths).unwrap();
        assert_eq!(plan.server.program, root.join("arma3server_x64"));
        assert_eq!(plan.server.working_dir, root);
        assert_eq!(
            plan.server.args,
            vec![
                "-limitFPS=1000".to_string(),
                "-world=empty".to_string(),
                "-mod=workshop/@CBA_A3".to_string(),
                "-mod=workshop/@ace".to_string(),
                "-mod=mods/@local".to_string(),
                "-serverMod=servermods/@admin".to_string(),
                "-mod=gm".to_string(),
                "-mod=vn".to_string(),
                "-autoInit".to_string(),
                format!("-config={}", root.join("configs/server.cfg").display()),
                "-port=2302".to_string(),
                "-name=arma3".to_string(),
                format!("-profiles={}", root.join("configs/profiles").display()),
            ]
        );
        assert!(plan.headless.is_empty());
    }

    #[test]
    fn headless_clients_reuse_base_tokens() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("configs")).unwrap();
        fs::write(
            root.join("configs/server.cfg"),
            "password = \"pw\";\nheadlessClients[] = {\"127.0.0.1\"};\nlocalClient[] = {\"127.0.0.1\"};\n",
        )
        .unwrap();

        let mut settings = settings(root);
        settings.launch.headless_clients = 2;
        settings.launch.port = 2402;
        let paths = ServerPaths::new(&settings);

        let plan = compose(&settings, &paths).unwrap();
        assert_eq!(plan.headless.len(), 2);
        assert_eq!(
            plan.headless[1].args,
            vec![
                "-limitFPS=1000",
                "-world=empty",
                "-client",
                "-connect=127.0.0.1",
                "-port=2402",
                "-password=pw",
                "-name=arma3-hc-2",
            ]
        );
    }

    #[test]
    fn headless_without_password_omits_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("configs")).unwrap();
        fs::write(
            root.join("configs/server.cfg"),
            "headlessClients[] = {\"127.0.0.1\"};\nlocalClient[] = {\"127.0.0.1\"};\n",
        )
        .unwrap();
        let mut settings = settings(root);
        settings.launch.headless_clients = 1;

        let plan = compose(&settings, &ServerPaths::new(&settings)).unwrap();
        assert!(!plan.headless[0].args.iter().any(|a| a.starts_with("-password")));
    }

    #[test]
    fn headless_requires_both_directives() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("configs")).unwrap();
        fs::write(
            root.join("configs/server.cfg"),
            "headlessClients[] = {\"127.0.0.1\"};\n",
        )
        .unwrap();
        let mut settings = settings(root);
        settings.launch.headless_clients = 1;

        let err = compose(&settings, &ServerPaths::new(&settings)).unwrap_err();
        assert!(matches!(err, ServerError::Configuration(msg) if msg.contains("localClient[]")));
    }

    #[test]
    fn command_line_quotes_spaces() {
        let spec = LaunchSpec {
            program: PathBuf::from("/arma3/arma3server_x64"),
            args: vec!["-world=empty".into(), "-name=my server".into()],
            working_dir: PathBuf::from("/arma3"),
        };
        assert_eq!(
            spec.command_line(),
            "/arma3/arma3server_x64 -world=empty \"-name=my server\""
        );
    }
}
