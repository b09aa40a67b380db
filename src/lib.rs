mod commands;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use commands::{Cli, Command, GlobalOptions};

/// Installs the global tracing subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

/// Entry point for the binary. Returns the process exit code.
///
/// Settings are loaded first so their `debug` flag (file, `DEBUG` or
/// `--verbose`) selects the log level.
pub async fn run(cli: Cli) -> i32 {
    let settings = match cli.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(cli.options.verbose);
            tracing::error!("{}", e);
            return 1;
        }
    };
    init_logging(settings.debug);

    tracing::info!("armaserver {} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Effective settings: {:?}", settings);

    match commands::execute(&cli, &settings).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    }
}
