pub mod args;
pub mod server_config;
pub mod task;

pub use args::{compose, discover_mods, split_params, LaunchPlan, LaunchSpec};
pub use server_config::ServerConfig;
pub use task::{launch, start, ProcessHandle, ProcessSpawner, SystemSpawner};
