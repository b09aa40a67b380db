pub mod paths;
pub mod settings;

pub use paths::ServerPaths;
pub use settings::{LaunchSettings, LinkStrategy, NetworkSettings, ServerSettings, SteamSettings};
