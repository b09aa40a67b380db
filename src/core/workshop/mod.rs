pub mod changelog;
pub mod fetcher;
pub mod model;
pub mod staleness;

pub use changelog::{changelog_url, parse_changelog, ChangelogProbe};
pub use fetcher::{FetchOptions, ModFetcher, SteamCmd};
pub use model::{ModCacheEntry, ModMetadata, ModRegistry};
pub use staleness::{evaluate, Staleness};
