// ─── Server Core ───
// Workshop mod synchronization and launch composition for a dedicated server.
//
// Architecture:
//   core/
//     config/     — Layered settings (file, env, CLI) + server directory layout
//     downloader/ — Document retrieval with retry/backoff
//     catalog/    — Preset parsing + catalog source resolution
//     workshop/   — Changelog probe, staleness rules, SteamCMD fetcher
//     fs/         — Lowercase normalization, key store, presentation links
//     sync/       — The sync pipeline + running-server guard
//     launch/     — Argument composition + process spawner
//     report      — Integrity warnings and per-mod failures

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod error;
pub mod fs;
pub mod http;
pub mod launch;
pub mod report;
pub mod sync;
pub mod workshop;
