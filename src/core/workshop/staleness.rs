use super::model::{ModCacheEntry, ModMetadata};

/// Outcome of comparing a workshop item against its cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Cache present and not older than the last known update.
    Fresh,
    /// No cache entry; download required.
    Missing,
    /// Last update at or after the cache was created; drop and download.
    Outdated,
    /// Operator asked for a re-download.
    Forced,
}

impl Staleness {
    pub fn requires_fetch(self) -> bool {
        !matches!(self, Staleness::Fresh)
    }

    /// True when an existing cache directory must be deleted first.
    pub fn invalidates_cache(self) -> bool {
        matches!(self, Staleness::Outdated | Staleness::Forced)
    }
}

/// Decides whether `metadata`'s cache must be refetched.
///
/// Equal timestamps count as stale. Without a recorded update time the cache
/// is trusted unless `force_refresh` is set.
pub fn evaluate(
    metadata: &ModMetadata,
    cache: Option<&ModCacheEntry>,
    force_refresh: bool,
) -> Staleness {
    let Some(cache) = cache else {
        return Staleness::Missing;
    };

    if force_refresh {
        return Staleness::Forced;
    }

    match metadata.last_updated_at {
        Some(updated_at) if updated_at >= cache.created_at => Staleness::Outdated,
        _ => Staleness::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::PathBuf;

    fn created() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn meta(updated: Option<DateTime<Utc>>) -> ModMetadata {
        ModMetadata {
            id: "450814997".into(),
            display_name: "Example Mod".into(),
            last_updated_at: updated,
        }
    }

    fn cache() -> ModCacheEntry {
        ModCacheEntry {
            id: "450814997".into(),
            directory: PathBuf::from("/arma3/steamapps/workshop/content/107410/450814997"),
            created_at: created(),
        }
    }

    #[test]
    fn missing_cache_always_fetches() {
        for updated in [None, Some(created()), Some(created() - Duration::days(3))] {
            for force in [false, true] {
                let outcome = evaluate(&meta(updated), None, force);
                assert_eq!(outcome, Staleness::Missing);
                assert!(outcome.requires_fetch());
                assert!(!outcome.invalidates_cache());
            }
        }
    }

    #[test]
    fn unknown_update_time_trusts_cache() {
        let outcome = evaluate(&meta(None), Some(&cache()), false);
        assert_eq!(outcome, Staleness::Fresh);
        assert!(!outcome.requires_fetch());
    }

    #[test]
    fn older_update_keeps_cache() {
        let updated = created() - Duration::seconds(1);
        assert_eq!(
            evaluate(&meta(Some(updated)), Some(&cache()), false),
            Staleness::Fresh
        );
    }

    #[test]
    fn equal_timestamps_are_stale() {
        let outcome = evaluate(&meta(Some(created())), Some(&cache()), false);
        assert_eq!(outcome, Staleness::Outdated);
        assert!(outcome.invalidates_cache());
    }

    #[test]
    fn newer_update_invalidates() {
        let updated = created() + Duration::hours(2);
        assert_eq!(
            evaluate(&meta(Some(updated)), Some(&cache()), false),
            Staleness::Outdated
        );
    }

    #[test]
    fn force_refresh_invalidates_regardless_of_timestamps() {
        for updated in [None, Some(created() - Duration::days(30))] {
            let outcome = evaluate(&meta(updated), Some(&cache()), true);
            assert_eq!(outcome, Staleness::Forced);
            assert!(outcome.requires_fetch());
            assert!(outcome.invalidates_cache());
        }
    }
}
