// ─── Changelog Probe ───
// Reads a workshop item's changelog page for its title and last update time.

use std::sync::OnceLock;

use chrono::{TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use super::model::ModMetadata;
use crate::core::downloader::DocumentSource;
use crate::core::error::{ServerError, ServerResult};

pub const WORKSHOP_CHANGELOG_URL: &str =
    "https://steamcommunity.com/sharedfiles/filedetails/changelog";

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)workshopItemTitle">(.*?)</div"#).expect("valid title regex")
    })
}

fn announcement_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)workshopAnnouncement.*?<p id="(\d+)">"#)
            .expect("valid announcement regex")
    })
}

pub fn changelog_url(id: &str) -> String {
    format!("{}/{}", WORKSHOP_CHANGELOG_URL, id)
}

/// Extracts metadata from a changelog page.
///
/// The title is mandatory; the first announcement id is the unix time of the
/// newest update and may be absent.
pub fn parse_changelog(id: &str, page: &str) -> ServerResult<ModMetadata> {
    let display_name = title_regex()
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ServerError::MissingDisplayName { id: id.to_string() })?;

    let last_updated_at = announcement_regex()
        .captures(page)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

    Ok(ModMetadata {
        id: id.to_string(),
        display_name,
        last_updated_at,
    })
}

/// Fetches and parses changelog pages through a [`DocumentSource`].
pub struct ChangelogProbe<'a> {
    documents: &'a dyn DocumentSource,
}

impl<'a> ChangelogProbe<'a> {
    pub fn new(documents: &'a dyn DocumentSource) -> Self {
        Self { documents }
    }

    pub async fn probe(&self, id: &str) -> ServerResult<ModMetadata> {
        let bytes = self.documents.fetch(&changelog_url(id)).await?;
        let page = String::from_utf8_lossy(&bytes);
        let metadata = parse_changelog(id, &page)?;
        debug!(
            "Probed {} as \"{}\" (last update: {:?})",
            id, metadata.display_name, metadata.last_updated_at
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="workshopItemTitle">CBA_A3</div>
<div class="detailBox workshopAnnouncement noFooter changeLogCtn">
    <div class="headline">
        Update: 6 Feb @ 6:21pm
    </div>
    <p id="1675707660">Release 3.15.8</p>
</div>
<div class="detailBox workshopAnnouncement noFooter changeLogCtn">
    <p id="1660000000">Older release</p>
</div>"#;

    #[test]
    fn parses_title_and_newest_announcement() {
        let meta = parse_changelog("450814997", PAGE).unwrap();
        assert_eq!(meta.id, "450814997");
        assert_eq!(meta.display_name, "CBA_A3");
        assert_eq!(
            meta.last_updated_at,
            Utc.timestamp_opt(1_675_707_660, 0).single()
        );
    }

    #[test]
    fn missing_announcement_leaves_timestamp_unknown() {
        let page = r#"<div class="workshopItemTitle">Quiet Mod</div>"#;
        let meta = parse_changelog("1", page).unwrap();
        assert_eq!(meta.display_name, "Quiet Mod");
        assert_eq!(meta.last_updated_at, None);
    }

    #[test]
    fn multiline_title_is_trimmed() {
        let page = "<div class=\"workshopItemTitle\">\n  Example Mod\n</div>";
        assert_eq!(parse_changelog("1", page).unwrap().display_name, "Example Mod");
    }

    #[test]
    fn missing_title_is_an_error() {
        let err = parse_changelog("7", "<html>private item</html>").unwrap_err();
        assert!(matches!(err, ServerError::MissingDisplayName { id } if id == "7"));
    }

    #[test]
    fn url_is_templated_by_id() {
        assert_eq!(
            changelog_url("450814997"),
            "https://steamcommunity.com/sharedfiles/filedetails/changelog/450814997"
        );
    }
}
