// ─── Catalog Parser ───
// Pulls workshop item ids out of a launcher preset / collection page.

use std::sync::OnceLock;

use regex::{CaptureMatches, Regex};

fn item_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"filedetails/\?id=(\d+)""#).expect("valid item link regex"))
}

/// A catalog document held in memory. Iterating it is cheap and repeatable.
#[derive(Debug, Clone)]
pub struct Catalog {
    document: String,
}

impl Catalog {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
        }
    }

    /// Builds a catalog from raw bytes, replacing invalid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::new(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Item ids in document order. Duplicates are yielded as they appear.
    pub fn ids(&self) -> CatalogIds<'_> {
        CatalogIds {
            inner: item_link_regex().captures_iter(&self.document),
        }
    }
}

/// Lazy iterator over the ids of a [`Catalog`].
pub struct CatalogIds<'a> {
    inner: CaptureMatches<'static, 'a>,
}

impl<'a> Iterator for CatalogIds<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}
