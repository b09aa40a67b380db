use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::error::{ServerError, ServerResult};

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?ms)^[ \t]*([A-Za-z_][A-Za-z0-9_]*(?:\[\])?)[ \t]*=[ \t]*(.*?);")
            .expect("valid directive regex")
    })
}

/// Marks the bytes of `contents` that are top-level code: outside every
/// `{ }` block, comment and string literal.
fn top_level_mask(contents: &str) -> Vec<bool> {
    let bytes = contents.as_bytes();
    let mut mask = vec![false; bytes.len()];
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            // `""` inside a string reads as two adjacent literals, which is
            // equivalent for masking.
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => mask[i] = depth == 0,
        }
        i += 1;
    }
    mask
}

/// Top-level `key = value;` directives of a server configuration file.
/// Keys nested in `class` blocks or commented out are ignored.
///
/// Keys are compared case-insensitively; a repeated key keeps its last value.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    directives: HashMap<String, String>,
}

impl ServerConfig {
    pub fn parse(contents: &str) -> Self {
        let top_level = top_level_mask(contents);
        let directives = directive_regex()
            .captures_iter(contents)
            .filter_map(|caps| {
                let key = caps.get(1)?;
                if !top_level[key.start()] {
                    return None;
                }
                let key = key.as_str().to_ascii_lowercase();
                let value = caps.get(2)?.as_str().trim().to_string();
                Some((key, value))
            })
            .collect();
        Self { directives }
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServerError::Configuration(format!("Server config {:?} does not exist", path))
            } else {
                ServerError::io(path, e)
            }
        })?;
        Ok(Self::parse(&contents))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.directives.contains_key(&key.to_ascii_lowercase())
    }

    /// Raw value text, without the trailing `;`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.directives
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Value with surrounding double quotes removed.
    pub fn string(&self, key: &str) -> Option<&str> {
        self.get(key).map(|raw| {
            raw.strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(raw)
        })
    }
}
