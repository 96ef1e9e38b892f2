/// Engine configuration: labels, reserved keys, and segmentation rules.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// How a script-runtime page jump resolves decision points it meets
/// before reaching the target page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReplayPolicy {
    /// Commit the first available choice and keep replaying.
    #[default]
    FirstChoice,
    /// Fail the jump as soon as a decision point offers more than one choice.
    StopAtBranch,
}

/// Settings shared by parsing, mapping, and navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Text of the choice synthesized for linear nodes.
    pub continue_label: String,
    /// Text of the fallback fragment emitted for stories with no content.
    pub placeholder_text: String,
    /// Key whose presence marks a compiled-script document.
    pub version_key: String,
    /// Key of the anonymous content array in compiled scripts.
    pub root_key: String,
    /// Key naming the explicit entry node of a named graph.
    pub start_key: String,
    /// Top-level keys that never count as story nodes.
    pub reserved_keys: Vec<String>,
    /// Prefix of synthetic fragment identifiers.
    pub fragment_prefix: String,
    /// Leading words that mark a chapter heading.
    pub chapter_patterns: Vec<String>,
    /// Leading markers that mark an embedded image directive.
    pub image_prefixes: Vec<String>,
    /// Maximum nesting depth the token parser descends into.
    pub max_depth: usize,
    pub replay_policy: ReplayPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            continue_label: "Continue".to_string(),
            placeholder_text: "This story has no content yet.".to_string(),
            version_key: "inkVersion".to_string(),
            root_key: "root".to_string(),
            start_key: "start".to_string(),
            reserved_keys: vec![
                "inkVersion".to_string(),
                "listDefs".to_string(),
                "#f".to_string(),
                "#n".to_string(),
            ],
            fragment_prefix: "fragment_".to_string(),
            chapter_patterns: vec![
                "Chapter".to_string(),
                "Part".to_string(),
                "Prologue".to_string(),
                "Epilogue".to_string(),
                "Book".to_string(),
            ],
            image_prefixes: vec![
                "IMAGE:".to_string(),
                "[image:".to_string(),
                "![".to_string(),
                "img:".to_string(),
            ],
            max_depth: 64,
            replay_policy: ReplayPolicy::FirstChoice,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a RON file. Missing fields take defaults.
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    /// Returns true if `key` names format data rather than a story node.
    pub fn is_reserved_key(&self, key: &str) -> bool {
        key.starts_with('#') || self.reserved_keys.iter().any(|k| k == key)
    }

    /// Fragment identifier for the `index`-th segment of a compiled script.
    pub fn fragment_id(&self, index: usize) -> String {
        format!("{}{}", self.fragment_prefix, index)
    }

    /// Returns true if `text` opens with one of the chapter heading words.
    ///
    /// The word must be followed by the end of the text, whitespace, a digit,
    /// or punctuation, so "Partial" is not a heading but "Part II" is.
    pub fn is_chapter_heading(&self, text: &str) -> bool {
        let text = text.trim();
        self.chapter_patterns.iter().any(|pattern| {
            let Some(head) = text.get(..pattern.len()) else {
                return false;
            };
            if !head.eq_ignore_ascii_case(pattern) {
                return false;
            }
            match text[pattern.len()..].chars().next() {
                None => true,
                Some(c) => c.is_whitespace() || c.is_ascii_digit() || c.is_ascii_punctuation(),
            }
        })
    }

    /// If `text` is an image directive, returns the image reference.
    pub fn image_directive<'a>(&self, text: &'a str) -> Option<&'a str> {
        let text = text.trim();
        self.image_prefixes.iter().find_map(|prefix| {
            let rest = text.strip_prefix(prefix.as_str())?;
            let rest = match rest.split_once("](") {
                Some((_, target)) => target,
                None => rest,
            };
            Some(rest.trim().trim_end_matches([')', ']']).trim())
        })
    }
}
