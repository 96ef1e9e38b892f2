/// Story loading: raw JSON through extraction and graph building to a
/// validated page mapping.

use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::extract::{extract, DocumentShape};
use crate::core::graph::StoryGraph;
use crate::core::pager::{determine_start, map_pages};
use crate::core::validate::{ensure_consistent, MappingIssue};
use crate::schema::mapping::NodeMappings;
use crate::schema::story::CustomStory;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("story document must be a JSON object, found {0}")]
    InvalidDocument(&'static str),
}

/// A story ready for reading: normalized nodes, graph, and a validated
/// page mapping.
#[derive(Debug, Clone)]
pub struct LoadedStory {
    pub story: CustomStory,
    pub graph: StoryGraph,
    pub mappings: NodeMappings,
    pub start: Option<String>,
    pub shape: DocumentShape,
    /// Nodes reachable from the start before orphans were appended.
    pub reachable: usize,
    /// Nodes the traversal could not reach from the start, in page order.
    pub orphans: Vec<String>,
    /// Problems found in the traversal mapping. Non-empty exactly when the
    /// positional fallback replaced it.
    pub mapping_issues: Vec<MappingIssue>,
    pub used_fallback: bool,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl LoadedStory {
    pub fn from_path(path: &Path, config: &EngineConfig) -> Result<LoadedStory, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents, config)
    }

    pub fn from_json_str(input: &str, config: &EngineConfig) -> Result<LoadedStory, LoadError> {
        let value: Value = serde_json::from_str(input)?;
        Self::from_value(&value, config)
    }

    pub fn from_value(value: &Value, config: &EngineConfig) -> Result<LoadedStory, LoadError> {
        let Value::Object(doc) = value else {
            return Err(LoadError::InvalidDocument(kind_of(value)));
        };
        let extraction = extract(doc, config);
        let loaded = Self::from_story(extraction.story, extraction.shape, config);
        info!(
            shape = ?loaded.shape,
            nodes = loaded.story.node_count(),
            pages = loaded.total_pages(),
            reachable = loaded.reachable,
            fallback = loaded.used_fallback,
            "story loaded"
        );
        Ok(loaded)
    }

    /// Build graph and mapping for an already normalized story.
    pub fn from_story(story: CustomStory, shape: DocumentShape, config: &EngineConfig) -> LoadedStory {
        let graph = StoryGraph::build(&story);
        let start = determine_start(&story, config);
        let layout = map_pages(&story, &graph, start.as_deref());
        let (mappings, report) = ensure_consistent(&story, layout.mappings);
        LoadedStory {
            story,
            graph,
            mappings,
            start,
            shape,
            reachable: layout.reachable,
            orphans: layout.orphans,
            used_fallback: !report.is_valid(),
            mapping_issues: report.issues,
        }
    }

    /// Recompute graph and mapping after the story was edited.
    pub fn remap(&mut self, config: &EngineConfig) {
        let story = std::mem::take(&mut self.story);
        *self = Self::from_story(story, self.shape, config);
    }

    pub fn total_pages(&self) -> u32 {
        self.mappings.total_pages()
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }
}
