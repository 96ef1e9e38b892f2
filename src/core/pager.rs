/// Page mapping: assigns reader-facing page numbers by tracing story flow.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use tracing::debug;

use crate::config::EngineConfig;
use crate::core::graph::StoryGraph;
use crate::schema::mapping::NodeMappings;
use crate::schema::story::CustomStory;

/// A computed page layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub mappings: NodeMappings,
    /// Nodes reached from the start, in page order.
    pub reachable: usize,
    /// Nodes appended after traversal, in declaration order.
    pub orphans: Vec<String>,
}

impl PageLayout {
    pub fn total_pages(&self) -> u32 {
        self.mappings.total_pages()
    }
}

/// Entry node of a story: the explicitly declared start, then a node named
/// `start`, then `root`, then the first declared node.
pub fn determine_start(story: &CustomStory, config: &EngineConfig) -> Option<String> {
    if let Some(start) = story.start().filter(|id| story.contains(id)) {
        return Some(start.to_string());
    }
    [config.start_key.as_str(), config.root_key.as_str()]
        .into_iter()
        .find(|id| story.contains(id))
        .or_else(|| story.first_id())
        .map(str::to_string)
}

/// Breadth-first page assignment from `start`, then orphans appended in
/// declaration order so every node receives a page.
pub fn map_pages(story: &CustomStory, graph: &StoryGraph, start: Option<&str>) -> PageLayout {
    let mut mappings = NodeMappings::new();
    let mut visited: FxHashSet<&str> = FxHashSet::default();
    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut next_page = 1u32;

    if let Some(start) = start.filter(|id| story.contains(id)) {
        visited.insert(start);
        queue.push_back(start);
    }

    while let Some(id) = queue.pop_front() {
        mappings.assign(id, next_page);
        next_page += 1;
        for target in graph.successors(id) {
            if visited.insert(target.as_str()) {
                queue.push_back(target.as_str());
            }
        }
    }
    let reachable = mappings.total_pages() as usize;

    let mut orphans = Vec::new();
    for id in story.ids() {
        if visited.contains(id) {
            continue;
        }
        mappings.assign(id, next_page);
        next_page += 1;
        orphans.push(id.to_string());
    }

    if !orphans.is_empty() {
        debug!(reachable, orphans = orphans.len(), "appended unreachable nodes to page sequence");
    }
    PageLayout {
        mappings,
        reachable,
        orphans,
    }
}
