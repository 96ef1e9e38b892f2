/// Graph builder: adjacency between story nodes derived from their choices.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::schema::story::CustomStory;

/// A choice whose target does not exist in the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingEdge {
    pub from: String,
    /// Index of the offending choice within `from`'s choices.
    pub choice: usize,
    pub target: String,
}

/// Directed adjacency map in node declaration order. Only edges to
/// existing nodes are kept, each at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryGraph {
    edges: IndexMap<String, Vec<String>>,
    dangling: Vec<DanglingEdge>,
}

impl StoryGraph {
    pub fn build(story: &CustomStory) -> Self {
        let mut edges = IndexMap::with_capacity(story.node_count());
        let mut dangling = Vec::new();

        for (id, node) in story.nodes() {
            let mut targets: Vec<String> = Vec::with_capacity(node.choices.len());
            for (index, choice) in node.choices.iter().enumerate() {
                if !story.contains(&choice.next_node) {
                    debug!(from = %id, target = %choice.next_node, "dropping edge to missing node");
                    dangling.push(DanglingEdge {
                        from: id.to_string(),
                        choice: index,
                        target: choice.next_node.clone(),
                    });
                    continue;
                }
                if !targets.contains(&choice.next_node) {
                    targets.push(choice.next_node.clone());
                }
            }
            edges.insert(id.to_string(), targets);
        }

        Self { edges, dangling }
    }

    /// Reachable next nodes of `id`, in choice order.
    pub fn successors(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn dangling(&self) -> &[DanglingEdge] {
        &self.dangling
    }

    /// Nodes with no outgoing edges that are not marked as endings.
    /// Traversal simply stops at them.
    pub fn dead_ends<'a>(&'a self, story: &'a CustomStory) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(id, targets)| {
                targets.is_empty() && story.get(id).is_some_and(|node| !node.is_ending)
            })
            .map(|(id, _)| id.as_str())
    }

    /// Nodes with at least one edge pointing at `id`.
    pub fn predecessors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, targets)| targets.iter().any(|t| t == id))
            .map(|(from, _)| from.as_str())
    }
}
