use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::node::StoryNode;

/// A reconstructed story: nodes keyed by identifier in declaration order,
/// plus the non-node keys of the source document.
///
/// Serializes back to the flat named-graph object shape, nodes first and
/// reserved keys after.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomStory {
    nodes: IndexMap<String, StoryNode>,
    reserved: IndexMap<String, Value>,
    start: Option<String>,
    /// Reserved key whose value names `start`, kept in step with it.
    start_pointer: Option<String>,
}

impl CustomStory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node. Replacing keeps the original position.
    pub fn insert(&mut self, id: impl Into<String>, node: StoryNode) -> Option<StoryNode> {
        self.nodes.insert(id.into(), node)
    }

    pub fn insert_reserved(&mut self, key: impl Into<String>, value: Value) {
        self.reserved.insert(key.into(), value);
    }

    /// Remove a node, keeping the declaration order of the rest. Removing
    /// the start node also drops its start pointer.
    pub fn remove(&mut self, id: &str) -> Option<StoryNode> {
        let removed = self.nodes.shift_remove(id);
        if removed.is_some() && self.start.as_deref() == Some(id) {
            self.set_start(None);
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<&StoryNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut StoryNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of story nodes; reserved keys never count.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node identifiers in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &StoryNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (&str, &mut StoryNode)> {
        self.nodes.iter_mut().map(|(id, node)| (id.as_str(), node))
    }

    pub fn first_id(&self) -> Option<&str> {
        self.nodes.keys().next().map(String::as_str)
    }

    pub fn reserved(&self) -> &IndexMap<String, Value> {
        &self.reserved
    }

    /// The explicitly declared entry node, if the source declared one.
    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn set_start(&mut self, start: Option<String>) {
        self.start = start;
        let Some(key) = self.start_pointer.clone() else {
            return;
        };
        match &self.start {
            Some(start) => {
                self.reserved.insert(key, Value::String(start.clone()));
            }
            None => {
                self.reserved.shift_remove(&key);
                self.start_pointer = None;
            }
        }
    }

    /// Declare `start` through the reserved entry `key`, as a named graph's
    /// `"start": "<id>"` does. Later start changes rewrite that entry.
    pub fn set_start_pointer(&mut self, key: impl Into<String>, start: String) {
        self.start_pointer = Some(key.into());
        self.set_start(Some(start));
    }

    /// Rename a node in place and rewrite every choice that targeted it.
    /// Returns false if `from` is missing or `to` is already taken.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if from == to || !self.nodes.contains_key(from) || self.nodes.contains_key(to) {
            return false;
        }
        let Some(index) = self.nodes.get_index_of(from) else {
            return false;
        };
        let Some((_, node)) = self.nodes.shift_remove_index(index) else {
            return false;
        };
        self.nodes.shift_insert(index, to.to_string(), node);
        for node in self.nodes.values_mut() {
            for choice in &mut node.choices {
                if choice.next_node == from {
                    choice.next_node = to.to_string();
                }
            }
        }
        if self.start.as_deref() == Some(from) {
            self.set_start(Some(to.to_string()));
        }
        true
    }
}

impl Serialize for CustomStory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.nodes.len() + self.reserved.len()))?;
        for (id, node) in &self.nodes {
            map.serialize_entry(id, node)?;
        }
        for (key, value) in &self.reserved {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
