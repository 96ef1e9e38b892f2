use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bidirectional node ↔ page mapping. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMappings {
    pub node_to_page: IndexMap<String, u32>,
    pub page_to_node: BTreeMap<u32, String>,
}

impl NodeMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping by assigning pages 1..=N to `ids` in order.
    pub fn sequential<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut mappings = Self::new();
        for (index, id) in ids.into_iter().enumerate() {
            mappings.assign(id, index as u32 + 1);
        }
        mappings
    }

    /// Record both directions of a `(node, page)` pair.
    pub fn assign(&mut self, node: &str, page: u32) {
        self.node_to_page.insert(node.to_string(), page);
        self.page_to_node.insert(page, node.to_string());
    }

    pub fn page_of(&self, node: &str) -> Option<u32> {
        self.node_to_page.get(node).copied()
    }

    pub fn node_at(&self, page: u32) -> Option<&str> {
        self.page_to_node.get(&page).map(String::as_str)
    }

    pub fn total_pages(&self) -> u32 {
        self.node_to_page.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.node_to_page.is_empty()
    }
}
