use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One outgoing option of a node. `next_node` may name a node that does
/// not exist; consumers display such choices but never follow them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryChoice {
    pub text: String,
    #[serde(rename = "nextNode")]
    pub next_node: String,
}

impl StoryChoice {
    pub fn new(text: impl Into<String>, next_node: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            next_node: next_node.into(),
        }
    }
}

/// Side data collected while parsing a node's tokens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Set on compiled-script fragments whose choices came from an
    /// adjacent choice array rather than an automatic link.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub choice_bearing: bool,
    /// Set when the node's single choice was synthesized to link it to the
    /// next passage, as opposed to an option the author wrote.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continuation: bool,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.variables.is_empty()
            && self.images.is_empty()
            && !self.choice_bearing
            && !self.continuation
    }

    /// Merge `other` into `self`, keeping tag order and letting later
    /// variable assignments win. `continuation` describes the node's own
    /// choices and is never merged.
    pub fn absorb(&mut self, other: NodeMetadata) {
        self.tags.extend(other.tags);
        self.variables.extend(other.variables);
        self.images.extend(other.images);
        self.choice_bearing |= other.choice_bearing;
    }
}

/// The single normalized node shape every downstream component works with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryNode {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub choices: Vec<StoryChoice>,
    #[serde(rename = "isEnding", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ending: bool,
    #[serde(default, skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
}

impl StoryNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_choice(mut self, text: impl Into<String>, next_node: impl Into<String>) -> Self {
        self.choices.push(StoryChoice::new(text, next_node));
        self
    }

    pub fn ending(mut self) -> Self {
        self.is_ending = true;
        self
    }

    /// Replace the choices with a single synthesized continuation.
    pub fn with_continuation(mut self, label: impl Into<String>, next_node: impl Into<String>) -> Self {
        self.choices = vec![StoryChoice::new(label, next_node)];
        self.metadata.continuation = true;
        self
    }

    /// Returns the target if this node's only choice is a synthesized
    /// linear continuation.
    pub fn linear_target(&self) -> Option<&str> {
        match self.choices.as_slice() {
            [only] if self.metadata.continuation => Some(only.next_node.as_str()),
            _ => None,
        }
    }

    pub fn is_linear(&self) -> bool {
        self.linear_target().is_some()
    }
}
