/// Story editing with debounced remapping.
///
/// Every edit marks the page mapping stale and hands out a `RemapTicket`.
/// The host redeems tickets when its debounce timer fires; only the newest
/// ticket triggers a recomputation, older ones are superseded.

use tracing::debug;

use crate::config::EngineConfig;
use crate::core::loader::LoadedStory;
use crate::schema::mapping::NodeMappings;
use crate::schema::node::{StoryChoice, StoryNode};
use crate::schema::story::CustomStory;

/// Proof of an edit request. Redeem with `StoryEditor::complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemapTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapOutcome {
    /// The mapping was recomputed for this ticket.
    Applied,
    /// A newer edit arrived; this request no longer matters.
    Superseded,
    /// The mapping is already current.
    UpToDate,
}

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("choice {index} out of range for node {node} ({len} choices)")]
    ChoiceOutOfRange { node: String, index: usize, len: usize },
}

pub struct StoryEditor {
    loaded: LoadedStory,
    config: EngineConfig,
    generation: u64,
    applied: u64,
}

impl StoryEditor {
    pub fn new(loaded: LoadedStory, config: EngineConfig) -> Self {
        Self {
            loaded,
            config,
            generation: 0,
            applied: 0,
        }
    }

    pub fn story(&self) -> &CustomStory {
        &self.loaded.story
    }

    /// The last computed mapping. May lag behind the story until the
    /// newest ticket is completed.
    pub fn mappings(&self) -> &NodeMappings {
        &self.loaded.mappings
    }

    pub fn loaded(&self) -> &LoadedStory {
        &self.loaded
    }

    pub fn is_stale(&self) -> bool {
        self.applied != self.generation
    }

    /// Recompute now if any edit is pending, and return the current story.
    pub fn flush(&mut self) -> &LoadedStory {
        if self.is_stale() {
            self.recompute();
        }
        &self.loaded
    }

    pub fn into_loaded(mut self) -> LoadedStory {
        self.flush();
        self.loaded
    }

    /// Redeem a ticket. Only the newest ticket recomputes.
    pub fn complete(&mut self, ticket: RemapTicket) -> RemapOutcome {
        if ticket.0 != self.generation {
            debug!(ticket = ticket.0, latest = self.generation, "remap request superseded");
            return RemapOutcome::Superseded;
        }
        if !self.is_stale() {
            return RemapOutcome::UpToDate;
        }
        self.recompute();
        RemapOutcome::Applied
    }

    fn recompute(&mut self) {
        self.loaded.remap(&self.config);
        self.applied = self.generation;
        debug!(generation = self.generation, pages = self.loaded.total_pages(), "remapped story");
    }

    fn touch(&mut self) -> RemapTicket {
        self.generation += 1;
        RemapTicket(self.generation)
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut StoryNode, EditError> {
        self.loaded
            .story
            .get_mut(id)
            .ok_or_else(|| EditError::NodeNotFound(id.to_string()))
    }

    /// Insert a new node or replace an existing one.
    pub fn upsert_node(&mut self, id: &str, node: StoryNode) -> RemapTicket {
        self.loaded.story.insert(id, node);
        self.touch()
    }

    pub fn set_text(&mut self, id: &str, text: &str) -> Result<RemapTicket, EditError> {
        self.node_mut(id)?.text = text.to_string();
        Ok(self.touch())
    }

    /// Append an authored choice. A node that had a synthesized
    /// continuation becomes a decision point.
    pub fn add_choice(&mut self, id: &str, choice: StoryChoice) -> Result<RemapTicket, EditError> {
        let node = self.node_mut(id)?;
        node.choices.push(choice);
        node.metadata.continuation = false;
        Ok(self.touch())
    }

    pub fn remove_choice(&mut self, id: &str, index: usize) -> Result<RemapTicket, EditError> {
        let node = self.node_mut(id)?;
        if index >= node.choices.len() {
            return Err(EditError::ChoiceOutOfRange {
                node: id.to_string(),
                index,
                len: node.choices.len(),
            });
        }
        node.choices.remove(index);
        node.metadata.continuation = false;
        Ok(self.touch())
    }

    pub fn set_ending(&mut self, id: &str, is_ending: bool) -> Result<RemapTicket, EditError> {
        self.node_mut(id)?.is_ending = is_ending;
        Ok(self.touch())
    }

    /// Remove a node. Choices that pointed at it stay visible and become
    /// dangling.
    pub fn remove_node(&mut self, id: &str) -> Result<RemapTicket, EditError> {
        self.loaded
            .story
            .remove(id)
            .ok_or_else(|| EditError::NodeNotFound(id.to_string()))?;
        Ok(self.touch())
    }

    /// Rename a node and rewrite every reference to it.
    pub fn rename_node(&mut self, from: &str, to: &str) -> Result<RemapTicket, EditError> {
        if !self.loaded.story.contains(from) {
            return Err(EditError::NodeNotFound(from.to_string()));
        }
        if !self.loaded.story.rename(from, to) {
            return Err(EditError::NodeExists(to.to_string()));
        }
        Ok(self.touch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn editor() -> StoryEditor {
        let config = EngineConfig::default();
        let loaded = LoadedStory::from_value(
            &json!({
                "root": {"text": "A", "choices": [{"text": "go", "nextNode": "b"}]},
                "b": {"text": "B", "isEnding": true},
            }),
            &config,
        )
        .unwrap();
        StoryEditor::new(loaded, config)
    }

    #[test]
    fn newest_ticket_wins() {
        let mut editor = editor();
        let first = editor.upsert_node("c", StoryNode::new("C"));
        let second = editor.add_choice("b", StoryChoice::new("on", "c")).unwrap();
        assert!(editor.is_stale());
        assert_eq!(editor.mappings().total_pages(), 2);

        assert_eq!(editor.complete(first), RemapOutcome::Superseded);
        assert_eq!(editor.mappings().total_pages(), 2);

        assert_eq!(editor.complete(second), RemapOutcome::Applied);
        assert!(!editor.is_stale());
        assert_eq!(editor.mappings().page_of("c"), Some(3));
        assert_eq!(editor.complete(second), RemapOutcome::UpToDate);
    }

    #[test]
    fn flush_recomputes_pending_edits() {
        let mut editor = editor();
        editor.upsert_node("orphan", StoryNode::new("O"));
        let loaded = editor.flush();
        assert_eq!(loaded.total_pages(), 3);
        assert_eq!(loaded.mappings.page_of("orphan"), Some(3));
    }

    #[test]
    fn remove_node_leaves_dangling_choice() {
        let mut editor = editor();
        editor.remove_node("b").unwrap();
        let loaded = editor.into_loaded();
        assert_eq!(loaded.total_pages(), 1);
        assert_eq!(loaded.story.get("root").unwrap().choices.len(), 1);
        assert_eq!(loaded.graph.dangling().len(), 1);
    }

    #[test]
    fn rename_updates_references() {
        let mut editor = editor();
        editor.rename_node("b", "finale").unwrap();
        let loaded = editor.flush();
        assert_eq!(loaded.mappings.page_of("finale"), Some(2));
        assert!(matches!(
            editor.rename_node("root", "finale"),
            Err(EditError::NodeExists(_))
        ));
    }

    fn saved_and_reopened(editor: &mut StoryEditor) -> LoadedStory {
        let config = EngineConfig::default();
        let saved = serde_json::to_value(editor.flush().story.clone()).unwrap();
        LoadedStory::from_value(&saved, &config).unwrap()
    }

    fn with_start_pointer() -> StoryEditor {
        let config = EngineConfig::default();
        let loaded = LoadedStory::from_value(
            &json!({
                "start": "intro",
                "root": {"text": "Appendix"},
                "intro": {"text": "Once upon a time."},
            }),
            &config,
        )
        .unwrap();
        StoryEditor::new(loaded, config)
    }

    #[test]
    fn renamed_start_survives_save_and_reload() {
        let mut editor = with_start_pointer();
        editor.rename_node("intro", "opening").unwrap();
        assert_eq!(editor.flush().mappings.node_at(1), Some("opening"));

        let reopened = saved_and_reopened(&mut editor);
        assert_eq!(reopened.story.reserved()["start"], json!("opening"));
        assert_eq!(reopened.mappings.node_at(1), Some("opening"));
        assert_eq!(reopened.mappings.node_at(2), Some("root"));
    }

    #[test]
    fn removed_start_is_not_saved() {
        let mut editor = with_start_pointer();
        editor.remove_node("intro").unwrap();

        let reopened = saved_and_reopened(&mut editor);
        assert!(!reopened.story.reserved().contains_key("start"));
        assert_eq!(reopened.mappings.node_at(1), Some("root"));
        assert_eq!(reopened.total_pages(), 1);
    }

    #[test]
    fn adding_a_choice_ends_linear_continuation() {
        let mut editor = editor();
        editor.upsert_node("c", StoryNode::new("C").with_continuation("Continue", "b"));
        assert!(editor.story().get("c").unwrap().is_linear());

        editor.add_choice("c", StoryChoice::new("Wait", "root")).unwrap();
        editor.remove_choice("c", 1).unwrap();
        let node = editor.story().get("c").unwrap();
        assert_eq!(node.choices, vec![StoryChoice::new("Continue", "b")]);
        assert!(!node.is_linear());
    }

    #[test]
    fn edits_on_missing_nodes_fail() {
        let mut editor = editor();
        assert!(matches!(editor.set_text("zzz", "x"), Err(EditError::NodeNotFound(_))));
        assert!(matches!(
            editor.remove_choice("root", 4),
            Err(EditError::ChoiceOutOfRange { index: 4, len: 1, .. })
        ));
        assert!(!editor.is_stale());
    }
}
