/// Script runtime: the seam between the navigator and whatever executes a
/// compiled story, plus a built-in runtime over extracted stories.

use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::loader::LoadedStory;
use crate::schema::node::StoryChoice;
use crate::schema::story::CustomStory;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("story has no entry node")]
    NoEntry,
    #[error("runtime cannot continue from here")]
    CannotContinue,
    #[error("choice {index} out of range ({len} choices)")]
    ChoiceOutOfRange { index: usize, len: usize },
    #[error("node not found: {0}")]
    MissingNode(String),
    #[error("saved state belongs to a different story (expected {expected:016x}, found {found:016x})")]
    ForeignState { expected: u64, found: u64 },
    #[error("saved state is corrupt: {0}")]
    CorruptState(#[from] serde_json::Error),
}

/// A stateful story executor.
///
/// Passages are produced by `continue_passage`; decision points surface as
/// `current_choices`. The runtime cannot seek: positions are restored only
/// through tokens produced by `save_state`.
pub trait StoryRuntime {
    /// Rewind to the beginning, before the first passage.
    fn reset(&mut self);

    fn can_continue(&self) -> bool;

    /// Emit the next passage.
    fn continue_passage(&mut self) -> Result<String, RuntimeError>;

    /// Choices at the current decision point. Empty while the runtime can
    /// continue linearly.
    fn current_choices(&self) -> &[StoryChoice];

    fn choose(&mut self, index: usize) -> Result<(), RuntimeError>;

    fn save_state(&self) -> Result<String, RuntimeError>;

    /// Restore a token from `save_state`. On error nothing changes.
    fn load_state(&mut self, token: &str) -> Result<(), RuntimeError>;

    /// Node whose passage was emitted last.
    fn current_node(&self) -> Option<&str>;

    /// Node the next continue will emit.
    fn pending_node(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Cursor {
    current: Option<String>,
    pending: Option<String>,
    choices: Vec<StoryChoice>,
    visits: IndexMap<String, u32>,
    turn: u32,
    variables: IndexMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct SavedState {
    fingerprint: u64,
    cursor: Cursor,
}

/// Runs an extracted story one node per passage. Linear diverts are taken
/// lazily on the next continue; real choices stop the runtime.
pub struct ScriptRuntime {
    story: CustomStory,
    start: String,
    fingerprint: u64,
    cursor: Cursor,
}

fn fingerprint(story: &CustomStory) -> u64 {
    let mut hasher = FxHasher::default();
    for id in story.ids() {
        id.hash(&mut hasher);
    }
    story.node_count().hash(&mut hasher);
    hasher.finish()
}

impl ScriptRuntime {
    pub fn new(story: CustomStory, start: &str) -> Result<Self, RuntimeError> {
        if !story.contains(start) {
            return Err(RuntimeError::MissingNode(start.to_string()));
        }
        let mut runtime = Self {
            fingerprint: fingerprint(&story),
            story,
            start: start.to_string(),
            cursor: Cursor::default(),
        };
        runtime.reset();
        Ok(runtime)
    }

    /// Start from the loaded entry node, or from page 1 when none was
    /// declared.
    pub fn from_loaded(loaded: &LoadedStory) -> Result<Self, RuntimeError> {
        let start = loaded
            .start
            .as_deref()
            .filter(|id| loaded.story.contains(id))
            .or_else(|| loaded.mappings.node_at(1))
            .ok_or(RuntimeError::NoEntry)?;
        Self::new(loaded.story.clone(), start)
    }

    pub fn visit_count(&self, id: &str) -> u32 {
        self.cursor.visits.get(id).copied().unwrap_or(0)
    }

    /// Number of choices committed since the last reset.
    pub fn turn_index(&self) -> u32 {
        self.cursor.turn
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.cursor.variables.get(name)
    }

    fn check_node(&self, id: Option<&str>) -> Result<(), RuntimeError> {
        match id {
            Some(id) if !self.story.contains(id) => Err(RuntimeError::MissingNode(id.to_string())),
            _ => Ok(()),
        }
    }
}

impl StoryRuntime for ScriptRuntime {
    fn reset(&mut self) {
        self.cursor = Cursor {
            pending: Some(self.start.clone()),
            ..Cursor::default()
        };
    }

    fn can_continue(&self) -> bool {
        self.cursor.pending.is_some()
    }

    fn continue_passage(&mut self) -> Result<String, RuntimeError> {
        let id = self.cursor.pending.clone().ok_or(RuntimeError::CannotContinue)?;
        let node = self
            .story
            .get(&id)
            .ok_or_else(|| RuntimeError::MissingNode(id.clone()))?;

        let linear = node
            .linear_target()
            .filter(|target| self.story.contains(target))
            .map(str::to_string);
        let (pending, choices) = match linear {
            Some(target) => (Some(target), Vec::new()),
            None if node.is_ending => (None, Vec::new()),
            None => (None, node.choices.clone()),
        };
        let text = node.text.clone();
        let variables = node.metadata.variables.clone();

        self.cursor.pending = pending;
        self.cursor.choices = choices;
        *self.cursor.visits.entry(id.clone()).or_insert(0) += 1;
        self.cursor.variables.extend(variables);
        trace!(node = %id, "continued");
        self.cursor.current = Some(id);
        Ok(text)
    }

    fn current_choices(&self) -> &[StoryChoice] {
        &self.cursor.choices
    }

    fn choose(&mut self, index: usize) -> Result<(), RuntimeError> {
        let len = self.cursor.choices.len();
        let choice = self
            .cursor
            .choices
            .get(index)
            .ok_or(RuntimeError::ChoiceOutOfRange { index, len })?;
        if !self.story.contains(&choice.next_node) {
            return Err(RuntimeError::MissingNode(choice.next_node.clone()));
        }
        self.cursor.pending = Some(choice.next_node.clone());
        self.cursor.choices.clear();
        self.cursor.turn += 1;
        Ok(())
    }

    fn save_state(&self) -> Result<String, RuntimeError> {
        let saved = SavedState {
            fingerprint: self.fingerprint,
            cursor: self.cursor.clone(),
        };
        Ok(serde_json::to_string(&saved)?)
    }

    fn load_state(&mut self, token: &str) -> Result<(), RuntimeError> {
        let saved: SavedState = serde_json::from_str(token)?;
        if saved.fingerprint != self.fingerprint {
            return Err(RuntimeError::ForeignState {
                expected: self.fingerprint,
                found: saved.fingerprint,
            });
        }
        self.check_node(saved.cursor.current.as_deref())?;
        self.check_node(saved.cursor.pending.as_deref())?;
        self.cursor = saved.cursor;
        debug!(node = ?self.cursor.current, "runtime state restored");
        Ok(())
    }

    fn current_node(&self) -> Option<&str> {
        self.cursor.current.as_deref()
    }

    fn pending_node(&self) -> Option<&str> {
        self.cursor.pending.as_deref()
    }
}
