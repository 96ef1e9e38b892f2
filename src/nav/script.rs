/// Runtime backend: navigation through a `StoryRuntime`.
///
/// The runtime only moves forward, so back restores saved tokens and page
/// jumps replay from the beginning.

use tracing::{debug, error, warn};

use super::runtime::StoryRuntime;
use super::{check_page_target, NavError, NavigationState, Navigator};
use crate::config::{EngineConfig, ReplayPolicy};
use crate::schema::mapping::NodeMappings;
use crate::schema::node::StoryChoice;

struct HistoryEntry {
    token: String,
    state: NavigationState,
}

pub struct ScriptNavigator<R: StoryRuntime> {
    runtime: R,
    mappings: NodeMappings,
    continue_label: String,
    replay_policy: ReplayPolicy,
    state: NavigationState,
    history: Vec<HistoryEntry>,
}

impl<R: StoryRuntime> ScriptNavigator<R> {
    /// Reset the runtime and show its first passage.
    pub fn new(mut runtime: R, mappings: NodeMappings, config: &EngineConfig) -> Result<Self, NavError> {
        runtime.reset();
        let text = runtime.continue_passage()?;
        let mut navigator = Self {
            runtime,
            mappings,
            continue_label: config.continue_label.clone(),
            replay_policy: config.replay_policy,
            state: NavigationState::default(),
            history: Vec::new(),
        };
        navigator.state = navigator.observe(text, false)?;
        Ok(navigator)
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Build the reader state from the runtime's current position.
    fn observe(&self, text: String, can_go_back: bool) -> Result<NavigationState, NavError> {
        let node = self
            .runtime
            .current_node()
            .ok_or(NavError::EmptyStory)?
            .to_string();
        let page = self
            .mappings
            .page_of(&node)
            .ok_or_else(|| NavError::UnmappedNode(node.clone()))?;
        let can_continue = self.runtime.can_continue();
        let choices = if can_continue {
            let next = self.runtime.pending_node().unwrap_or_default();
            vec![StoryChoice::new(self.continue_label.clone(), next)]
        } else {
            self.runtime.current_choices().to_vec()
        };
        Ok(NavigationState {
            node,
            page,
            text,
            is_ending: choices.is_empty(),
            choices,
            can_continue,
            can_go_back,
        })
    }

    fn current_page(&self) -> Option<u32> {
        self.runtime
            .current_node()
            .and_then(|node| self.mappings.page_of(node))
    }

    /// Run `step` against the runtime as one forward transition. On any
    /// failure the runtime is restored to where it was.
    fn transition<F>(&mut self, step: F) -> Result<&NavigationState, NavError>
    where
        F: FnOnce(&mut R) -> Result<String, NavError>,
    {
        let token = self.runtime.save_state()?;
        let outcome = step(&mut self.runtime).and_then(|text| self.observe(text, true));
        match outcome {
            Ok(next) => {
                let previous = std::mem::replace(&mut self.state, next);
                self.history.push(HistoryEntry {
                    token,
                    state: previous,
                });
                debug!(node = %self.state.node, page = self.state.page, "navigated");
                Ok(&self.state)
            }
            Err(err) => {
                self.rollback(&token);
                Err(err)
            }
        }
    }

    fn rollback(&mut self, token: &str) {
        if let Err(err) = self.runtime.load_state(token) {
            error!(error = %err, "failed to roll runtime back after a rejected transition");
        }
    }

    /// Replay from the beginning until the runtime sits on `target`.
    fn replay_to(&mut self, target: u32, total: u32) -> Result<String, NavError> {
        let failed = |reason: String| NavError::ReplayFailed { target, reason };
        self.runtime.reset();
        let mut text = self.runtime.continue_passage()?;
        for _ in 0..total {
            if self.current_page() == Some(target) {
                return Ok(text);
            }
            if !self.runtime.can_continue() {
                let choices = self.runtime.current_choices().len();
                if choices == 0 {
                    return Err(failed("story ended before the page was reached".into()));
                }
                if choices > 1 && self.replay_policy == ReplayPolicy::StopAtBranch {
                    return Err(failed(format!("reached a decision point with {choices} choices")));
                }
                self.runtime.choose(0)?;
            }
            text = self.runtime.continue_passage()?;
        }
        if self.current_page() == Some(target) {
            return Ok(text);
        }
        Err(failed(format!("page not reached within {total} steps")))
    }
}

impl<R: StoryRuntime> Navigator for ScriptNavigator<R> {
    fn state(&self) -> &NavigationState {
        &self.state
    }

    fn total_pages(&self) -> u32 {
        self.mappings.total_pages()
    }

    fn cont(&mut self) -> Result<&NavigationState, NavError> {
        if !self.runtime.can_continue() {
            warn!(node = %self.state.node, "continue requested at a decision point");
            return Err(NavError::NoContinue);
        }
        self.transition(|runtime| Ok(runtime.continue_passage()?))
    }

    fn choose(&mut self, index: usize) -> Result<&NavigationState, NavError> {
        let len = self.state.choices.len();
        if index >= len {
            warn!(index, len, "choice index out of range");
            return Err(NavError::ChoiceOutOfRange { index, len });
        }
        if self.runtime.can_continue() {
            return self.cont();
        }
        let outcome = self.transition(|runtime| {
            runtime.choose(index)?;
            Ok(runtime.continue_passage()?)
        });
        if let Err(err) = &outcome {
            warn!(index, error = %err, "choice rejected");
        }
        outcome
    }

    fn back(&mut self) -> Result<&NavigationState, NavError> {
        let Some(entry) = self.history.last() else {
            warn!("back requested with empty history");
            return Err(NavError::NothingToGoBack);
        };
        if let Err(err) = self.runtime.load_state(&entry.token) {
            warn!(error = %err, "could not restore previous runtime state");
            return Err(NavError::RestoreFailed(err));
        }
        if let Some(entry) = self.history.pop() {
            self.state = NavigationState {
                can_go_back: !self.history.is_empty(),
                ..entry.state
            };
        }
        Ok(&self.state)
    }

    fn restart(&mut self) -> Result<&NavigationState, NavError> {
        let token = self.runtime.save_state()?;
        self.runtime.reset();
        let restarted = self
            .runtime
            .continue_passage()
            .map_err(NavError::from)
            .and_then(|text| self.observe(text, false));
        match restarted {
            Ok(state) => {
                self.state = state;
                self.history.clear();
                Ok(&self.state)
            }
            Err(err) => {
                self.rollback(&token);
                Err(err)
            }
        }
    }

    fn jump_to_page(&mut self, page: u32) -> Result<&NavigationState, NavError> {
        let total = self.total_pages();
        let mapped = self.mappings.node_at(page).is_some();
        if let Err(err) = check_page_target(page, self.state.page, total, mapped) {
            warn!(page, current = self.state.page, error = %err, "page change rejected");
            return Err(err);
        }
        let token = self.runtime.save_state()?;
        let replayed = self.replay_to(page, total);
        let outcome = replayed.and_then(|text| self.observe(text, true));
        match outcome {
            Ok(next) => {
                let previous = std::mem::replace(&mut self.state, next);
                self.history.push(HistoryEntry {
                    token,
                    state: previous,
                });
                Ok(&self.state)
            }
            Err(err) => {
                warn!(page, error = %err, "page replay failed, rolling back");
                self.rollback(&token);
                Err(match err {
                    NavError::ReplayFailed { .. } => err,
                    other => NavError::ReplayFailed {
                        target: page,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}
