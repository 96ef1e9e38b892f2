/// Graph backend: navigation by direct lookup in the normalized story.

use tracing::{debug, warn};

use super::{check_page_target, NavError, NavigationState, Navigator};
use crate::core::loader::LoadedStory;
use crate::schema::mapping::NodeMappings;
use crate::schema::story::CustomStory;

pub struct GraphNavigator {
    story: CustomStory,
    mappings: NodeMappings,
    start: String,
    state: NavigationState,
    /// Node ids visited before the current one, most recent last.
    history: Vec<String>,
}

impl GraphNavigator {
    pub fn new(loaded: &LoadedStory) -> Result<Self, NavError> {
        let start = loaded
            .mappings
            .node_at(1)
            .ok_or(NavError::EmptyStory)?
            .to_string();
        let mut navigator = Self {
            story: loaded.story.clone(),
            mappings: loaded.mappings.clone(),
            start,
            state: NavigationState::default(),
            history: Vec::new(),
        };
        navigator.state = navigator.state_at(&navigator.start, false)?;
        Ok(navigator)
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn state_at(&self, id: &str, can_go_back: bool) -> Result<NavigationState, NavError> {
        let node = self
            .story
            .get(id)
            .ok_or_else(|| NavError::MissingNode(id.to_string()))?;
        let page = self
            .mappings
            .page_of(id)
            .ok_or_else(|| NavError::UnmappedNode(id.to_string()))?;
        Ok(NavigationState {
            node: id.to_string(),
            page,
            text: node.text.clone(),
            choices: node.choices.clone(),
            can_continue: node.is_linear(),
            can_go_back,
            is_ending: node.is_ending || node.choices.is_empty(),
        })
    }

    /// Move forward to `id`, recording the current node in history.
    fn advance(&mut self, id: &str) -> Result<&NavigationState, NavError> {
        let next = self.state_at(id, true)?;
        let previous = std::mem::replace(&mut self.state, next);
        self.history.push(previous.node);
        debug!(node = %self.state.node, page = self.state.page, "navigated");
        Ok(&self.state)
    }
}

impl Navigator for GraphNavigator {
    fn state(&self) -> &NavigationState {
        &self.state
    }

    fn total_pages(&self) -> u32 {
        self.mappings.total_pages()
    }

    fn cont(&mut self) -> Result<&NavigationState, NavError> {
        if !self.state.can_continue {
            warn!(node = %self.state.node, "continue requested on a branching passage");
            return Err(NavError::NoContinue);
        }
        self.choose(0)
    }

    fn choose(&mut self, index: usize) -> Result<&NavigationState, NavError> {
        let Some(choice) = self.state.choices.get(index) else {
            warn!(index, len = self.state.choices.len(), "choice index out of range");
            return Err(NavError::ChoiceOutOfRange {
                index,
                len: self.state.choices.len(),
            });
        };
        let target = choice.next_node.clone();
        if !self.story.contains(&target) {
            warn!(from = %self.state.node, target = %target, "choice targets a missing node");
            return Err(NavError::MissingNode(target));
        }
        self.advance(&target)
    }

    fn back(&mut self) -> Result<&NavigationState, NavError> {
        let Some(previous) = self.history.last() else {
            warn!("back requested with empty history");
            return Err(NavError::NothingToGoBack);
        };
        let restored = self.state_at(previous, self.history.len() > 1)?;
        self.history.pop();
        self.state = restored;
        Ok(&self.state)
    }

    fn restart(&mut self) -> Result<&NavigationState, NavError> {
        self.state = self.state_at(&self.start, false)?;
        self.history.clear();
        Ok(&self.state)
    }

    fn jump_to_page(&mut self, page: u32) -> Result<&NavigationState, NavError> {
        let target = self.mappings.node_at(page).map(str::to_string);
        if let Err(err) = check_page_target(page, self.state.page, self.total_pages(), target.is_some()) {
            warn!(page, current = self.state.page, error = %err, "page change rejected");
            return Err(err);
        }
        let target = target.ok_or(NavError::UnmappedPage(page))?;
        self.advance(&target)
    }
}
