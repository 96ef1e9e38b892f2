/// Navigation: one reader-facing state machine over two story backends.
///
/// `GraphNavigator` walks a normalized story directly. `ScriptNavigator`
/// drives a `StoryRuntime` and can only seek by replaying. Both expose the
/// same `Navigator` contract; `StoryNavigator` picks one per story.

pub mod graph;
pub mod runtime;
pub mod script;
pub mod session;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::core::extract::DocumentShape;
use crate::core::loader::LoadedStory;
use crate::schema::node::StoryChoice;

pub use graph::GraphNavigator;
pub use runtime::{RuntimeError, ScriptRuntime, StoryRuntime};
pub use script::ScriptNavigator;

/// What the reader sees. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub node: String,
    pub page: u32,
    pub text: String,
    pub choices: Vec<StoryChoice>,
    pub can_continue: bool,
    pub can_go_back: bool,
    pub is_ending: bool,
}

#[derive(Debug, Error)]
pub enum NavError {
    #[error("story has no nodes to read")]
    EmptyStory,
    #[error("current passage has no linear continuation")]
    NoContinue,
    #[error("choice {index} out of range ({len} choices)")]
    ChoiceOutOfRange { index: usize, len: usize },
    #[error("target node not found: {0}")]
    MissingNode(String),
    #[error("node {0} has no page mapping")]
    UnmappedNode(String),
    #[error("no earlier page to go back to")]
    NothingToGoBack,
    #[error("page {page} out of range (1..={total})")]
    PageOutOfRange { page: u32, total: u32 },
    #[error("already on page {0}")]
    SamePage(u32),
    #[error("page {0} has no mapped node")]
    UnmappedPage(u32),
    #[error("could not restore previous position: {0}")]
    RestoreFailed(RuntimeError),
    #[error("could not replay to page {target}: {reason}")]
    ReplayFailed { target: u32, reason: String },
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// The contract shared by every navigation backend.
///
/// A transition either fully succeeds and returns the new state, or fails
/// and leaves the previous state in place.
pub trait Navigator {
    fn state(&self) -> &NavigationState;

    fn total_pages(&self) -> u32;

    /// Follow the linear continuation of the current passage.
    fn cont(&mut self) -> Result<&NavigationState, NavError>;

    fn choose(&mut self, index: usize) -> Result<&NavigationState, NavError>;

    fn back(&mut self) -> Result<&NavigationState, NavError>;

    /// Return to page 1 and forget history.
    fn restart(&mut self) -> Result<&NavigationState, NavError>;

    fn jump_to_page(&mut self, page: u32) -> Result<&NavigationState, NavError>;
}

/// Shared page-change precondition: in range, not current, mapped.
pub(crate) fn check_page_target(
    target: u32,
    current: u32,
    total: u32,
    mapped: bool,
) -> Result<(), NavError> {
    if target == 0 || target > total {
        return Err(NavError::PageOutOfRange { page: target, total });
    }
    if target == current {
        return Err(NavError::SamePage(target));
    }
    if !mapped {
        return Err(NavError::UnmappedPage(target));
    }
    Ok(())
}

pub enum StoryNavigator {
    Graph(GraphNavigator),
    Script(ScriptNavigator<ScriptRuntime>),
}

impl StoryNavigator {
    /// Compiled scripts are read through the runtime, everything else
    /// through the graph.
    pub fn for_story(loaded: &LoadedStory, config: &EngineConfig) -> Result<Self, NavError> {
        match loaded.shape {
            DocumentShape::CompiledScript => {
                let runtime = ScriptRuntime::from_loaded(loaded)?;
                let navigator = ScriptNavigator::new(runtime, loaded.mappings.clone(), config)?;
                Ok(StoryNavigator::Script(navigator))
            }
            DocumentShape::NamedGraph => Ok(StoryNavigator::Graph(GraphNavigator::new(loaded)?)),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            StoryNavigator::Graph(_) => "graph",
            StoryNavigator::Script(_) => "script",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $nav:ident => $call:expr) => {
        match $self {
            StoryNavigator::Graph($nav) => $call,
            StoryNavigator::Script($nav) => $call,
        }
    };
}

impl Navigator for StoryNavigator {
    fn state(&self) -> &NavigationState {
        delegate!(self, nav => nav.state())
    }

    fn total_pages(&self) -> u32 {
        delegate!(self, nav => nav.total_pages())
    }

    fn cont(&mut self) -> Result<&NavigationState, NavError> {
        delegate!(self, nav => nav.cont())
    }

    fn choose(&mut self, index: usize) -> Result<&NavigationState, NavError> {
        delegate!(self, nav => nav.choose(index))
    }

    fn back(&mut self) -> Result<&NavigationState, NavError> {
        delegate!(self, nav => nav.back())
    }

    fn restart(&mut self) -> Result<&NavigationState, NavError> {
        delegate!(self, nav => nav.restart())
    }

    fn jump_to_page(&mut self, page: u32) -> Result<&NavigationState, NavError> {
        delegate!(self, nav => nav.jump_to_page(page))
    }
}
