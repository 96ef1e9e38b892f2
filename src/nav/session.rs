/// Reading session: a navigator bound to one story, refreshing the comment
/// count for whatever page the reader lands on.

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;
use tracing::trace;

use super::{NavError, NavigationState, Navigator, StoryNavigator};

/// Identifies the page a comment count belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageKey {
    pub story_id: String,
    pub page: u32,
}

/// Where a comment count lands once it is known. Writes from stale
/// requests are not filtered: the last write wins.
#[derive(Debug, Clone, Default)]
pub struct CommentSlot(Rc<Cell<Option<usize>>>);

impl CommentSlot {
    pub fn set(&self, count: usize) {
        self.0.set(Some(count));
    }

    pub fn get(&self) -> Option<usize> {
        self.0.get()
    }
}

/// Supplies comment counts. `request` must return immediately; the source
/// fills the slot whenever the count is available.
pub trait CommentCountSource {
    fn request(&mut self, key: PageKey, slot: CommentSlot);
}

/// A source that never reports counts.
pub struct NoComments;

impl CommentCountSource for NoComments {
    fn request(&mut self, _key: PageKey, _slot: CommentSlot) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub story_id: String,
    pub total_pages: u32,
}

pub struct ReadingSession<S: CommentCountSource> {
    story_id: String,
    navigator: StoryNavigator,
    comments: S,
    slot: CommentSlot,
}

impl<S: CommentCountSource> ReadingSession<S> {
    /// Open a session on the navigator's current page.
    pub fn new(story_id: impl Into<String>, navigator: StoryNavigator, comments: S) -> Self {
        let mut session = Self {
            story_id: story_id.into(),
            navigator,
            comments,
            slot: CommentSlot::default(),
        };
        session.refresh_comments();
        session
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn state(&self) -> &NavigationState {
        self.navigator.state()
    }

    pub fn navigator(&self) -> &StoryNavigator {
        &self.navigator
    }

    /// The most recently delivered comment count, if any arrived yet.
    pub fn comment_count(&self) -> Option<usize> {
        self.slot.get()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            story_id: self.story_id.clone(),
            total_pages: self.navigator.total_pages(),
        }
    }

    pub fn cont(&mut self) -> Result<&NavigationState, NavError> {
        self.navigator.cont()?;
        Ok(self.after_navigation())
    }

    pub fn choose(&mut self, index: usize) -> Result<&NavigationState, NavError> {
        self.navigator.choose(index)?;
        Ok(self.after_navigation())
    }

    pub fn back(&mut self) -> Result<&NavigationState, NavError> {
        self.navigator.back()?;
        Ok(self.after_navigation())
    }

    pub fn restart(&mut self) -> Result<&NavigationState, NavError> {
        self.navigator.restart()?;
        Ok(self.after_navigation())
    }

    pub fn jump_to_page(&mut self, page: u32) -> Result<&NavigationState, NavError> {
        self.navigator.jump_to_page(page)?;
        Ok(self.after_navigation())
    }

    fn after_navigation(&mut self) -> &NavigationState {
        self.refresh_comments();
        self.navigator.state()
    }

    fn refresh_comments(&mut self) {
        let key = PageKey {
            story_id: self.story_id.clone(),
            page: self.navigator.state().page,
        };
        trace!(story = %key.story_id, page = key.page, "requesting comment count");
        self.comments.request(key, self.slot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::loader::LoadedStory;
    use serde_json::json;

    /// Records requests and answers them later, on demand.
    #[derive(Default)]
    struct Deferred {
        pending: Vec<(PageKey, CommentSlot)>,
    }

    impl CommentCountSource for &mut Deferred {
        fn request(&mut self, key: PageKey, slot: CommentSlot) {
            self.pending.push((key, slot));
        }
    }

    fn navigator() -> StoryNavigator {
        let config = EngineConfig::default();
        let loaded = LoadedStory::from_value(
            &json!({
                "root": {"text": "A", "choices": [{"text": "go", "nextNode": "b"}]},
                "b": {"text": "B", "isEnding": true},
            }),
            &config,
        )
        .unwrap();
        StoryNavigator::for_story(&loaded, &config).unwrap()
    }

    #[test]
    fn requests_follow_successful_navigation() {
        let mut source = Deferred::default();
        {
            let mut session = ReadingSession::new("story-1", navigator(), &mut source);
            session.choose(0).unwrap();
            assert!(session.cont().is_err());
            session.back().unwrap();
        }
        let pages: Vec<u32> = source.pending.iter().map(|(key, _)| key.page).collect();
        assert_eq!(pages, vec![1, 2, 1]);
        assert!(source.pending.iter().all(|(key, _)| key.story_id == "story-1"));
    }

    #[test]
    fn late_counts_are_last_write_wins() {
        let mut source = Deferred::default();
        let mut session = ReadingSession::new("story-1", navigator(), &mut source);
        session.choose(0).unwrap();
        drop(session);

        let (_, newest) = &source.pending[1];
        let (_, oldest) = &source.pending[0];
        newest.set(4);
        oldest.set(9);
        assert_eq!(newest.get(), Some(9));
    }

    #[test]
    fn summary_reports_pages() {
        let session = ReadingSession::new("story-7", navigator(), NoComments);
        assert_eq!(
            session.summary(),
            SessionSummary {
                story_id: "story-7".into(),
                total_pages: 2,
            }
        );
        assert_eq!(session.comment_count(), None);
        let value = serde_json::to_value(session.summary()).unwrap();
        assert_eq!(value["totalPages"], json!(2));
    }
}
