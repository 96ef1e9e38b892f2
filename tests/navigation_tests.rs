/// Navigation integration tests: reading named-graph stories end to end.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;

use story_engine::config::EngineConfig;
use story_engine::core::loader::LoadedStory;
use story_engine::nav::session::{CommentCountSource, CommentSlot, PageKey, ReadingSession};
use story_engine::nav::{NavError, Navigator, StoryNavigator};

fn lighthouse() -> StoryNavigator {
    let config = EngineConfig::default();
    let loaded = LoadedStory::from_path(Path::new("tests/fixtures/lighthouse.json"), &config).unwrap();
    StoryNavigator::for_story(&loaded, &config).unwrap()
}

#[test]
fn scenario_choice_then_back() {
    let config = EngineConfig::default();
    let loaded = LoadedStory::from_value(
        &json!({
            "root": {"text": "A", "choices": [{"text": "go", "nextNode": "b"}]},
            "b": {"text": "B", "choices": [], "isEnding": true},
        }),
        &config,
    )
    .unwrap();
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();

    let state = nav.choose(0).unwrap();
    assert_eq!(
        (state.node.as_str(), state.page, state.text.as_str(), state.can_continue),
        ("b", 2, "B", false)
    );
    let state = nav.back().unwrap();
    assert_eq!(
        (state.node.as_str(), state.page, state.text.as_str()),
        ("root", 1, "A")
    );
}

#[test]
fn walk_the_lighthouse() {
    let mut nav = lighthouse();
    assert_eq!(nav.backend(), "graph");
    assert_eq!(nav.total_pages(), 7);
    assert_eq!(nav.state().choices.len(), 2);

    assert_eq!(nav.choose(0).unwrap().node, "stairs");
    assert!(nav.state().can_continue);
    assert_eq!(nav.cont().unwrap().node, "lamp_room");
    let state = nav.choose(0).unwrap();
    assert_eq!(state.node, "lit");
    assert_eq!(state.page, 5);
    assert!(state.is_ending);
    assert!(matches!(nav.cont(), Err(NavError::NoContinue)));
}

#[test]
fn restart_from_any_depth() {
    let mut nav = lighthouse();
    nav.choose(1).unwrap();
    nav.choose(0).unwrap();
    nav.choose(0).unwrap();
    nav.cont().unwrap();
    assert_eq!(nav.state().node, "lamp_room");

    let state = nav.restart().unwrap();
    assert_eq!(state.page, 1);
    assert_eq!(state.node, "root");
    assert!(!state.can_go_back);
    assert!(matches!(nav.back(), Err(NavError::NothingToGoBack)));
}

#[test]
fn dangling_choice_is_shown_but_not_followed() {
    let mut nav = lighthouse();
    nav.choose(1).unwrap();
    let before = nav.state().clone();
    assert_eq!(before.choices[1].next_node, "wreck_site");
    assert!(matches!(nav.choose(1), Err(NavError::MissingNode(target)) if target == "wreck_site"));
    assert_eq!(nav.state(), &before);
}

#[test]
fn jump_to_orphan_and_back() {
    let mut nav = lighthouse();
    let state = nav.jump_to_page(7).unwrap();
    assert_eq!(state.node, "ghost");
    assert!(state.is_ending);
    assert!(matches!(nav.jump_to_page(7), Err(NavError::SamePage(7))));
    assert!(matches!(nav.jump_to_page(0), Err(NavError::PageOutOfRange { .. })));
    assert!(matches!(nav.jump_to_page(8), Err(NavError::PageOutOfRange { .. })));
    assert_eq!(nav.back().unwrap().node, "root");
}

#[derive(Default)]
struct Recorder {
    keys: Vec<PageKey>,
    slots: Vec<CommentSlot>,
}

impl CommentCountSource for &mut Recorder {
    fn request(&mut self, key: PageKey, slot: CommentSlot) {
        self.keys.push(key);
        self.slots.push(slot);
    }
}

#[test]
fn session_requests_comment_counts_per_page() {
    let mut recorder = Recorder::default();
    {
        let mut session = ReadingSession::new("lighthouse", lighthouse(), &mut recorder);
        session.choose(1).unwrap();
        assert!(session.jump_to_page(99).is_err());
        session.jump_to_page(6).unwrap();
        session.restart().unwrap();
        assert_eq!(session.summary().total_pages, 7);
    }
    let pages: Vec<u32> = recorder.keys.iter().map(|key| key.page).collect();
    assert_eq!(pages, vec![1, 3, 6, 1]);

    recorder.slots[3].set(2);
    assert_eq!(recorder.slots[0].get(), Some(2));
}
