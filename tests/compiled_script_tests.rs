/// Compiled-script integration tests: segmentation, mapping, and reading
/// through the script runtime.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;

use story_engine::config::{EngineConfig, ReplayPolicy};
use story_engine::core::extract::DocumentShape;
use story_engine::core::loader::LoadedStory;
use story_engine::nav::{NavError, Navigator, StoryNavigator};

fn harbor(config: &EngineConfig) -> LoadedStory {
    LoadedStory::from_path(Path::new("tests/fixtures/harbor.ink.json"), config).unwrap()
}

#[test]
fn harbor_segments_into_fragments_and_sections() {
    let loaded = harbor(&EngineConfig::default());
    assert_eq!(loaded.shape, DocumentShape::CompiledScript);
    assert_eq!(
        loaded.story.ids().collect::<Vec<_>>(),
        vec!["fragment_0", "fragment_1", "fragment_2", "greet", "market", "voyage"]
    );

    let opening = loaded.story.get("fragment_0").unwrap();
    assert_eq!(opening.text, "Chapter 1\nThe harbor wakes before dawn.");
    assert_eq!(opening.choices[0].next_node, "fragment_1");

    let gulls = loaded.story.get("fragment_1").unwrap();
    assert_eq!(gulls.text, "Gulls circle the masts.");
    assert_eq!(gulls.metadata.images, vec!["harbor.png"]);

    let pier = loaded.story.get("fragment_2").unwrap();
    assert_eq!(pier.text, "Chapter 2\nA stranger waits on the pier.");
    assert!(pier.metadata.choice_bearing);
    let targets: Vec<&str> = pier.choices.iter().map(|c| c.next_node.as_str()).collect();
    assert_eq!(targets, vec!["greet", "market"]);

    assert!(loaded.story.get("market").unwrap().is_ending);
    let voyage = loaded.story.get("voyage").unwrap();
    assert!(voyage.is_ending);
    assert_eq!(voyage.metadata.tags, vec!["mood: hopeful"]);

    assert!(loaded.story.reserved().contains_key("inkVersion"));
    assert!(loaded.story.reserved().contains_key("listDefs"));
}

#[test]
fn harbor_pages_follow_flow() {
    let loaded = harbor(&EngineConfig::default());
    let pages: Vec<&str> = loaded.mappings.page_to_node.values().map(String::as_str).collect();
    assert_eq!(
        pages,
        vec!["fragment_0", "fragment_1", "fragment_2", "greet", "market", "voyage"]
    );
    assert_eq!(loaded.orphan_count(), 0);
}

#[test]
fn crossroads_choices_keep_labels_and_targets() {
    let config = EngineConfig::default();
    let loaded =
        LoadedStory::from_path(Path::new("tests/fixtures/crossroads.ink.json"), &config).unwrap();
    assert_eq!(
        loaded.story.ids().collect::<Vec<_>>(),
        vec!["fragment_0", "left", "right"]
    );
    let hello = loaded.story.get("fragment_0").unwrap();
    assert_eq!(hello.text, "Hello.");
    let choices: Vec<(&str, &str)> = hello
        .choices
        .iter()
        .map(|c| (c.text.as_str(), c.next_node.as_str()))
        .collect();
    assert_eq!(choices, vec![("Go left", "left"), ("Go right", "right")]);
    assert!(loaded.graph.dangling().is_empty());
    assert_eq!(loaded.orphan_count(), 0);

    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();
    assert!(!nav.state().can_continue);
    assert_eq!(nav.state().choices.len(), 2);
    let state = nav.choose(1).unwrap();
    assert_eq!(state.node, "right");
    assert_eq!(state.page, 3);
    assert_eq!(state.text, "You went right.");
    assert!(state.is_ending);
}

#[test]
fn empty_script_yields_placeholder() {
    let config = EngineConfig::default();
    let loaded = LoadedStory::from_value(&json!({"inkVersion": 21, "root": []}), &config).unwrap();
    assert_eq!(loaded.total_pages(), 1);
    let node = loaded.story.get("fragment_0").unwrap();
    assert_eq!(node.text, config.placeholder_text);
    assert!(node.is_ending);
}

#[test]
fn read_harbor_through_runtime() {
    let config = EngineConfig::default();
    let loaded = harbor(&config);
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();
    assert_eq!(nav.backend(), "script");
    assert_eq!(nav.state().page, 1);
    assert!(nav.state().can_continue);

    nav.cont().unwrap();
    let state = nav.choose(0).unwrap();
    assert_eq!(state.node, "fragment_2");
    assert_eq!(state.choices.len(), 2);
    assert!(!state.can_continue);

    let state = nav.choose(0).unwrap();
    assert_eq!(state.node, "greet");
    assert_eq!(state.page, 4);
    assert_eq!(state.text, "The stranger smiles and hands you a map.");

    let state = nav.cont().unwrap();
    assert_eq!(state.node, "voyage");
    assert_eq!(state.page, 6);
    assert!(state.is_ending);

    assert_eq!(nav.back().unwrap().node, "greet");
    assert_eq!(nav.back().unwrap().node, "fragment_2");
    let state = nav.choose(1).unwrap();
    assert_eq!(state.node, "market");
    assert_eq!(state.page, 5);
}

#[test]
fn jump_replays_along_first_choices() {
    let config = EngineConfig::default();
    let loaded = harbor(&config);
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();

    let state = nav.jump_to_page(6).unwrap();
    assert_eq!(state.node, "voyage");
    assert_eq!(nav.back().unwrap().page, 1);
}

#[test]
fn jump_off_the_replayed_branch_rolls_back() {
    let config = EngineConfig::default();
    let loaded = harbor(&config);
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();
    nav.cont().unwrap();
    let before = nav.state().clone();

    let err = nav.jump_to_page(5).unwrap_err();
    assert!(matches!(err, NavError::ReplayFailed { target: 5, .. }));
    assert_eq!(nav.state(), &before);
    assert_eq!(nav.cont().unwrap().node, "fragment_2");
}

#[test]
fn stop_at_branch_refuses_to_guess() {
    let config = EngineConfig {
        replay_policy: ReplayPolicy::StopAtBranch,
        ..EngineConfig::default()
    };
    let loaded = harbor(&config);
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();

    assert_eq!(nav.jump_to_page(3).unwrap().node, "fragment_2");
    assert!(matches!(nav.jump_to_page(4), Err(NavError::ReplayFailed { .. })));
    assert_eq!(nav.state().node, "fragment_2");
}

#[test]
fn restart_resets_runtime() {
    let config = EngineConfig::default();
    let loaded = harbor(&config);
    let mut nav = StoryNavigator::for_story(&loaded, &config).unwrap();
    nav.jump_to_page(4).unwrap();
    nav.cont().unwrap();

    let state = nav.restart().unwrap();
    assert_eq!(state.page, 1);
    assert!(!state.can_go_back);
    assert_eq!(state.text, "Chapter 1\nThe harbor wakes before dawn.");
}
