/// Export integration tests: rendered scripts keep every passage verbatim.

use proptest::prelude::*;
use std::path::Path;

use story_engine::config::EngineConfig;
use story_engine::core::export::export_ink;
use story_engine::core::loader::LoadedStory;
use story_engine::schema::node::StoryNode;
use story_engine::schema::story::CustomStory;

fn assert_texts_exported(path: &str) {
    let config = EngineConfig::default();
    let loaded = LoadedStory::from_path(Path::new(path), &config).unwrap();
    let script = export_ink(&loaded.story, &config);
    for (id, node) in loaded.story.nodes() {
        if !node.text.is_empty() {
            assert!(script.contains(&node.text), "text of {id} missing from export");
        }
    }
}

#[test]
fn lighthouse_export_contains_every_passage() {
    assert_texts_exported("tests/fixtures/lighthouse.json");
}

#[test]
fn harbor_export_contains_every_passage() {
    assert_texts_exported("tests/fixtures/harbor.ink.json");
}

#[test]
fn lighthouse_export_structure() {
    let config = EngineConfig::default();
    let loaded =
        LoadedStory::from_path(Path::new("tests/fixtures/lighthouse.json"), &config).unwrap();
    let script = export_ink(&loaded.story, &config);
    assert!(script.starts_with("-> root\n"));
    assert!(script.contains("=== stairs ===\nThe spiral stairs groan under every step.\n-> lamp_room\n"));
    assert!(script.contains("* [Search the wreck] -> wreck_site\n"));
    assert!(script.contains("=== lit ===\nLight sweeps the water. Far out, a ship turns for home.\n-> END\n"));
    assert!(script.contains("=== ghost ===\nSomeone is humming on the gallery.\n-> DONE\n"));
}

proptest! {
    #[test]
    fn arbitrary_text_survives_export(
        texts in prop::collection::vec("[A-Za-z0-9 ,.!?'\n-]{1,60}", 1..8)
    ) {
        let mut story = CustomStory::new();
        for (i, text) in texts.iter().enumerate() {
            story.insert(format!("node {i}"), StoryNode::new(text.clone()));
        }
        let script = export_ink(&story, &EngineConfig::default());
        for text in &texts {
            prop_assert!(script.contains(text.as_str()));
        }
    }
}
