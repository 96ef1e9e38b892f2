//! WASM bindings for story-engine: loading, mapping, export and reading
//! from the browser editor.

use wasm_bindgen::prelude::*;

use story_engine::config::EngineConfig;
use story_engine::core::export::export_ink as render_ink;
use story_engine::core::extract::DocumentShape;
use story_engine::core::loader::LoadedStory;
use story_engine::nav::{NavigationState, Navigator, StoryNavigator};
use story_engine::schema::mapping::NodeMappings;
use story_engine::schema::story::CustomStory;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct MappedStory<'a> {
    shape: DocumentShape,
    story: &'a CustomStory,
    mappings: &'a NodeMappings,
    start: Option<&'a str>,
    total_pages: u32,
    orphans: usize,
    used_fallback: bool,
}

fn load(json: &str) -> Result<LoadedStory, JsError> {
    LoadedStory::from_json_str(json, &EngineConfig::default())
        .map_err(|e| JsError::new(&format!("Story load error: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

/// Parse a story document and return its normalized nodes and page mapping
/// as JSON.
#[wasm_bindgen]
pub fn map_story(json: &str) -> Result<String, JsError> {
    let loaded = load(json)?;
    to_json(&MappedStory {
        shape: loaded.shape,
        story: &loaded.story,
        mappings: &loaded.mappings,
        start: loaded.start.as_deref(),
        total_pages: loaded.total_pages(),
        orphans: loaded.orphan_count(),
        used_fallback: loaded.used_fallback,
    })
}

/// Render a story document as ink-style source text.
#[wasm_bindgen]
pub fn export_ink(json: &str) -> Result<String, JsError> {
    let loaded = load(json)?;
    Ok(render_ink(&loaded.story, &EngineConfig::default()))
}

// ---------------------------------------------------------------------------
// Reader: the exported navigation handle
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct Reader {
    navigator: StoryNavigator,
}

fn state_json(state: &NavigationState) -> Result<String, JsError> {
    to_json(state)
}

#[wasm_bindgen]
impl Reader {
    #[wasm_bindgen(constructor)]
    pub fn new(json: &str) -> Result<Reader, JsError> {
        let config = EngineConfig::default();
        let loaded = load(json)?;
        let navigator = StoryNavigator::for_story(&loaded, &config)
            .map_err(|e| JsError::new(&format!("Navigation error: {e}")))?;
        Ok(Reader { navigator })
    }

    pub fn state(&self) -> Result<String, JsError> {
        state_json(self.navigator.state())
    }

    pub fn total_pages(&self) -> u32 {
        self.navigator.total_pages()
    }

    pub fn cont(&mut self) -> Result<String, JsError> {
        let state = self.navigator.cont().map_err(nav_error)?;
        state_json(state)
    }

    pub fn choose(&mut self, index: usize) -> Result<String, JsError> {
        let state = self.navigator.choose(index).map_err(nav_error)?;
        state_json(state)
    }

    pub fn back(&mut self) -> Result<String, JsError> {
        let state = self.navigator.back().map_err(nav_error)?;
        state_json(state)
    }

    pub fn restart(&mut self) -> Result<String, JsError> {
        let state = self.navigator.restart().map_err(nav_error)?;
        state_json(state)
    }

    pub fn jump_to_page(&mut self, page: u32) -> Result<String, JsError> {
        let state = self.navigator.jump_to_page(page).map_err(nav_error)?;
        state_json(state)
    }
}

fn nav_error(err: story_engine::nav::NavError) -> JsError {
    JsError::new(&err.to_string())
}
