/// Node extraction: discovers every story node in a raw document.
///
/// Named graphs are walked breadth-first from their entry node; compiled
/// scripts have their anonymous root array segmented into fragments.

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use tracing::debug;

use crate::config::EngineConfig;
use crate::core::tokens::{
    divert_target, is_choice_container, is_choice_start, is_end_marker, is_node_object,
    lower_choice_points, normalize_node, parse_tokens, tag_content, text_content,
};
use crate::schema::node::{NodeMetadata, StoryChoice, StoryNode};
use crate::schema::story::CustomStory;

/// The two document layouts the engine ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DocumentShape {
    /// An object keyed by node id (format A).
    NamedGraph,
    /// A compiled script with a version marker and a root token array (format B).
    CompiledScript,
}

/// Result of extracting a document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub story: CustomStory,
    pub shape: DocumentShape,
    /// Entry node the extraction started from, if any node exists.
    pub start: Option<String>,
}

pub fn detect_shape(doc: &Map<String, Value>, config: &EngineConfig) -> DocumentShape {
    let versioned = doc.contains_key(&config.version_key);
    let array_root = doc.get(&config.root_key).is_some_and(Value::is_array);
    if versioned && array_root {
        DocumentShape::CompiledScript
    } else {
        DocumentShape::NamedGraph
    }
}

pub fn extract(doc: &Map<String, Value>, config: &EngineConfig) -> Extraction {
    match detect_shape(doc, config) {
        DocumentShape::NamedGraph => extract_named_graph(doc, config),
        DocumentShape::CompiledScript => extract_compiled_script(doc, config),
    }
}

// Named graphs

/// Named-graph nodes are `{text, choices}` objects. Top-level arrays such
/// as an author list stay reserved.
fn is_node_entry(key: &str, value: &Value, config: &EngineConfig) -> bool {
    !config.is_reserved_key(key) && is_node_object(value)
}

/// Entry node of a named graph: an explicit `start` (a pointer to a node,
/// or a node itself), then `root`, then the first node-shaped key.
fn named_start(doc: &Map<String, Value>, config: &EngineConfig) -> (Option<String>, bool) {
    match doc.get(&config.start_key) {
        Some(Value::String(target))
            if doc
                .get(target)
                .is_some_and(|v| is_node_entry(target, v, config)) =>
        {
            return (Some(target.clone()), true);
        }
        Some(value) if is_node_object(value) => {
            return (Some(config.start_key.clone()), false);
        }
        _ => {}
    }
    if doc
        .get(&config.root_key)
        .is_some_and(|v| is_node_entry(&config.root_key, v, config))
    {
        return (Some(config.root_key.clone()), false);
    }
    let first = doc
        .iter()
        .find(|(key, value)| is_node_entry(key, value, config))
        .map(|(key, _)| key.clone());
    (first, false)
}

fn extract_named_graph(doc: &Map<String, Value>, config: &EngineConfig) -> Extraction {
    let (start, pointer) = named_start(doc, config);

    let mut parsed: FxHashMap<String, StoryNode> = FxHashMap::default();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut queue: VecDeque<String> = start.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if visited.contains(&id) {
            continue;
        }
        let Some(node) = doc
            .get(&id)
            .filter(|value| is_node_entry(&id, value, config))
            .and_then(|value| normalize_node(value, config))
        else {
            continue;
        };
        visited.insert(id.clone());
        for choice in &node.choices {
            if !visited.contains(&choice.next_node) {
                queue.push_back(choice.next_node.clone());
            }
        }
        parsed.insert(id, node);
    }
    let reachable = parsed.len();

    let mut story = CustomStory::new();
    for (key, value) in doc {
        if !is_node_entry(key, value, config) {
            story.insert_reserved(key.clone(), value.clone());
            continue;
        }
        if let Some(node) = parsed.remove(key) {
            story.insert(key.clone(), node);
        } else if let Some(node) = normalize_node(value, config) {
            debug!(node = %key, "node unreachable from start");
            story.insert(key.clone(), node);
        }
    }
    if let Some(target) = start.clone().filter(|_| pointer) {
        story.set_start_pointer(config.start_key.clone(), target);
    }

    debug!(
        nodes = story.node_count(),
        reachable,
        start = ?start,
        "extracted named graph"
    );
    Extraction {
        story,
        shape: DocumentShape::NamedGraph,
        start,
    }
}

// Compiled scripts

#[derive(Debug, Clone, PartialEq)]
enum FragmentLink {
    /// Linked to the following fragment by a synthesized Continue choice.
    Next,
    Divert(String),
    Ending,
    Choices,
}

#[derive(Debug, Default)]
struct Fragment {
    text: String,
    choices: Vec<StoryChoice>,
    metadata: NodeMetadata,
}

impl Fragment {
    fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || !self.choices.is_empty() || !self.metadata.images.is_empty()
    }

    fn push_text(&mut self, text: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }
}

struct Segmenter<'a> {
    config: &'a EngineConfig,
    fragments: Vec<(Fragment, FragmentLink)>,
    current: Fragment,
    sections: Vec<(String, StoryNode)>,
}

impl<'a> Segmenter<'a> {
    fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            fragments: Vec::new(),
            current: Fragment::default(),
            sections: Vec::new(),
        }
    }

    /// End the current fragment at a boundary. Empty fragments are dropped.
    fn close(&mut self, link: FragmentLink) {
        let fragment = std::mem::take(&mut self.current);
        if fragment.has_content() {
            self.fragments.push((fragment, link));
        } else if link != FragmentLink::Next {
            // A terminal marker right after a boundary applies to the
            // fragment that boundary closed, unless it already has a link.
            if let Some((_, last)) = self.fragments.last_mut() {
                if *last == FragmentLink::Next {
                    *last = link;
                }
            }
        }
    }

    fn walk(&mut self, items: &[Value], depth: usize) {
        for item in lower_choice_points(items, self.config.max_depth).iter() {
            self.visit(item, depth);
        }
    }

    fn visit(&mut self, item: &Value, depth: usize) {
        if let Some(content) = text_content(item) {
            self.visit_text(content.trim());
        } else if item.as_str() == Some("\n") {
            if !self.current.text.is_empty() {
                let trimmed = self.current.text.trim_end_matches(' ').len();
                self.current.text.truncate(trimmed);
                self.current.text.push('\n');
            }
        } else if is_end_marker(item) {
            self.close(FragmentLink::Ending);
        } else if let Some(target) = divert_target(item) {
            let link = match target {
                "END" | "DONE" => FragmentLink::Ending,
                other => FragmentLink::Divert(other.to_string()),
            };
            self.close(link);
        } else if let Some(tag) = tag_content(item) {
            self.visit_tag(tag.trim());
        } else if is_choice_start(item) || is_choice_container(item) {
            self.visit_choices(std::slice::from_ref(item));
        } else {
            match item {
                Value::Array(inner) if is_choice_array(inner) => self.visit_choices(inner),
                Value::Array(inner) if depth < self.config.max_depth => {
                    self.walk(inner, depth + 1);
                }
                Value::Object(obj) => self.collect_sections(obj),
                other => debug!(token = %other, "skipping root token"),
            }
        }
    }

    fn visit_text(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        if let Some(image) = self.config.image_directive(content) {
            self.close(FragmentLink::Next);
            self.current.metadata.images.push(image.to_string());
            return;
        }
        if self.config.is_chapter_heading(content) {
            self.close(FragmentLink::Next);
        }
        self.current.push_text(content);
    }

    fn visit_tag(&mut self, tag: &str) {
        if let Some(image) = self.config.image_directive(tag) {
            self.close(FragmentLink::Next);
            self.current.metadata.images.push(image.to_string());
        } else if !tag.is_empty() {
            self.current.metadata.tags.push(tag.to_string());
        }
    }

    /// A choice array closes the current fragment as choice-bearing.
    fn visit_choices(&mut self, tokens: &[Value]) {
        let parsed = parse_tokens(&Value::Array(tokens.to_vec()), self.config);
        if !parsed.text.is_empty() {
            self.current.push_text(&parsed.text);
        }
        let synthesized_only = parsed.metadata.continuation;
        self.current.metadata.absorb(parsed.metadata);
        if parsed.choices.is_empty() {
            if let Some(next) = parsed.next_node {
                self.close(FragmentLink::Divert(next));
            } else if parsed.is_ending {
                self.close(FragmentLink::Ending);
            }
            return;
        }
        if synthesized_only {
            self.close(FragmentLink::Divert(parsed.choices[0].next_node.clone()));
            return;
        }
        self.current.choices = parsed.choices;
        self.current.metadata.choice_bearing = true;
        self.close(FragmentLink::Choices);
    }

    /// Named containers become standalone nodes when they carry text.
    fn collect_sections(&mut self, obj: &Map<String, Value>) {
        for (name, value) in obj {
            self.collect_section(name, value);
        }
    }

    fn collect_section(&mut self, name: &str, value: &Value) {
        if self.config.is_reserved_key(name) || !(value.is_array() || value.is_object()) {
            return;
        }
        if self.sections.iter().any(|(existing, _)| existing == name) {
            debug!(section = %name, "duplicate section name, keeping the first");
            return;
        }
        let parsed = parse_tokens(value, self.config);
        if parsed.text.is_empty() {
            debug!(section = %name, "section has no extractable text");
            return;
        }
        let mut node = parsed.into_node();
        node.metadata.choice_bearing = node.choices.len() > 1;
        self.sections.push((name.to_string(), node));
    }
}

/// An array that directly holds a choice marker or choice container.
/// Compiled choice points do not count: `walk` lowers them into marker
/// arrays first.
fn is_choice_array(items: &[Value]) -> bool {
    items
        .iter()
        .any(|item| (item.is_string() && is_choice_start(item)) || is_choice_container(item))
}

/// Resolve a divert target against known section names. Dotted paths
/// (`knot.stitch`) resolve to their knot; relative paths (`.^.c-0`) cannot
/// name a section and resolve to `None`.
fn resolve_target(target: &str, sections: &FxHashSet<String>) -> Option<String> {
    if sections.contains(target) {
        return Some(target.to_string());
    }
    if target.starts_with('.') {
        return None;
    }
    let knot = target.split('.').next().unwrap_or(target);
    if sections.contains(knot) {
        Some(knot.to_string())
    } else {
        Some(target.to_string())
    }
}

fn extract_compiled_script(doc: &Map<String, Value>, config: &EngineConfig) -> Extraction {
    let mut segmenter = Segmenter::new(config);
    if let Some(Value::Array(root)) = doc.get(&config.root_key) {
        segmenter.walk(root, 1);
    }
    segmenter.close(FragmentLink::Next);

    for (key, value) in doc {
        if key != &config.root_key && !config.is_reserved_key(key) {
            segmenter.collect_section(key, value);
        }
    }

    let Segmenter {
        fragments,
        sections,
        ..
    } = segmenter;
    let section_names: FxHashSet<String> = sections.iter().map(|(name, _)| name.clone()).collect();

    let mut story = CustomStory::new();
    let count = fragments.len();
    for (index, (fragment, link)) in fragments.into_iter().enumerate() {
        let next_fragment = (index + 1 < count).then(|| config.fragment_id(index + 1));
        let mut node = StoryNode {
            text: fragment.text.trim().to_string(),
            choices: fragment.choices,
            is_ending: false,
            metadata: fragment.metadata,
        };
        match link {
            FragmentLink::Next => {
                if let Some(next) = next_fragment {
                    node = node.with_continuation(config.continue_label.clone(), next);
                }
            }
            FragmentLink::Divert(target) => {
                let target = resolve_target(&target, &section_names).or(next_fragment);
                if let Some(target) = target {
                    node = node.with_continuation(config.continue_label.clone(), target);
                }
            }
            FragmentLink::Ending => node.is_ending = true,
            FragmentLink::Choices => {
                for choice in &mut node.choices {
                    if let Some(target) = resolve_target(&choice.next_node, &section_names) {
                        choice.next_node = target;
                    }
                }
            }
        }
        story.insert(config.fragment_id(index), node);
    }

    if count == 0 {
        let placeholder = StoryNode::new(config.placeholder_text.clone());
        let placeholder = match sections.first() {
            Some((first, _)) => placeholder.with_continuation(config.continue_label.clone(), first.clone()),
            None => placeholder.ending(),
        };
        debug!("compiled script has no root content, emitting placeholder fragment");
        story.insert(config.fragment_id(0), placeholder);
    }

    for (name, mut node) in sections {
        if story.contains(&name) {
            debug!(section = %name, "section name collides with a fragment, skipping");
            continue;
        }
        for choice in &mut node.choices {
            if let Some(target) = resolve_target(&choice.next_node, &section_names) {
                choice.next_node = target;
            }
        }
        story.insert(name, node);
    }

    for (key, value) in doc {
        if config.is_reserved_key(key) {
            story.insert_reserved(key.clone(), value.clone());
        }
    }

    let start = config.fragment_id(0);
    story.set_start(Some(start.clone()));
    debug!(
        fragments = count.max(1),
        nodes = story.node_count(),
        "extracted compiled script"
    );
    Extraction {
        story,
        shape: DocumentShape::CompiledScript,
        start: Some(start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn extract_with_defaults(value: Value) -> Extraction {
        extract(&doc(value), &EngineConfig::default())
    }

    #[test]
    fn shape_detection() {
        let config = EngineConfig::default();
        assert_eq!(
            detect_shape(&doc(json!({"inkVersion": 21, "root": []})), &config),
            DocumentShape::CompiledScript
        );
        assert_eq!(
            detect_shape(&doc(json!({"root": {"text": "A"}})), &config),
            DocumentShape::NamedGraph
        );
        assert_eq!(
            detect_shape(&doc(json!({"inkVersion": 21, "root": {"text": "A"}})), &config),
            DocumentShape::NamedGraph
        );
    }

    #[test]
    fn named_graph_keeps_declaration_order_and_orphans() {
        let extraction = extract_with_defaults(json!({
            "orphan": {"text": "Nobody links here.", "choices": []},
            "root": {"text": "A", "choices": [{"text": "go", "nextNode": "b"}]},
            "b": {"text": "B", "choices": [], "isEnding": true},
            "inkVersion": 21,
        }));
        assert_eq!(extraction.start.as_deref(), Some("root"));
        assert_eq!(
            extraction.story.ids().collect::<Vec<_>>(),
            vec!["orphan", "root", "b"]
        );
        assert!(extraction.story.get("b").unwrap().is_ending);
        assert_eq!(extraction.story.reserved().len(), 1);
    }

    #[test]
    fn named_graph_start_pointer() {
        let extraction = extract_with_defaults(json!({
            "start": "intro",
            "root": {"text": "Not first."},
            "intro": {"text": "First."},
        }));
        assert_eq!(extraction.start.as_deref(), Some("intro"));
        assert_eq!(extraction.story.start(), Some("intro"));
        assert_eq!(extraction.story.node_count(), 2);
        assert_eq!(extraction.story.reserved()["start"], json!("intro"));
    }

    #[test]
    fn named_graph_start_node_and_first_node_fallback() {
        let with_start = extract_with_defaults(json!({
            "a": {"text": "A"},
            "start": {"text": "S"},
        }));
        assert_eq!(with_start.start.as_deref(), Some("start"));

        let first = extract_with_defaults(json!({
            "title": "A story",
            "x": {"text": "X"},
            "y": {"text": "Y"},
        }));
        assert_eq!(first.start.as_deref(), Some("x"));
        assert_eq!(first.story.node_count(), 2);
        assert!(first.story.reserved().contains_key("title"));
    }

    #[test]
    fn named_graph_ignores_top_level_arrays() {
        let extraction = extract_with_defaults(json!({
            "root": {"text": "A", "choices": [{"text": "go", "nextNode": "b"}]},
            "b": {"text": "B", "isEnding": true},
            "authors": ["ann", "bo"],
        }));
        assert_eq!(extraction.story.ids().collect::<Vec<_>>(), vec!["root", "b"]);
        assert_eq!(extraction.story.reserved()["authors"], json!(["ann", "bo"]));

        // An array is never picked as the entry node either.
        let arrays_first = extract_with_defaults(json!({
            "tags": ["^not a passage"],
            "x": {"text": "X"},
        }));
        assert_eq!(arrays_first.start.as_deref(), Some("x"));
        assert_eq!(arrays_first.story.node_count(), 1);
    }

    #[test]
    fn named_graph_cycle_terminates() {
        let extraction = extract_with_defaults(json!({
            "root": {"text": "A", "choices": [{"text": "on", "nextNode": "b"}]},
            "b": {"text": "B", "choices": [{"text": "back", "nextNode": "root"}]},
        }));
        assert_eq!(extraction.story.node_count(), 2);
    }

    #[test]
    fn compiled_script_linear_fragments() {
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": [[
                "^Chapter 1", "\n", "^It was dark.", "\n",
                "^Chapter 2", "\n", "^It was light.", "\n",
                "done",
            ]],
        }));
        let story = extraction.story;
        assert_eq!(extraction.start.as_deref(), Some("fragment_0"));
        assert_eq!(story.node_count(), 2);
        let first = story.get("fragment_0").unwrap();
        assert_eq!(first.text, "Chapter 1\nIt was dark.");
        assert_eq!(first.choices, vec![StoryChoice::new("Continue", "fragment_1")]);
        assert_eq!(first.linear_target(), Some("fragment_1"));
        let second = story.get("fragment_1").unwrap();
        assert!(second.is_ending);
        assert!(second.choices.is_empty());
    }

    #[test]
    fn compiled_script_choice_bearing_fragment() {
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": [
                "^You reach a gate.", "\n",
                ["*", "^Open it", {"->": "garden"}, "*", "^Turn back", {"->": "road.start"}],
                {
                    "garden": ["^Roses everywhere.", "\n", "end"],
                    "road": ["^The long road home.", "\n", "end"],
                    "#f": 1,
                },
            ],
        }));
        let story = extraction.story;
        let gate = story.get("fragment_0").unwrap();
        assert!(gate.metadata.choice_bearing);
        assert_eq!(
            gate.choices,
            vec![StoryChoice::new("Open it", "garden"), StoryChoice::new("Turn back", "road")]
        );
        assert_eq!(story.get("garden").unwrap().text, "Roses everywhere.");
        assert!(story.get("road").unwrap().is_ending);
        assert_eq!(story.node_count(), 3);
    }

    #[test]
    fn compiled_choice_points_take_labels_and_container_targets() {
        // `Hello.` followed by two bracketed choices, as inklecate writes it.
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": [
                [
                    "^Hello.", "\n",
                    "ev", "str", "^Go left", "/str", "/ev", {"*": "0.c-0", "flg": 20},
                    "ev", "str", "^Go right", "/str", "/ev", {"*": "0.c-1", "flg": 20},
                    {
                        "c-0": ["\n", {"->": "left"}, {"#f": 5}],
                        "c-1": ["\n", {"->": "right"}, {"#f": 5}],
                    },
                ],
                "done",
                {
                    "left": ["^You went left.", "\n", "end", null],
                    "right": ["^You went right.", "\n", "end", null],
                    "#f": 1,
                },
            ],
            "listDefs": {},
        }));
        let story = extraction.story;
        assert_eq!(story.ids().collect::<Vec<_>>(), vec!["fragment_0", "left", "right"]);
        let hello = story.get("fragment_0").unwrap();
        assert_eq!(hello.text, "Hello.");
        assert_eq!(
            hello.choices,
            vec![StoryChoice::new("Go left", "left"), StoryChoice::new("Go right", "right")]
        );
        assert!(hello.metadata.choice_bearing);
        assert!(!hello.is_linear());
        assert!(story.get("left").unwrap().is_ending);
    }

    #[test]
    fn compiled_script_image_directive_starts_fragment() {
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": ["^Before the storm.", "#IMAGE: storm.png", "^Thunder.", "done"],
        }));
        let story = extraction.story;
        assert_eq!(story.node_count(), 2);
        assert_eq!(story.get("fragment_0").unwrap().text, "Before the storm.");
        let storm = story.get("fragment_1").unwrap();
        assert_eq!(storm.metadata.images, vec!["storm.png"]);
        assert_eq!(storm.text, "Thunder.");
    }

    #[test]
    fn compiled_script_top_level_sections() {
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": ["^Opening.", {"->": "epilogue"}],
            "epilogue": ["^The end.", "end"],
            "listDefs": {},
        }));
        let story = extraction.story;
        assert_eq!(
            story.get("fragment_0").unwrap().choices,
            vec![StoryChoice::new("Continue", "epilogue")]
        );
        assert!(story.contains("epilogue"));
        assert!(story.reserved().contains_key("listDefs"));
        assert!(story.reserved().contains_key("inkVersion"));
    }

    #[test]
    fn compiled_script_without_content_gets_placeholder() {
        let extraction = extract_with_defaults(json!({"inkVersion": 21, "root": [["done"]]}));
        let story = extraction.story;
        assert_eq!(story.node_count(), 1);
        let placeholder = story.get("fragment_0").unwrap();
        assert_eq!(placeholder.text, EngineConfig::default().placeholder_text);
        assert!(placeholder.is_ending);
    }

    #[test]
    fn placeholder_links_to_first_section() {
        let extraction = extract_with_defaults(json!({
            "inkVersion": 21,
            "root": [],
            "intro": ["^Hello."],
        }));
        let placeholder = extraction.story.get("fragment_0").unwrap();
        assert_eq!(placeholder.choices, vec![StoryChoice::new("Continue", "intro")]);
        assert_eq!(placeholder.linear_target(), Some("intro"));
    }
}
