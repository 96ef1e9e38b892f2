/// Token parser: turns one node's raw token stream into a normalized node.
///
/// Grammar elements are recognized by a fixed, ordered table of
/// matcher/processor pairs; the first matching rule consumes the token.
/// Nothing here returns an error: unrecognized structure is skipped and the
/// rest of the stream is still processed.

use serde_json::{json, Map, Value};
use std::borrow::Cow;
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::schema::node::{NodeMetadata, StoryChoice, StoryNode};

/// Divert targets that terminate the story instead of naming a node.
const TERMINAL_TARGETS: &[&str] = &["END", "DONE"];

/// The normalized result of parsing one token stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedNode {
    pub text: String,
    pub choices: Vec<StoryChoice>,
    pub next_node: Option<String>,
    pub is_ending: bool,
    pub metadata: NodeMetadata,
}

impl ParsedNode {
    pub fn into_node(self) -> StoryNode {
        StoryNode {
            text: self.text,
            choices: self.choices,
            is_ending: self.is_ending,
            metadata: self.metadata,
        }
    }
}

/// Kind of marker that opened a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceMarker {
    Plain,
    Sticky,
    Gather,
}

impl ChoiceMarker {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "*" => Some(Self::Plain),
            "+" => Some(Self::Sticky),
            "-" => Some(Self::Gather),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingChoice {
    marker: ChoiceMarker,
    text: String,
    glue: bool,
}

struct ParseState<'a> {
    config: &'a EngineConfig,
    text: String,
    glue: bool,
    choices: Vec<StoryChoice>,
    open: Option<PendingChoice>,
    next_node: Option<String>,
    is_ending: bool,
    metadata: NodeMetadata,
    last_literal: Option<Value>,
}

impl<'a> ParseState<'a> {
    fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            text: String::new(),
            glue: false,
            choices: Vec::new(),
            open: None,
            next_node: None,
            is_ending: false,
            metadata: NodeMetadata::default(),
            last_literal: None,
        }
    }

    fn push_text(&mut self, fragment: &str) {
        if let Some(open) = self.open.as_mut() {
            join_into(&mut open.text, fragment, open.glue);
            open.glue = false;
        } else {
            join_into(&mut self.text, fragment, self.glue);
            self.glue = false;
        }
    }

    fn open_choice(&mut self, marker: ChoiceMarker) {
        self.flush_choice(None);
        self.open = Some(PendingChoice {
            marker,
            text: String::new(),
            glue: false,
        });
    }

    /// Close the open choice, emitting it if it gathered any text.
    fn flush_choice(&mut self, target: Option<String>) {
        let Some(open) = self.open.take() else {
            return;
        };
        let text = open.text.trim();
        if text.is_empty() {
            debug!(marker = ?open.marker, "dropping choice without text");
            return;
        }
        self.choices.push(StoryChoice::new(text, target.unwrap_or_default()));
    }

    fn divert(&mut self, target: &str) {
        if self.open.is_some() {
            self.flush_choice(Some(target.to_string()));
        } else if TERMINAL_TARGETS.contains(&target) {
            self.is_ending = true;
        } else {
            self.next_node = Some(target.to_string());
        }
    }

    fn finish(mut self) -> ParsedNode {
        self.flush_choice(None);
        let mut text = self.text;
        let trimmed_len = text.trim_end_matches([' ', '\n']).len();
        text.truncate(trimmed_len);
        let text = text.trim_start_matches([' ', '\n']).to_string();

        let mut choices = self.choices;
        let mut metadata = self.metadata;
        if choices.is_empty() {
            if let Some(next) = &self.next_node {
                choices.push(StoryChoice::new(self.config.continue_label.clone(), next.clone()));
                metadata.continuation = true;
            }
        }
        ParsedNode {
            text,
            choices,
            next_node: self.next_node,
            is_ending: self.is_ending,
            metadata,
        }
    }
}

fn join_into(buffer: &mut String, fragment: &str, glued: bool) {
    if !glued && !buffer.is_empty() && !buffer.ends_with('\n') && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(fragment);
}

type Matcher = fn(&Value) -> bool;
type Processor = fn(&Value, &mut ParseState<'_>);

struct TokenRule {
    name: &'static str,
    matches: Matcher,
    apply: Processor,
}

/// Recognized grammar elements in priority order.
const RULES: &[TokenRule] = &[
    TokenRule {
        name: "text",
        matches: is_text_token,
        apply: apply_text,
    },
    TokenRule {
        name: "divert",
        matches: is_divert,
        apply: apply_divert,
    },
    TokenRule {
        name: "newline",
        matches: is_newline,
        apply: apply_newline,
    },
    TokenRule {
        name: "end",
        matches: is_end_marker,
        apply: apply_end,
    },
    TokenRule {
        name: "choice_start",
        matches: is_choice_start,
        apply: apply_choice_start,
    },
    TokenRule {
        name: "choice_container",
        matches: is_choice_container,
        apply: apply_choice_container,
    },
    TokenRule {
        name: "tag",
        matches: is_tag,
        apply: apply_tag,
    },
    TokenRule {
        name: "variable",
        matches: is_variable_assignment,
        apply: apply_variable,
    },
    TokenRule {
        name: "glue",
        matches: is_glue,
        apply: apply_glue,
    },
    TokenRule {
        name: "literal",
        matches: is_scalar_literal,
        apply: apply_literal,
    },
];

// Matchers

/// Content of a `^`-prefixed text token.
pub fn text_content(token: &Value) -> Option<&str> {
    token.as_str().and_then(|s| s.strip_prefix('^'))
}

fn is_text_token(token: &Value) -> bool {
    text_content(token).is_some()
}

/// Target of a divert object (`{"->": target}` or `{"divert": target}`).
pub fn divert_target(token: &Value) -> Option<&str> {
    let obj = token.as_object()?;
    obj.get("->")
        .or_else(|| obj.get("divert"))
        .and_then(Value::as_str)
}

fn is_divert(token: &Value) -> bool {
    divert_target(token).is_some()
}

fn is_newline(token: &Value) -> bool {
    token.as_str() == Some("\n")
}

pub fn is_end_marker(token: &Value) -> bool {
    matches!(token.as_str(), Some("end") | Some("done"))
}

pub fn is_choice_start(token: &Value) -> bool {
    match token {
        Value::String(s) => ChoiceMarker::from_token(s).is_some(),
        Value::Object(obj) => obj.contains_key("*"),
        _ => false,
    }
}

fn option_arrays(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    obj.values().find_map(|value| match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_array) => {
            Some(items)
        }
        _ => None,
    })
}

pub fn is_choice_container(token: &Value) -> bool {
    token.as_object().and_then(option_arrays).is_some()
}

/// Content of a tag token (`"#tag"` or `{"#": "tag"}`).
pub fn tag_content(token: &Value) -> Option<&str> {
    match token {
        Value::String(s) => s.strip_prefix('#'),
        Value::Object(obj) => obj.get("#").and_then(Value::as_str),
        _ => None,
    }
}

fn is_tag(token: &Value) -> bool {
    tag_content(token).is_some()
}

fn variable_name(token: &Value) -> Option<&str> {
    let obj = token.as_object()?;
    obj.get("VAR=")
        .or_else(|| obj.get("temp="))
        .and_then(Value::as_str)
}

fn is_variable_assignment(token: &Value) -> bool {
    variable_name(token).is_some()
}

fn is_glue(token: &Value) -> bool {
    token.as_str() == Some("<>")
}

fn is_scalar_literal(token: &Value) -> bool {
    token.is_number() || token.is_boolean()
}

// Processors

fn apply_text(token: &Value, state: &mut ParseState<'_>) {
    let Some(content) = text_content(token) else {
        return;
    };
    let content = content.trim();
    if !content.is_empty() {
        state.push_text(content);
    }
}

fn apply_divert(token: &Value, state: &mut ParseState<'_>) {
    if let Some(target) = divert_target(token) {
        state.divert(target);
    }
}

fn apply_newline(_token: &Value, state: &mut ParseState<'_>) {
    if state.open.is_none() && !state.text.is_empty() {
        let trimmed = state.text.trim_end_matches(' ').len();
        state.text.truncate(trimmed);
        state.text.push('\n');
    }
}

fn apply_end(_token: &Value, state: &mut ParseState<'_>) {
    state.is_ending = true;
}

fn apply_choice_start(token: &Value, state: &mut ParseState<'_>) {
    let marker = token
        .as_str()
        .and_then(ChoiceMarker::from_token)
        .unwrap_or(ChoiceMarker::Plain);
    state.open_choice(marker);
}

fn apply_choice_container(token: &Value, state: &mut ParseState<'_>) {
    state.flush_choice(None);
    let Some(options) = token.as_object().and_then(option_arrays) else {
        return;
    };
    for option in options {
        let Some(text) = first_text(option, state.config.max_depth) else {
            debug!("dropping choice option without text");
            continue;
        };
        let target = first_divert(option, state.config.max_depth).unwrap_or_default();
        state.choices.push(StoryChoice::new(text, target));
    }
}

fn apply_tag(token: &Value, state: &mut ParseState<'_>) {
    let Some(tag) = tag_content(token) else {
        return;
    };
    let tag = tag.trim();
    if !tag.is_empty() {
        state.metadata.tags.push(tag.to_string());
    }
}

fn apply_variable(token: &Value, state: &mut ParseState<'_>) {
    let Some(name) = variable_name(token) else {
        return;
    };
    let value = token
        .get("value")
        .cloned()
        .or_else(|| state.last_literal.take())
        .unwrap_or(Value::Null);
    state.metadata.variables.insert(name.to_string(), value);
}

fn apply_glue(_token: &Value, state: &mut ParseState<'_>) {
    if let Some(open) = state.open.as_mut() {
        open.glue = true;
    } else {
        state.glue = true;
    }
}

fn apply_literal(token: &Value, state: &mut ParseState<'_>) {
    state.last_literal = Some(token.clone());
}

fn first_text(option: &Value, depth: usize) -> Option<String> {
    if depth == 0 {
        return None;
    }
    match option {
        Value::Array(items) => items.iter().find_map(|item| first_text(item, depth - 1)),
        other => text_content(other)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

fn first_divert(option: &Value, depth: usize) -> Option<String> {
    if depth == 0 {
        return None;
    }
    match option {
        Value::Array(items) => items.iter().find_map(|item| first_divert(item, depth - 1)),
        other => divert_target(other).map(str::to_string),
    }
}

/// A compiled ink choice point (`{"*": path, "flg": n}`).
fn is_choice_point(token: &Value) -> bool {
    token.get("*").is_some_and(Value::is_string)
}

/// One compiled choice read out of a token stream.
struct CompiledChoice<'v> {
    label: String,
    /// Path of the choice's content container, ending in its `c-N` name.
    path: &'v str,
    /// Number of stream tokens the choice occupies.
    len: usize,
}

/// Label text inside the `str` ... `/str` spans of an evaluation block.
fn eval_label(tokens: &[Value]) -> String {
    let mut label = String::new();
    let mut in_str = false;
    for token in tokens {
        match token.as_str() {
            Some("str") => in_str = true,
            Some("/str") => in_str = false,
            _ if in_str => {
                if let Some(text) = text_content(token).map(str::trim).filter(|t| !t.is_empty()) {
                    join_into(&mut label, text, false);
                }
            }
            _ => {}
        }
    }
    label
}

/// Read a compiled choice at `items[at]`: an optional `ev` ... `/ev` block
/// holding the label, the choice point, then an optional `{"s": [...]}`
/// start container that carries the label when the block does not.
fn flat_choice_at(items: &[Value], at: usize, max_depth: usize) -> Option<CompiledChoice<'_>> {
    let (mut label, point) = if items.get(at)?.as_str() == Some("ev") {
        let close = at + items[at..].iter().position(|t| t.as_str() == Some("/ev"))?;
        (eval_label(&items[at + 1..close]), close + 1)
    } else {
        (String::new(), at)
    };
    let path = items.get(point)?.get("*")?.as_str()?;
    let mut end = point + 1;
    if let Some(start) = items.get(end).and_then(|t| t.get("s")) {
        if label.is_empty() {
            label = first_text(start, max_depth).unwrap_or_default();
        }
        end += 1;
    }
    Some(CompiledChoice {
        label,
        path,
        len: end - at,
    })
}

/// Like `flat_choice_at`, also accepting a choice wrapped in its own array.
fn choice_at(items: &[Value], at: usize, max_depth: usize) -> Option<CompiledChoice<'_>> {
    if let Some(Value::Array(inner)) = items.get(at) {
        let choice = flat_choice_at(inner, 0, max_depth)?;
        return Some(CompiledChoice { len: 1, ..choice });
    }
    flat_choice_at(items, at, max_depth)
}

/// First divert in a choice container that names a story location. Relative
/// paths and variable diverts are skipped.
fn first_named_divert(content: &Value, depth: usize) -> Option<String> {
    if depth == 0 {
        return None;
    }
    match content {
        Value::Array(items) => items.iter().find_map(|item| first_named_divert(item, depth - 1)),
        other => divert_target(other)
            .filter(|target| !target.starts_with('.') && other.get("var").is_none())
            .map(str::to_string),
    }
}

/// Rewrite compiled ink choice points into the marker form the rules read:
/// one `["*", "^label", {"->": target}, ...]` array per run of choices.
///
/// A point's target is the first named divert inside the `c-N` container
/// its path names, looked up in the stream's trailing named-content object.
/// Containers used this way are dropped from that object. Streams without
/// choice points come back borrowed.
pub fn lower_choice_points(items: &[Value], max_depth: usize) -> Cow<'_, [Value]> {
    let has_points = items.iter().any(|item| match item {
        Value::Array(inner) => inner.iter().any(is_choice_point),
        other => is_choice_point(other),
    });
    if !has_points {
        return Cow::Borrowed(items);
    }

    let named = items.last().and_then(Value::as_object);
    let mut used: Vec<&str> = Vec::new();
    let mut out = Vec::with_capacity(items.len());
    let mut run: Vec<Value> = Vec::new();
    let mut at = 0;
    while at < items.len() {
        let Some(choice) = choice_at(items, at, max_depth) else {
            if !run.is_empty() {
                out.push(Value::Array(std::mem::take(&mut run)));
            }
            out.push(items[at].clone());
            at += 1;
            continue;
        };
        let key = choice.path.rsplit('.').next().unwrap_or(choice.path);
        let content = named.and_then(|named| named.get(key));
        if content.is_some() {
            used.push(key);
        }
        run.push(Value::from("*"));
        if !choice.label.is_empty() {
            run.push(Value::String(format!("^{}", choice.label)));
        }
        match content.and_then(|content| first_named_divert(content, max_depth)) {
            Some(target) => run.push(json!({ "->": target })),
            None => debug!(path = choice.path, "choice point without a named target"),
        }
        at += choice.len;
    }
    if !run.is_empty() {
        out.push(Value::Array(run));
    }
    if let Some(Value::Object(trailing)) = out.last_mut() {
        trailing.retain(|key, _| !used.contains(&key.as_str()));
    }
    Cow::Owned(out)
}

fn process(token: &Value, state: &mut ParseState<'_>, depth: usize) {
    if let Some(rule) = RULES.iter().find(|rule| (rule.matches)(token)) {
        trace!(rule = rule.name, "token matched");
        (rule.apply)(token, state);
        return;
    }
    if depth >= state.config.max_depth {
        debug!(depth, "token nesting too deep, skipping");
        return;
    }
    match token {
        Value::Array(items) => {
            for item in lower_choice_points(items, state.config.max_depth).iter() {
                process(item, state, depth + 1);
            }
        }
        Value::Object(obj) => scan_object(obj, state, depth + 1),
        other => debug!(token = %other, "skipping unrecognized token"),
    }
}

/// Key-by-key scan of an object no rule matched.
fn scan_object(obj: &Map<String, Value>, state: &mut ParseState<'_>, depth: usize) {
    for (key, value) in obj {
        if let Some(label) = key.strip_prefix('^') {
            let label = label.trim();
            let target = divert_target(value).or_else(|| value.as_str());
            if let Some(target) = target.filter(|_| !label.is_empty()) {
                state.flush_choice(None);
                state.choices.push(StoryChoice::new(label, target));
                continue;
            }
        }
        if !(value.is_array() || value.is_object()) {
            continue;
        }
        // Structured values are treated as nested choice content.
        let mut nested = ParseState::new(state.config);
        process(value, &mut nested, depth);
        nested.flush_choice(None);
        let nested_text = nested.text.trim().to_string();
        if !nested_text.is_empty() {
            let target = nested.next_node.clone().unwrap_or_default();
            state.choices.push(StoryChoice::new(nested_text, target));
        }
        state.choices.append(&mut nested.choices);
        state.metadata.absorb(nested.metadata);
    }
}

/// Parse a raw token stream (usually an array) into a normalized node.
pub fn parse_tokens(tokens: &Value, config: &EngineConfig) -> ParsedNode {
    let mut state = ParseState::new(config);
    match tokens {
        Value::Array(items) => {
            for item in lower_choice_points(items, config.max_depth).iter() {
                process(item, &mut state, 1);
            }
        }
        other => process(other, &mut state, 1),
    }
    state.finish()
}

/// Returns true if `value` is a `{text, choices}` node object.
pub fn is_node_object(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("text") || obj.contains_key("choices"))
}


/// Normalize any accepted node representation into a `StoryNode`.
///
/// Accepts a `{text, choices, isEnding}` object (where `text` may itself be
/// a token stream and choices may use `target`/`divert` for `nextNode`) or
/// a bare token stream. Returns `None` for values that are not nodes.
pub fn normalize_node(value: &Value, config: &EngineConfig) -> Option<StoryNode> {
    let obj = match value {
        Value::Array(_) => return Some(parse_tokens(value, config).into_node()),
        Value::Object(obj) if is_node_object(value) => obj,
        _ => return None,
    };

    let mut node = match obj.get("text") {
        Some(Value::String(text)) => StoryNode::new(text.clone()),
        Some(tokens @ Value::Array(_)) => parse_tokens(tokens, config).into_node(),
        _ => StoryNode::default(),
    };

    if let Some(Value::Array(choices)) = obj.get("choices") {
        let explicit: Vec<StoryChoice> = choices.iter().filter_map(normalize_choice).collect();
        // Explicit choices replace any synthesized continuation from `text`.
        if !explicit.is_empty() || node.is_linear() {
            // A lone choice wearing the continue label is how named graphs
            // spell a linear link.
            node.metadata.continuation =
                matches!(explicit.as_slice(), [only] if only.text == config.continue_label);
            node.choices = explicit;
        }
    }
    if obj.get("isEnding").and_then(Value::as_bool) == Some(true) {
        node.is_ending = true;
    }
    if let Some(metadata) = obj.get("metadata") {
        match serde_json::from_value::<NodeMetadata>(metadata.clone()) {
            Ok(parsed) => {
                let continuation = parsed.continuation;
                node.metadata.absorb(parsed);
                node.metadata.continuation |= continuation && node.choices.len() == 1;
            }
            Err(e) => debug!(error = %e, "ignoring malformed node metadata"),
        }
    }
    Some(node)
}

fn normalize_choice(value: &Value) -> Option<StoryChoice> {
    let obj = value.as_object()?;
    let text = obj.get("text").and_then(Value::as_str).unwrap_or_default();
    let target = ["nextNode", "target", "divert"]
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str))
        .unwrap_or_default();
    Some(StoryChoice::new(text, target))
}
