/// Script export: renders a story back to ink-style source text.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::fmt::Write;

use crate::config::EngineConfig;
use crate::core::pager::determine_start;
use crate::schema::story::CustomStory;

/// Turn a node id into a valid ink identifier.
fn sanitize_identifier(id: &str) -> String {
    let mut ident: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert_str(0, "knot_");
    }
    ident
}

/// Knot names for every node, made unique in declaration order.
fn knot_names(story: &CustomStory) -> IndexMap<&str, String> {
    let mut taken: FxHashSet<String> = FxHashSet::default();
    let mut names = IndexMap::with_capacity(story.node_count());
    for id in story.ids() {
        let base = sanitize_identifier(id);
        let mut name = base.clone();
        let mut suffix = 2;
        while !taken.insert(name.clone()) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        names.insert(id, name);
    }
    names
}

fn ink_literal(value: &Value) -> Option<String> {
    match value {
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("\"{}\"", s.replace('"', "\\\""))),
        _ => None,
    }
}

/// Render `story` as an ink-style script. Node text is written verbatim.
pub fn export_ink(story: &CustomStory, config: &EngineConfig) -> String {
    let names = knot_names(story);
    let target_name = |target: &str| -> String {
        names
            .get(target)
            .cloned()
            .unwrap_or_else(|| sanitize_identifier(target))
    };
    let mut out = String::new();

    let mut declared: FxHashSet<&str> = FxHashSet::default();
    for (_, node) in story.nodes() {
        for (name, value) in &node.metadata.variables {
            if let Some(literal) = ink_literal(value) {
                if declared.insert(name.as_str()) {
                    let _ = writeln!(out, "VAR {} = {}", name, literal);
                }
            }
        }
    }
    if !declared.is_empty() {
        out.push('\n');
    }

    if let Some(start) = determine_start(story, config) {
        let _ = writeln!(out, "-> {}\n", target_name(&start));
    }

    for (id, node) in story.nodes() {
        let _ = writeln!(out, "=== {} ===", target_name(id));
        for tag in &node.metadata.tags {
            let _ = writeln!(out, "# {}", tag);
        }
        for image in &node.metadata.images {
            let _ = writeln!(out, "# IMAGE: {}", image);
        }
        for (name, value) in &node.metadata.variables {
            if let Some(literal) = ink_literal(value) {
                let _ = writeln!(out, "~ {} = {}", name, literal);
            }
        }
        if !node.text.is_empty() {
            out.push_str(&node.text);
            out.push('\n');
        }
        if let Some(next) = node.linear_target() {
            let _ = writeln!(out, "-> {}", target_name(next));
        } else if !node.choices.is_empty() {
            for choice in &node.choices {
                let target = if choice.next_node.is_empty() {
                    "DONE".to_string()
                } else {
                    target_name(&choice.next_node)
                };
                let _ = writeln!(out, "* [{}] -> {}", choice.text, target);
            }
        } else if node.is_ending {
            out.push_str("-> END\n");
        } else {
            out.push_str("-> DONE\n");
        }
        out.push('\n');
    }
    out
}
