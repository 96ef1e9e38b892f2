/// Story Linter: reports structure and mapping problems in story documents.
///
/// Usage: story_linter <story.json>... [--config <engine.ron>]

use std::path::Path;
use std::process;

use story_engine::config::EngineConfig;
use story_engine::core::loader::LoadedStory;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("story_engine=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_linter <story.json>... [--config <engine.ron>]");
        process::exit(0);
    }

    let mut files = Vec::new();
    let mut config = EngineConfig::default();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            i += 1;
            config = match EngineConfig::load_from_ron(Path::new(&args[i])) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("ERROR: Failed to load config: {}", e);
                    process::exit(1);
                }
            };
        } else {
            files.push(args[i].clone());
        }
        i += 1;
    }

    let mut total_errors = 0;
    let mut total_warnings = 0;
    for file in &files {
        let (errors, warnings) = lint_file(Path::new(file), &config);
        total_errors += errors;
        total_warnings += warnings;
    }

    println!();
    println!(
        "Linted {} file(s): {} error(s), {} warning(s)",
        files.len(),
        total_errors,
        total_warnings
    );
    if total_errors > 0 {
        process::exit(1);
    }
}

/// Problems found in one loaded story.
#[derive(Debug, Default)]
struct Lint {
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn lint_story(loaded: &LoadedStory) -> Lint {
    let mut lint = Lint::default();

    for edge in loaded.graph.dangling() {
        lint.errors.push(format!(
            "{} choice {} targets missing node '{}'",
            edge.from, edge.choice, edge.target
        ));
    }

    // The issues describe the traversal mapping, before any fallback.
    if loaded.used_fallback {
        lint.errors
            .push("traversal mapping was inconsistent, positional fallback used".to_string());
    }
    for issue in &loaded.mapping_issues {
        lint.errors.push(issue.to_string());
    }

    for id in loaded.graph.dead_ends(&loaded.story) {
        lint.warnings
            .push(format!("'{}' has no choices and is not marked as an ending", id));
    }
    for id in &loaded.orphans {
        lint.warnings.push(format!("'{}' is unreachable from the start", id));
    }
    for (id, node) in loaded.story.nodes() {
        if node.text.trim().is_empty() {
            lint.warnings.push(format!("'{}' has no text", id));
        }
    }
    lint
}

fn lint_file(path: &Path, config: &EngineConfig) -> (usize, usize) {
    println!("== {}", path.display());
    let loaded = match LoadedStory::from_path(path, config) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("  ERROR: {}", e);
            return (1, 0);
        }
    };

    println!("  shape:      {:?}", loaded.shape);
    println!("  nodes:      {}", loaded.story.node_count());
    println!("  reachable:  {}", loaded.reachable);
    println!("  orphans:    {}", loaded.orphan_count());
    println!("  edges:      {}", loaded.graph.edge_count());
    println!("  pages:      {}", loaded.total_pages());

    let lint = lint_story(&loaded);
    for error in &lint.errors {
        println!("  ERROR: {}", error);
    }
    for warning in &lint.warnings {
        println!("  WARN: {}", warning);
    }
    (lint.errors.len(), lint.warnings.len())
}
