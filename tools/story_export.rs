/// Story Export: prints a story document as ink-style source.
///
/// Usage: story_export <story.json> [--config <engine.ron>] [--out <file.ink>]

use std::path::Path;
use std::process;

use story_engine::config::EngineConfig;
use story_engine::core::export::export_ink;
use story_engine::core::loader::LoadedStory;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("story_engine=warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: story_export <story.json> [--config <engine.ron>] [--out <file.ink>]");
        process::exit(0);
    }

    let input = &args[1];
    let mut config = EngineConfig::default();
    let mut out = None;
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config = EngineConfig::load_from_ron(Path::new(&args[i])).unwrap_or_else(|e| {
                    eprintln!("ERROR: Failed to load config: {}", e);
                    process::exit(1);
                });
            }
            "--out" if i + 1 < args.len() => {
                i += 1;
                out = Some(args[i].clone());
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let loaded = LoadedStory::from_path(Path::new(input), &config).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to load story: {}", e);
        process::exit(1);
    });
    let script = export_ink(&loaded.story, &config);

    match out {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, &script) {
                eprintln!("ERROR: Failed to write {}: {}", path, e);
                process::exit(1);
            }
            println!("Wrote {} node(s) to {}", loaded.story.node_count(), path);
        }
        None => print!("{}", script),
    }
}
