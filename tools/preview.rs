/// Preview: interactive reading shell for story documents.
///
/// Usage: preview <story.json> [--config <engine.ron>] [--id <story-id>]
///
/// Commands:
///   c | continue   follow the linear continuation
///   <n>            take choice n (1-based)
///   back           return to the previous page
///   restart        return to page 1
///   page <n>       jump to page n
///   pages          list the page mapping
///   export         print the story as ink-style source
///   help           list commands
///   quit           exit

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;

use story_engine::config::EngineConfig;
use story_engine::core::export::export_ink;
use story_engine::core::loader::LoadedStory;
use story_engine::nav::session::{NoComments, ReadingSession};
use story_engine::nav::{NavError, NavigationState, StoryNavigator};
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
        print_usage();
        return;
    }

    let story_path = args[1].clone();
    let mut config = EngineConfig::default();
    let mut story_id = None;
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
            "--id" if i + 1 < args.len() => {
                i += 1;
                story_id = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let loaded = LoadedStory::from_path(Path::new(&story_path), &config).unwrap_or_else(|e| {
        eprintln!("ERROR: Failed to load story: {}", e);
        process::exit(1);
    });
    let navigator = StoryNavigator::for_story(&loaded, &config).unwrap_or_else(|e| {
        eprintln!("ERROR: Cannot read story: {}", e);
        process::exit(1);
    });
    let backend = navigator.backend();
    let story_id = story_id.unwrap_or_else(|| story_path.clone());
    let mut session = ReadingSession::new(story_id, navigator, NoComments);

    println!(
        "Loaded {} node(s), {} page(s), {} backend",
        loaded.story.node_count(),
        loaded.total_pages(),
        backend
    );
    println!("Type 'help' for commands.\n");
    print_state(session.state());

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        let result = match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" => {
                print_help();
                continue;
            }
            "pages" => {
                for (page, node) in &loaded.mappings.page_to_node {
                    println!("  {:>3}  {}", page, node);
                }
                continue;
            }
            "export" => {
                print!("{}", export_ink(&loaded.story, &config));
                continue;
            }
            "c" | "continue" => session.cont().map(|_| ()),
            "back" | "b" => session.back().map(|_| ()),
            "restart" => session.restart().map(|_| ()),
            "page" | "p" => match parts.get(1).and_then(|n| n.parse::<u32>().ok()) {
                Some(page) => session.jump_to_page(page).map(|_| ()),
                None => {
                    println!("Usage: page <n>");
                    continue;
                }
            },
            other => match other.parse::<usize>() {
                Ok(n) if n > 0 => session.choose(n - 1).map(|_| ()),
                _ => {
                    println!("Unknown command: {}. Type 'help' for commands.", other);
                    continue;
                }
            },
        };

        match result {
            Ok(()) => print_state(session.state()),
            Err(e) => report(&e),
        }
    }

    let summary = session.summary();
    println!("{}: {} page(s)", summary.story_id, summary.total_pages);
}

fn print_state(state: &NavigationState) {
    println!("--- page {} ({}) ---", state.page, state.node);
    if !state.text.is_empty() {
        println!("{}", state.text);
    }
    println!();
    for (i, choice) in state.choices.iter().enumerate() {
        println!("  [{}] {}", i + 1, choice.text);
    }
    if state.is_ending {
        println!("  (the end)");
    }
    println!();
}

fn report(err: &NavError) {
    println!("  ! {}", err);
}

fn print_usage() {
    println!("Usage: preview <story.json> [--config <engine.ron>] [--id <story-id>]");
}

fn print_help() {
    println!("Commands:");
    println!("  c | continue   Follow the linear continuation");
    println!("  <n>            Take choice n");
    println!("  back           Return to the previous page");
    println!("  restart        Return to page 1");
    println!("  page <n>       Jump to page n");
    println!("  pages          List the page mapping");
    println!("  export         Print the story as ink-style source");
    println!("  help           Show this help");
    println!("  quit           Exit");
}
