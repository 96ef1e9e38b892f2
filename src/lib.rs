//! Story Engine: ingestion, page mapping, and navigation for branching stories.
//!
//! Accepts a named-graph JSON story or a compiled ink-style script, rebuilds
//! it as normalized nodes, assigns stable reader-facing page numbers, and
//! drives a navigation state machine over either a graph or a script runtime.

pub mod config;
pub mod core;
pub mod nav;
pub mod schema;
