pub mod edit;
pub mod export;
pub mod extract;
pub mod graph;
pub mod loader;
pub mod pager;
pub mod tokens;
pub mod validate;
