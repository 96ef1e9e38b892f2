pub mod mapping;
pub mod node;
pub mod story;
