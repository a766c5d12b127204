pub mod commands;
pub mod engine;
pub mod queue;
pub mod sink;
pub mod source;

pub use engine::Player;
