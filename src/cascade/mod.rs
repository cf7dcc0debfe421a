mod engine;
mod rules;

pub use engine::{propagate, CascadeReport};
pub use rules::Firing;
