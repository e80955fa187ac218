//! Parsers turning operator-supplied text into scan tasks.

pub mod targets;

pub use targets::parse_targets;
