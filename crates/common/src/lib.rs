//! Small utilities shared across parabox crates.

pub mod time;
