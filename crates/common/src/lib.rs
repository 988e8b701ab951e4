//! Small utilities shared by the courier crates.

pub mod error;
pub mod time;

pub use error::FromMessage;
