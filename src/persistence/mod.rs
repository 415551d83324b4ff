//! Durable storage of the gate state between runs.

pub mod error;
pub mod json_file;
pub mod traits;

pub use json_file::JsonFileStateStore;
