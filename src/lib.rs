#![warn(missing_docs)]
//! Perch is a notification gate for acoustic species detections. It decides,
//! per detection event, whether to surface a notification on a shared display
//! while suppressing redundant or overwhelming alerts.

pub mod cmd;
pub mod config;
pub mod engine;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod notifier;
pub mod persistence;
pub mod stats;
pub mod supervisor;
pub mod test_helpers;
