//! Command-line subcommands other than the long-running gate.

pub mod replay;

pub use replay::ReplayArgs;
