//! The decision engine: rarity classification, cooldowns, burst protection,
//! first-of-year and milestone tracking, and the orchestrator combining them.

pub mod burst;
pub mod cooldown;
pub mod dedup;
pub mod orchestrator;
pub mod rarity;
pub mod tracker;
