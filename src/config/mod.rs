//! Configuration module for Perch.

mod app_config;
mod display;
mod gate;
mod helpers;
mod http_retry;

pub use app_config::{AppConfig, AppConfigError, NatsConfig, StationConfig};
pub use display::{DisplayConfig, DisplayTemplates, TierColors};
pub use gate::{
    BurstConfig, BurstCountMode, CoalescePolicy, GateConfig, GateConfigError, SeasonWindow,
    TierCooldowns, TimeOfDayWindow,
};
pub use helpers::{
    deserialize_duration_from_ms, deserialize_duration_from_seconds,
    deserialize_optional_duration_from_seconds, serialize_duration_to_ms,
    serialize_duration_to_seconds, serialize_optional_duration_to_seconds,
};
pub use http_retry::{HttpRetryConfig, JitterSetting};
