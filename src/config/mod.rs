//! Configuration module for the weibo-harvester.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Mode, format and media filter parsing with legacy aliases
//! - Configuration validation

pub mod loader;
pub mod modes;
pub mod validation;

pub use loader::{
    normalize_targets, AccountConfig, CommentConfig, ConcurrencyConfig, Config, DelayConfig,
    DelayRange, LimitsConfig, MediaConfig, OutputConfig, ProfileConfig, RunConfig, TargetConfig,
};
pub use modes::{output_group, resolve_modes, MediaTypeFilter, SaveFormat, SourceMode};
pub use validation::{validate_config, validate_delay_range};
