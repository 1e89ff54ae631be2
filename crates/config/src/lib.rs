//! Configuration loading, validation, and env substitution.
//!
//! Config files: `courier.toml`, `courier.yaml`, or `courier.json`
//! Searched in `./` then `~/.config/courier/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        AggregationConfig, ChannelConfig, CourierConfig, DeliveryConfig, ReplyConfig,
        ServerConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
