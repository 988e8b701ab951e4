//! Configuration loading, validation, and env substitution.
//!
//! Config files: `courier.toml`, `courier.yaml`, or `courier.json`
//! Searched in `./` then `~/.config/courier/` (or only in the directory set
//! with [`set_config_dir`]).
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, database_url, discover_and_load,
        find_config_file, load_config, set_config_dir, set_data_dir,
    },
    schema::{
        CourierConfig, DatabaseConfig, MessagesConfig, ServerConfig, WebhookConfig,
        WhatsAppConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
