//! Settings for publishing and retention
//!
//! Settings live in `sitepush.toml` next to the project. Each command lists
//! the [`Section`]s it depends on; missing required values are reported by
//! [`Settings::missing_fields`] and filled in by the frontend before any
//! remote call is made.

pub mod fields;
pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use fields::{Accessor, DefaultValue, FieldSpec, SCHEMA, ScalarField, Section, ValueKind};
pub use parser::{parse_settings_str, parse_settings_toml, to_toml};
pub use paths::{CONFIG_FILE_NAME, config_path_for_project};
pub use schema::{OssSettings, Settings, SshSettings};
pub use store::SettingsStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{field}`")]
    Missing { field: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: String, reason: String },

    #[error("unknown setting `{0}`")]
    UnknownField(String),
}

impl ConfigError {
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::Missing {
            field: field.into(),
        }
    }
}
