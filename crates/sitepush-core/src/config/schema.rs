//! Configuration schema for sitepush.toml
//!
//! ```toml
//! path = "/home/me/site/dist"
//! duration = 15552000
//! auto_remove = false
//! skip_previous = true
//!
//! [oss]
//! region = "oss-cn-hangzhou"
//! bucket = "my-site"
//! access_key_id = "..."
//! access_key_secret = "..."
//! index_page = "index.html"
//! error_page = "index.html"
//!
//! [ssh]
//! host = "example.com"
//! username = "deploy"
//! private_key = "~/.ssh/id_ed25519"
//! target_path = "/var/www/site"
//! ```
//!
//! Required values may be absent on disk; [`Settings::missing_fields`] reports
//! them so the frontend can prompt and save the completed file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use super::fields::{FieldSpec, ScalarField, Section};
use super::paths::{default_publish_dir, expand_home};

pub const DEFAULT_REGION: &str = "oss-cn-hangzhou";
pub const DEFAULT_ENTRY_PAGE: &str = "index.html";
/// 180 days
pub const DEFAULT_DURATION_SECS: u64 = 15_552_000;
pub const DEFAULT_SSH_PORT: u16 = 22;
/// 100 years
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 86_400;

/// Root configuration structure for sitepush.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Local directory to publish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Retention window in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Sweep expired files before each publish
    #[serde(default)]
    pub auto_remove: bool,

    /// Anchor the retention window at the previous publish
    #[serde(default = "default_skip_previous")]
    pub skip_previous: bool,

    /// Object storage target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oss: Option<OssSettings>,

    /// Remote shell target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            path: None,
            duration: None,
            auto_remove: false,
            skip_previous: default_skip_previous(),
            oss: None,
            ssh: None,
        }
    }
}

fn default_skip_previous() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OssSettings {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub access_key_secret: String,

    /// Overrides the derived `https://<bucket>.<region>.aliyuncs.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_entry_page")]
    pub index_page: String,

    #[serde(default = "default_entry_page")]
    pub error_page: String,
}

impl Default for OssSettings {
    fn default() -> Self {
        Self {
            region: default_region(),
            bucket: String::new(),
            access_key_id: String::new(),
            access_key_secret: String::new(),
            endpoint: None,
            index_page: default_entry_page(),
            error_page: default_entry_page(),
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_entry_page() -> String {
    DEFAULT_ENTRY_PAGE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    /// Path to the private key; `~` expands to the home directory
    #[serde(default)]
    pub private_key: String,

    /// Directory on the server the site is extracted into
    #[serde(default)]
    pub target_path: String,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: String::new(),
            private_key: String::new(),
            target_path: String::new(),
        }
    }
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl SshSettings {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    /// `user@host:/target/path`, the scp upload target
    pub fn target(&self) -> String {
        format!("{}:{}", self.destination(), self.target_path)
    }

    pub fn private_key_path(&self) -> PathBuf {
        expand_home(&self.private_key)
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oss(&self) -> Result<&OssSettings, ConfigError> {
        self.oss.as_ref().ok_or_else(|| ConfigError::missing("oss"))
    }

    pub fn ssh(&self) -> Result<&SshSettings, ConfigError> {
        self.ssh.as_ref().ok_or_else(|| ConfigError::missing("ssh"))
    }

    /// Directory to publish, `<cwd>/dist` when unset.
    pub fn publish_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_publish_dir)
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration.unwrap_or(DEFAULT_DURATION_SECS)
    }

    pub fn duration_ms(&self) -> i64 {
        i64::try_from(self.duration_secs())
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// Current value of a field as it would be shown in a prompt.
    ///
    /// Empty strings and absent groups count as unset.
    pub fn value_of(&self, key: &str) -> Option<String> {
        FieldSpec::scalar(key)?.value_in(self)
    }

    /// Parse `raw` according to the field's kind and store it.
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        FieldSpec::scalar(key)
            .ok_or_else(|| ConfigError::UnknownField(key.to_string()))?
            .store_in(self, raw)
    }

    /// Required fields of `sections` that have no value yet, in schema order.
    pub fn missing_fields(&self, sections: &[Section]) -> Vec<&'static ScalarField> {
        sections
            .iter()
            .filter_map(|section| FieldSpec::find(section.key()))
            .flat_map(FieldSpec::scalars)
            .filter(|field| field.required && field.value_in(self).is_none())
            .collect()
    }

    /// Fail with the first missing required field of `sections`.
    pub fn require(&self, sections: &[Section]) -> Result<(), ConfigError> {
        match self.missing_fields(sections).first() {
            Some(field) => Err(ConfigError::missing(field.key)),
            None => self.validate(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(duration) = self.duration {
            check_duration(duration)?;
        }
        if let Some(oss) = &self.oss {
            for (field, value) in [("oss.index_page", &oss.index_page), ("oss.error_page", &oss.error_page)] {
                if value.starts_with('/') {
                    return Err(ConfigError::Invalid {
                        field: field.to_string(),
                        reason: "object keys must not start with '/'".to_string(),
                    });
                }
            }
        }
        if self.ssh.as_ref().is_some_and(|ssh| ssh.port == 0) {
            return Err(ConfigError::Invalid {
                field: "ssh.port".to_string(),
                reason: "port must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// A retention window of `secs` seconds, if it is within bounds.
pub(crate) fn check_duration(secs: u64) -> Result<u64, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            field: "duration".to_string(),
            reason: "retention window must be greater than zero".to_string(),
        });
    }
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            field: "duration".to_string(),
            reason: format!("retention window must be at most {} seconds (100 years)", MAX_DURATION_SECS),
        });
    }
    Ok(secs)
}
