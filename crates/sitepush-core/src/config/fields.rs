//! Field descriptors for interactive completion of sitepush.toml.
//!
//! Every top-level setting is either a scalar or a group of scalars. Commands
//! declare which [`Section`]s they need; the frontend walks the descriptors of
//! those sections to prompt for whatever is missing.

use std::path::PathBuf;

use super::ConfigError;
use super::paths::default_publish_dir;
use super::schema::{
    DEFAULT_DURATION_SECS, DEFAULT_ENTRY_PAGE, DEFAULT_REGION, DEFAULT_SSH_PORT, Settings,
    check_duration,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Integer,
    Bool,
}

/// Default suggested when prompting.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    None,
    Text(&'static str),
    Integer(u64),
    Bool(bool),
    /// Computed at prompt time (e.g. relative to the working directory)
    Computed(fn() -> String),
}

impl DefaultValue {
    pub fn resolve(&self) -> Option<String> {
        match self {
            DefaultValue::None => None,
            DefaultValue::Text(text) => Some((*text).to_string()),
            DefaultValue::Integer(value) => Some(value.to_string()),
            DefaultValue::Bool(value) => Some(value.to_string()),
            DefaultValue::Computed(compute) => Some(compute()),
        }
    }
}

/// Typed read/write access to the [`Settings`] field behind a descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Accessor {
    pub get: fn(&Settings) -> Option<String>,
    /// Receives the trimmed raw input
    pub set: fn(&mut Settings, &str) -> Result<(), ConfigError>,
}

/// Accessor for a `String` field of the `oss` or `ssh` group; writing creates
/// the group with its defaults.
macro_rules! group_text {
    ($group:ident . $field:ident) => {
        Accessor {
            get: |settings: &Settings| settings.$group.as_ref().map(|group| group.$field.clone()),
            set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
                settings.$group.get_or_insert_with(Default::default).$field = raw.to_string();
                Ok(())
            },
        }
    };
}

const PATH: Accessor = Accessor {
    get: |settings: &Settings| settings.path.as_ref().map(|path| path.display().to_string()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        settings.path = Some(PathBuf::from(raw));
        Ok(())
    },
};

const DURATION: Accessor = Accessor {
    get: |settings: &Settings| settings.duration.map(|secs| secs.to_string()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        settings.duration = Some(check_duration(parse_whole("duration", raw)?)?);
        Ok(())
    },
};

const AUTO_REMOVE: Accessor = Accessor {
    get: |settings: &Settings| Some(settings.auto_remove.to_string()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        settings.auto_remove = parse_flag("auto_remove", raw)?;
        Ok(())
    },
};

const SKIP_PREVIOUS: Accessor = Accessor {
    get: |settings: &Settings| Some(settings.skip_previous.to_string()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        settings.skip_previous = parse_flag("skip_previous", raw)?;
        Ok(())
    },
};

const OSS_ENDPOINT: Accessor = Accessor {
    get: |settings: &Settings| settings.oss.as_ref().and_then(|oss| oss.endpoint.clone()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        settings.oss.get_or_insert_with(Default::default).endpoint =
            Some(raw.to_string()).filter(|endpoint| !endpoint.is_empty());
        Ok(())
    },
};

const SSH_PORT: Accessor = Accessor {
    get: |settings: &Settings| settings.ssh.as_ref().map(|ssh| ssh.port.to_string()),
    set: |settings: &mut Settings, raw: &str| -> Result<(), ConfigError> {
        let value = parse_whole("ssh.port", raw)?;
        settings.ssh.get_or_insert_with(Default::default).port =
            u16::try_from(value).map_err(|_| ConfigError::Invalid {
                field: "ssh.port".to_string(),
                reason: format!("{} is not a valid port", value),
            })?;
        Ok(())
    },
};

fn parse_whole(field: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("'{}' is not a whole number", raw),
    })
}

fn parse_flag(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Ok(true),
        "n" | "no" | "false" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("'{}' is not yes/no", raw),
        }),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScalarField {
    /// Dotted key, e.g. `oss.bucket`
    pub key: &'static str,
    pub description: &'static str,
    pub kind: ValueKind,
    pub required: bool,
    pub default: DefaultValue,
    /// Mask input when prompting
    pub secret: bool,
    pub access: Accessor,
}

impl ScalarField {
    const fn new(key: &'static str, description: &'static str, access: Accessor) -> Self {
        Self {
            key,
            description,
            kind: ValueKind::Text,
            required: true,
            default: DefaultValue::None,
            secret: false,
            access,
        }
    }

    /// Current value, with empty strings and absent groups counting as unset.
    pub fn value_in(&self, settings: &Settings) -> Option<String> {
        (self.access.get)(settings).filter(|value| !value.trim().is_empty())
    }

    /// Parse `raw` according to this field's kind and store it.
    pub fn store_in(&self, settings: &mut Settings, raw: &str) -> Result<(), ConfigError> {
        (self.access.set)(settings, raw.trim())
    }

    const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    const fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    const fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldSpec {
    Scalar(ScalarField),
    Group {
        key: &'static str,
        description: &'static str,
        children: &'static [ScalarField],
    },
}

/// Top-level settings a command can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Oss,
    Ssh,
    Path,
    Duration,
    AutoRemove,
    SkipPrevious,
}

impl Section {
    pub fn key(self) -> &'static str {
        match self {
            Section::Oss => "oss",
            Section::Ssh => "ssh",
            Section::Path => "path",
            Section::Duration => "duration",
            Section::AutoRemove => "auto_remove",
            Section::SkipPrevious => "skip_previous",
        }
    }
}

fn publish_dir_default() -> String {
    default_publish_dir().display().to_string()
}

const OSS_FIELDS: &[ScalarField] = &[
    ScalarField::new("oss.region", "OSS region", group_text!(oss.region)).with_default(DefaultValue::Text(DEFAULT_REGION)),
    ScalarField::new("oss.bucket", "OSS bucket", group_text!(oss.bucket)),
    ScalarField::new("oss.access_key_id", "OSS access key id", group_text!(oss.access_key_id)),
    ScalarField::new(
        "oss.access_key_secret",
        "OSS access key secret",
        group_text!(oss.access_key_secret),
    ).secret(),
    ScalarField::new("oss.endpoint", "OSS endpoint override", OSS_ENDPOINT).optional(),
    ScalarField::new("oss.index_page", "Index page", group_text!(oss.index_page))
        .with_default(DefaultValue::Text(DEFAULT_ENTRY_PAGE)),
    ScalarField::new("oss.error_page", "Error page", group_text!(oss.error_page))
        .with_default(DefaultValue::Text(DEFAULT_ENTRY_PAGE)),
];

const SSH_FIELDS: &[ScalarField] = &[
    ScalarField::new("ssh.host", "SSH host", group_text!(ssh.host)),
    ScalarField::new("ssh.port", "SSH port", SSH_PORT)
        .kind(ValueKind::Integer)
        .with_default(DefaultValue::Integer(DEFAULT_SSH_PORT as u64))
        .optional(),
    ScalarField::new("ssh.username", "SSH username", group_text!(ssh.username)),
    ScalarField::new("ssh.private_key", "SSH private key path", group_text!(ssh.private_key))
        .with_default(DefaultValue::Text("~/.ssh/id_rsa")),
    ScalarField::new(
        "ssh.target_path",
        "Target directory on the server",
        group_text!(ssh.target_path),
    ),
];

/// The whole settings schema, in prompt order.
pub const SCHEMA: &[FieldSpec] = &[
    FieldSpec::Group {
        key: "oss",
        description: "Object storage target",
        children: OSS_FIELDS,
    },
    FieldSpec::Group {
        key: "ssh",
        description: "Remote shell target",
        children: SSH_FIELDS,
    },
    FieldSpec::Scalar(
        ScalarField::new("path", "Directory to publish", PATH)
            .with_default(DefaultValue::Computed(publish_dir_default)),
    ),
    FieldSpec::Scalar(
        ScalarField::new("duration", "Retention window in seconds", DURATION)
            .kind(ValueKind::Integer)
            .with_default(DefaultValue::Integer(DEFAULT_DURATION_SECS)),
    ),
    FieldSpec::Scalar(
        ScalarField::new(
            "auto_remove",
            "Remove expired files before publishing",
            AUTO_REMOVE,
        )
            .kind(ValueKind::Bool)
            .with_default(DefaultValue::Bool(false))
            .optional(),
    ),
    FieldSpec::Scalar(
        ScalarField::new(
            "skip_previous",
            "Keep the previously published version",
            SKIP_PREVIOUS,
        )
            .kind(ValueKind::Bool)
            .with_default(DefaultValue::Bool(true))
            .optional(),
    ),
];

impl FieldSpec {
    pub fn key(&self) -> &'static str {
        match self {
            FieldSpec::Scalar(field) => field.key,
            FieldSpec::Group { key, .. } => *key,
        }
    }

    /// Look up a top-level entry by key.
    pub fn find(key: &str) -> Option<&'static FieldSpec> {
        SCHEMA.iter().find(|spec| spec.key() == key)
    }

    /// Look up a scalar anywhere in the schema by dotted key.
    pub fn scalar(key: &str) -> Option<&'static ScalarField> {
        SCHEMA.iter().flat_map(FieldSpec::scalars).find(|f| f.key == key)
    }

    /// The scalar itself, or a group's children.
    pub fn scalars(&'static self) -> &'static [ScalarField] {
        match self {
            FieldSpec::Scalar(field) => std::slice::from_ref(field),
            FieldSpec::Group { children, .. } => children,
        }
    }
}
