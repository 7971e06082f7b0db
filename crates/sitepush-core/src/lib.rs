//! Sitepush Core Library
//!
//! Publishes a static-site build to an object-storage bucket or a server
//! over a remote shell, and expires files older than a retention window.

pub mod commands;
pub mod config;
pub mod publish;
pub mod retention;
pub mod ssh;
pub mod store;
pub mod sweep;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{
        ConfigError, FieldSpec, OssSettings, ScalarField, Section, Settings, SettingsStore,
        SshSettings,
    };

    // Remote store
    pub use crate::store::{
        ListPage, MemoryStore, ObjectHead, OssStore, RemoteObject, RemoteStore, StoreError,
    };

    // Retention and sweep
    pub use crate::retention::{
        Clock, FixedClock, RetentionPolicy, RetentionSettings, RetentionWindow, SystemClock,
    };
    pub use crate::sweep::{DELETE_BATCH_SIZE, RemovalSweep, SweepResult};

    // Publishing
    pub use crate::publish::{OssPublisher, PublishEntry, PublishSet};
    pub use crate::ssh::SshPublisher;

    // Commands
    pub use crate::commands::{
        PublishCommand, PublishOptions, PublishPreview, PublishProgress, PublishReport,
        RemoveCommand, RemoveReport, RetentionPreview, SshPublishCommand, SshPublishPreview,
        SshPublishReport,
    };
}
