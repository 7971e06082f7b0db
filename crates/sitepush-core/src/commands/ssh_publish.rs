//! Publish over a remote shell.

use std::path::PathBuf;

use anyhow::Context;

use crate::config::{Section, Settings};
use crate::publish::PublishSet;
use crate::ssh::SshPublisher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublishPreview {
    pub path: PathBuf,
    pub target: String,
    pub file_count: usize,
    /// Archive left over from an earlier run; it is deleted before packing
    pub stale_archive: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshPublishReport {
    pub target: String,
    pub file_count: usize,
}

#[derive(Debug)]
pub struct SshPublishCommand {
    path: PathBuf,
    publisher: SshPublisher,
    file_count: usize,
}

impl SshPublishCommand {
    pub fn required_sections() -> &'static [Section] {
        &[Section::Path, Section::Ssh]
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let path = settings.publish_path();
        let publisher = SshPublisher::new(path.clone(), settings.ssh()?.clone());
        Ok(Self {
            path,
            publisher,
            file_count: 0,
        })
    }

    pub fn target(&self) -> String {
        self.publisher.target()
    }

    pub fn collect(&mut self) -> anyhow::Result<SshPublishPreview> {
        let mut file_count = 0;
        for entry in PublishSet::new(&self.path) {
            entry.with_context(|| {
                format!("Failed to read publish directory {}", self.path.display())
            })?;
            file_count += 1;
        }
        self.file_count = file_count;

        Ok(SshPublishPreview {
            path: self.path.clone(),
            target: self.publisher.target(),
            file_count,
            stale_archive: self
                .publisher
                .archive_exists()
                .then(|| self.publisher.archive_path()),
        })
    }

    pub async fn execute(&self) -> anyhow::Result<SshPublishReport> {
        self.publisher.remove_stale_archive()?;
        self.publisher.publish().await?;
        Ok(SshPublishReport {
            target: self.publisher.target(),
            file_count: self.file_count,
        })
    }
}
