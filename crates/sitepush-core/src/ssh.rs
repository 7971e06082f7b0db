//! Publish over a remote shell.
//!
//! The publish directory is packed with `tar`, copied with `scp` and unpacked
//! on the server with `ssh`. The archive is written next to the publish
//! directory, never inside it.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::process::Command;

use crate::config::SshSettings;

pub const ARCHIVE_NAME: &str = "compressed_dist.tar.gz";

/// An external command, kept as data until it is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: &'static str,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandLine {
    fn new(program: &'static str) -> Self {
        Self {
            program,
            args: Vec::new(),
            current_dir: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    fn current_dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Run to completion; a non-zero exit is an error carrying stderr.
    pub async fn run(&self) -> anyhow::Result<String> {
        let mut command = Command::new(self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        tracing::debug!(command = %self, "running");

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to invoke {}", self.program))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            anyhow::bail!("{} failed ({}): {}", self.program, output.status, stderr.trim());
        }
        if !stderr.trim().is_empty() {
            tracing::warn!(program = self.program, stderr = %stderr.trim(), "command wrote to stderr");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote a word for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@,%=~".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Unpack `archive` into `target` and remove it. The archive is removed even
/// when unpacking fails; the exit status is still tar's.
pub fn extract_script(archive: &str, target: &str) -> String {
    let archive = shell_quote(archive);
    format!(
        "tar -xzf {archive} -C {}; rc=$?; rm -f {archive}; exit $rc",
        shell_quote(target)
    )
}

#[derive(Debug, Clone)]
pub struct SshPublisher {
    publish_path: PathBuf,
    settings: SshSettings,
}

impl SshPublisher {
    pub fn new(publish_path: impl Into<PathBuf>, settings: SshSettings) -> Self {
        Self {
            publish_path: publish_path.into(),
            settings,
        }
    }

    pub fn target(&self) -> String {
        self.settings.target()
    }

    /// `<publish dir>/../compressed_dist.tar.gz`, absolute.
    pub fn archive_path(&self) -> PathBuf {
        let publish_path = std::path::absolute(&self.publish_path)
            .unwrap_or_else(|_| self.publish_path.clone());
        publish_path
            .parent()
            .unwrap_or(&publish_path)
            .join(ARCHIVE_NAME)
    }

    pub fn remote_archive_path(&self) -> String {
        format!(
            "{}/{}",
            self.settings.target_path.trim_end_matches('/'),
            ARCHIVE_NAME
        )
    }

    pub fn archive_exists(&self) -> bool {
        self.archive_path().exists()
    }

    /// Remove an archive left over from an interrupted run.
    pub fn remove_stale_archive(&self) -> anyhow::Result<()> {
        let archive = self.archive_path();
        if archive.exists() {
            std::fs::remove_file(&archive)
                .with_context(|| format!("Failed to remove {}", archive.display()))?;
            tracing::debug!(archive = %archive.display(), "removed stale archive");
        }
        Ok(())
    }

    pub fn compress_command(&self) -> CommandLine {
        CommandLine::new("tar")
            .arg("-czf")
            .path_arg(&self.archive_path())
            .arg("./")
            .current_dir(&self.publish_path)
    }

    pub fn upload_command(&self) -> CommandLine {
        CommandLine::new("scp")
            .arg("-i")
            .path_arg(&self.settings.private_key_path())
            .arg("-P")
            .arg(self.settings.port.to_string())
            .path_arg(&self.archive_path())
            .arg(self.settings.target())
    }

    pub fn extract_command(&self) -> CommandLine {
        let script = extract_script(&self.remote_archive_path(), &self.settings.target_path);
        CommandLine::new("ssh")
            .arg("-i")
            .path_arg(&self.settings.private_key_path())
            .arg("-p")
            .arg(self.settings.port.to_string())
            .arg(self.settings.destination())
            .arg(script)
    }

    pub async fn compress(&self) -> anyhow::Result<()> {
        self.compress_command()
            .run()
            .await
            .context("Failed to compress publish directory")?;
        let archive = self.archive_path();
        if !archive.exists() {
            anyhow::bail!("Archive was not created: {}", archive.display());
        }
        Ok(())
    }

    /// Copy the archive to the server, then drop the local copy.
    pub async fn upload(&self) -> anyhow::Result<()> {
        self.upload_command()
            .run()
            .await
            .with_context(|| format!("Failed to copy archive to {}", self.target()))?;
        self.remove_stale_archive()
    }

    pub async fn extract(&self) -> anyhow::Result<()> {
        let output = self
            .extract_command()
            .run()
            .await
            .with_context(|| format!("Failed to extract archive on {}", self.settings.host))?;
        if !output.trim().is_empty() {
            tracing::info!(output = %output.trim(), "remote output");
        }
        Ok(())
    }

    /// Compress, upload and extract. Expects no stale archive.
    pub async fn publish(&self) -> anyhow::Result<()> {
        tracing::info!(target = %self.target(), "compressing");
        self.compress().await?;
        tracing::info!(target = %self.target(), "uploading archive");
        self.upload().await?;
        tracing::info!(target = %self.target(), "extracting archive");
        self.extract().await
    }
}
