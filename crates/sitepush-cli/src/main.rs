//! Sitepush - static site publisher
//!
//! Usage:
//!   sitepush                          # Publish (default)
//!   sitepush publish last-publish-at  # When the live version was published
//!   sitepush remove                   # Remove expired files
//!   sitepush oss-publish              # Upload without removing anything
//!   sitepush ssh-publish              # Publish to a server over ssh
//!   sitepush config                   # Fill in settings

mod interactive;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sitepush_core::commands::{
    PublishCommand, PublishOptions, PublishPreview, PublishProgress, PublishReport,
    RemoveCommand, RemoveReport, RetentionPreview, SshPublishCommand, SshPublishReport,
    format_local,
};
use sitepush_core::config::{Section, Settings, SettingsStore};
use sitepush_core::store::OssStore;

use crate::interactive::InteractiveFlow;

#[derive(Parser)]
#[command(name = "sitepush", version)]
#[command(about = "Publish static sites and expire old files", long_about = None)]
struct Cli {
    /// Config file (defaults to ./sitepush.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Answer yes to every confirmation (for CI/CD)
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Output format of the final report
    #[arg(short = 'o', long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish to the bucket, removing expired files when auto_remove is set
    Publish {
        #[command(subcommand)]
        action: Option<PublishAction>,
    },

    /// Remove files older than the retention window
    #[command(alias = "rm")]
    Remove,

    /// Upload to the bucket without removing anything
    OssPublish,

    /// Publish to a server with tar, scp and ssh
    SshPublish,

    /// Prompt for missing settings and save them
    Config {
        /// Prompt for every setting, not only missing ones
        #[arg(long)]
        all: bool,

        /// Include the ssh settings
        #[arg(long)]
        ssh: bool,
    },

    /// Print the version
    Version,
}

#[derive(Subcommand)]
enum PublishAction {
    /// Print when the live version was published
    #[command(name = "last-publish-at", alias = "lastPublishAt")]
    LastPublishAt,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(log_filter(cli.verbose))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run_cli(cli))
}

fn log_filter(verbose: u8) -> EnvFilter {
    match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sitepush=info,sitepush_core=info".into()),
        1 => "sitepush=debug,sitepush_core=debug".into(),
        _ => "sitepush=trace,sitepush_core=trace".into(),
    }
}

async fn run_cli(cli: Cli) -> Result<()> {
    let settings_store = match cli.config {
        Some(path) => SettingsStore::from_path(path),
        None => SettingsStore::from_cwd()?,
    };
    let mut flow = InteractiveFlow::new(cli.yes);
    let format = cli.format;

    match cli.command.unwrap_or(Commands::Publish { action: None }) {
        Commands::Publish { action: None } => {
            run_publish(&settings_store, &mut flow, format, false).await
        }
        Commands::Publish {
            action: Some(PublishAction::LastPublishAt),
        } => run_last_publish_at(&settings_store, &mut flow, format).await,
        Commands::Remove => run_remove(&settings_store, &mut flow, format).await,
        Commands::OssPublish => run_publish(&settings_store, &mut flow, format, true).await,
        Commands::SshPublish => run_ssh_publish(&settings_store, &mut flow, format).await,
        Commands::Config { all, ssh } => run_config(&settings_store, &mut flow, all, ssh),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load settings, prompting for and saving whatever `sections` still lacks.
fn load_settings(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    sections: &[Section],
) -> Result<Settings> {
    tracing::debug!(path = %settings_store.config_path().display(), "Loading settings");
    let mut settings = settings_store.load()?;
    let filled = flow.complete_settings(&mut settings, sections)?;
    if !filled.is_empty() {
        settings_store.save(&settings)?;
        flow.info(format!(
            "Saved {}",
            settings_store.config_path().display()
        ))?;
    }
    settings.require(sections)?;
    Ok(settings)
}

async fn run_remove(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    format: OutputFormat,
) -> Result<()> {
    let settings = load_settings(settings_store, flow, RemoveCommand::required_sections())?;
    let store = OssStore::new(settings.oss()?)?;
    let mut command = RemoveCommand::from_settings(&store, &settings)?;

    let retention = command.retention().await;
    print_retention(flow, &retention)?;
    let question = format!(
        "Remove files in {} modified before {} (about {} days ago)?",
        style(command.bucket()).red(),
        style(format_local(&retention.expiration_date)).red(),
        retention.duration_days
    );
    if !flow.confirm(&question)? {
        return Ok(());
    }

    if flow.assume_yes() {
        let spinner = spinner("Removing expired files")?;
        let report = command.sweep().await;
        spinner.finish_and_clear();
        return print_remove_report(flow, &report?, format);
    }

    flow.info("Collecting files")?;
    command.collect().await?;
    if command.is_empty() {
        flow.warn("No files to remove")?;
        return Ok(());
    }

    let question = format!(
        "Remove {} files from {}?",
        style(command.file_count()).red(),
        style(command.bucket()).red()
    );
    if !flow.confirm(&question)? {
        return Ok(());
    }

    let bar = progress_bar(command.file_count(), "Removing")?;
    let report = command
        .execute_with_progress(|done, _| bar.set_position(done as u64))
        .await;
    bar.finish_and_clear();
    print_remove_report(flow, &report?, format)
}

async fn run_publish(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    format: OutputFormat,
    upload_only: bool,
) -> Result<()> {
    let settings = load_settings(
        settings_store,
        flow,
        PublishCommand::required_sections(upload_only),
    )?;
    let store = OssStore::new(settings.oss()?)?;
    let options = if upload_only {
        PublishOptions::upload_only(&settings)?
    } else {
        PublishOptions::from_settings(&settings)?.with_stream_removal(flow.assume_yes())
    };
    let path = options.path.clone();
    let mut command = PublishCommand::new(&store, options);

    let question = format!(
        "Publish files in {} to {}?",
        style(path.display()).red(),
        style(store_name(&settings)).red()
    );
    if !flow.confirm(&question)? {
        return Ok(());
    }

    flow.info("Collecting files")?;
    let preview = command.collect().await?;
    if preview.file_count == 0 {
        anyhow::bail!("No files to publish in {}", path.display());
    }
    if let Some(retention) = &preview.retention {
        print_retention(flow, retention)?;
    }
    if !flow.confirm(&publish_question(&preview))? {
        return Ok(());
    }

    flow.info("Uploading website config")?;
    let mut bars = PhaseProgress::default();
    let report = command
        .execute_with_progress(|event| bars.update(event))
        .await;
    bars.finish();
    print_publish_report(flow, &report?, format)
}

fn publish_question(preview: &PublishPreview) -> String {
    let mut question = format!(
        "Publish {} files to {}",
        style(preview.file_count).red(),
        style(&preview.bucket).red()
    );
    if let Some(retention) = &preview.retention {
        let count = match preview.remove_count {
            Some(count) => format!("{} ", style(count).red()),
            None => String::new(),
        };
        question.push_str(&format!(
            " and remove {}files modified before {} (about {} days ago)",
            count,
            style(format_local(&retention.expiration_date)).red(),
            retention.duration_days
        ));
    }
    question.push('?');
    question
}

async fn run_last_publish_at(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    format: OutputFormat,
) -> Result<()> {
    let settings = load_settings(settings_store, flow, &[Section::Oss])?;
    let store = OssStore::new(settings.oss()?)?;
    let mut command = PublishCommand::new(&store, PublishOptions::upload_only(&settings)?);

    let last = command.last_publish_at().await;
    match format {
        OutputFormat::Table => match &last {
            Some(date) => println!("{}", format_local(date)),
            None => println!("none"),
        },
        OutputFormat::Json => {
            let output = serde_json::json!({
                "bucket": store_name(&settings),
                "last_publish_at": last.map(|date| date.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

async fn run_ssh_publish(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    format: OutputFormat,
) -> Result<()> {
    let settings = load_settings(settings_store, flow, SshPublishCommand::required_sections())?;
    let mut command = SshPublishCommand::from_settings(&settings)?;
    let target = command.target();

    let question = format!(
        "Publish files in {} to {}?",
        style(settings.publish_path().display()).red(),
        style(&target).red()
    );
    if !flow.confirm(&question)? {
        return Ok(());
    }

    flow.info("Collecting files")?;
    let preview = command.collect()?;
    if preview.file_count == 0 {
        anyhow::bail!("No files to publish in {}", preview.path.display());
    }
    if let Some(archive) = &preview.stale_archive {
        let question = format!(
            "Archive {} exists and will be deleted. Continue?",
            style(archive.display()).red()
        );
        if !flow.confirm(&question)? {
            return Ok(());
        }
    }

    let question = format!(
        "Publish {} files to {}?",
        style(preview.file_count).red(),
        style(&target).red()
    );
    if !flow.confirm(&question)? {
        return Ok(());
    }

    let spinner = spinner("Compressing, uploading and extracting")?;
    let report = command.execute().await;
    spinner.finish_and_clear();
    print_ssh_report(flow, &report?, format)
}

fn run_config(
    settings_store: &SettingsStore,
    flow: &mut InteractiveFlow,
    all: bool,
    ssh: bool,
) -> Result<()> {
    let mut sections = vec![
        Section::Oss,
        Section::Path,
        Section::Duration,
        Section::AutoRemove,
        Section::SkipPrevious,
    ];
    if ssh {
        sections.push(Section::Ssh);
    }

    let mut settings = settings_store.load()?;
    if all {
        flow.edit_settings(&mut settings, &sections)?;
    } else {
        flow.complete_settings(&mut settings, &sections)?;
    }
    settings.validate()?;
    settings_store.save(&settings)?;

    flow.success(format!(
        "Saved {}",
        settings_store.config_path().display()
    ))?;
    Ok(())
}

fn store_name(settings: &Settings) -> String {
    settings
        .oss
        .as_ref()
        .map(|oss| oss.bucket.clone())
        .unwrap_or_default()
}

fn print_retention(flow: &mut InteractiveFlow, retention: &RetentionPreview) -> Result<()> {
    if !retention.protects_previous() {
        return Ok(());
    }
    if let Some(previous) = &retention.previous_publish {
        flow.info(format!(
            "Previous version published at {} (to the hour)",
            style(format_local(previous)).cyan()
        ))?;
        flow.info("The previous version will be kept")?;
    }
    Ok(())
}

fn print_remove_report(
    flow: &mut InteractiveFlow,
    report: &RemoveReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if report.removed == 0 {
                flow.warn("No files to remove")?;
            } else {
                flow.success(format!(
                    "Removed {} files from {}",
                    report.removed, report.bucket
                ))?;
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "bucket": report.bucket,
                "removed": report.removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_publish_report(
    flow: &mut InteractiveFlow,
    report: &PublishReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            flow.success(format!(
                "Published {} files to {}",
                report.uploaded, report.bucket
            ))?;
            if report.removed > 0 {
                flow.success(format!("Removed {} expired files", report.removed))?;
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "bucket": report.bucket,
                "uploaded": report.uploaded,
                "removed": report.removed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_ssh_report(
    flow: &mut InteractiveFlow,
    report: &SshPublishReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => {
            flow.success(format!(
                "Published {} files to {}",
                report.file_count, report.target
            ))?;
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "target": report.target,
                "uploaded": report.file_count,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn progress_bar(total: usize, label: &'static str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg:>10} {bar:40.cyan/blue} {pos}/{len} ({percent}%)")?
            .progress_chars("█░"),
    );
    bar.set_message(label);
    Ok(bar)
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// One progress bar per publish phase.
#[derive(Default)]
struct PhaseProgress {
    current: Option<(&'static str, ProgressBar)>,
}

impl PhaseProgress {
    fn update(&mut self, event: PublishProgress) {
        let (label, done, total) = match event {
            PublishProgress::Removing { done, total } => ("Removing", done, total),
            PublishProgress::Uploading { done, total } => ("Uploading", done, total),
        };
        if self.current.as_ref().is_none_or(|(current, _)| *current != label) {
            self.finish();
            let bar = progress_bar(total, label).unwrap_or_else(|_| ProgressBar::new(total as u64));
            self.current = Some((label, bar));
        }
        if let Some((_, bar)) = &self.current {
            bar.set_position(done as u64);
        }
    }

    fn finish(&mut self) {
        if let Some((_, bar)) = self.current.take() {
            bar.finish_and_clear();
        }
    }
}
