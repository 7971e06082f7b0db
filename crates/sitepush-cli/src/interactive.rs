//! Interactive prompts for confirmations and settings completion.
//!
//! Uses dialoguer for terminal UI prompts. With `--yes` every confirmation is
//! accepted and every missing setting takes its default, so a run can go
//! through without a terminal as long as no setting lacks one.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Input, Password, theme::ColorfulTheme};

use sitepush_core::config::{ConfigError, FieldSpec, ScalarField, Section, Settings, ValueKind};

/// Interactive flow shared by every command.
pub struct InteractiveFlow<W: Write = io::Stdout> {
    /// Answer yes to everything
    yes: bool,
    /// Output writer (for testing)
    writer: W,
    /// Theme for dialoguer prompts
    theme: ColorfulTheme,
}

impl InteractiveFlow<io::Stdout> {
    pub fn new(yes: bool) -> Self {
        Self {
            yes,
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> InteractiveFlow<W> {
    /// Create a new interactive flow with custom writer (for testing).
    #[cfg(test)]
    pub fn with_writer(yes: bool, writer: W) -> Self {
        Self {
            yes,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    pub fn assume_yes(&self) -> bool {
        self.yes
    }

    /// Ask a yes/no question; the default answer is no.
    pub fn confirm(&mut self, question: &str) -> Result<bool> {
        if self.yes {
            writeln!(self.writer, "{} {}", question, style("yes").green())?;
            return Ok(true);
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(question)
            .default(false)
            .interact()?;

        Ok(confirmed)
    }

    /// Prompt for the required settings of `sections` that have no value.
    ///
    /// Returns the keys that were filled in.
    pub fn complete_settings(
        &mut self,
        settings: &mut Settings,
        sections: &[Section],
    ) -> Result<Vec<&'static str>> {
        let missing = settings.missing_fields(sections);
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        self.print_header("Missing settings")?;
        let mut filled = Vec::with_capacity(missing.len());
        for field in missing {
            let value = self.prompt_field(field, None)?;
            settings.set_value(field.key, &value)?;
            filled.push(field.key);
        }
        Ok(filled)
    }

    /// Prompt for every setting of `sections`, offering current values as defaults.
    pub fn edit_settings(&mut self, settings: &mut Settings, sections: &[Section]) -> Result<()> {
        self.print_header("Settings")?;
        let fields = sections
            .iter()
            .filter_map(|section| FieldSpec::find(section.key()))
            .flat_map(FieldSpec::scalars);
        for field in fields {
            let current = settings.value_of(field.key);
            let value = self.prompt_field(field, current)?;
            if !value.is_empty() {
                settings.set_value(field.key, &value)?;
            }
        }
        Ok(())
    }

    fn prompt_field(&mut self, field: &ScalarField, current: Option<String>) -> Result<String> {
        let has_current = current.is_some();
        let default = current.or_else(|| field.default.resolve());

        if self.yes {
            return match default {
                Some(value) => {
                    let shown = if field.secret { "********" } else { value.as_str() };
                    writeln!(self.writer, "  {}: {}", field.description, style(shown).green())?;
                    Ok(value)
                }
                None if !field.required => Ok(String::new()),
                None => Err(ConfigError::missing(field.key).into()),
            };
        }

        let prompt = format!("{} ({})", field.description, field.key);
        match field.kind {
            ValueKind::Bool => {
                let answer = Confirm::with_theme(&self.theme)
                    .with_prompt(prompt)
                    .default(default.as_deref() == Some("true"))
                    .interact()?;
                Ok(answer.to_string())
            }
            ValueKind::Text if field.secret => {
                let value = Password::with_theme(&self.theme)
                    .with_prompt(prompt)
                    .allow_empty_password(has_current)
                    .interact()?;
                match (value.is_empty(), default) {
                    (true, Some(current)) => Ok(current),
                    _ => Ok(value),
                }
            }
            ValueKind::Integer => {
                let mut input = Input::<String>::with_theme(&self.theme)
                    .with_prompt(prompt)
                    .validate_with(|input: &String| -> Result<(), &'static str> {
                        input
                            .trim()
                            .parse::<u64>()
                            .map(|_| ())
                            .map_err(|_| "enter a whole number")
                    });
                if let Some(default) = default {
                    input = input.default(default);
                }
                Ok(input.interact_text()?.trim().to_string())
            }
            ValueKind::Text => {
                let mut input = Input::<String>::with_theme(&self.theme)
                    .with_prompt(prompt)
                    .allow_empty(!field.required);
                if let Some(default) = default {
                    input = input.default(default);
                }
                Ok(input.interact_text()?.trim().to_string())
            }
        }
    }

    fn print_header(&mut self, title: &str) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style(format!("  {}", title)).bold().cyan())?;
        writeln!(self.writer)?;
        Ok(())
    }

    pub fn info(&mut self, message: impl AsRef<str>) -> Result<()> {
        writeln!(self.writer, "{} {}", style("•").cyan(), message.as_ref())?;
        Ok(())
    }

    pub fn success(&mut self, message: impl AsRef<str>) -> Result<()> {
        writeln!(self.writer, "{} {}", style("✓").green(), message.as_ref())?;
        Ok(())
    }

    pub fn warn(&mut self, message: impl AsRef<str>) -> Result<()> {
        writeln!(self.writer, "{} {}", style("⚠").yellow(), message.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitepush_core::config::OssSettings;

    #[test]
    fn test_yes_flag_accepts_confirmation() {
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(true, &mut output);

        assert!(flow.confirm("Remove 3 files?").unwrap());

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Remove 3 files?"));
        assert!(output.contains("yes"));
    }

    #[test]
    fn test_nothing_missing_prints_nothing() {
        let mut settings = Settings {
            duration: Some(60),
            ..Settings::default()
        };
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(true, &mut output);

        let filled = flow
            .complete_settings(&mut settings, &[Section::Duration])
            .unwrap();

        assert!(filled.is_empty());
        assert!(output.is_empty());
    }

    #[test]
    fn test_yes_fills_defaults() {
        let mut settings = Settings::default();
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(true, &mut output);

        let filled = flow
            .complete_settings(&mut settings, &[Section::Path, Section::Duration])
            .unwrap();

        assert_eq!(filled, vec!["path", "duration"]);
        assert_eq!(settings.duration, Some(15_552_000));
        assert!(settings.publish_path().ends_with("dist"));
        assert!(String::from_utf8(output).unwrap().contains("Missing settings"));
    }

    #[test]
    fn test_yes_cannot_invent_credentials() {
        let mut settings = Settings::default();
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(true, &mut output);

        let err = flow
            .complete_settings(&mut settings, &[Section::Oss])
            .unwrap_err();

        assert!(err.to_string().contains("oss.bucket"));
    }

    #[test]
    fn test_edit_keeps_current_values_and_masks_secret() {
        let mut settings = Settings {
            oss: Some(OssSettings {
                bucket: "site".to_string(),
                access_key_id: "id".to_string(),
                access_key_secret: "top-secret".to_string(),
                ..OssSettings::default()
            }),
            ..Settings::default()
        };
        let before = settings.clone();
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(true, &mut output);

        flow.edit_settings(&mut settings, &[Section::Oss]).unwrap();

        assert_eq!(settings, before);
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("site"));
        assert!(!output.contains("top-secret"));
    }

    #[test]
    fn test_message_symbols() {
        let mut output = Vec::new();
        let mut flow = InteractiveFlow::with_writer(false, &mut output);

        flow.success("Published").unwrap();
        flow.warn("Nothing to remove").unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("✓ Published"));
        assert!(output.contains("⚠ Nothing to remove"));
    }
}
