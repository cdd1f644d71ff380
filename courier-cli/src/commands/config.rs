//! Configuration file commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;

use courier_core::config::AppConfig;
use courier_core::error::{CourierError, CourierResult};

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Write a default configuration file.
    Init {
        /// Where to write it (defaults to the --config path).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

pub fn run(
    config: &AppConfig,
    config_path: &Path,
    action: ConfigAction,
    format: OutputFormat,
) -> CourierResult<()> {
    match action {
        ConfigAction::Show => match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&redacted(config))?);
            }
            OutputFormat::Text => {
                println!("# {}", config_path.display());
                print!("{}", redacted(config).to_toml()?);
            }
        },
        ConfigAction::Init { path, force } => {
            let target = path.unwrap_or_else(|| config_path.to_path_buf());
            if target.exists() && !force {
                return Err(CourierError::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    target.display()
                )));
            }
            AppConfig::default().save_to_file(&target)?;
            match format {
                OutputFormat::Json => {
                    let out = serde_json::json!({ "written": target.display().to_string() });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                OutputFormat::Text => {
                    println!("  {} wrote {}", style("✓").green(), target.display());
                }
            }
        }
    }
    Ok(())
}

/// A copy safe to print: the API key is masked.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut copy = config.clone();
    if !copy.backend.api_key.is_empty() {
        copy.backend.api_key = "********".into();
    }
    copy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = AppConfig::default();

        run(&config, &path, ConfigAction::Init { path: None, force: false }, OutputFormat::Text)
            .unwrap();
        assert!(AppConfig::load_from_file(&path).is_ok());

        let again = run(&config, &path, ConfigAction::Init { path: None, force: false }, OutputFormat::Text);
        assert!(matches!(again, Err(CourierError::Config(_))));

        run(&config, &path, ConfigAction::Init { path: None, force: true }, OutputFormat::Json)
            .unwrap();
    }

    #[test]
    fn test_show_masks_api_key() {
        let mut config = AppConfig::default();
        config.backend.api_key = "secret".into();
        assert_eq!(redacted(&config).backend.api_key, "********");
        assert_eq!(config.backend.api_key, "secret");
    }
}
