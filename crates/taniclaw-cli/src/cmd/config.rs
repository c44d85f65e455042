use crate::app;
use crate::output::print_json;
use clap::Subcommand;
use std::path::Path;
use taniclaw_core::config::{Config, WarnLevel};

const REDACTED: &str = "***";

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config (file plus TANICLAW_* overrides), secrets redacted
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = redacted(app::load_config(root)?);
    if json {
        return print_json(&config);
    }
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn redacted(mut config: Config) -> Config {
    let hide = |secret: &mut Option<String>| {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    };
    hide(&mut config.llm.api_key);
    hide(&mut config.notification.telegram_bot_token);
    hide(&mut config.notification.whatsapp_api_key);
    config
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = app::load_config(root)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
