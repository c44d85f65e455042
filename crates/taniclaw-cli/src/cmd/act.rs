use crate::app;
use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use taniclaw_core::action::Action;

pub struct ActArgs {
    pub plant: String,
    pub action_type: String,
    pub description: Option<String>,
    pub amount_ml: Option<u32>,
    pub amount_grams: Option<u32>,
}

/// Human override: bypasses quota and ceilings but is audited like any
/// other action.
pub fn run(root: &Path, args: ActArgs, json: bool) -> anyhow::Result<()> {
    let config = app::load_config(root)?;
    let agent = app::build_agent(root, &config)?;
    let id = app::parse_plant_id(&args.plant)?;

    let description = args
        .description
        .unwrap_or_else(|| format!("manual {}", args.action_type));
    let mut action = Action::new(args.action_type.trim().to_lowercase().as_str(), description);
    action.amount_ml = args.amount_ml;
    action.amount_grams = args.amount_grams;

    let result = app::runtime()?
        .block_on(agent.execute_manual(id, action, Utc::now()))
        .with_context(|| format!("manual action failed for plant {id}"))?;

    if json {
        print_json(&result)?;
    } else if result.is_ok() {
        println!("Recorded {}: {}", result.action_type, result.description);
    } else {
        println!(
            "Recorded {} as skipped: {}",
            result.action_type,
            result.error.as_deref().unwrap_or("handler failed")
        );
    }

    if !result.is_ok() {
        anyhow::bail!("action '{}' was not executed", result.action_type);
    }
    Ok(())
}
