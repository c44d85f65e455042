use crate::app;
use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use taniclaw_core::{
    agent::PlantCycle,
    config::Config,
    executor::ExecutionResult,
    notification::{format_daily_summary, NotificationChannel, NotificationPriority, Notifier},
};

pub fn run(root: &Path, plant: Option<&str>, json: bool) -> anyhow::Result<()> {
    let config = app::load_config(root)?;
    let agent = app::build_agent(root, &config)?;
    let rt = app::runtime()?;

    let cycles = match plant {
        Some(raw) => {
            let id = app::parse_plant_id(raw)?;
            let found = app::require_plant(agent.memory().as_ref(), id)?;
            let results = rt
                .block_on(agent.run_single_plant(id, Utc::now()))
                .with_context(|| format!("cycle failed for plant {id}"))?;
            vec![PlantCycle {
                plant_id: id,
                plant_name: found.name,
                results,
                error: None,
            }]
        }
        None => rt.block_on(agent.run_cycle()).context("cycle failed")?,
    };

    if config.notification.enabled {
        rt.block_on(send_summaries(&config, &cycles));
    }

    if json {
        return print_json(&cycles);
    }
    print_cycles(&cycles);
    Ok(())
}

async fn send_summaries(config: &Config, cycles: &[PlantCycle]) {
    let notifier = match Notifier::new(config.notification.clone()) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build notifier for summaries");
            return;
        }
    };
    for cycle in cycles.iter().filter(|c| !c.results.is_empty()) {
        let message = format_daily_summary(&cycle.plant_name, &cycle.results);
        notifier.send(&message, NotificationPriority::Normal).await;
    }
}

fn print_cycles(cycles: &[PlantCycle]) {
    if cycles.is_empty() {
        println!("No active plants.");
        return;
    }
    let mut rows = Vec::new();
    for cycle in cycles {
        if let Some(err) = &cycle.error {
            rows.push(vec![cycle.plant_name.clone(), "-".into(), "failed".into(), err.clone()]);
            continue;
        }
        if cycle.results.is_empty() {
            rows.push(vec![cycle.plant_name.clone(), "-".into(), "idle".into(), "nothing executed".into()]);
            continue;
        }
        rows.extend(cycle.results.iter().map(|r| row(&cycle.plant_name, r)));
    }
    print_table(&["PLANT", "ACTION", "STATUS", "DESCRIPTION"], rows);
}

fn row(plant_name: &str, result: &ExecutionResult) -> Vec<String> {
    let status = if result.is_ok() { "ok" } else { "error" };
    let detail = match &result.error {
        Some(e) => format!("{} ({e})", result.description),
        None => result.description.clone(),
    };
    vec![
        plant_name.to_string(),
        result.action_type.to_string(),
        status.to_string(),
        detail,
    ]
}
