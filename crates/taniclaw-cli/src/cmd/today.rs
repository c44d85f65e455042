use crate::app;
use crate::output::print_json;
use anyhow::Context;
use chrono::Utc;
use std::path::Path;
use taniclaw_core::agent::DailyInstructions;

pub fn run(root: &Path, plant: &str, json: bool) -> anyhow::Result<()> {
    let config = app::load_config(root)?;
    let agent = app::build_agent(root, &config)?;
    let id = app::parse_plant_id(plant)?;

    let today = app::runtime()?
        .block_on(agent.daily_instructions(id, Utc::now()))
        .with_context(|| format!("failed to build instructions for plant {id}"))?;

    if json {
        return print_json(&today);
    }
    print_instructions(&today);
    Ok(())
}

fn print_instructions(today: &DailyInstructions) {
    println!("{} ({})", today.plant_name, today.plant_type);
    println!(
        "  state: {}, day {} in state, day {} since planting",
        today.plant_state, today.days_in_state, today.days_since_planting
    );
    if let Some(next) = today.next_state {
        println!("  next:  {next}");
    }
    let w = &today.weather;
    println!(
        "  weather: {}, {:.0}-{:.0}°C, rain {:.1} mm, humidity {:.0}%",
        w.summary, w.temp_min, w.temp_max, w.rainfall_mm, w.humidity
    );

    if !today.alerts.is_empty() {
        println!("\nAlerts:");
        for alert in &today.alerts {
            println!("  ! {alert}");
        }
    }

    println!("\nToday:");
    if today.instructions.is_empty() {
        println!("  nothing to do");
    }
    for (i, step) in today.instructions.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }

    if let Some(water) = &today.watering {
        println!(
            "\nWatering guide: {} ml every {} day(s)",
            water.amount_ml, water.frequency_days
        );
    }
    for feed in &today.fertilizer {
        println!(
            "Feeding guide: {} g {} every {} days",
            feed.amount_grams, feed.fertilizer_type, feed.frequency_days
        );
    }

    if !today.harvest_info.indicators.is_empty() {
        println!("\nHarvest when: {}", today.harvest_info.indicators.join("; "));
    }
    if !today.common_diseases.is_empty() {
        println!("Watch for: {}", today.common_diseases.join(", "));
    }
}
