use crate::app;
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use taniclaw_core::{
    knowledge::{KnowledgeBase, KnowledgeProvider},
    memory::{Memory, NewPlant, Plant},
    paths,
    types::PlantState,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum PlantSubcommand {
    /// Register a plant
    Add {
        name: String,
        /// Plant type matching a knowledge document (chili, tomato, ...)
        #[arg(long = "type", value_name = "TYPE")]
        plant_type: String,
        #[arg(long, default_value = "garden")]
        location: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Planting date, YYYY-MM-DD (default: today)
        #[arg(long)]
        planted: Option<String>,
        /// soil, pot, polybag or hydroponic
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        soil: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Starting lifecycle state (default: estimated from the planting date)
        #[arg(long)]
        state: Option<String>,
    },
    /// List plants
    List {
        /// Include deactivated plants
        #[arg(long)]
        all: bool,
    },
    /// Show a plant and its latest actions
    Show { id: String },
    /// Show a plant's history, newest first
    History {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Stop scheduling a plant; its records are kept
    Deactivate { id: String },
}

pub fn run(root: &Path, subcmd: PlantSubcommand, json: bool) -> anyhow::Result<()> {
    app::load_config(root)?;
    let store = app::open_store(root)?;
    match subcmd {
        PlantSubcommand::Add {
            name,
            plant_type,
            location,
            lat,
            lon,
            planted,
            method,
            soil,
            notes,
            state,
        } => {
            let plant_date = match planted {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("invalid --planted date '{raw}'"))?,
                None => Utc::now().date_naive(),
            };
            let plant_type = plant_type.trim().to_lowercase();
            let kb = KnowledgeBase::load_dir(&paths::knowledge_dir(root))?;
            let initial_state: PlantState = match state {
                Some(raw) => raw.parse().with_context(|| format!("invalid --state '{raw}'"))?,
                None => {
                    let age = (Utc::now().date_naive() - plant_date).num_days().max(0);
                    kb.expected_stage(&plant_type, age)
                }
            };
            let new = NewPlant {
                name,
                plant_type,
                location,
                latitude: lat,
                longitude: lon,
                plant_date,
                growing_method: method,
                soil_condition: soil,
                notes,
                initial_state,
            };
            add(&kb, store.as_ref(), new, json)
        }
        PlantSubcommand::List { all } => list(store.as_ref(), all, json),
        PlantSubcommand::Show { id } => show(store.as_ref(), &id, json),
        PlantSubcommand::History { id, limit } => history(store.as_ref(), &id, limit, json),
        PlantSubcommand::Deactivate { id } => deactivate(store.as_ref(), &id, json),
    }
}

fn add(kb: &KnowledgeBase, memory: &dyn Memory, new: NewPlant, json: bool) -> anyhow::Result<()> {
    if !(-90.0..=90.0).contains(&new.latitude) || !(-180.0..=180.0).contains(&new.longitude) {
        anyhow::bail!("coordinates out of range: {}, {}", new.latitude, new.longitude);
    }
    let plant = Plant::new(new);
    memory
        .create_plant(&plant)
        .with_context(|| format!("failed to save plant '{}'", plant.name))?;

    let known = kb
        .supported_plant_types()
        .iter()
        .any(|t| *t == plant.plant_type);

    if json {
        print_json(&plant)?;
    } else {
        println!(
            "Added plant '{}' ({}) in state {}",
            plant.name, plant.id, plant.current_state
        );
        if !known {
            println!(
                "note: no knowledge document for '{}', default stage durations apply",
                plant.plant_type
            );
        }
    }
    Ok(())
}

fn list(memory: &dyn Memory, all: bool, json: bool) -> anyhow::Result<()> {
    let plants = if all {
        memory.list_plants()?
    } else {
        memory.active_plants()?
    };

    if json {
        return print_json(&plants);
    }
    if plants.is_empty() {
        println!("No plants.");
        return Ok(());
    }
    let rows = plants
        .iter()
        .map(|p| {
            vec![
                p.id.to_string(),
                p.name.clone(),
                p.plant_type.clone(),
                p.current_state.clone(),
                p.plant_date.to_string(),
                if p.is_active { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "TYPE", "STATE", "PLANTED", "ACTIVE"], rows);
    Ok(())
}

fn show(memory: &dyn Memory, raw_id: &str, json: bool) -> anyhow::Result<()> {
    let plant = app::require_plant(memory, app::parse_plant_id(raw_id)?)?;
    let actions = memory.list_actions(plant.id, 10)?;

    if json {
        let value = serde_json::json!({ "plant": plant, "recent_actions": actions });
        return print_json(&value);
    }

    println!("{} ({})", plant.name, plant.id);
    println!("  type:      {}", plant.plant_type);
    println!("  state:     {}", plant.current_state);
    println!("  planted:   {}", plant.plant_date);
    println!("  location:  {} ({:.4}, {:.4})", plant.location, plant.latitude, plant.longitude);
    println!("  method:    {}", or_dash(plant.growing_method.as_deref()));
    println!("  soil:      {}", or_dash(plant.soil_condition.as_deref()));
    println!("  active:    {}", plant.is_active);
    if let Some(notes) = &plant.notes {
        println!("  notes:     {notes}");
    }

    if actions.is_empty() {
        println!("\nNo actions recorded.");
        return Ok(());
    }
    println!();
    let rows = actions
        .iter()
        .map(|a| {
            vec![
                a.created_at.format("%Y-%m-%d %H:%M").to_string(),
                a.action_type.to_string(),
                a.status.as_str().to_string(),
                a.source.as_str().to_string(),
                a.description.clone(),
            ]
        })
        .collect();
    print_table(&["WHEN", "TYPE", "STATUS", "SOURCE", "DESCRIPTION"], rows);
    Ok(())
}

fn history(memory: &dyn Memory, raw_id: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let plant = app::require_plant(memory, app::parse_plant_id(raw_id)?)?;
    let entries = memory.plant_history(plant.id, limit)?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No history for '{}'.", plant.name);
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.event_type.clone(),
                e.payload.to_string(),
            ]
        })
        .collect();
    print_table(&["WHEN", "EVENT", "DETAILS"], rows);
    Ok(())
}

fn deactivate(memory: &dyn Memory, raw_id: &str, json: bool) -> anyhow::Result<()> {
    let id = app::parse_plant_id(raw_id)?;
    if !memory.deactivate_plant(id)? {
        anyhow::bail!("plant not found: {id}");
    }
    if json {
        print_json(&serde_json::json!({ "plant_id": id, "is_active": false }))?;
    } else {
        println!("Deactivated plant {id}");
    }
    Ok(())
}
