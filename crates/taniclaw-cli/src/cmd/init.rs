use anyhow::Context;
use std::path::Path;
use taniclaw_core::{config::Config, io, paths};

use crate::app;

const DEFAULT_RULES: &str = include_str!("../../assets/rules/default.yaml");

/// Bundled plant knowledge, keyed by plant type.
const PLANT_KNOWLEDGE: &[(&str, &str)] = &[
    ("chili", include_str!("../../assets/knowledge/plants/chili.yaml")),
    ("lettuce", include_str!("../../assets/knowledge/plants/lettuce.yaml")),
    ("spinach", include_str!("../../assets/knowledge/plants/spinach.yaml")),
    ("tomato", include_str!("../../assets/knowledge/plants/tomato.yaml")),
];

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing TaniClaw in: {}", root.display());

    for dir in [paths::TANICLAW_DIR, paths::RULES_DIR, paths::KNOWLEDGE_PLANTS_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if paths::config_path(root).exists() {
        report(false, paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        report(true, paths::CONFIG_FILE);
    }

    let rules_path = paths::rules_file(root, "default");
    let written = io::write_if_missing(&rules_path, DEFAULT_RULES.as_bytes())
        .with_context(|| format!("failed to write {}", rules_path.display()))?;
    report(written, &relative(root, &rules_path));

    for (plant_type, doc) in PLANT_KNOWLEDGE {
        let path = paths::knowledge_plant_path(root, plant_type);
        let written = io::write_if_missing(&path, doc.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        report(written, &relative(root, &path));
    }

    let db_existed = paths::db_path(root).exists();
    app::open_store(root)?;
    report(!db_existed, paths::DB_FILE);

    io::ensure_gitignore_entry(root, paths::DB_FILE).context("failed to update .gitignore")?;

    println!("\nNext: taniclaw plant add <name> --type chili --lat <lat> --lon <lon>");
    Ok(())
}

fn report(created: bool, path: &str) {
    if created {
        println!("  created: {path}");
    } else {
        println!("  exists:  {path}");
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
