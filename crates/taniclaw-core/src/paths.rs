use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TANICLAW_DIR: &str = ".taniclaw";
pub const RULES_DIR: &str = ".taniclaw/rules";
pub const KNOWLEDGE_DIR: &str = ".taniclaw/knowledge";
pub const KNOWLEDGE_PLANTS_DIR: &str = ".taniclaw/knowledge/plants";

pub const CONFIG_FILE: &str = ".taniclaw/config.yaml";
pub const DB_FILE: &str = ".taniclaw/taniclaw.db";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_path(root: &Path) -> PathBuf {
    root.join(DB_FILE)
}

pub fn rules_dir(root: &Path) -> PathBuf {
    root.join(RULES_DIR)
}

pub fn rules_file(root: &Path, name: &str) -> PathBuf {
    rules_dir(root).join(format!("{name}.yaml"))
}

pub fn knowledge_dir(root: &Path) -> PathBuf {
    root.join(KNOWLEDGE_DIR)
}

pub fn knowledge_plant_path(root: &Path, plant_type: &str) -> PathBuf {
    root.join(KNOWLEDGE_PLANTS_DIR).join(format!("{plant_type}.yaml"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
