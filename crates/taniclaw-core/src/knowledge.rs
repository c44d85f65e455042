//! Plant knowledge: per-stage durations and instructions, watering and
//! fertilizer schedules, harvest indicators and common diseases.
//!
//! The core depends only on `KnowledgeProvider`. `KnowledgeBase` is the
//! YAML-backed implementation loaded from `knowledge/plants/*.yaml`.

use crate::error::Result;
use crate::types::PlantState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Duration bounds used when a plant type or stage is unknown.
pub const DEFAULT_STAGE_BOUNDS: (u32, u32) = (7, 14);

// ---------------------------------------------------------------------------
// Document types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInfo {
    pub name: PlantState,
    #[serde(default = "default_duration")]
    pub duration_days: Vec<u32>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

fn default_duration() -> Vec<u32> {
    vec![DEFAULT_STAGE_BOUNDS.0, DEFAULT_STAGE_BOUNDS.1]
}

impl StageInfo {
    /// `(min, max)`; a single-element list means `min == max`.
    pub fn bounds(&self) -> (u32, u32) {
        match self.duration_days.as_slice() {
            [] => DEFAULT_STAGE_BOUNDS,
            [only] => (*only, *only),
            [min, max, ..] => (*min, *max),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub stages: Vec<StageInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringInfo {
    pub frequency_days: u32,
    pub amount_ml: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Watering {
    #[serde(default)]
    pub adjust_by_stage: BTreeMap<String, WateringInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerEntry {
    pub stage: PlantState,
    #[serde(rename = "type", default = "default_fertilizer")]
    pub fertilizer_type: String,
    pub amount_grams: u32,
    pub frequency_days: u32,
}

fn default_fertilizer() -> String {
    "NPK".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fertilizer {
    #[serde(default)]
    pub schedule: Vec<FertilizerEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestInfo {
    #[serde(default)]
    pub indicators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    pub name: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub prevention: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diseases {
    #[serde(default)]
    pub common: Vec<DiseaseInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantKnowledge {
    pub plant_type: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub watering: Watering,
    #[serde(default)]
    pub fertilizer: Fertilizer,
    #[serde(default)]
    pub harvest: HarvestInfo,
    #[serde(default)]
    pub diseases: Diseases,
}

impl PlantKnowledge {
    pub fn stage(&self, stage: PlantState) -> Option<&StageInfo> {
        self.lifecycle.stages.iter().find(|s| s.name == stage)
    }
}

// ---------------------------------------------------------------------------
// KnowledgeProvider
// ---------------------------------------------------------------------------

/// Query contract the decision core depends on.
pub trait KnowledgeProvider: Send + Sync {
    fn stage_duration_bounds(&self, plant_type: &str, stage: PlantState) -> (u32, u32);
    fn stage_instructions(&self, plant_type: &str, stage: PlantState) -> Vec<String>;
    fn harvest_info(&self, plant_type: &str) -> HarvestInfo;
    fn disease_info(&self, plant_type: &str) -> Vec<DiseaseInfo>;
    fn supported_plant_types(&self) -> Vec<String>;
    fn watering_info(&self, plant_type: &str, stage: PlantState) -> Option<WateringInfo>;
    fn fertilizer_schedule(&self, plant_type: &str, stage: PlantState) -> Vec<FertilizerEntry>;

    /// The stage a plant would be in after `days_since_planting`, walking the
    /// cumulative max durations of its lifecycle. Unknown types are seeds.
    fn expected_stage(&self, plant_type: &str, days_since_planting: i64) -> PlantState;
}

// ---------------------------------------------------------------------------
// KnowledgeBase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    plants: BTreeMap<String, PlantKnowledge>,
}

impl KnowledgeBase {
    pub fn new(plants: impl IntoIterator<Item = PlantKnowledge>) -> Self {
        Self {
            plants: plants
                .into_iter()
                .map(|p| (p.plant_type.clone(), p))
                .collect(),
        }
    }

    /// Load every `plants/*.yaml` under `dir`. Malformed files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let plants_dir = dir.join("plants");
        let mut kb = Self::default();
        if !plants_dir.is_dir() {
            tracing::warn!(dir = %plants_dir.display(), "knowledge directory not found");
            return Ok(kb);
        }
        let mut paths: Vec<_> = std::fs::read_dir(&plants_dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
            .collect();
        paths.sort();

        for path in paths {
            let parsed = std::fs::read_to_string(&path)
                .map_err(crate::error::TaniclawError::from)
                .and_then(|text| Ok(serde_yaml::from_str::<PlantKnowledge>(&text)?));
            match parsed {
                Ok(plant) => {
                    tracing::debug!(plant_type = %plant.plant_type, "loaded plant knowledge");
                    kb.plants.insert(plant.plant_type.clone(), plant);
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "skipping malformed knowledge document")
                }
            }
        }
        tracing::info!(plants = kb.plants.len(), "knowledge base loaded");
        Ok(kb)
    }

    pub fn plant(&self, plant_type: &str) -> Option<&PlantKnowledge> {
        self.plants.get(plant_type)
    }

    fn stage_info(&self, plant_type: &str, stage: PlantState) -> Option<&StageInfo> {
        self.plant(plant_type).and_then(|p| p.stage(stage))
    }
}

impl KnowledgeProvider for KnowledgeBase {
    fn expected_stage(&self, plant_type: &str, days_since_planting: i64) -> PlantState {
        let Some(plant) = self.plant(plant_type) else {
            return PlantState::Seed;
        };
        let mut elapsed = 0i64;
        for stage in &plant.lifecycle.stages {
            elapsed += i64::from(stage.bounds().1);
            if days_since_planting <= elapsed {
                return stage.name;
            }
        }
        plant
            .lifecycle
            .stages
            .last()
            .map(|s| s.name)
            .unwrap_or(PlantState::Harvest)
    }

    fn stage_duration_bounds(&self, plant_type: &str, stage: PlantState) -> (u32, u32) {
        self.stage_info(plant_type, stage)
            .map(StageInfo::bounds)
            .unwrap_or(DEFAULT_STAGE_BOUNDS)
    }

    fn stage_instructions(&self, plant_type: &str, stage: PlantState) -> Vec<String> {
        self.stage_info(plant_type, stage)
            .map(|s| s.instructions.clone())
            .unwrap_or_default()
    }

    fn harvest_info(&self, plant_type: &str) -> HarvestInfo {
        self.plant(plant_type)
            .map(|p| p.harvest.clone())
            .unwrap_or_default()
    }

    fn disease_info(&self, plant_type: &str) -> Vec<DiseaseInfo> {
        self.plant(plant_type)
            .map(|p| p.diseases.common.clone())
            .unwrap_or_default()
    }

    fn supported_plant_types(&self) -> Vec<String> {
        self.plants.keys().cloned().collect()
    }

    fn watering_info(&self, plant_type: &str, stage: PlantState) -> Option<WateringInfo> {
        self.plant(plant_type)
            .and_then(|p| p.watering.adjust_by_stage.get(stage.as_str()).cloned())
    }

    fn fertilizer_schedule(&self, plant_type: &str, stage: PlantState) -> Vec<FertilizerEntry> {
        self.plant(plant_type)
            .map(|p| {
                p.fertilizer
                    .schedule
                    .iter()
                    .filter(|e| e.stage == stage)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    const CHILI: &str = r#"
plant_type: chili
lifecycle:
  stages:
    - name: seed
      duration_days: [5, 10]
      instructions: ["Keep the seedbed moist"]
    - name: germination
      duration_days: [7]
    - name: vegetative
      duration_days: [10, 15]
      instructions: ["Water every morning", "Stake tall plants", "Remove weeds", "Check leaves"]
watering:
  adjust_by_stage:
    vegetative: { frequency_days: 1, amount_ml: 300 }
fertilizer:
  schedule:
    - stage: vegetative
      type: NPK 16-16-16
      amount_grams: 5
      frequency_days: 14
harvest:
  indicators: ["Fruit turns fully red"]
diseases:
  common:
    - name: Anthracnose
      symptoms: ["Sunken dark spots on fruit"]
"#;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::new([serde_yaml::from_str::<PlantKnowledge>(CHILI).unwrap()])
    }

    #[test]
    fn stage_bounds_come_from_the_document() {
        let kb = kb();
        assert_eq!(kb.stage_duration_bounds("chili", PlantState::Vegetative), (10, 15));
        assert_eq!(kb.stage_duration_bounds("chili", PlantState::Germination), (7, 7));
    }

    #[test]
    fn unknown_plant_or_stage_uses_default_bounds() {
        let kb = kb();
        assert_eq!(kb.stage_duration_bounds("durian", PlantState::Seed), (7, 14));
        assert_eq!(kb.stage_duration_bounds("chili", PlantState::Dormant), (7, 14));
        assert!(kb.stage_instructions("durian", PlantState::Seed).is_empty());
    }

    #[test]
    fn schedules_are_filtered_by_stage() {
        let kb = kb();
        assert_eq!(
            kb.watering_info("chili", PlantState::Vegetative),
            Some(WateringInfo { frequency_days: 1, amount_ml: 300 })
        );
        assert_eq!(kb.fertilizer_schedule("chili", PlantState::Vegetative).len(), 1);
        assert!(kb.fertilizer_schedule("chili", PlantState::Seed).is_empty());
        assert_eq!(kb.disease_info("chili")[0].name, "Anthracnose");
    }

    #[test]
    fn expected_stage_walks_cumulative_durations() {
        let kb: Arc<dyn KnowledgeProvider> = Arc::new(kb());
        assert_eq!(kb.expected_stage("chili", 3), PlantState::Seed);
        assert_eq!(kb.expected_stage("chili", 15), PlantState::Germination);
        assert_eq!(kb.expected_stage("chili", 30), PlantState::Vegetative);
        assert_eq!(kb.expected_stage("chili", 300), PlantState::Vegetative);
        assert_eq!(kb.expected_stage("durian", 300), PlantState::Seed);
    }

    #[test]
    fn load_dir_skips_malformed_documents() {
        let dir = TempDir::new().unwrap();
        let plants = dir.path().join("plants");
        std::fs::create_dir_all(&plants).unwrap();
        std::fs::write(plants.join("chili.yaml"), CHILI).unwrap();
        std::fs::write(plants.join("broken.yaml"), "plant_type: [oops").unwrap();

        let kb = KnowledgeBase::load_dir(dir.path()).unwrap();
        assert_eq!(kb.supported_plant_types(), vec!["chili".to_string()]);
    }
}
