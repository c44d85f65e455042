use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PlantState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantState {
    Seed,
    Germination,
    Vegetative,
    Flowering,
    Harvest,
    Dormant,
    Dead,
}

impl PlantState {
    pub fn all() -> &'static [PlantState] {
        &[
            PlantState::Seed,
            PlantState::Germination,
            PlantState::Vegetative,
            PlantState::Flowering,
            PlantState::Harvest,
            PlantState::Dormant,
            PlantState::Dead,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlantState::Seed => "seed",
            PlantState::Germination => "germination",
            PlantState::Vegetative => "vegetative",
            PlantState::Flowering => "flowering",
            PlantState::Harvest => "harvest",
            PlantState::Dormant => "dormant",
            PlantState::Dead => "dead",
        }
    }
}

impl fmt::Display for PlantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlantState {
    type Err = crate::error::TaniclawError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seed" => Ok(PlantState::Seed),
            "germination" => Ok(PlantState::Germination),
            "vegetative" => Ok(PlantState::Vegetative),
            "flowering" => Ok(PlantState::Flowering),
            "harvest" => Ok(PlantState::Harvest),
            "dormant" => Ok(PlantState::Dormant),
            "dead" => Ok(PlantState::Dead),
            _ => Err(crate::error::TaniclawError::InvalidState(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

/// The kind of care action. The seven named kinds form the allow-list;
/// anything else parses into `Other` so an advisory or manual action with an
/// unexpected type still deserializes and can be judged by the guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Water,
    SkipWater,
    Fertilize,
    Harvest,
    Notify,
    Alert,
    Log,
    Other(String),
}

impl ActionType {
    pub fn allowed() -> &'static [ActionType] {
        &[
            ActionType::Water,
            ActionType::SkipWater,
            ActionType::Fertilize,
            ActionType::Harvest,
            ActionType::Notify,
            ActionType::Alert,
            ActionType::Log,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Water => "water",
            ActionType::SkipWater => "skip_water",
            ActionType::Fertilize => "fertilize",
            ActionType::Harvest => "harvest",
            ActionType::Notify => "notify",
            ActionType::Alert => "alert",
            ActionType::Log => "log",
            ActionType::Other(s) => s,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, ActionType::Other(_))
    }
}

impl From<String> for ActionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "water" => ActionType::Water,
            "skip_water" => ActionType::SkipWater,
            "fertilize" => ActionType::Fertilize,
            "harvest" => ActionType::Harvest,
            "notify" => ActionType::Notify,
            "alert" => ActionType::Alert,
            "log" => ActionType::Log,
            _ => ActionType::Other(s),
        }
    }
}

impl From<&str> for ActionType {
    fn from(s: &str) -> Self {
        ActionType::from(s.to_string())
    }
}

impl From<ActionType> for String {
    fn from(t: ActionType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionSource
// ---------------------------------------------------------------------------

/// Who proposed an action. Only `Manual` is treated specially by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    #[default]
    Rules,
    Llm,
    Manual,
}

impl ActionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionSource::Rules => "rules",
            ActionSource::Llm => "llm",
            ActionSource::Manual => "manual",
        }
    }
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Status of a persisted action record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Executed,
    Skipped,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Executed => "executed",
            ActionStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
