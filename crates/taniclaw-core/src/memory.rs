//! Persisted records and the persistence contract the decision core runs
//! against. `RedbStore` in `store.rs` is the on-disk implementation.

use crate::error::Result;
use crate::types::{ActionSource, ActionStatus, ActionType, PlantState};
use crate::weather::Weather;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reported by `days_since_last_action` for an action never performed, so
/// "never" compares as "long ago" in rule conditions.
pub const NEVER_PERFORMED_DAYS: i64 = 9999;

/// History event types written by the core.
pub mod events {
    pub const STATE_CHANGE: &str = "state_change";
    pub const ACTION: &str = "action";
    pub const ACTION_BLOCKED: &str = "action_blocked";
    pub const CYCLE: &str = "cycle";
}

// ---------------------------------------------------------------------------
// Plant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: Uuid,
    pub name: String,
    pub plant_type: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub plant_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growing_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_condition: Option<String>,
    /// Stored as text; parsed leniently by the state engine.
    pub current_state: String,
    #[serde(default)]
    pub state_changed_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlant {
    pub name: String,
    pub plant_type: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub plant_date: NaiveDate,
    pub growing_method: Option<String>,
    pub soil_condition: Option<String>,
    pub notes: Option<String>,
    pub initial_state: PlantState,
}

impl Plant {
    pub fn new(new: NewPlant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            plant_type: new.plant_type,
            location: new.location,
            latitude: new.latitude,
            longitude: new.longitude,
            plant_date: new.plant_date,
            growing_method: new.growing_method,
            soil_condition: new.soil_condition,
            current_state: new.initial_state.as_str().to_string(),
            state_changed_at: Some(now),
            is_active: true,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionRecord / HistoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: Uuid,
    pub plant_id: Uuid,
    pub action_type: ActionType,
    pub description: String,
    pub source: ActionSource,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_ml: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_grams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub plant_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

pub trait Memory: Send + Sync {
    fn create_plant(&self, plant: &Plant) -> Result<()>;
    fn get_plant(&self, id: Uuid) -> Result<Option<Plant>>;
    fn list_plants(&self) -> Result<Vec<Plant>>;
    fn update_plant(&self, plant: &Plant) -> Result<()>;

    /// Persist `state` and stamp `state_changed_at = at`. Returns the
    /// updated plant.
    fn update_plant_state(&self, id: Uuid, state: PlantState, at: DateTime<Utc>) -> Result<Plant>;

    fn create_action_record(&self, record: &ActionRecord) -> Result<()>;

    /// Newest first.
    fn list_actions(&self, plant_id: Uuid, limit: usize) -> Result<Vec<ActionRecord>>;

    fn append_history(
        &self,
        plant_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<HistoryEntry>;

    /// Newest first.
    fn plant_history(&self, plant_id: Uuid, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Action records of any status created on the UTC day of `now`.
    fn today_action_count(&self, plant_id: Uuid, now: DateTime<Utc>) -> Result<u32>;

    /// Whole days since the last *executed* action of `action_type`, or
    /// [`NEVER_PERFORMED_DAYS`].
    fn days_since_last_action(
        &self,
        plant_id: Uuid,
        action_type: &ActionType,
        now: DateTime<Utc>,
    ) -> Result<i64>;

    fn cached_weather(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<Option<Weather>>;
    fn cache_weather(&self, lat: f64, lon: f64, date: NaiveDate, weather: &Weather) -> Result<()>;

    fn active_plants(&self) -> Result<Vec<Plant>> {
        Ok(self
            .list_plants()?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }

    fn deactivate_plant(&self, id: Uuid) -> Result<bool> {
        let Some(mut plant) = self.get_plant(id)? else {
            return Ok(false);
        };
        plant.is_active = false;
        plant.updated_at = Utc::now();
        self.update_plant(&plant)?;
        Ok(true)
    }
}
