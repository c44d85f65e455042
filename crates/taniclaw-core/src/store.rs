//! redb-backed implementation of [`Memory`].
//!
//! # Table design
//!
//! `plants` is keyed by the 16 raw UUID bytes. `actions` and `history` use a
//! 40-byte composite key:
//! ```text
//! [ plant uuid (16 bytes) | timestamp_ms u64 big-endian (8 bytes) | record uuid (16 bytes) ]
//! ```
//! Big-endian timestamps make byte order equal time order within a plant,
//! so a plant's records (or one day of them) are a single range scan.
//! `weather_cache` is keyed by `"{lat:.2},{lon:.2},{date}"`. All values are
//! JSON.

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{Result, TaniclawError};
use crate::memory::{ActionRecord, HistoryEntry, Memory, Plant, NEVER_PERFORMED_DAYS};
use crate::types::{ActionStatus, ActionType, PlantState};
use crate::weather::Weather;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const PLANTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("plants");
const ACTIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
const HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("history");
const WEATHER_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("weather_cache");

const BUSY_RETRY: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn record_key(plant_id: Uuid, ts: DateTime<Utc>, id: Uuid) -> [u8; 40] {
    let mut key = [0u8; 40];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..16].copy_from_slice(plant_id.as_bytes());
    key[16..24].copy_from_slice(&ms.to_be_bytes());
    key[24..].copy_from_slice(id.as_bytes());
    key
}

/// Inclusive key bounds covering `[from_ms, to_ms]` for one plant.
fn plant_range(plant_id: Uuid, from_ms: u64, to_ms: u64) -> ([u8; 40], [u8; 40]) {
    let mut lower = [0u8; 40];
    lower[..16].copy_from_slice(plant_id.as_bytes());
    lower[16..24].copy_from_slice(&from_ms.to_be_bytes());
    let mut upper = [0xffu8; 40];
    upper[..16].copy_from_slice(plant_id.as_bytes());
    upper[16..24].copy_from_slice(&to_ms.to_be_bytes());
    (lower, upper)
}

fn weather_key(lat: f64, lon: f64, date: NaiveDate) -> String {
    format!("{lat:.2},{lon:.2},{date}")
}

fn db_err<E: std::fmt::Display>(e: E) -> TaniclawError {
    TaniclawError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbStore
// ---------------------------------------------------------------------------

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`, creating every table.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                return Err(TaniclawError::StoreBusy(path.display().to_string()))
            }
            Err(e) => return Err(db_err(e)),
        };
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(PLANTS).map_err(db_err)?;
        wt.open_table(ACTIONS).map_err(db_err)?;
        wt.open_table(HISTORY).map_err(db_err)?;
        wt.open_table(WEATHER_CACHE).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// [`RedbStore::open`], retrying for up to `wait` while another process
    /// holds the file lock.
    pub fn open_waiting(path: &Path, wait: Duration) -> Result<Self> {
        let deadline = Instant::now() + wait;
        let mut logged = false;
        loop {
            match Self::open(path) {
                Err(TaniclawError::StoreBusy(_)) if Instant::now() < deadline => {
                    if !logged {
                        tracing::info!(path = %path.display(), "store busy, waiting for it to be released");
                        logged = true;
                    }
                    std::thread::sleep(BUSY_RETRY);
                }
                other => return other,
            }
        }
    }

    fn put(&self, table: TableDefinition<&[u8], &[u8]>, key: &[u8], value: &[u8]) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(table).map_err(db_err)?;
            t.insert(key, value).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }

    /// Decode every value in `[from_ms, to_ms]` for a plant, oldest first.
    fn scan<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        plant_id: Uuid,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<T>> {
        let (lower, upper) = plant_range(plant_id, from_ms, to_ms);
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(table).map_err(db_err)?;
        let mut out = Vec::new();
        for entry in t
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(db_err)?
        {
            let (_, v) = entry.map_err(db_err)?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }
}

impl Memory for RedbStore {
    fn create_plant(&self, plant: &Plant) -> Result<()> {
        let value = serde_json::to_vec(plant)?;
        self.put(PLANTS, plant.id.as_bytes(), &value)?;
        tracing::info!(plant_id = %plant.id, name = %plant.name, "created plant");
        Ok(())
    }

    fn get_plant(&self, id: Uuid) -> Result<Option<Plant>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(PLANTS).map_err(db_err)?;
        match t.get(id.as_bytes().as_slice()).map_err(db_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn list_plants(&self) -> Result<Vec<Plant>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(PLANTS).map_err(db_err)?;
        let mut plants = Vec::new();
        for entry in t.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            plants.push(serde_json::from_slice::<Plant>(v.value())?);
        }
        plants.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(plants)
    }

    fn update_plant(&self, plant: &Plant) -> Result<()> {
        if self.get_plant(plant.id)?.is_none() {
            return Err(TaniclawError::PlantNotFound(plant.id.to_string()));
        }
        let value = serde_json::to_vec(plant)?;
        self.put(PLANTS, plant.id.as_bytes(), &value)
    }

    fn update_plant_state(&self, id: Uuid, state: PlantState, at: DateTime<Utc>) -> Result<Plant> {
        let mut plant = self
            .get_plant(id)?
            .ok_or_else(|| TaniclawError::PlantNotFound(id.to_string()))?;
        plant.current_state = state.as_str().to_string();
        plant.state_changed_at = Some(at);
        plant.updated_at = Utc::now();
        self.update_plant(&plant)?;
        Ok(plant)
    }

    fn create_action_record(&self, record: &ActionRecord) -> Result<()> {
        let key = record_key(record.plant_id, record.created_at, record.id);
        let value = serde_json::to_vec(record)?;
        self.put(ACTIONS, &key, &value)
    }

    fn list_actions(&self, plant_id: Uuid, limit: usize) -> Result<Vec<ActionRecord>> {
        let mut all: Vec<ActionRecord> = self.scan(ACTIONS, plant_id, 0, u64::MAX)?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    fn append_history(
        &self,
        plant_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            plant_id,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        let key = record_key(plant_id, entry.created_at, entry.id);
        let value = serde_json::to_vec(&entry)?;
        self.put(HISTORY, &key, &value)?;
        Ok(entry)
    }

    fn plant_history(&self, plant_id: Uuid, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut all: Vec<HistoryEntry> = self.scan(HISTORY, plant_id, 0, u64::MAX)?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    fn today_action_count(&self, plant_id: Uuid, now: DateTime<Utc>) -> Result<u32> {
        let start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);
        let from_ms = start.timestamp_millis().max(0) as u64;
        let to_ms = from_ms + 24 * 60 * 60 * 1000 - 1;
        let today: Vec<ActionRecord> = self.scan(ACTIONS, plant_id, from_ms, to_ms)?;
        Ok(today.len() as u32)
    }

    fn days_since_last_action(
        &self,
        plant_id: Uuid,
        action_type: &ActionType,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let all: Vec<ActionRecord> = self.scan(ACTIONS, plant_id, 0, u64::MAX)?;
        let last = all
            .iter()
            .filter(|r| &r.action_type == action_type && r.status == ActionStatus::Executed)
            .filter_map(|r| r.executed_at)
            .max();
        Ok(match last {
            Some(at) => (now - at).num_days().max(0),
            None => NEVER_PERFORMED_DAYS,
        })
    }

    fn cached_weather(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<Option<Weather>> {
        let key = weather_key(lat, lon, date);
        let rt = self.db.begin_read().map_err(db_err)?;
        let t = rt.open_table(WEATHER_CACHE).map_err(db_err)?;
        match t.get(key.as_str()).map_err(db_err)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn cache_weather(&self, lat: f64, lon: f64, date: NaiveDate, weather: &Weather) -> Result<()> {
        let key = weather_key(lat, lon, date);
        let value = serde_json::to_vec(weather)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut t = wt.open_table(WEATHER_CACHE).map_err(db_err)?;
            t.insert(key.as_str(), value.as_slice()).map_err(db_err)?;
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
