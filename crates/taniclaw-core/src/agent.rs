//! The per-plant decision cycle and the sweep over all active plants.
//!
//! One cycle: advance the lifecycle if due, fetch weather, build the
//! context, evaluate rules (or ask the advisory suggester when nothing
//! matched), validate every proposal through the guard, execute what passes.
//! Cycles for the same plant are serialized; different plants run
//! concurrently up to `scheduler.max_concurrent_plants`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::action::Action;
use crate::advisory::AdvisorySuggester;
use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, TaniclawError};
use crate::executor::{ExecutionResult, ToolExecutor};
use crate::knowledge::{FertilizerEntry, HarvestInfo, KnowledgeProvider, WateringInfo};
use crate::lifecycle::StateEngine;
use crate::memory::{events, Memory, Plant};
use crate::notification::{NotificationChannel, NotificationPriority};
use crate::rules::RuleSet;
use crate::security::{SecurityGuard, Verdict};
use crate::types::{ActionSource, ActionType, PlantState};
use crate::weather::{Weather, WeatherProvider};

const STAGE_INSTRUCTION_LIMIT: usize = 3;
const DISEASE_LIMIT: usize = 3;

/// Outcome of one plant's cycle within a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct PlantCycle {
    pub plant_id: Uuid,
    pub plant_name: String,
    pub results: Vec<ExecutionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyInstructions {
    pub plant_id: Uuid,
    pub plant_name: String,
    pub plant_type: String,
    pub plant_state: PlantState,
    pub days_since_planting: i64,
    pub days_in_state: i64,
    pub instructions: Vec<String>,
    pub alerts: Vec<String>,
    pub weather: Weather,
    pub harvest_info: HarvestInfo,
    pub common_diseases: Vec<String>,
    pub next_state: Option<PlantState>,
    /// Stage watering guide from the knowledge base, if any.
    pub watering: Option<WateringInfo>,
    pub fertilizer: Vec<FertilizerEntry>,
}

pub struct Agent {
    memory: Arc<dyn Memory>,
    knowledge: Arc<dyn KnowledgeProvider>,
    rules: RuleSet,
    state: StateEngine,
    guard: Arc<SecurityGuard>,
    executor: Arc<ToolExecutor>,
    weather: Arc<dyn WeatherProvider>,
    notifier: Option<Arc<dyn NotificationChannel>>,
    advisory: Option<Arc<dyn AdvisorySuggester>>,
    max_concurrent: usize,
    plant_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

/// What the guard and executor made of one proposed action.
enum Outcome {
    Blocked(Verdict),
    Executed(ExecutionResult),
}

impl Agent {
    pub fn new(
        config: &Config,
        memory: Arc<dyn Memory>,
        knowledge: Arc<dyn KnowledgeProvider>,
        rules: RuleSet,
        weather: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            state: StateEngine::new(knowledge.clone()),
            guard: Arc::new(SecurityGuard::new(config.security.clone())),
            executor: Arc::new(ToolExecutor::new(memory.clone())),
            memory,
            knowledge,
            rules,
            weather,
            notifier: None,
            advisory: None,
            max_concurrent: config.scheduler.max_concurrent_plants.max(1),
            plant_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationChannel>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisorySuggester>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn memory(&self) -> &Arc<dyn Memory> {
        &self.memory
    }

    /// Run store work on the blocking pool.
    async fn store<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Memory) -> Result<T> + Send + 'static,
    {
        let memory = self.memory.clone();
        tokio::task::spawn_blocking(move || op(memory.as_ref())).await?
    }

    // -----------------------------------------------------------------------
    // Per-plant serialization
    // -----------------------------------------------------------------------

    async fn with_plant_lock<T>(&self, plant_id: Uuid, work: impl Future<Output = T>) -> T {
        let lock = self.plant_lock(plant_id);
        let out = {
            let _held = lock.lock().await;
            work.await
        };
        self.release_plant_lock(plant_id, lock);
        out
    }

    fn plant_lock(&self, plant_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .plant_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(plant_id).or_default().clone()
    }

    /// Drop the map entry once no other caller holds or waits on it.
    fn release_plant_lock(&self, plant_id: Uuid, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .plant_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks
            .get(&plant_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&plant_id);
        }
    }

    // -----------------------------------------------------------------------
    // Sweep
    // -----------------------------------------------------------------------

    pub async fn run_cycle(&self) -> Result<Vec<PlantCycle>> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run every active plant's cycle. A failing plant is logged and
    /// reported in its `PlantCycle`; the sweep continues.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<Vec<PlantCycle>> {
        let plants = self.store(|m| m.active_plants()).await?;
        if plants.is_empty() {
            tracing::info!("no active plants, skipping cycle");
            return Ok(Vec::new());
        }

        let total = plants.len();
        let cycles: Vec<PlantCycle> = futures::stream::iter(plants)
            .map(|plant| async move {
                match self.run_single_plant(plant.id, now).await {
                    Ok(results) => PlantCycle {
                        plant_id: plant.id,
                        plant_name: plant.name,
                        results,
                        error: None,
                    },
                    Err(e) => {
                        tracing::error!(plant_id = %plant.id, error = %e, "plant cycle failed");
                        PlantCycle {
                            plant_id: plant.id,
                            plant_name: plant.name,
                            results: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let executed: usize = cycles.iter().map(|c| c.results.len()).sum();
        let failed = cycles.iter().filter(|c| c.error.is_some()).count();
        tracing::info!(plants = total, executed, failed, "cycle complete");
        Ok(cycles)
    }

    // -----------------------------------------------------------------------
    // Single plant
    // -----------------------------------------------------------------------

    /// One decision cycle. A missing or inactive plant is a no-op.
    pub async fn run_single_plant(
        &self,
        plant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionResult>> {
        self.with_plant_lock(plant_id, self.plant_cycle(plant_id, now))
            .await
    }

    async fn plant_cycle(&self, plant_id: Uuid, now: DateTime<Utc>) -> Result<Vec<ExecutionResult>> {
        let Some(plant) = self.store(move |m| m.get_plant(plant_id)).await? else {
            return Ok(Vec::new());
        };
        if !plant.is_active {
            return Ok(Vec::new());
        }

        let plant = match self.state.should_transition(&plant, now) {
            Some(next) => {
                let from = self.state.current_state(&plant);
                let days_in_previous = self.state.days_in_state(&plant, now);
                let updated = self
                    .store(move |m| {
                        let updated = m.update_plant_state(plant_id, next, now)?;
                        m.append_history(
                            plant_id,
                            events::STATE_CHANGE,
                            json!({
                                "from_state": from,
                                "to_state": next,
                                "days_in_previous_state": days_in_previous,
                            }),
                        )?;
                        Ok(updated)
                    })
                    .await?;
                tracing::info!(plant = %updated.name, %from, to = %next, "plant transitioned");
                updated
            }
            None => plant,
        };

        let weather = self
            .weather
            .get_weather(plant.latitude, plant.longitude, now.date_naive())
            .await;
        let ctx = self.build_context(&plant, &weather, now).await?;

        let mut results = Vec::new();
        let matched = self.rules.evaluate(&ctx);
        if !matched.is_empty() {
            for action in matched {
                if let Some(result) = self.validate_and_execute(&plant, action, &ctx, now).await? {
                    results.push(result);
                }
            }
        } else if let Some(advisory) = &self.advisory {
            tracing::info!(plant = %plant.name, "no rule matched, consulting advisory");
            match advisory.suggest(&ctx).await {
                Some(mut suggestion) => {
                    suggestion.source = ActionSource::Llm;
                    if let Some(result) =
                        self.validate_and_execute(&plant, suggestion, &ctx, now).await?
                    {
                        results.push(result);
                    }
                }
                None => {
                    self.record_idle_cycle(&plant, &ctx, "advisory had no suggestion")
                        .await?
                }
            }
        } else {
            self.record_idle_cycle(&plant, &ctx, "no action needed").await?;
        }

        Ok(results)
    }

    async fn record_idle_cycle(&self, plant: &Plant, ctx: &Context, message: &str) -> Result<()> {
        tracing::debug!(plant = %plant.name, "{message}");
        let plant_id = plant.id;
        let payload = json!({ "message": message, "context": ctx });
        self.store(move |m| m.append_history(plant_id, events::CYCLE, payload))
            .await?;
        Ok(())
    }

    /// `Ok(None)` when the guard rejected the action; the rejection is
    /// written to history. The quota check and the audit write share one
    /// store task.
    async fn validate_and_execute(
        &self,
        plant: &Plant,
        action: Action,
        ctx: &Context,
        now: DateTime<Utc>,
    ) -> Result<Option<ExecutionResult>> {
        let guard = self.guard.clone();
        let executor = self.executor.clone();
        let plant_id = plant.id;
        let ctx = ctx.clone();
        let proposed = action.clone();
        let outcome = self
            .store(move |m| {
                let verdict = guard.validate(&proposed, &ctx, m, plant_id, now)?;
                if !verdict.accepted {
                    m.append_history(
                        plant_id,
                        events::ACTION_BLOCKED,
                        json!({
                            "reason": verdict.reason,
                            "event": verdict.event,
                            "action": proposed,
                        }),
                    )?;
                    return Ok(Outcome::Blocked(verdict));
                }
                Ok(Outcome::Executed(executor.execute(plant_id, &proposed)))
            })
            .await?;

        match outcome {
            Outcome::Blocked(verdict) => {
                tracing::info!(plant = %plant.name, action = %action.action_type, reason = %verdict.reason, "action blocked");
                Ok(None)
            }
            Outcome::Executed(result) => {
                self.dispatch_notification(plant, &action).await;
                Ok(Some(result))
            }
        }
    }

    async fn dispatch_notification(&self, plant: &Plant, action: &Action) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let (message, priority) = match action.action_type {
            ActionType::Alert => (
                crate::notification::format_alert(&plant.name, &action.description),
                NotificationPriority::High,
            ),
            ActionType::Notify => (
                format!("{}: {}", plant.name, action.description),
                NotificationPriority::Normal,
            ),
            _ => return,
        };
        if !notifier.send(&message, priority).await {
            tracing::warn!(plant = %plant.name, "notification was not delivered");
        }
    }

    // -----------------------------------------------------------------------
    // Context
    // -----------------------------------------------------------------------

    pub async fn build_context(
        &self,
        plant: &Plant,
        weather: &Weather,
        now: DateTime<Utc>,
    ) -> Result<Context> {
        let plant_id = plant.id;
        let (since_water, since_fertilize) = self
            .store(move |m| {
                Ok((
                    m.days_since_last_action(plant_id, &ActionType::Water, now)?,
                    m.days_since_last_action(plant_id, &ActionType::Fertilize, now)?,
                ))
            })
            .await?;

        let mut ctx = Context::new();
        ctx.insert("plant_id", plant.id.to_string());
        ctx.insert("plant_name", plant.name.as_str());
        ctx.insert("plant_type", plant.plant_type.as_str());
        ctx.insert("plant_state", self.state.current_state(plant).as_str());
        ctx.insert("days_since_planting", self.state.days_since_planting(plant, now));
        ctx.insert("days_in_state", self.state.days_in_state(plant, now));
        ctx.insert("days_since_last_water", since_water);
        ctx.insert("days_since_last_fertilize", since_fertilize);
        ctx.insert("today_rainfall_mm", weather.rainfall_mm);
        ctx.insert("temp_max", weather.temp_max);
        ctx.insert("temp_min", weather.temp_min);
        ctx.insert("humidity", weather.humidity);
        ctx.insert("weather_summary", weather.summary.as_str());
        ctx.insert(
            "growing_method",
            plant.growing_method.as_deref().unwrap_or("soil"),
        );
        ctx.insert(
            "soil_condition",
            plant.soil_condition.as_deref().unwrap_or("loamy"),
        );
        Ok(ctx)
    }

    /// Context for a stored plant with live weather, without running a cycle.
    pub async fn context_for(&self, plant_id: Uuid, now: DateTime<Utc>) -> Result<Context> {
        let plant = self.require_plant(plant_id).await?;
        let weather = self
            .weather
            .get_weather(plant.latitude, plant.longitude, now.date_naive())
            .await;
        self.build_context(&plant, &weather, now).await
    }

    async fn require_plant(&self, plant_id: Uuid) -> Result<Plant> {
        self.store(move |m| m.get_plant(plant_id))
            .await?
            .ok_or_else(|| TaniclawError::PlantNotFound(plant_id.to_string()))
    }

    // -----------------------------------------------------------------------
    // Instructions and manual actions
    // -----------------------------------------------------------------------

    /// Today's instructions for a plant. Read-only: nothing is executed or
    /// recorded.
    pub async fn daily_instructions(
        &self,
        plant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<DailyInstructions> {
        let plant = self.require_plant(plant_id).await?;
        let weather = self
            .weather
            .get_weather(plant.latitude, plant.longitude, now.date_naive())
            .await;
        let ctx = self.build_context(&plant, &weather, now).await?;
        let state = self.state.current_state(&plant);

        let mut alerts = Vec::new();
        let mut instructions = Vec::new();
        for action in self.rules.evaluate(&ctx) {
            if action.action_type == ActionType::Alert {
                alerts.push(action.description);
            } else {
                instructions.push(action.description);
            }
        }
        instructions.extend(
            self.knowledge
                .stage_instructions(&plant.plant_type, state)
                .into_iter()
                .take(STAGE_INSTRUCTION_LIMIT),
        );

        Ok(DailyInstructions {
            plant_id,
            plant_name: plant.name.clone(),
            plant_type: plant.plant_type.clone(),
            plant_state: state,
            days_since_planting: self.state.days_since_planting(&plant, now),
            days_in_state: self.state.days_in_state(&plant, now),
            instructions,
            alerts,
            harvest_info: self.knowledge.harvest_info(&plant.plant_type),
            common_diseases: self
                .knowledge
                .disease_info(&plant.plant_type)
                .into_iter()
                .take(DISEASE_LIMIT)
                .map(|d| d.name)
                .collect(),
            next_state: self.state.next_state(&plant),
            watering: self.knowledge.watering_info(&plant.plant_type, state),
            fertilizer: self.knowledge.fertilizer_schedule(&plant.plant_type, state),
            weather,
        })
    }

    /// Human override: the action is marked manual, passes the guard and is
    /// executed and audited like any other.
    pub async fn execute_manual(
        &self,
        plant_id: Uuid,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult> {
        self.with_plant_lock(plant_id, self.manual_action(plant_id, action, now))
            .await
    }

    async fn manual_action(
        &self,
        plant_id: Uuid,
        mut action: Action,
        now: DateTime<Utc>,
    ) -> Result<ExecutionResult> {
        let plant = self.require_plant(plant_id).await?;
        action.source = ActionSource::Manual;
        let ctx = Context::new()
            .with("plant_id", plant.id.to_string())
            .with("plant_name", plant.name.as_str())
            .with("plant_type", plant.plant_type.as_str());

        self.validate_and_execute(&plant, action, &ctx, now)
            .await?
            .ok_or_else(|| TaniclawError::InvalidInput("manual action was rejected".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KnowledgeBase, PlantKnowledge};
    use crate::memory::{ActionRecord, HistoryEntry, NewPlant};
    use crate::store::RedbStore;
    use crate::types::ActionStatus;
    use crate::weather::StaticWeather;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const RULES: &str = r#"
rules:
  - id: water_when_dry
    name: Water when dry
    priority: 50
    conditions:
      - { field: days_since_last_water, operator: gte, value: 2 }
      - { field: today_rainfall_mm, operator: lt, value: 5 }
    action: { type: water, description: Water 300 ml at the base, amount_ml: 300 }
  - id: heat_alert
    name: Heat alert
    priority: 90
    conditions:
      - { field: temp_max, operator: gte, value: 38 }
    action: { type: alert, description: "Heatwave, shade the plant" }
  - id: flood
    name: Flood the bed
    priority: 10
    conditions:
      - { field: plant_type, operator: eq, value: chili }
    action: { type: water, description: Flood, amount_ml: 5000 }
"#;

    const CHILI: &str = r#"
plant_type: chili
lifecycle:
  stages:
    - name: vegetative
      duration_days: [10, 15]
      instructions: ["Water every morning", "Stake tall plants", "Remove weeds", "Check leaves"]
watering:
  adjust_by_stage:
    vegetative: { frequency_days: 2, amount_ml: 300 }
diseases:
  common:
    - name: Anthracnose
"#;

    struct Harness {
        _dir: TempDir,
        store: Arc<RedbStore>,
        config: Config,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = Arc::new(RedbStore::open(&dir.path().join("agent.db")).unwrap());
            Self {
                _dir: dir,
                store,
                config: Config::default(),
            }
        }

        fn agent_with(&self, memory: Arc<dyn Memory>, weather: Weather) -> Agent {
            let knowledge: PlantKnowledge = serde_yaml::from_str(CHILI).unwrap();
            Agent::new(
                &self.config,
                memory,
                Arc::new(KnowledgeBase::new([knowledge])),
                RuleSet::from_documents([("test.yaml", RULES)]),
                Arc::new(StaticWeather::new(weather)),
            )
        }

        fn agent(&self) -> Agent {
            self.agent_with(self.store.clone(), Weather::from_readings(30.0, 22.0, 70.0, 0.0))
        }

        fn plant(&self, name: &str, plant_type: &str, state: PlantState) -> Plant {
            let mut p = Plant::new(NewPlant {
                name: name.to_string(),
                plant_type: plant_type.to_string(),
                location: "yard".to_string(),
                latitude: -6.2,
                longitude: 106.8,
                plant_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                growing_method: None,
                soil_condition: None,
                notes: None,
                initial_state: state,
            });
            p.state_changed_at = Some(Utc::now());
            self.store.create_plant(&p).unwrap();
            p
        }
    }

    struct Recorder(AtomicUsize);

    #[async_trait]
    impl NotificationChannel for Recorder {
        async fn send(&self, _message: &str, _priority: NotificationPriority) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    struct FixedSuggestion(Option<Action>);

    #[async_trait]
    impl AdvisorySuggester for FixedSuggestion {
        async fn suggest(&self, _context: &Context) -> Option<Action> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn matched_rules_execute_and_unsafe_ones_are_blocked() {
        let h = Harness::new();
        let p = h.plant("chili-1", "chili", PlantState::Vegetative);
        let results = h.agent().run_single_plant(p.id, Utc::now()).await.unwrap();

        // water_when_dry passes, flood exceeds the ceiling
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].action_type, ActionType::Water);
        assert_eq!(results[0].rule_id.as_deref(), Some("water_when_dry"));

        let history = h.store.plant_history(p.id, 10).unwrap();
        assert!(history.iter().any(|e| e.event_type == events::ACTION_BLOCKED));
        assert!(history.iter().any(|e| e.event_type == events::ACTION));
        assert_eq!(h.store.list_actions(p.id, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn due_transition_is_persisted_before_rules_run() {
        let h = Harness::new();
        let mut p = h.plant("chili-2", "chili", PlantState::Vegetative);
        p.state_changed_at = Some(Utc::now() - Duration::days(20));
        h.store.update_plant(&p).unwrap();

        h.agent().run_single_plant(p.id, Utc::now()).await.unwrap();

        let reloaded = h.store.get_plant(p.id).unwrap().unwrap();
        assert_eq!(reloaded.current_state, "flowering");
        let history = h.store.plant_history(p.id, 20).unwrap();
        let change: &HistoryEntry = history
            .iter()
            .find(|e| e.event_type == events::STATE_CHANGE)
            .unwrap();
        assert_eq!(change.payload["from_state"], "vegetative");
        assert_eq!(change.payload["to_state"], "flowering");
        assert_eq!(change.payload["days_in_previous_state"], 20);
    }

    #[tokio::test]
    async fn missing_or_inactive_plant_is_a_noop() {
        let h = Harness::new();
        let agent = h.agent();
        assert!(agent
            .run_single_plant(Uuid::new_v4(), Utc::now())
            .await
            .unwrap()
            .is_empty());

        let p = h.plant("old", "chili", PlantState::Vegetative);
        h.store.deactivate_plant(p.id).unwrap();
        assert!(agent.run_single_plant(p.id, Utc::now()).await.unwrap().is_empty());
        assert!(h.store.plant_history(p.id, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn idle_cycle_writes_history() {
        let h = Harness::new();
        // tomato matches no rule once watered today
        let p = h.plant("tomato-1", "tomato", PlantState::Seed);
        let agent = h.agent();
        agent
            .execute_manual(p.id, Action::new(ActionType::Water, "hand watered"), Utc::now())
            .await
            .unwrap();

        let results = agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        assert!(results.is_empty());
        let history = h.store.plant_history(p.id, 10).unwrap();
        let idle = history
            .iter()
            .find(|e| e.event_type == events::CYCLE)
            .unwrap();
        assert_eq!(idle.payload["message"], "no action needed");
    }

    #[tokio::test]
    async fn advisory_is_consulted_only_without_matches_and_is_guarded() {
        let h = Harness::new();
        let p = h.plant("tomato-2", "tomato", PlantState::Seed);
        let forged = Action::new(ActionType::Water, "drown it")
            .with_amount_ml(3000)
            .with_source(ActionSource::Manual);

        let base = h.agent();
        base.execute_manual(p.id, Action::new(ActionType::Water, "hand watered"), Utc::now())
            .await
            .unwrap();
        let agent = base.with_advisory(Arc::new(FixedSuggestion(Some(forged))));

        // the suggestion cannot claim human override
        let results = agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        assert!(results.is_empty());
        let history = h.store.plant_history(p.id, 10).unwrap();
        let blocked = history
            .iter()
            .find(|e| e.event_type == events::ACTION_BLOCKED)
            .unwrap();
        assert_eq!(blocked.payload["action"]["source"], "llm");
    }

    #[tokio::test]
    async fn accepted_advisory_action_is_executed_as_llm() {
        let h = Harness::new();
        let p = h.plant("tomato-3", "tomato", PlantState::Seed);
        let base = h.agent();
        base.execute_manual(p.id, Action::new(ActionType::Water, "hand watered"), Utc::now())
            .await
            .unwrap();
        let agent = base.with_advisory(Arc::new(FixedSuggestion(Some(Action::new(
            ActionType::Log,
            "check for aphids",
        )))));

        let results = agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, ActionSource::Llm);
    }

    #[tokio::test]
    async fn alert_triggers_a_notification() {
        let h = Harness::new();
        let p = h.plant("chili-3", "chili", PlantState::Vegetative);
        let recorder = Arc::new(Recorder(AtomicUsize::new(0)));
        let agent = h
            .agent_with(h.store.clone(), Weather::from_readings(39.0, 25.0, 60.0, 0.0))
            .with_notifier(recorder.clone());

        let results = agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        assert_eq!(results[0].action_type, ActionType::Alert);
        assert_eq!(recorder.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_blocks_rules_but_manual_still_runs() {
        let mut h = Harness::new();
        h.config.security.max_daily_actions = 1;
        let p = h.plant("chili-4", "chili", PlantState::Vegetative);
        let agent = h.agent();

        agent
            .execute_manual(p.id, Action::new(ActionType::Log, "visited"), Utc::now())
            .await
            .unwrap();
        let results = agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        assert!(results.is_empty());

        let manual = agent
            .execute_manual(
                p.id,
                Action::new(ActionType::Water, "extra water").with_amount_ml(400),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(manual.is_ok());
        assert_eq!(manual.source, ActionSource::Manual);
    }

    #[tokio::test]
    async fn daily_instructions_split_alerts_and_add_stage_tips() {
        let h = Harness::new();
        let p = h.plant("chili-5", "chili", PlantState::Vegetative);
        let agent = h.agent_with(h.store.clone(), Weather::from_readings(39.0, 25.0, 60.0, 0.0));

        let daily = agent.daily_instructions(p.id, Utc::now()).await.unwrap();
        assert_eq!(daily.alerts, vec!["Heatwave, shade the plant".to_string()]);
        // two water rules plus the top three stage instructions
        assert_eq!(daily.instructions.len(), 5);
        assert_eq!(daily.common_diseases, vec!["Anthracnose".to_string()]);
        assert_eq!(daily.next_state, Some(PlantState::Flowering));
        assert_eq!(daily.watering.map(|w| w.amount_ml), Some(300));
        assert!(daily.fertilizer.is_empty());
        assert!(h.store.list_actions(p.id, 10).unwrap().is_empty());
    }

    // A store that fails quota lookups for one plant and reads plants slowly.
    struct Flaky {
        inner: Arc<RedbStore>,
        broken: Uuid,
        read_delay: std::time::Duration,
    }

    impl Memory for Flaky {
        fn create_plant(&self, plant: &Plant) -> Result<()> {
            self.inner.create_plant(plant)
        }
        fn get_plant(&self, id: Uuid) -> Result<Option<Plant>> {
            std::thread::sleep(self.read_delay);
            self.inner.get_plant(id)
        }
        fn list_plants(&self) -> Result<Vec<Plant>> {
            self.inner.list_plants()
        }
        fn update_plant(&self, plant: &Plant) -> Result<()> {
            self.inner.update_plant(plant)
        }
        fn update_plant_state(&self, id: Uuid, state: PlantState, at: DateTime<Utc>) -> Result<Plant> {
            self.inner.update_plant_state(id, state, at)
        }
        fn create_action_record(&self, record: &ActionRecord) -> Result<()> {
            self.inner.create_action_record(record)
        }
        fn list_actions(&self, plant_id: Uuid, limit: usize) -> Result<Vec<ActionRecord>> {
            self.inner.list_actions(plant_id, limit)
        }
        fn append_history(
            &self,
            plant_id: Uuid,
            event_type: &str,
            payload: serde_json::Value,
        ) -> Result<HistoryEntry> {
            self.inner.append_history(plant_id, event_type, payload)
        }
        fn plant_history(&self, plant_id: Uuid, limit: usize) -> Result<Vec<HistoryEntry>> {
            self.inner.plant_history(plant_id, limit)
        }
        fn today_action_count(&self, plant_id: Uuid, now: DateTime<Utc>) -> Result<u32> {
            if plant_id == self.broken {
                return Err(TaniclawError::Store("disk on fire".to_string()));
            }
            self.inner.today_action_count(plant_id, now)
        }
        fn days_since_last_action(
            &self,
            plant_id: Uuid,
            action_type: &ActionType,
            now: DateTime<Utc>,
        ) -> Result<i64> {
            self.inner.days_since_last_action(plant_id, action_type, now)
        }
        fn cached_weather(&self, lat: f64, lon: f64, date: NaiveDate) -> Result<Option<Weather>> {
            self.inner.cached_weather(lat, lon, date)
        }
        fn cache_weather(&self, lat: f64, lon: f64, date: NaiveDate, weather: &Weather) -> Result<()> {
            self.inner.cache_weather(lat, lon, date, weather)
        }
    }

    #[tokio::test]
    async fn one_failing_plant_does_not_abort_the_sweep() {
        let h = Harness::new();
        let bad = h.plant("bad", "chili", PlantState::Vegetative);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let good = h.plant("good", "chili", PlantState::Vegetative);
        let flaky = Arc::new(Flaky {
            inner: h.store.clone(),
            broken: bad.id,
            read_delay: std::time::Duration::ZERO,
        });
        let agent = h.agent_with(flaky, Weather::from_readings(30.0, 22.0, 70.0, 0.0));

        let cycles = agent.run_cycle().await.unwrap();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].plant_id, bad.id);
        assert!(cycles[0].error.as_deref().unwrap().contains("disk on fire"));
        assert_eq!(cycles[1].plant_id, good.id);
        assert!(cycles[1].error.is_none());
        assert_eq!(cycles[1].results.len(), 1);

        let records = h.store.list_actions(good.id, 10).unwrap();
        assert_eq!(records[0].status, ActionStatus::Executed);
    }

    #[tokio::test]
    async fn concurrent_cycles_for_one_plant_respect_the_quota() {
        let mut h = Harness::new();
        h.config.security.max_daily_actions = 1;
        let p = h.plant("chili-6", "chili", PlantState::Vegetative);
        let agent = h.agent();

        let now = Utc::now();
        let (a, b) = tokio::join!(
            agent.run_single_plant(p.id, now),
            agent.run_single_plant(p.id, now)
        );
        assert_eq!(a.unwrap().len() + b.unwrap().len(), 1);
        assert_eq!(h.store.today_action_count(p.id, now).unwrap(), 1);
        assert!(agent.plant_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plant_locks_are_dropped_after_use() {
        let h = Harness::new();
        let p = h.plant("chili-7", "chili", PlantState::Vegetative);
        let agent = h.agent();

        agent.run_single_plant(p.id, Utc::now()).await.unwrap();
        agent.run_single_plant(Uuid::new_v4(), Utc::now()).await.unwrap();
        let missing = agent
            .execute_manual(Uuid::new_v4(), Action::new(ActionType::Log, "hello"), Utc::now())
            .await;
        assert!(missing.is_err());
        assert!(agent.plant_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_store_reads_leave_the_runtime_free() {
        let h = Harness::new();
        let p = h.plant("chili-8", "chili", PlantState::Vegetative);
        let slow = Arc::new(Flaky {
            inner: h.store.clone(),
            broken: Uuid::nil(),
            read_delay: std::time::Duration::from_millis(200),
        });
        let agent = h.agent_with(slow, Weather::from_readings(30.0, 22.0, 70.0, 0.0));

        // single-threaded runtime: the ticker only advances while the
        // cycle is parked on the blocking pool
        let ticks = AtomicUsize::new(0);
        let ticker = async {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        };
        tokio::select! {
            _ = ticker => unreachable!(),
            results = agent.run_single_plant(p.id, Utc::now()) => {
                assert_eq!(results.unwrap().len(), 1);
            }
        }
        assert!(ticks.load(Ordering::SeqCst) >= 5, "runtime stalled during store read");
    }
}
