//! Action execution and the audit trail.
//!
//! The executor trusts its caller: actions arrive already validated by the
//! guard. Its job is to run the handler for the action's type and to write
//! exactly one action record and one history entry per call, whether the
//! handler succeeded or not.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::action::Action;
use crate::error::Result;
use crate::memory::{events, ActionRecord, Memory};
use crate::types::{ActionSource, ActionStatus, ActionType};

/// Formats the acknowledgement payload for one action kind. Handlers do no
/// I/O; notification delivery is dispatched by the agent.
pub type Handler = fn(Uuid, &Action) -> Result<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub action_type: ActionType,
    pub description: String,
    pub source: ActionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// `None` only when the action record could not be written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    /// Mark failed, keeping any handler error ahead of `reason`.
    fn fail(&mut self, reason: String) {
        self.status = ExecutionStatus::Error;
        self.error = Some(match self.error.take() {
            Some(prev) => format!("{prev}; {reason}"),
            None => reason,
        });
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn water(plant_id: Uuid, action: &Action) -> Result<Value> {
    let amount_ml = action.amount_ml.unwrap_or(200);
    tracing::info!(plant_id = %plant_id, amount_ml, "water: {}", action.description);
    Ok(json!({ "amount_ml": amount_ml, "instruction": action.description }))
}

fn skip_water(plant_id: Uuid, action: &Action) -> Result<Value> {
    tracing::info!(plant_id = %plant_id, "skip watering: {}", action.description);
    Ok(json!({ "skipped": true, "reason": action.description }))
}

fn fertilize(plant_id: Uuid, action: &Action) -> Result<Value> {
    let amount_grams = action.amount_grams.unwrap_or(5);
    let fertilizer_type = action.fertilizer_type.as_deref().unwrap_or("NPK");
    tracing::info!(plant_id = %plant_id, amount_grams, fertilizer_type, "fertilize");
    Ok(json!({
        "amount_grams": amount_grams,
        "fertilizer_type": fertilizer_type,
        "instruction": action.description,
    }))
}

fn harvest(plant_id: Uuid, action: &Action) -> Result<Value> {
    tracing::info!(plant_id = %plant_id, "harvest: {}", action.description);
    Ok(json!({ "instruction": action.description, "harvest_triggered": true }))
}

fn notify(plant_id: Uuid, action: &Action) -> Result<Value> {
    tracing::info!(plant_id = %plant_id, "notify: {}", action.description);
    Ok(json!({ "message": action.description, "priority": "normal" }))
}

fn alert(plant_id: Uuid, action: &Action) -> Result<Value> {
    tracing::warn!(plant_id = %plant_id, "alert: {}", action.description);
    Ok(json!({ "message": action.description, "priority": "high" }))
}

fn log(plant_id: Uuid, action: &Action) -> Result<Value> {
    let message = if action.description.is_empty() {
        "daily cycle completed"
    } else {
        action.description.as_str()
    };
    tracing::info!(plant_id = %plant_id, "log: {message}");
    Ok(json!({ "logged": true, "message": message }))
}

// ---------------------------------------------------------------------------
// ToolExecutor
// ---------------------------------------------------------------------------

pub struct ToolExecutor {
    memory: Arc<dyn Memory>,
    handlers: HashMap<ActionType, Handler>,
}

impl ToolExecutor {
    pub fn new(memory: Arc<dyn Memory>) -> Self {
        let mut handlers: HashMap<ActionType, Handler> = HashMap::new();
        handlers.insert(ActionType::Water, water);
        handlers.insert(ActionType::SkipWater, skip_water);
        handlers.insert(ActionType::Fertilize, fertilize);
        handlers.insert(ActionType::Harvest, harvest);
        handlers.insert(ActionType::Notify, notify);
        handlers.insert(ActionType::Alert, alert);
        handlers.insert(ActionType::Log, log);
        Self { memory, handlers }
    }

    /// Replace the handler for one action type.
    pub fn register(&mut self, action_type: ActionType, handler: Handler) {
        self.handlers.insert(action_type, handler);
    }

    /// Run the handler and record the attempt. Unknown types use the log
    /// handler. Never fails; handler and store errors land in the result.
    pub fn execute(&self, plant_id: Uuid, action: &Action) -> ExecutionResult {
        let handler = self
            .handlers
            .get(&action.action_type)
            .copied()
            .unwrap_or(log as Handler);

        let outcome = handler(plant_id, action);
        let now = Utc::now();
        let (status, record_status, output, error) = match outcome {
            Ok(output) => (ExecutionStatus::Ok, ActionStatus::Executed, output, None),
            Err(e) => {
                tracing::error!(plant_id = %plant_id, action = %action.action_type, error = %e, "handler failed");
                (ExecutionStatus::Error, ActionStatus::Skipped, Value::Null, Some(e.to_string()))
            }
        };

        let record = ActionRecord {
            id: Uuid::new_v4(),
            plant_id,
            action_type: action.action_type.clone(),
            description: action.description.clone(),
            source: action.source,
            status: record_status,
            amount_ml: action.amount_ml,
            amount_grams: action.amount_grams,
            rule_id: action.rule_id.clone(),
            created_at: now,
            executed_at: (record_status == ActionStatus::Executed).then_some(now),
        };

        let mut result = ExecutionResult {
            status,
            action_type: action.action_type.clone(),
            description: action.description.clone(),
            source: action.source,
            rule_id: action.rule_id.clone(),
            action_id: Some(record.id),
            output,
            error,
        };

        if let Err(e) = self.memory.create_action_record(&record) {
            tracing::error!(plant_id = %plant_id, action = %action.action_type, error = %e, "failed to write action record");
            result.action_id = None;
            result.fail(format!("audit write failed: {e}"));
            return result;
        }
        let payload = history_payload(&record, &result);
        if let Err(e) = self.memory.append_history(plant_id, events::ACTION, payload) {
            tracing::error!(plant_id = %plant_id, action_id = %record.id, error = %e, "failed to write action history");
            result.fail(format!("history write failed: {e}"));
        }
        result
    }
}

fn history_payload(record: &ActionRecord, result: &ExecutionResult) -> Value {
    let mut payload = json!({
        "action_id": record.id,
        "action_type": record.action_type,
        "description": record.description,
        "source": record.source,
        "status": record.status,
    });
    if let Some(rule_id) = &record.rule_id {
        payload["rule_id"] = json!(rule_id);
    }
    match &result.error {
        Some(err) => payload["error"] = json!(err),
        None => payload["result"] = result.output.clone(),
    }
    payload
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
