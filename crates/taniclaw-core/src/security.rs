//! Action validation. Every automated action passes through
//! [`SecurityGuard::validate`] before it reaches the executor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::action::Action;
use crate::config::SecurityConfig;
use crate::context::Context;
use crate::error::Result;
use crate::memory::Memory;
use crate::types::ActionType;

pub const REASON_HUMAN_OVERRIDE: &str = "human_override";
pub const REASON_OK: &str = "ok";

/// Security event types, logged under the `taniclaw::security` target.
pub mod events {
    pub const BLOCKED_UNKNOWN_TYPE: &str = "blocked_unknown_type";
    pub const BLOCKED_DAILY_LIMIT: &str = "blocked_daily_limit";
    pub const BLOCKED_WATERING_LIMIT: &str = "blocked_watering_limit";
    pub const BLOCKED_FERTILIZER_LIMIT: &str = "blocked_fertilizer_limit";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: String,
    /// Set on rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'static str>,
}

impl Verdict {
    fn accept(reason: &str) -> Self {
        Self {
            accepted: true,
            reason: reason.to_string(),
            event: None,
        }
    }

    fn reject(event: &'static str, reason: String) -> Self {
        Self {
            accepted: false,
            reason,
            event: Some(event),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGuard {
    config: SecurityConfig,
}

impl SecurityGuard {
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Checks run in order and stop at the first rejection: human override,
    /// type allow-list, daily quota, watering ceiling, fertilizer ceiling.
    ///
    /// Only a failed quota lookup is an error.
    pub fn validate(
        &self,
        action: &Action,
        context: &Context,
        memory: &dyn Memory,
        plant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        if action.is_human_override() {
            tracing::info!(plant_id = %plant_id, action = %action.action_type, "human override accepted");
            return Ok(Verdict::accept(REASON_HUMAN_OVERRIDE));
        }

        let verdict = self.check(action, memory, plant_id, now)?;
        if let Some(event) = verdict.event {
            tracing::warn!(
                target: "taniclaw::security",
                event,
                plant_id = %plant_id,
                plant_name = context.get_str("plant_name").unwrap_or(""),
                action = %action.action_type,
                source = %action.source,
                reason = %verdict.reason,
                "action blocked"
            );
        }
        Ok(verdict)
    }

    fn check(
        &self,
        action: &Action,
        memory: &dyn Memory,
        plant_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Verdict> {
        if !action.action_type.is_allowed() {
            return Ok(Verdict::reject(
                events::BLOCKED_UNKNOWN_TYPE,
                format!("unknown action type '{}'", action.action_type),
            ));
        }

        let today = memory.today_action_count(plant_id, now)?;
        if today >= self.config.max_daily_actions {
            return Ok(Verdict::reject(
                events::BLOCKED_DAILY_LIMIT,
                format!(
                    "daily limit exceeded ({today}/{} actions today)",
                    self.config.max_daily_actions
                ),
            ));
        }

        match action.action_type {
            ActionType::Water => {
                let ceiling = self.config.watering_ceiling_ml();
                let amount = action.amount_ml.unwrap_or(0);
                if amount > ceiling {
                    return Ok(Verdict::reject(
                        events::BLOCKED_WATERING_LIMIT,
                        format!("watering amount {amount} ml exceeds maximum of {ceiling} ml"),
                    ));
                }
            }
            ActionType::Fertilize => {
                let ceiling = self.config.fertilizer_ceiling_grams();
                let amount = action.amount_grams.unwrap_or(0);
                if amount > ceiling {
                    return Ok(Verdict::reject(
                        events::BLOCKED_FERTILIZER_LIMIT,
                        format!("fertilizer amount {amount} g exceeds maximum of {ceiling} g"),
                    ));
                }
            }
            _ => {}
        }

        Ok(Verdict::accept(REASON_OK))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
