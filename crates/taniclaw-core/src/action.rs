//! The concrete care instruction that flows from a rule match (or an advisory
//! suggestion, or a human) through the guard into the executor.

use crate::types::{ActionSource, ActionType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_ml: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_grams: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fertilizer_type: Option<String>,
    #[serde(default)]
    pub source: ActionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

impl Action {
    pub fn new(action_type: impl Into<ActionType>, description: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            description: description.into(),
            amount_ml: None,
            amount_grams: None,
            fertilizer_type: None,
            source: ActionSource::Rules,
            rule_id: None,
            rule_name: None,
            priority: None,
        }
    }

    pub fn with_amount_ml(mut self, ml: u32) -> Self {
        self.amount_ml = Some(ml);
        self
    }

    pub fn with_amount_grams(mut self, grams: u32) -> Self {
        self.amount_grams = Some(grams);
        self
    }

    pub fn with_source(mut self, source: ActionSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_human_override(&self) -> bool {
        self.source == ActionSource::Manual
    }
}
