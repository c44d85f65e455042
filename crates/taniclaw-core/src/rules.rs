//! Declarative rule engine.
//!
//! Rules are data: a priority, an AND-combined list of `field operator value`
//! conditions, and an action template. Rule documents are YAML files of the
//! form `rules: [ ... ]`; all documents are merged into one `RuleSet` held in
//! descending priority order (stable, so ties keep document order).
//!
//! Evaluation is a pure function of `(RuleSet, Context)`: every rule is
//! checked, and one `Action` is produced per matching rule.

use crate::action::Action;
use crate::context::{Context, Scalar};
use crate::error::{Result, TaniclawError};
use crate::types::{ActionSource, ActionType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    /// Kept rather than rejected at load time; always evaluates false.
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Contains => "contains",
            Operator::Unknown(s) => s,
        }
    }
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "in" => Operator::In,
            "not_in" => Operator::NotIn,
            "contains" => Operator::Contains,
            _ => Operator::Unknown(s),
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    List(Vec<Scalar>),
    Scalar(Scalar),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: &str, value: ConditionValue) -> Self {
        Self {
            field: field.into(),
            operator: Operator::from(operator.to_string()),
            value,
        }
    }

    /// A field absent from the context is false under every operator.
    pub fn evaluate(&self, ctx: &Context) -> bool {
        let Some(actual) = ctx.get(&self.field) else {
            return false;
        };
        match &self.operator {
            Operator::Eq => self.equals(actual),
            Operator::Neq => !self.equals(actual),
            Operator::Gt => self.ordering(actual) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                self.ordering(actual),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => self.ordering(actual) == Some(Ordering::Less),
            Operator::Lte => matches!(
                self.ordering(actual),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::In => self.member(actual),
            Operator::NotIn => !self.member(actual),
            Operator::Contains => match &self.value {
                ConditionValue::Scalar(needle) => {
                    actual.to_string().contains(&needle.to_string())
                }
                ConditionValue::List(_) => false,
            },
            Operator::Unknown(op) => {
                tracing::warn!(field = %self.field, operator = %op, "unknown rule operator");
                false
            }
        }
    }

    fn equals(&self, actual: &Scalar) -> bool {
        match &self.value {
            ConditionValue::Scalar(v) => actual.loose_eq(v),
            ConditionValue::List(_) => false,
        }
    }

    fn ordering(&self, actual: &Scalar) -> Option<Ordering> {
        match &self.value {
            ConditionValue::Scalar(v) => actual.loose_cmp(v),
            ConditionValue::List(_) => None,
        }
    }

    fn member(&self, actual: &Scalar) -> bool {
        match &self.value {
            ConditionValue::List(items) => items.iter().any(|v| actual.loose_eq(v)),
            ConditionValue::Scalar(v) => actual.loose_eq(v),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: ActionTemplate,
}

fn default_priority() -> i64 {
    10
}

impl Rule {
    /// AND over all conditions. A rule with no conditions is inert.
    pub fn matches(&self, ctx: &Context) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.evaluate(ctx))
    }

    pub fn instantiate(&self) -> Action {
        Action {
            action_type: self.action.action_type.clone(),
            description: self.action.description.clone(),
            amount_ml: self.action.amount_ml,
            amount_grams: self.action.amount_grams,
            fertilizer_type: self.action.fertilizer_type.clone(),
            source: ActionSource::Rules,
            rule_id: Some(self.id.clone()),
            rule_name: Some(self.name.clone()),
            priority: Some(self.priority),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    rules: Vec<Rule>,
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<Rule>) -> Self {
        // sort_by is stable: equal priorities keep load order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Parse a single YAML rule document.
    pub fn parse_document(name: &str, text: &str) -> Result<Vec<Rule>> {
        let doc: RuleDocument =
            serde_yaml::from_str(text).map_err(|e| TaniclawError::RuleDocument {
                path: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(doc.rules)
    }

    /// Merge `(name, yaml)` documents in order. Malformed documents are
    /// skipped and logged; the rest still load.
    pub fn from_documents<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut all = Vec::new();
        for (name, text) in docs {
            match Self::parse_document(name, text) {
                Ok(rules) => {
                    tracing::debug!(document = name, count = rules.len(), "loaded rules");
                    all.extend(rules);
                }
                Err(e) => tracing::error!(error = %e, "skipping malformed rule document"),
            }
        }
        let set = Self::new(all);
        set.warn_duplicate_ids();
        set
    }

    /// Load every `*.yaml` / `*.yml` file in `dir`, in file-name order.
    /// A missing directory yields an empty rule set.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            tracing::warn!(dir = %dir.display(), "rules directory not found; no rules loaded");
            return Ok(Self::default());
        }
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in &paths {
            match std::fs::read_to_string(path) {
                Ok(text) => docs.push((path.display().to_string(), text)),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "cannot read rule document")
                }
            }
        }
        let set = Self::from_documents(docs.iter().map(|(n, t)| (n.as_str(), t.as_str())));
        tracing::info!(count = set.len(), "rules engine loaded");
        Ok(set)
    }

    /// Every matching rule's action, in rule-set order.
    pub fn evaluate(&self, ctx: &Context) -> Vec<Action> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(ctx))
            .map(|rule| {
                tracing::debug!(rule_id = %rule.id, action_type = %rule.action.action_type, "rule matched");
                rule.instantiate()
            })
            .collect()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn warn_duplicate_ids(&self) {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                tracing::warn!(rule_id = %rule.id, "duplicate rule id");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
