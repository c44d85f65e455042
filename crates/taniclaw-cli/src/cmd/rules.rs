use crate::app;
use crate::output::{or_dash, print_json, print_table};
use anyhow::Context as _;
use chrono::Utc;
use clap::Subcommand;
use std::path::Path;
use taniclaw_core::{
    action::Action,
    context::Context,
    rules::{ConditionValue, Rule},
};

#[derive(Subcommand)]
pub enum RulesSubcommand {
    /// List loaded rules in evaluation order
    List,
    /// Dry-run the rule set against a context; nothing is executed
    Eval {
        /// Context as a JSON object, e.g. '{"days_since_last_water": 3}'
        #[arg(long, conflicts_with = "plant")]
        context: Option<String>,
        /// Build the live context for a stored plant instead
        #[arg(long)]
        plant: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: RulesSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RulesSubcommand::List => list(root, json),
        RulesSubcommand::Eval { context, plant } => eval(root, context, plant, json),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let rules = app::load_rules(root)?;
    if json {
        return print_json(&rules.rules());
    }
    if rules.is_empty() {
        println!("No rules loaded.");
        return Ok(());
    }
    let rows = rules
        .rules()
        .iter()
        .map(|r| {
            vec![
                r.priority.to_string(),
                r.id.clone(),
                r.action.action_type.to_string(),
                describe_conditions(r),
            ]
        })
        .collect();
    print_table(&["PRIORITY", "ID", "ACTION", "WHEN"], rows);
    Ok(())
}

fn describe_conditions(rule: &Rule) -> String {
    rule.conditions
        .iter()
        .map(|c| format!("{} {} {}", c.field, c.operator, condition_value(&c.value)))
        .collect::<Vec<_>>()
        .join(" and ")
}

fn condition_value(value: &ConditionValue) -> String {
    match value {
        ConditionValue::Scalar(s) => s.to_string(),
        ConditionValue::List(items) => format!(
            "[{}]",
            items.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ")
        ),
    }
}

// ---------------------------------------------------------------------------
// eval
// ---------------------------------------------------------------------------

fn eval(
    root: &Path,
    context: Option<String>,
    plant: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (rules, ctx) = match (context, plant) {
        (Some(raw), _) => {
            let ctx: Context = serde_json::from_str(&raw)
                .context("--context must be a JSON object of scalar fields")?;
            (app::load_rules(root)?, ctx)
        }
        (None, Some(raw_id)) => {
            let config = app::load_config(root)?;
            let agent = app::build_agent(root, &config)?;
            let id = app::parse_plant_id(&raw_id)?;
            let ctx = app::runtime()?
                .block_on(agent.context_for(id, Utc::now()))
                .with_context(|| format!("failed to build context for plant {id}"))?;
            (agent.rules().clone(), ctx)
        }
        (None, None) => anyhow::bail!("pass --context JSON or --plant ID"),
    };

    let actions = rules.evaluate(&ctx);
    if json {
        let value = serde_json::json!({ "context": ctx, "actions": actions });
        return print_json(&value);
    }
    print_matches(&actions);
    Ok(())
}

fn print_matches(actions: &[Action]) {
    if actions.is_empty() {
        println!("No rule matched.");
        return;
    }
    let rows = actions
        .iter()
        .map(|a| {
            vec![
                or_dash(a.priority),
                or_dash(a.rule_id.as_deref()),
                a.action_type.to_string(),
                amount(a),
                a.description.clone(),
            ]
        })
        .collect();
    print_table(&["PRIORITY", "RULE", "ACTION", "AMOUNT", "DESCRIPTION"], rows);
}

fn amount(action: &Action) -> String {
    match (action.amount_ml, action.amount_grams) {
        (Some(ml), _) => format!("{ml} ml"),
        (None, Some(g)) => format!("{g} g"),
        (None, None) => "-".to_string(),
    }
}
