//! Wiring shared by the commands: config, store and a fully assembled agent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use taniclaw_core::{
    advisory::ChatCompletionsSuggester,
    agent::Agent,
    config::Config,
    knowledge::KnowledgeBase,
    memory::{Memory, Plant},
    notification::Notifier,
    paths,
    rules::RuleSet,
    store::RedbStore,
    weather::{OpenMeteoClient, StaticWeather, WeatherProvider},
};
use uuid::Uuid;

pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load(root).context("failed to load config")
}

/// How long a command waits for a running sweep to release the store.
const STORE_WAIT: Duration = Duration::from_secs(60);

pub fn open_store(root: &Path) -> anyhow::Result<Arc<RedbStore>> {
    let path = paths::db_path(root);
    let store = RedbStore::open_waiting(&path, STORE_WAIT)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    Ok(Arc::new(store))
}

pub fn load_rules(root: &Path) -> anyhow::Result<RuleSet> {
    RuleSet::load_dir(&paths::rules_dir(root)).context("failed to load rules")
}

/// Agent with every collaborator the config turns on.
pub fn build_agent(root: &Path, config: &Config) -> anyhow::Result<Agent> {
    let store = open_store(root)?;
    let memory: Arc<dyn Memory> = store;
    let knowledge = KnowledgeBase::load_dir(&paths::knowledge_dir(root))
        .context("failed to load plant knowledge")?;
    let rules = load_rules(root)?;

    let weather: Arc<dyn WeatherProvider> = if config.weather.enabled {
        Arc::new(
            OpenMeteoClient::new(&config.weather, memory.clone())
                .context("failed to build weather client")?,
        )
    } else {
        tracing::info!("weather disabled, using safe defaults");
        Arc::new(StaticWeather::default())
    };

    let notifier =
        Notifier::new(config.notification.clone()).context("failed to build notifier")?;
    let mut agent = Agent::new(config, memory, Arc::new(knowledge), rules, weather)
        .with_notifier(Arc::new(notifier));

    if let Some(suggester) =
        ChatCompletionsSuggester::from_config(&config.llm).context("failed to build advisory")?
    {
        agent = agent.with_advisory(Arc::new(suggester));
    }
    Ok(agent)
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

pub fn parse_plant_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("'{raw}' is not a plant id"))
}

pub fn require_plant(memory: &dyn Memory, id: Uuid) -> anyhow::Result<Plant> {
    memory
        .get_plant(id)?
        .ok_or_else(|| anyhow::anyhow!("plant not found: {id}"))
}
