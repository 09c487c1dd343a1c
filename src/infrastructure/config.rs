// Configuration loading: server settings and the dashboard definition
use crate::domain::dashboard::DashboardDefinition;
use crate::domain::error::DashboardError;
use crate::domain::source::Locator;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub sources: SourceSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    /// SQLite file backing query sources; query cards fail validation without it
    pub database: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub fetch_timeout_secs: u64,
}

impl SourceSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/settings").required(false))
        .add_source(config::Environment::with_prefix("DASHBOARD").separator("__"));
    settings_from(builder)
}

fn settings_from(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> anyhow::Result<Settings> {
    let settings = builder
        .set_default("server.bind", "0.0.0.0:8080")?
        .set_default("sources.data_dir", "data")?
        .set_default("sources.fetch_timeout_secs", 10)?
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboard_definition(settings: &Settings) -> anyhow::Result<DashboardDefinition> {
    let source = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .build()?;
    definition_from(source, settings)
}

fn definition_from(
    source: config::Config,
    settings: &Settings,
) -> anyhow::Result<DashboardDefinition> {
    let definition: DashboardDefinition = source.try_deserialize()?;
    let definition = definition.prepare()?;
    check_query_sources(&definition, settings)?;
    Ok(definition)
}

fn check_query_sources(
    definition: &DashboardDefinition,
    settings: &Settings,
) -> Result<(), DashboardError> {
    if settings.sources.database.is_some() {
        return Ok(());
    }
    match definition
        .cards()
        .find(|card| matches!(card.source.locator, Locator::Query { .. }))
    {
        Some(card) => Err(DashboardError::configuration(format!(
            "card {}: query source but no sources.database configured",
            card.id
        ))),
        None => Ok(()),
    }
}
