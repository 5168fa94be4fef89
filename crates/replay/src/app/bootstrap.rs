use std::path::PathBuf;

use presence::{ConfigError, PresenceConfig, RegionMap, WaterTilemap};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scenario::{Scenario, ScenarioError};

pub(crate) const CONFIG_ENV_VAR: &str = "PRESENCE_CONFIG";
pub(crate) const SCENARIO_ENV_VAR: &str = "PRESENCE_SCENARIO";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error("no scenario given: pass its path as the first argument or set PRESENCE_SCENARIO")]
    MissingScenario,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplayPaths {
    pub(crate) scenario: PathBuf,
    pub(crate) config: Option<PathBuf>,
}

pub(crate) struct AppWiring {
    pub(crate) config: PresenceConfig,
    pub(crate) scenario: Scenario,
    pub(crate) water: Option<WaterTilemap>,
    pub(crate) occlusion: RegionMap,
}

pub(crate) fn build_app(args: &[String]) -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Presence Replay Startup ===");

    let paths = resolve_paths(
        args,
        std::env::var(SCENARIO_ENV_VAR).ok(),
        std::env::var(CONFIG_ENV_VAR).ok(),
    )?;
    let config = match &paths.config {
        Some(path) => PresenceConfig::load(path)?,
        None => PresenceConfig::default(),
    };
    let scenario = Scenario::load(&paths.scenario)?;
    let water = scenario.water_map()?;
    let occlusion = scenario.occlusion.clone();
    let config_source = paths
        .config
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    info!(
        scenario = %paths.scenario.display(),
        config = %config_source,
        events = scenario.events.len(),
        duration_ms = scenario.duration_ms,
        water = water.is_some(),
        occlusion_regions = occlusion.region_count(),
        "replay_config"
    );

    Ok(AppWiring {
        config,
        scenario,
        water,
        occlusion,
    })
}

/// Positional arguments win over the environment: `<scenario> [config]`.
pub(crate) fn resolve_paths(
    args: &[String],
    scenario_env: Option<String>,
    config_env: Option<String>,
) -> Result<ReplayPaths, BootstrapError> {
    let non_empty = |value: Option<String>| value.filter(|raw| !raw.trim().is_empty());
    let scenario = args
        .first()
        .cloned()
        .or_else(|| non_empty(scenario_env))
        .map(PathBuf::from)
        .ok_or(BootstrapError::MissingScenario)?;
    let config = args
        .get(1)
        .cloned()
        .or_else(|| non_empty(config_env))
        .map(PathBuf::from);
    Ok(ReplayPaths { scenario, config })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
