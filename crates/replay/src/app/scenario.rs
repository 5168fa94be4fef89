use std::fs;
use std::path::{Path, PathBuf};

use presence::animation::compose_key;
use presence::config::AnimationConfig;
use presence::{Direction, RegionMap, ServerMessage, TileSize, TilemapError, Vec2, WaterTilemap};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TICK_MS: f64 = 1000.0 / 60.0;
const DEFAULT_MAX_TICKS_PER_FRAME: u32 = 5;
const DEFAULT_SNAPSHOT_INTERVAL_MS: f64 = 1_000.0;

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("failed to read scenario file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid water layer: {0}")]
    Water(#[from] TilemapError),
    #[error("invalid scenario value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WaterLayer {
    pub(crate) rows: Vec<String>,
    #[serde(default)]
    pub(crate) origin: Vec2,
    pub(crate) tile_size: TileSize,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TimedMessage {
    pub(crate) at_ms: f64,
    pub(crate) message: ServerMessage,
}

/// Scripted replay: timed server messages against a fixed world.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Scenario {
    #[serde(default)]
    pub(crate) seed: u64,
    pub(crate) duration_ms: f64,
    #[serde(default = "default_tick_ms")]
    pub(crate) tick_ms: f64,
    /// Simulated render frame length; defaults to `tick_ms`.
    #[serde(default)]
    pub(crate) frame_ms: Option<f64>,
    #[serde(default = "default_max_ticks_per_frame")]
    pub(crate) max_ticks_per_frame: u32,
    #[serde(default = "default_snapshot_interval_ms")]
    pub(crate) snapshot_interval_ms: f64,
    #[serde(default)]
    pub(crate) local_session_id: Option<String>,
    /// Semantic animation names loaded for every facing.
    #[serde(default)]
    pub(crate) animations: Vec<String>,
    #[serde(default)]
    pub(crate) missing_textures: Vec<String>,
    #[serde(default)]
    pub(crate) water: Option<WaterLayer>,
    #[serde(default)]
    pub(crate) occlusion: RegionMap,
    #[serde(default)]
    pub(crate) events: Vec<TimedMessage>,
}

fn default_tick_ms() -> f64 {
    DEFAULT_TICK_MS
}

fn default_max_ticks_per_frame() -> u32 {
    DEFAULT_MAX_TICKS_PER_FRAME
}

fn default_snapshot_interval_ms() -> f64 {
    DEFAULT_SNAPSHOT_INTERVAL_MS
}

impl Scenario {
    pub(crate) fn from_json_str(raw: &str) -> Result<Self, ScenarioError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let mut scenario: Scenario = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| {
                let path = error.path().to_string();
                ScenarioError::Parse {
                    path,
                    source: error.into_inner(),
                }
            })?;
        scenario.validate()?;
        scenario
            .events
            .sort_by(|left, right| left.at_ms.total_cmp(&right.at_ms));
        Ok(scenario)
    }

    pub(crate) fn load(path: &Path) -> Result<Self, ScenarioError> {
        let raw = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ScenarioError> {
        check_positive("tick_ms", self.tick_ms)?;
        check_positive("snapshot_interval_ms", self.snapshot_interval_ms)?;
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            return Err(ScenarioError::Invalid {
                field: "duration_ms",
                reason: format!("must be a non-negative number, got {}", self.duration_ms),
            });
        }
        if let Some(frame_ms) = self.frame_ms {
            check_positive("frame_ms", frame_ms)?;
        }
        if self.max_ticks_per_frame == 0 {
            return Err(ScenarioError::Invalid {
                field: "max_ticks_per_frame",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(event) = self.events.iter().find(|event| !event.at_ms.is_finite()) {
            return Err(ScenarioError::Invalid {
                field: "events.at_ms",
                reason: format!("non-finite timestamp for {}", event.message.kind()),
            });
        }
        Ok(())
    }

    pub(crate) fn frame_ms(&self) -> f64 {
        self.frame_ms.unwrap_or(self.tick_ms)
    }

    pub(crate) fn water_map(&self) -> Result<Option<WaterTilemap>, ScenarioError> {
        match &self.water {
            Some(layer) => Ok(Some(WaterTilemap::from_rows(
                layer.rows.as_slice(),
                layer.origin,
                layer.tile_size,
            )?)),
            None => Ok(None),
        }
    }

    /// Every `<prefix>/<animation>_<facing>` key the scene should report as loaded.
    pub(crate) fn animation_keys(&self, config: &AnimationConfig) -> Vec<String> {
        self.animations
            .iter()
            .flat_map(|animation| {
                Direction::ALL
                    .iter()
                    .map(move |direction| compose_key(&config.key_prefix, animation, *direction))
            })
            .collect()
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ScenarioError::Invalid {
            field,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}
