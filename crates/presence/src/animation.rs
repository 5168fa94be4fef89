use std::collections::HashSet;

use tracing::warn;

use crate::config::AnimationConfig;
use crate::direction::Direction;
use crate::error::SceneError;
use crate::scene::{AnimationRequest, SceneSink, VisualId};

const TIME_SCALE_EPSILON: f32 = 0.01;

pub fn compose_key(prefix: &str, animation: &str, direction: Direction) -> String {
    format!("{prefix}/{animation}_{}", direction.token())
}

/// Playback rate for the walk cycle at the observed speed.
pub fn walk_rate(config: &AnimationConfig, speed_px_per_s: f32) -> f32 {
    if !speed_px_per_s.is_finite() || config.max_reference_velocity <= 0.0 {
        return config.min_walk_rate;
    }
    let t = (speed_px_per_s / config.max_reference_velocity).clamp(0.0, 1.0);
    config.min_walk_rate + (config.max_walk_rate - config.min_walk_rate) * t
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationInput<'a> {
    pub animation: &'a str,
    pub direction: Direction,
    pub speed_px_per_s: f32,
    pub water_time_scale: f32,
}

/// Per-entity animation selection. Keeps the last pose that resolved.
#[derive(Debug, Default)]
pub struct AnimationSelector {
    custom_prefix: Option<String>,
    current: Option<AnimationRequest>,
    warned_missing_keys: HashSet<String>,
}

impl AnimationSelector {
    pub fn new(custom_prefix: Option<String>) -> Self {
        Self {
            custom_prefix,
            current: None,
            warned_missing_keys: HashSet::new(),
        }
    }

    pub fn current(&self) -> Option<&AnimationRequest> {
        self.current.as_ref()
    }

    pub fn candidate_keys(
        &self,
        config: &AnimationConfig,
        animation: &str,
        direction: Direction,
    ) -> (Option<String>, String) {
        let art = direction.visual(config.mirror_policy).art_direction;
        let custom = self
            .custom_prefix
            .as_deref()
            .map(|prefix| compose_key(prefix, animation, art));
        (custom, compose_key(&config.key_prefix, animation, art))
    }

    /// Plays the resolved animation on `visual` when it differs from the
    /// current one. Returns whether a new request was issued.
    pub fn apply(
        &mut self,
        config: &AnimationConfig,
        scene: &mut dyn SceneSink,
        visual: VisualId,
        input: &AnimationInput<'_>,
    ) -> Result<bool, SceneError> {
        let (custom_key, default_key) =
            self.candidate_keys(config, input.animation, input.direction);
        let resolved = custom_key
            .filter(|key| scene.has_animation(key))
            .or_else(|| scene.has_animation(&default_key).then(|| default_key.clone()));

        let Some(key) = resolved else {
            if self.warned_missing_keys.insert(default_key.clone()) {
                warn!(
                    key = %default_key,
                    custom_prefix = ?self.custom_prefix,
                    "animation_key_missing_keeping_last_pose"
                );
            }
            return Ok(false);
        };

        let base_rate = if input.animation == config.walk_animation {
            walk_rate(config, input.speed_px_per_s)
        } else {
            1.0
        };
        let request = AnimationRequest {
            key,
            time_scale: base_rate * input.water_time_scale,
            flip_x: input.direction.visual(config.mirror_policy).flip_x,
        };

        if let Some(current) = &self.current {
            if current.key == request.key
                && current.flip_x == request.flip_x
                && (current.time_scale - request.time_scale).abs() < TIME_SCALE_EPSILON
            {
                return Ok(false);
            }
        }

        scene.play_animation(visual, &request)?;
        self.current = Some(request);
        Ok(true)
    }
}
