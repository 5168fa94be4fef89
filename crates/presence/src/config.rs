use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::direction::MirrorPolicy;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub interpolation: InterpolationConfig,
    pub animation: AnimationConfig,
    pub depth: DepthConfig,
    pub afk: AfkConfig,
    pub overlay: OverlayConfig,
    pub spawn_effect: SpawnEffectConfig,
    pub submersion: SubmersionConfig,
    pub splash: SplashConfig,
    pub footprints: FootprintConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    pub smoothing_fraction: f32,
    pub snap_epsilon_px: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            smoothing_fraction: 0.25,
            snap_epsilon_px: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub key_prefix: String,
    pub mirror_policy: MirrorPolicy,
    pub walk_animation: String,
    pub min_walk_rate: f32,
    pub max_walk_rate: f32,
    pub max_reference_velocity: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            key_prefix: "avatar".to_string(),
            mirror_policy: MirrorPolicy::default(),
            walk_animation: "walk".to_string(),
            min_walk_rate: 0.6,
            max_walk_rate: 1.6,
            max_reference_velocity: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub base_depth: f32,
    pub foot_y_scale: f32,
    pub occluded_offset: f32,
    pub elevated_front_offset: f32,
    pub occlusion_tolerance_px: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            base_depth: 10.0,
            foot_y_scale: 0.0001,
            occluded_offset: 1.0,
            elevated_front_offset: 0.5,
            occlusion_tolerance_px: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfkConfig {
    pub afk_alpha: f32,
    pub fade_fraction_per_tick: f32,
    pub reference_tick_ms: f64,
    /// Applies the fade fraction once per tick regardless of tick length.
    pub fade_per_tick_unscaled: bool,
    pub ghost_delay_ms: f64,
    pub standard_window_ms: f64,
    pub premium_window_ms: f64,
}

impl Default for AfkConfig {
    fn default() -> Self {
        Self {
            afk_alpha: 0.4,
            fade_fraction_per_tick: 0.05,
            reference_tick_ms: 1000.0 / 60.0,
            fade_per_tick_unscaled: false,
            ghost_delay_ms: 60_000.0,
            standard_window_ms: 240_000.0,
            premium_window_ms: 900_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub chat_duration_ms: f64,
    pub activity_duration_ms: f64,
    pub fade_ms: f64,
    pub nameplate_gap_px: f32,
    pub bubble_gap_px: f32,
    pub default_nameplate_height_px: f32,
    pub menu_icon: String,
    pub typing_icon: String,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            chat_duration_ms: 5_000.0,
            activity_duration_ms: 3_000.0,
            fade_ms: 300.0,
            nameplate_gap_px: 4.0,
            bubble_gap_px: 6.0,
            default_nameplate_height_px: 12.0,
            menu_icon: "icons/menu".to_string(),
            typing_icon: "icons/typing".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnEffectConfig {
    pub particle_count: usize,
    pub duration_ms: f64,
    pub scatter_min_px: f32,
    pub scatter_max_px: f32,
    pub spawn_max_delay: f32,
    pub despawn_max_delay: f32,
    pub particle_size_min: f32,
    pub particle_size_max: f32,
    pub default_bounds_width: f32,
    pub default_bounds_height: f32,
}

impl Default for SpawnEffectConfig {
    fn default() -> Self {
        Self {
            particle_count: 40,
            duration_ms: 800.0,
            scatter_min_px: 80.0,
            scatter_max_px: 140.0,
            spawn_max_delay: 0.3,
            despawn_max_delay: 0.2,
            particle_size_min: 2.0,
            particle_size_max: 4.0,
            default_bounds_width: 32.0,
            default_bounds_height: 48.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmersionConfig {
    pub sample_interval_ms: f64,
    pub max_depth: f32,
    pub slowdown_start: f32,
    pub min_speed_multiplier: f32,
    pub depth_smoothing: f32,
    pub max_sink_px: f32,
}

impl Default for SubmersionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 100.0,
            max_depth: 3.0,
            slowdown_start: 1.0,
            min_speed_multiplier: 0.4,
            depth_smoothing: 0.15,
            max_sink_px: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplashConfig {
    pub max_splash_depth: f32,
    pub min_speed_px: f32,
    pub max_speed_px: f32,
    pub min_particles: u32,
    pub max_particles: u32,
    pub min_droplet_speed_px: f32,
    pub max_droplet_speed_px: f32,
    pub min_alpha: f32,
    pub max_alpha: f32,
    pub min_lifespan_ms: f64,
    pub max_lifespan_ms: f64,
    pub min_cooldown_ms: f64,
    pub max_cooldown_ms: f64,
    pub gravity_px_per_s2: f32,
}

impl Default for SplashConfig {
    fn default() -> Self {
        Self {
            max_splash_depth: 1.0,
            min_speed_px: 20.0,
            max_speed_px: 200.0,
            min_particles: 3,
            max_particles: 10,
            min_droplet_speed_px: 20.0,
            max_droplet_speed_px: 90.0,
            min_alpha: 0.35,
            max_alpha: 0.8,
            min_lifespan_ms: 250.0,
            max_lifespan_ms: 600.0,
            min_cooldown_ms: 80.0,
            max_cooldown_ms: 300.0,
            gravity_px_per_s2: 300.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintConfig {
    pub min_wet_ms: f64,
    pub max_wet_ms: f64,
    pub wet_time_factor: f64,
    pub min_spacing_px: f32,
    pub interval_ms: f64,
    pub mark_lifetime_ms: f64,
    pub side_offset_px: f32,
    pub min_speed_px: f32,
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self {
            min_wet_ms: 500.0,
            max_wet_ms: 3_000.0,
            wet_time_factor: 1.0,
            min_spacing_px: 14.0,
            interval_ms: 150.0,
            mark_lifetime_ms: 2_000.0,
            side_offset_px: 3.0,
            min_speed_px: 10.0,
        }
    }
}

impl PresenceConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: PresenceConfig = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| {
                let path = error.path().to_string();
                ConfigError::Parse {
                    path,
                    source: error.into_inner(),
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_fraction(
            "interpolation.smoothing_fraction",
            self.interpolation.smoothing_fraction,
        )?;
        check_non_negative(
            "interpolation.snap_epsilon_px",
            self.interpolation.snap_epsilon_px as f64,
        )?;
        check_ordered(
            "animation.min_walk_rate",
            self.animation.min_walk_rate as f64,
            self.animation.max_walk_rate as f64,
        )?;
        check_positive(
            "animation.max_reference_velocity",
            self.animation.max_reference_velocity as f64,
        )?;
        check_fraction("afk.afk_alpha", self.afk.afk_alpha)?;
        check_fraction("afk.fade_fraction_per_tick", self.afk.fade_fraction_per_tick)?;
        check_positive("afk.reference_tick_ms", self.afk.reference_tick_ms)?;
        check_ordered(
            "afk.standard_window_ms",
            self.afk.standard_window_ms,
            self.afk.premium_window_ms,
        )?;
        check_positive("overlay.chat_duration_ms", self.overlay.chat_duration_ms)?;
        check_positive(
            "overlay.activity_duration_ms",
            self.overlay.activity_duration_ms,
        )?;
        check_non_negative("overlay.fade_ms", self.overlay.fade_ms)?;
        if self.spawn_effect.particle_count == 0 {
            return Err(ConfigError::Invalid {
                field: "spawn_effect.particle_count",
                reason: "must be at least 1".to_string(),
            });
        }
        check_positive("spawn_effect.duration_ms", self.spawn_effect.duration_ms)?;
        check_ordered(
            "spawn_effect.scatter_min_px",
            self.spawn_effect.scatter_min_px as f64,
            self.spawn_effect.scatter_max_px as f64,
        )?;
        check_delay("spawn_effect.spawn_max_delay", self.spawn_effect.spawn_max_delay)?;
        check_delay(
            "spawn_effect.despawn_max_delay",
            self.spawn_effect.despawn_max_delay,
        )?;
        check_ordered(
            "spawn_effect.particle_size_min",
            self.spawn_effect.particle_size_min as f64,
            self.spawn_effect.particle_size_max as f64,
        )?;
        check_positive(
            "submersion.sample_interval_ms",
            self.submersion.sample_interval_ms,
        )?;
        check_positive("submersion.max_depth", self.submersion.max_depth as f64)?;
        if self.submersion.slowdown_start >= self.submersion.max_depth {
            return Err(ConfigError::Invalid {
                field: "submersion.slowdown_start",
                reason: format!(
                    "must be below submersion.max_depth ({})",
                    self.submersion.max_depth
                ),
            });
        }
        check_fraction(
            "submersion.min_speed_multiplier",
            self.submersion.min_speed_multiplier,
        )?;
        check_fraction("submersion.depth_smoothing", self.submersion.depth_smoothing)?;
        check_ordered(
            "splash.min_speed_px",
            self.splash.min_speed_px as f64,
            self.splash.max_speed_px as f64,
        )?;
        check_ordered(
            "splash.min_particles",
            self.splash.min_particles as f64,
            self.splash.max_particles as f64,
        )?;
        check_ordered(
            "splash.min_cooldown_ms",
            self.splash.min_cooldown_ms,
            self.splash.max_cooldown_ms,
        )?;
        check_ordered(
            "splash.min_lifespan_ms",
            self.splash.min_lifespan_ms,
            self.splash.max_lifespan_ms,
        )?;
        check_ordered(
            "footprints.min_wet_ms",
            self.footprints.min_wet_ms,
            self.footprints.max_wet_ms,
        )?;
        check_positive(
            "footprints.mark_lifetime_ms",
            self.footprints.mark_lifetime_ms,
        )?;
        Ok(())
    }
}

fn check_fraction(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 1.0 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected a fraction in (0, 1], got {value}"),
    })
}

fn check_delay(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected a delay fraction in [0, 1), got {value}"),
    })
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected a positive value, got {value}"),
    })
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("expected a non-negative value, got {value}"),
    })
}

fn check_ordered(field: &'static str, min: f64, max: f64) -> Result<(), ConfigError> {
    if min.is_finite() && max.is_finite() && min <= max {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!("minimum {min} exceeds maximum {max}"),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config = PresenceConfig::from_json_str("{}").expect("config");
        assert_eq!(config, PresenceConfig::default());
        assert_eq!(config.spawn_effect.particle_count, 40);
        assert_eq!(config.interpolation.smoothing_fraction, 0.25);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = PresenceConfig::from_json_str(r#"{"afk": {"afk_alpha": 0.5}}"#)
            .expect("config");
        assert_eq!(config.afk.afk_alpha, 0.5);
        assert_eq!(config.afk.ghost_delay_ms, 60_000.0);
    }

    #[test]
    fn parse_error_reports_json_path() {
        let error = PresenceConfig::from_json_str(r#"{"submersion": {"max_depth": "deep"}}"#)
            .expect_err("type mismatch");
        match error {
            ConfigError::Parse { path, .. } => assert_eq!(path, "submersion.max_depth"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let error = PresenceConfig::from_json_str(
            r#"{"submersion": {"max_depth": 1.0, "slowdown_start": 2.0}}"#,
        )
        .expect_err("slowdown beyond max");
        assert!(matches!(
            error,
            ConfigError::Invalid {
                field: "submersion.slowdown_start",
                ..
            }
        ));

        let error = PresenceConfig::from_json_str(r#"{"spawn_effect": {"spawn_max_delay": 1.0}}"#)
            .expect_err("delay of one never starts");
        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"depth": {{"base_depth": 42.0}}}}"#).expect("write");
        let config = PresenceConfig::load(file.path()).expect("load");
        assert_eq!(config.depth.base_depth, 42.0);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = PresenceConfig::load(&dir.path().join("missing.json")).expect_err("missing");
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
