use std::f32::consts::PI;

use rand::Rng;
use tracing::trace;

use crate::config::{FootprintConfig, SplashConfig};
use crate::direction::Direction;
use crate::error::SceneError;
use crate::math::{lerp, Vec2};
use crate::scene::{SceneSink, VisualDesc, VisualId, VisualKind};
use crate::submersion::SubmersionSample;

const SPEED_WEIGHT: f32 = 0.7;
const DEPTH_WEIGHT: f32 = 0.3;
const DROPLET_SIZE_MIN: f32 = 1.5;
const DROPLET_SIZE_MAX: f32 = 3.0;
const DROPLET_DEPTH_OFFSET: f32 = 0.001;
const FOOTPRINT_DEPTH_OFFSET: f32 = 0.002;
const FOOTPRINT_ALPHA: f32 = 0.6;
// Upward cone, +y is down.
const DROPLET_ANGLE_MIN: f32 = -PI * 0.85;
const DROPLET_ANGLE_MAX: f32 = -PI * 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplashBurst {
    pub particle_count: u32,
    pub min_speed_px: f32,
    pub max_speed_px: f32,
    pub alpha: f32,
    pub lifespan_ms: f64,
}

pub fn should_splash(
    config: &SplashConfig,
    sample: &SubmersionSample,
    speed_px_per_s: f32,
) -> bool {
    sample.in_water
        && speed_px_per_s >= config.min_speed_px
        && sample.depth <= config.max_splash_depth
}

/// Combined speed/depth factor in `[0, 1]`.
pub fn splash_intensity(config: &SplashConfig, speed_px_per_s: f32, depth: f32) -> f32 {
    let span = (config.max_speed_px - config.min_speed_px).max(f32::EPSILON);
    let speed_factor = ((speed_px_per_s - config.min_speed_px) / span).clamp(0.0, 1.0);
    let depth_factor = if config.max_splash_depth > 0.0 {
        (depth / config.max_splash_depth).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (speed_factor * SPEED_WEIGHT + depth_factor * DEPTH_WEIGHT).clamp(0.0, 1.0)
}

pub fn burst_for(config: &SplashConfig, intensity: f32) -> SplashBurst {
    let t = intensity.clamp(0.0, 1.0);
    let count = lerp(config.min_particles as f32, config.max_particles as f32, t).round();
    SplashBurst {
        particle_count: count.max(0.0) as u32,
        min_speed_px: config.min_droplet_speed_px,
        max_speed_px: lerp(config.min_droplet_speed_px, config.max_droplet_speed_px, t),
        alpha: lerp(config.min_alpha, config.max_alpha, t),
        lifespan_ms: config.min_lifespan_ms
            + (config.max_lifespan_ms - config.min_lifespan_ms) * t as f64,
    }
}

/// Shorter at higher speed so fast waders splash more often.
pub fn splash_cooldown_ms(config: &SplashConfig, speed_px_per_s: f32) -> f64 {
    let span = (config.max_speed_px - config.min_speed_px).max(f32::EPSILON);
    let t = ((speed_px_per_s - config.min_speed_px) / span).clamp(0.0, 1.0) as f64;
    config.max_cooldown_ms + (config.min_cooldown_ms - config.max_cooldown_ms) * t
}

/// Wet window earned by `time_in_water_ms` of wading.
pub fn wet_window_ms(config: &FootprintConfig, time_in_water_ms: f64) -> f64 {
    (time_in_water_ms * config.wet_time_factor).clamp(config.min_wet_ms, config.max_wet_ms)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplashDroplet {
    pub position: Vec2,
    pub velocity: Vec2,
    pub initial_alpha: f32,
    pub alpha: f32,
    pub age_ms: f64,
    pub lifespan_ms: f64,
    visual: Option<VisualId>,
}

impl SplashDroplet {
    fn is_expired(&self) -> bool {
        self.age_ms >= self.lifespan_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FootSide {
    Left,
    Right,
}

impl FootSide {
    fn other(self) -> FootSide {
        match self {
            FootSide::Left => FootSide::Right,
            FootSide::Right => FootSide::Left,
        }
    }

    fn sign(self) -> f32 {
        match self {
            FootSide::Left => -1.0,
            FootSide::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FootprintMark {
    pub position: Vec2,
    pub facing: Direction,
    pub side: FootSide,
    pub age_ms: f64,
    pub lifetime_ms: f64,
    visual: Option<VisualId>,
}

impl FootprintMark {
    pub fn alpha(&self) -> f32 {
        if self.lifetime_ms <= 0.0 {
            return 0.0;
        }
        FOOTPRINT_ALPHA * (1.0 - (self.age_ms / self.lifetime_ms).clamp(0.0, 1.0)) as f32
    }
}

/// Per-tick motion input for the splash/footprint driver.
#[derive(Debug, Clone, Copy)]
pub struct WaterContact<'a> {
    pub foot: Vec2,
    pub velocity: Vec2,
    pub facing: Direction,
    pub depth: f32,
    pub sample: &'a SubmersionSample,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplashTick {
    pub droplets_emitted: u32,
    pub footprint_stamped: bool,
}

/// Drives transient water-interaction visuals for one entity.
#[derive(Debug)]
pub struct SplashDriver {
    droplets: Vec<SplashDroplet>,
    marks: Vec<FootprintMark>,
    cooldown_remaining_ms: f64,
    time_in_water_ms: f64,
    wet_remaining_ms: f64,
    since_last_mark_ms: f64,
    last_mark: Option<Vec2>,
    next_side: FootSide,
    was_in_water: bool,
}

impl Default for SplashDriver {
    fn default() -> Self {
        Self {
            droplets: Vec::new(),
            marks: Vec::new(),
            cooldown_remaining_ms: 0.0,
            time_in_water_ms: 0.0,
            wet_remaining_ms: 0.0,
            since_last_mark_ms: f64::INFINITY,
            last_mark: None,
            next_side: FootSide::Left,
            was_in_water: false,
        }
    }
}

impl SplashDriver {
    pub fn droplets(&self) -> &[SplashDroplet] {
        &self.droplets
    }

    pub fn marks(&self) -> &[FootprintMark] {
        &self.marks
    }

    pub fn is_wet(&self) -> bool {
        self.wet_remaining_ms > 0.0
    }

    pub fn wet_remaining_ms(&self) -> f64 {
        self.wet_remaining_ms
    }

    pub fn update<R: Rng>(
        &mut self,
        dt_ms: f64,
        contact: &WaterContact<'_>,
        splash: &SplashConfig,
        footprints: &FootprintConfig,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Result<SplashTick, SceneError> {
        let dt_ms = dt_ms.max(0.0);
        let mut tick = SplashTick::default();
        let speed = contact.velocity.length();
        let in_water = contact.sample.in_water;

        self.step_droplets(dt_ms, splash, scene)?;
        self.step_marks(dt_ms, scene)?;

        self.cooldown_remaining_ms = (self.cooldown_remaining_ms - dt_ms).max(0.0);
        if should_splash(splash, contact.sample, speed) && self.cooldown_remaining_ms <= 0.0 {
            let intensity = splash_intensity(splash, speed, contact.sample.depth);
            let burst = burst_for(splash, intensity);
            self.emit(&burst, contact, rng, scene);
            self.cooldown_remaining_ms = splash_cooldown_ms(splash, speed);
            tick.droplets_emitted = burst.particle_count;
            trace!(
                count = burst.particle_count,
                intensity,
                "splash_burst_emitted"
            );
        }

        if in_water {
            self.time_in_water_ms += dt_ms;
            self.wet_remaining_ms = 0.0;
        } else {
            if self.was_in_water {
                self.wet_remaining_ms = wet_window_ms(footprints, self.time_in_water_ms);
                self.time_in_water_ms = 0.0;
                self.last_mark = None;
            } else {
                self.wet_remaining_ms = (self.wet_remaining_ms - dt_ms).max(0.0);
            }
            self.since_last_mark_ms += dt_ms;
            if self.is_wet() && speed >= footprints.min_speed_px {
                tick.footprint_stamped = self.try_stamp(contact, footprints, scene);
            }
        }
        self.was_in_water = in_water;
        Ok(tick)
    }

    fn emit<R: Rng>(
        &mut self,
        burst: &SplashBurst,
        contact: &WaterContact<'_>,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) {
        let depth = contact.depth + DROPLET_DEPTH_OFFSET;
        for _ in 0..burst.particle_count {
            let angle = rng.gen_range(DROPLET_ANGLE_MIN..=DROPLET_ANGLE_MAX);
            let speed = if burst.max_speed_px > burst.min_speed_px {
                rng.gen_range(burst.min_speed_px..=burst.max_speed_px)
            } else {
                burst.min_speed_px
            };
            let size = rng.gen_range(DROPLET_SIZE_MIN..=DROPLET_SIZE_MAX);
            let velocity = Vec2::new(angle.cos() * speed, angle.sin() * speed);
            let visual = scene.add_visual(
                VisualDesc::new(VisualKind::Droplet { size }, contact.foot)
                    .with_depth(depth)
                    .with_alpha(burst.alpha),
            );
            self.droplets.push(SplashDroplet {
                position: contact.foot,
                velocity,
                initial_alpha: burst.alpha,
                alpha: burst.alpha,
                age_ms: 0.0,
                lifespan_ms: burst.lifespan_ms,
                visual: Some(visual),
            });
        }
    }

    fn step_droplets(
        &mut self,
        dt_ms: f64,
        config: &SplashConfig,
        scene: &mut dyn SceneSink,
    ) -> Result<(), SceneError> {
        let dt_s = (dt_ms / 1000.0) as f32;
        for droplet in &mut self.droplets {
            droplet.age_ms += dt_ms;
            droplet.velocity.y += config.gravity_px_per_s2 * dt_s;
            droplet.position = droplet.position + droplet.velocity * dt_s;
            let life = if droplet.lifespan_ms > 0.0 {
                (droplet.age_ms / droplet.lifespan_ms).clamp(0.0, 1.0) as f32
            } else {
                1.0
            };
            droplet.alpha = droplet.initial_alpha * (1.0 - life);
            if droplet.is_expired() {
                continue;
            }
            if let Some(visual) = droplet.visual {
                scene.set_position(visual, droplet.position)?;
                scene.set_alpha(visual, droplet.alpha)?;
            }
        }
        self.droplets.retain_mut(|droplet| {
            if !droplet.is_expired() {
                return true;
            }
            if let Some(visual) = droplet.visual.take() {
                scene.remove_visual(visual);
            }
            false
        });
        Ok(())
    }

    fn step_marks(&mut self, dt_ms: f64, scene: &mut dyn SceneSink) -> Result<(), SceneError> {
        for mark in &mut self.marks {
            mark.age_ms += dt_ms;
            if mark.age_ms >= mark.lifetime_ms {
                continue;
            }
            if let Some(visual) = mark.visual {
                scene.set_alpha(visual, mark.alpha())?;
            }
        }
        self.marks.retain_mut(|mark| {
            if mark.age_ms < mark.lifetime_ms {
                return true;
            }
            if let Some(visual) = mark.visual.take() {
                scene.remove_visual(visual);
            }
            false
        });
        Ok(())
    }

    fn try_stamp(
        &mut self,
        contact: &WaterContact<'_>,
        config: &FootprintConfig,
        scene: &mut dyn SceneSink,
    ) -> bool {
        if self.since_last_mark_ms < config.interval_ms {
            return false;
        }
        if let Some(last) = self.last_mark {
            if last.distance(contact.foot) < config.min_spacing_px {
                return false;
            }
        }

        let side = self.next_side;
        let speed = contact.velocity.length();
        let normal = if speed > f32::EPSILON {
            Vec2::new(-contact.velocity.y / speed, contact.velocity.x / speed)
        } else {
            Vec2::ZERO
        };
        let position = contact.foot + normal * (config.side_offset_px * side.sign());
        let visual = scene.add_visual(
            VisualDesc::new(
                VisualKind::Footprint {
                    facing: contact.facing,
                },
                position,
            )
            .with_depth(contact.depth - FOOTPRINT_DEPTH_OFFSET)
            .with_alpha(FOOTPRINT_ALPHA),
        );
        self.marks.push(FootprintMark {
            position,
            facing: contact.facing,
            side,
            age_ms: 0.0,
            lifetime_ms: config.mark_lifetime_ms,
            visual: Some(visual),
        });
        self.last_mark = Some(contact.foot);
        self.since_last_mark_ms = 0.0;
        self.next_side = side.other();
        true
    }

    /// Removes every droplet and footprint visual. Safe to call repeatedly.
    pub fn release(&mut self, scene: &mut dyn SceneSink) {
        for droplet in self.droplets.drain(..) {
            if let Some(visual) = droplet.visual {
                scene.remove_visual(visual);
            }
        }
        for mark in self.marks.drain(..) {
            if let Some(visual) = mark.visual {
                scene.remove_visual(visual);
            }
        }
        self.cooldown_remaining_ms = 0.0;
        self.wet_remaining_ms = 0.0;
        self.time_in_water_ms = 0.0;
        self.was_in_water = false;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::scene::SceneGraph;

    const TICK_MS: f64 = 16.0;

    fn wading(depth: f32) -> SubmersionSample {
        SubmersionSample {
            in_water: true,
            raw_depth: depth,
            depth,
            ..SubmersionSample::dry()
        }
    }

    fn contact(foot: Vec2, velocity: Vec2, sample: &SubmersionSample) -> WaterContact<'_> {
        WaterContact {
            foot,
            velocity,
            facing: Direction::East,
            depth: 10.0,
            sample,
        }
    }

    #[test]
    fn splash_requires_water_speed_and_shallow_depth() {
        let config = SplashConfig::default();
        assert!(should_splash(&config, &wading(0.5), 100.0));
        assert!(!should_splash(&config, &wading(0.5), 5.0));
        assert!(!should_splash(&config, &wading(1.5), 100.0));
        assert!(!should_splash(&config, &SubmersionSample::dry(), 100.0));
    }

    #[test]
    fn intensity_scales_burst_and_cooldown_shrinks_with_speed() {
        let config = SplashConfig::default();
        let calm = burst_for(&config, splash_intensity(&config, 25.0, 0.1));
        let rough = burst_for(&config, splash_intensity(&config, 200.0, 1.0));
        assert!(rough.particle_count > calm.particle_count);
        assert!(rough.alpha > calm.alpha);
        assert!(rough.lifespan_ms > calm.lifespan_ms);
        assert_eq!(rough.particle_count, config.max_particles);
        assert!(splash_cooldown_ms(&config, 200.0) < splash_cooldown_ms(&config, 30.0));
        assert_eq!(splash_cooldown_ms(&config, 200.0), config.min_cooldown_ms);
        assert_eq!(splash_cooldown_ms(&config, 0.0), config.max_cooldown_ms);
    }

    #[test]
    fn wet_window_is_clamped() {
        let config = FootprintConfig::default();
        assert_eq!(wet_window_ms(&config, 100.0), config.min_wet_ms);
        assert_eq!(wet_window_ms(&config, 1_200.0), 1_200.0);
        assert_eq!(wet_window_ms(&config, 60_000.0), config.max_wet_ms);
    }

    #[test]
    fn bursts_respect_cooldown_and_droplets_expire() {
        let splash = SplashConfig::default();
        let footprints = FootprintConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut scene = SceneGraph::default();
        let mut driver = SplashDriver::default();
        let sample = wading(0.5);
        let moving = contact(Vec2::new(50.0, 50.0), Vec2::new(120.0, 0.0), &sample);

        let first = driver
            .update(TICK_MS, &moving, &splash, &footprints, &mut rng, &mut scene)
            .expect("tick");
        assert!(first.droplets_emitted >= splash.min_particles);
        assert_eq!(scene.count_label("droplet"), first.droplets_emitted as usize);

        let second = driver
            .update(TICK_MS, &moving, &splash, &footprints, &mut rng, &mut scene)
            .expect("tick");
        assert_eq!(second.droplets_emitted, 0);

        let still = contact(Vec2::new(50.0, 50.0), Vec2::ZERO, &sample);
        for _ in 0..60 {
            driver
                .update(TICK_MS, &still, &splash, &footprints, &mut rng, &mut scene)
                .expect("tick");
        }
        assert!(driver.droplets().is_empty());
        assert_eq!(scene.count_label("droplet"), 0);
    }

    #[test]
    fn droplets_rise_then_fall_under_gravity() {
        let splash = SplashConfig::default();
        let footprints = FootprintConfig::default();
        let mut rng = StdRng::seed_from_u64(5);
        let mut scene = SceneGraph::default();
        let mut driver = SplashDriver::default();
        let sample = wading(0.5);
        let moving = contact(Vec2::new(0.0, 0.0), Vec2::new(150.0, 0.0), &sample);
        driver
            .update(TICK_MS, &moving, &splash, &footprints, &mut rng, &mut scene)
            .expect("tick");
        let initial: Vec<f32> = driver.droplets().iter().map(|d| d.velocity.y).collect();
        assert!(initial.iter().all(|vy| *vy < 0.0));

        let still = contact(Vec2::new(0.0, 0.0), Vec2::ZERO, &sample);
        driver
            .update(TICK_MS, &still, &splash, &footprints, &mut rng, &mut scene)
            .expect("tick");
        for (droplet, before) in driver.droplets().iter().zip(initial) {
            assert!(droplet.velocity.y > before);
            assert!(droplet.alpha < droplet.initial_alpha);
        }
    }

    #[test]
    fn footprints_follow_wet_exit_with_spacing_and_alternating_sides() {
        let splash = SplashConfig::default();
        let footprints = FootprintConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut scene = SceneGraph::default();
        let mut driver = SplashDriver::default();
        let water = wading(1.5);
        let dry = SubmersionSample::dry();
        let velocity = Vec2::new(100.0, 0.0);

        for _ in 0..100 {
            driver
                .update(
                    TICK_MS,
                    &contact(Vec2::ZERO, velocity, &water),
                    &splash,
                    &footprints,
                    &mut rng,
                    &mut scene,
                )
                .expect("tick");
        }
        assert!(driver.marks().is_empty());

        let mut foot = Vec2::ZERO;
        let mut stamped = 0;
        for _ in 0..40 {
            foot = foot + velocity * (TICK_MS as f32 / 1000.0);
            let tick = driver
                .update(
                    TICK_MS,
                    &contact(foot, velocity, &dry),
                    &splash,
                    &footprints,
                    &mut rng,
                    &mut scene,
                )
                .expect("tick");
            if tick.footprint_stamped {
                stamped += 1;
            }
        }
        assert!(stamped >= 2);
        let marks = driver.marks();
        for pair in marks.windows(2) {
            assert_ne!(pair[0].side, pair[1].side);
            assert!(pair[0].position.distance(pair[1].position) >= footprints.min_spacing_px - 1.0);
        }
        assert_eq!(marks[0].facing, Direction::East);
        assert_eq!(scene.count_label("footprint"), marks.len());
    }

    #[test]
    fn footprints_stop_once_dry_window_lapses_and_marks_self_remove() {
        let splash = SplashConfig::default();
        let footprints = FootprintConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut scene = SceneGraph::default();
        let mut driver = SplashDriver::default();
        let water = wading(1.5);
        let dry = SubmersionSample::dry();
        let velocity = Vec2::new(100.0, 0.0);

        driver
            .update(
                TICK_MS,
                &contact(Vec2::ZERO, velocity, &water),
                &splash,
                &footprints,
                &mut rng,
                &mut scene,
            )
            .expect("tick");
        let mut foot = Vec2::ZERO;
        for _ in 0..400 {
            foot = foot + velocity * (TICK_MS as f32 / 1000.0);
            driver
                .update(
                    TICK_MS,
                    &contact(foot, velocity, &dry),
                    &splash,
                    &footprints,
                    &mut rng,
                    &mut scene,
                )
                .expect("tick");
        }
        assert!(!driver.is_wet());
        assert!(driver.marks().is_empty());
        assert_eq!(scene.count_label("footprint"), 0);
    }

    #[test]
    fn release_removes_all_visuals_and_is_idempotent() {
        let splash = SplashConfig::default();
        let footprints = FootprintConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut scene = SceneGraph::default();
        let mut driver = SplashDriver::default();
        let sample = wading(0.2);
        driver
            .update(
                TICK_MS,
                &contact(Vec2::ZERO, Vec2::new(200.0, 0.0), &sample),
                &splash,
                &footprints,
                &mut rng,
                &mut scene,
            )
            .expect("tick");
        assert!(!scene.is_empty());
        driver.release(&mut scene);
        driver.release(&mut scene);
        assert!(scene.is_empty());
    }
}
