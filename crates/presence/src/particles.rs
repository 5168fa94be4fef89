use std::f32::consts::TAU;

use rand::Rng;

use crate::config::SpawnEffectConfig;
use crate::error::SceneError;
use crate::math::{ease_in_quad, ease_out_cubic, Rect, Vec2};
use crate::scene::{SceneSink, VisualDesc, VisualId, VisualKind};
use crate::tint::Tint;

const DEPTH_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterKind {
    /// Particles fly in from the scattered points and assemble the silhouette.
    Spawn,
    /// Particles leave the silhouette for the scattered points.
    Despawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterStatus {
    Running,
    /// Returned on exactly one update: the one where every particle arrived.
    JustCompleted,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterParticle {
    pub start: Vec2,
    pub target: Vec2,
    pub size: f32,
    pub delay: f32,
    pub progress: f32,
    pub tint: Tint,
    pub position: Vec2,
    pub alpha: f32,
    visual: Option<VisualId>,
}

#[derive(Debug)]
pub struct ScatterEffect {
    kind: ScatterKind,
    particles: Vec<ScatterParticle>,
    elapsed_ms: f64,
    duration_ms: f64,
    depth: f32,
    finished: bool,
}

impl ScatterEffect {
    /// Builds the particle set around `bounds` and adds one visual per
    /// particle to the scene.
    pub fn start<R: Rng>(
        kind: ScatterKind,
        bounds: Rect,
        tint: Tint,
        depth: f32,
        config: &SpawnEffectConfig,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Self {
        let max_delay = match kind {
            ScatterKind::Spawn => config.spawn_max_delay,
            ScatterKind::Despawn => config.despawn_max_delay,
        };
        let mut particles = Vec::with_capacity(config.particle_count);
        for _ in 0..config.particle_count {
            let in_place = Vec2 {
                x: bounds.x + rng.gen::<f32>() * bounds.width,
                y: bounds.y + rng.gen::<f32>() * bounds.height,
            };
            let angle = rng.gen::<f32>() * TAU;
            let distance = config.scatter_min_px
                + rng.gen::<f32>() * (config.scatter_max_px - config.scatter_min_px);
            let scattered = Vec2 {
                x: in_place.x + angle.cos() * distance,
                y: in_place.y + angle.sin() * distance,
            };
            let size = config.particle_size_min
                + rng.gen::<f32>() * (config.particle_size_max - config.particle_size_min);
            let delay = rng.gen::<f32>() * max_delay;
            let (start, target) = match kind {
                ScatterKind::Spawn => (scattered, in_place),
                ScatterKind::Despawn => (in_place, scattered),
            };
            let alpha = match kind {
                ScatterKind::Spawn => 0.0,
                ScatterKind::Despawn => 1.0,
            };
            let visual = scene.add_visual(
                VisualDesc::new(VisualKind::Particle { size, tint }, start)
                    .with_depth(depth)
                    .with_alpha(alpha),
            );
            particles.push(ScatterParticle {
                start,
                target,
                size,
                delay,
                progress: 0.0,
                tint,
                position: start,
                alpha,
                visual: Some(visual),
            });
        }

        Self {
            kind,
            particles,
            elapsed_ms: 0.0,
            duration_ms: config.duration_ms,
            depth,
            finished: false,
        }
    }

    pub fn kind(&self) -> ScatterKind {
        self.kind
    }

    pub fn particles(&self) -> &[ScatterParticle] {
        &self.particles
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn raw_progress(&self) -> f32 {
        if self.duration_ms <= 0.0 {
            return 1.0;
        }
        (self.elapsed_ms / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    /// Shifts every in-flight particle so the effect converges on a moved
    /// anchor.
    pub fn translate(&mut self, delta: Vec2) {
        for particle in &mut self.particles {
            particle.start = particle.start + delta;
            particle.target = particle.target + delta;
            particle.position = particle.position + delta;
        }
    }

    pub fn set_depth(&mut self, depth: f32, scene: &mut dyn SceneSink) -> Result<(), SceneError> {
        if (self.depth - depth).abs() <= DEPTH_EPSILON {
            return Ok(());
        }
        self.depth = depth;
        for particle in &self.particles {
            if let Some(visual) = particle.visual {
                scene.set_depth(visual, depth)?;
            }
        }
        Ok(())
    }

    pub fn update(
        &mut self,
        dt_ms: f64,
        scene: &mut dyn SceneSink,
    ) -> Result<ScatterStatus, SceneError> {
        if self.finished {
            return Ok(ScatterStatus::Finished);
        }
        self.elapsed_ms += dt_ms.max(0.0);
        let raw = self.raw_progress();

        let mut all_done = true;
        for particle in &mut self.particles {
            particle.progress = effective_progress(raw, particle.delay);
            let (eased, alpha) = match self.kind {
                ScatterKind::Spawn => (
                    ease_out_cubic(particle.progress),
                    (particle.progress * 2.0).min(1.0),
                ),
                ScatterKind::Despawn => (ease_in_quad(particle.progress), 1.0 - particle.progress),
            };
            particle.position = particle.start.lerp(particle.target, eased);
            particle.alpha = alpha;
            if particle.progress < 1.0 {
                all_done = false;
            }
            if let Some(visual) = particle.visual {
                scene.set_position(visual, particle.position)?;
                scene.set_alpha(visual, particle.alpha)?;
            }
        }

        if all_done {
            self.release(scene);
            self.finished = true;
            return Ok(ScatterStatus::JustCompleted);
        }
        Ok(ScatterStatus::Running)
    }

    /// Removes every particle visual. Safe to call more than once.
    pub fn release(&mut self, scene: &mut dyn SceneSink) {
        for particle in &mut self.particles {
            if let Some(visual) = particle.visual.take() {
                scene.remove_visual(visual);
            }
        }
        self.particles.clear();
    }
}

/// Per-particle progress: later-delayed particles start later but every
/// particle reaches 1 together when `raw` reaches 1.
pub fn effective_progress(raw: f32, delay: f32) -> f32 {
    if delay >= 1.0 {
        return if raw >= 1.0 { 1.0 } else { 0.0 };
    }
    ((raw - delay) / (1.0 - delay)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::scene::SceneGraph;

    fn bounds() -> Rect {
        Rect::anchored_at_foot(Vec2::new(100.0, 100.0), 32.0, 48.0)
    }

    fn start(kind: ScatterKind, scene: &mut SceneGraph) -> ScatterEffect {
        let mut rng = StdRng::seed_from_u64(7);
        ScatterEffect::start(
            kind,
            bounds(),
            Tint::WHITE,
            10.0,
            &SpawnEffectConfig::default(),
            &mut rng,
            scene,
        )
    }

    #[test]
    fn spawn_particles_start_scattered_and_delays_stay_in_range() {
        let mut scene = SceneGraph::default();
        let effect = start(ScatterKind::Spawn, &mut scene);
        let config = SpawnEffectConfig::default();
        assert_eq!(effect.particles().len(), config.particle_count);
        assert_eq!(scene.count_label("particle"), config.particle_count);
        for particle in effect.particles() {
            assert!(bounds().contains(particle.target, 1e-3));
            let distance = particle.start.distance(particle.target);
            assert!(distance >= config.scatter_min_px - 1e-3, "{distance}");
            assert!(distance <= config.scatter_max_px + 1e-3, "{distance}");
            assert!(particle.delay >= 0.0 && particle.delay <= config.spawn_max_delay);
        }
    }

    #[test]
    fn despawn_particles_leave_from_silhouette() {
        let mut scene = SceneGraph::default();
        let effect = start(ScatterKind::Despawn, &mut scene);
        let config = SpawnEffectConfig::default();
        for particle in effect.particles() {
            assert!(bounds().contains(particle.start, 1e-3));
            assert!(particle.delay <= config.despawn_max_delay);
            assert_eq!(particle.alpha, 1.0);
        }
    }

    #[test]
    fn completion_is_signalled_exactly_once() {
        let mut scene = SceneGraph::default();
        let mut effect = start(ScatterKind::Spawn, &mut scene);
        let mut completions = 0;
        for _ in 0..120 {
            if effect.update(1000.0 / 60.0, &mut scene).expect("update")
                == ScatterStatus::JustCompleted
            {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert!(effect.is_finished());
        assert!(effect.particles().is_empty());
        assert_eq!(scene.count_label("particle"), 0);
        assert_eq!(
            effect.update(16.0, &mut scene).expect("after"),
            ScatterStatus::Finished
        );
    }

    #[test]
    fn single_oversized_step_completes() {
        let mut scene = SceneGraph::default();
        let mut effect = start(ScatterKind::Despawn, &mut scene);
        assert_eq!(
            effect.update(5_000.0, &mut scene).expect("update"),
            ScatterStatus::JustCompleted
        );
    }

    #[test]
    fn effect_is_running_before_duration_elapses() {
        let mut scene = SceneGraph::default();
        let mut effect = start(ScatterKind::Spawn, &mut scene);
        assert_eq!(
            effect.update(799.0, &mut scene).expect("update"),
            ScatterStatus::Running
        );
        assert_eq!(
            effect.update(1.0, &mut scene).expect("update"),
            ScatterStatus::JustCompleted
        );
    }

    #[test]
    fn effective_progress_staggers_start_but_shares_finish() {
        assert_eq!(effective_progress(0.1, 0.2), 0.0);
        assert!((effective_progress(0.6, 0.2) - 0.5).abs() < 1e-6);
        assert_eq!(effective_progress(1.0, 0.0), 1.0);
        assert_eq!(effective_progress(1.0, 0.3), 1.0);
    }

    #[test]
    fn spawn_alpha_ramps_over_first_half_and_despawn_fades_linearly() {
        let mut scene = SceneGraph::default();
        let mut spawn = start(ScatterKind::Spawn, &mut scene);
        spawn.update(400.0, &mut scene).expect("update");
        for particle in spawn.particles() {
            let expected = (particle.progress * 2.0).min(1.0);
            assert!((particle.alpha - expected).abs() < 1e-6);
        }

        let mut despawn = start(ScatterKind::Despawn, &mut scene);
        despawn.update(400.0, &mut scene).expect("update");
        for particle in despawn.particles() {
            assert!((particle.alpha - (1.0 - particle.progress)).abs() < 1e-6);
        }
    }

    #[test]
    fn translate_moves_start_and_target_by_delta() {
        let mut scene = SceneGraph::default();
        let mut effect = start(ScatterKind::Spawn, &mut scene);
        let before: Vec<(Vec2, Vec2)> = effect
            .particles()
            .iter()
            .map(|particle| (particle.start, particle.target))
            .collect();

        effect.translate(Vec2::new(12.0, 0.0));
        effect.translate(Vec2::new(8.0, 0.0));

        for (particle, (start, target)) in effect.particles().iter().zip(before) {
            assert!((particle.start.x - (start.x + 20.0)).abs() < 1e-4);
            assert!((particle.target.x - (target.x + 20.0)).abs() < 1e-4);
            assert_eq!(particle.start.y, start.y);
        }
    }

    #[test]
    fn release_is_idempotent() {
        let mut scene = SceneGraph::default();
        let mut effect = start(ScatterKind::Spawn, &mut scene);
        effect.release(&mut scene);
        effect.release(&mut scene);
        assert!(scene.is_empty());
    }
}
