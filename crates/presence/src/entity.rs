use rand::Rng;
use tracing::debug;

use crate::afk::{fade_alpha, AfkState};
use crate::animation::{AnimationInput, AnimationSelector};
use crate::config::PresenceConfig;
use crate::depth::{compute_draw_depth, DepthSource, DrawDepth};
use crate::direction::Direction;
use crate::error::PresenceError;
use crate::math::{Rect, Vec2};
use crate::oracle::{OcclusionOracle, TileOracle};
use crate::overlay::OverlayBubbles;
use crate::particles::{ScatterEffect, ScatterKind, ScatterStatus};
use crate::scene::{SceneSink, VisualDesc, VisualId, VisualKind};
use crate::splash::{SplashDriver, WaterContact};
use crate::submersion::{DepthFlowSampler, SubmersionSample};
use crate::tint::Tint;

const NAMEPLATE_DEPTH_OFFSET: f32 = 0.002;
const DEFAULT_SKIN: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Spawning,
    Active,
    Despawning,
    Destroyed,
}

impl LifecycleState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Active => "active",
            Self::Despawning => "despawning",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Lifecycle transitions reported by [`RemoteEntity::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEvent {
    SpawnCompleted,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInit {
    pub session_id: String,
    pub name: String,
    pub position: Vec2,
    pub direction: Direction,
    pub animation: String,
    pub skin: Option<String>,
    pub custom_animation_prefix: Option<String>,
    pub premium: bool,
    pub already_present: bool,
    pub afk: bool,
    pub afk_since: Option<f64>,
    /// Attaches the depth/flow sampler and splash/footprint driver.
    pub water_aware: bool,
}

impl EntityInit {
    pub fn new(session_id: impl Into<String>, position: Vec2) -> Self {
        let session_id = session_id.into();
        Self {
            name: session_id.clone(),
            session_id,
            position,
            direction: Direction::default(),
            animation: "idle".to_string(),
            skin: None,
            custom_animation_prefix: None,
            premium: false,
            already_present: false,
            afk: false,
            afk_since: None,
            water_aware: true,
        }
    }
}

/// Partial authoritative update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementUpdate {
    pub position: Option<Vec2>,
    pub direction: Option<Direction>,
    pub animation: Option<String>,
}

/// Shared per-tick inputs for every entity.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub now_ms: f64,
    pub dt_ms: f64,
    pub config: &'a PresenceConfig,
    pub tiles: Option<&'a dyn TileOracle>,
    pub occlusion: Option<&'a dyn OcclusionOracle>,
}

#[derive(Debug, Default)]
struct WaterEffects {
    sampler: DepthFlowSampler,
    splash: SplashDriver,
}

#[derive(Debug)]
pub struct RemoteEntity {
    session_id: String,
    name: String,
    spawn_order: u64,
    tint: Tint,
    state: LifecycleState,
    target: Vec2,
    rendered: Vec2,
    direction: Direction,
    animation: String,
    afk: AfkState,
    gui_open: bool,
    chat_open: bool,
    alpha: f32,
    draw_depth: DrawDepth,
    speed_px_per_s: f32,
    avatar: Option<VisualId>,
    nameplate: Option<VisualId>,
    nameplate_text: String,
    selector: AnimationSelector,
    overlay: OverlayBubbles,
    scatter: Option<ScatterEffect>,
    water: Option<WaterEffects>,
    last_sample: SubmersionSample,
}

impl RemoteEntity {
    /// Creates the avatar and nameplate visuals. Starts in `Spawning` with a
    /// scatter effect, or directly in `Active` when `already_present` is set.
    pub fn new<R: Rng>(
        init: EntityInit,
        spawn_order: u64,
        tint: Tint,
        now_ms: f64,
        config: &PresenceConfig,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Result<Self, PresenceError> {
        if !init.position.is_finite() {
            return Err(PresenceError::NonFinitePosition {
                session_id: init.session_id,
                x: init.position.x,
                y: init.position.y,
            });
        }

        let mut afk = AfkState::default();
        afk.set_premium(init.premium);
        if init.afk {
            afk.apply(true, init.afk_since, now_ms);
        }

        let draw_depth = compute_draw_depth(&config.depth, init.position, None);
        let skin = init.skin.unwrap_or_else(|| DEFAULT_SKIN.to_string());
        let mut avatar_desc = VisualDesc::new(VisualKind::Avatar { skin }, init.position)
            .with_depth(draw_depth.depth);
        let mut plate_desc = VisualDesc::new(
            VisualKind::Nameplate {
                text: init.name.clone(),
            },
            init.position,
        )
        .with_depth(draw_depth.depth + NAMEPLATE_DEPTH_OFFSET);

        // Already-present peers appear opaque and fade to the AFK alpha from there.
        let alpha = if init.already_present {
            1.0
        } else {
            avatar_desc = avatar_desc.hidden();
            plate_desc = plate_desc.hidden();
            0.0
        };
        let avatar = scene.add_visual(avatar_desc.with_alpha(alpha));
        let nameplate = scene.add_visual(plate_desc.with_alpha(alpha));

        let mut entity = Self {
            session_id: init.session_id,
            nameplate_text: init.name.clone(),
            name: init.name,
            spawn_order,
            tint,
            state: LifecycleState::Active,
            target: init.position,
            rendered: init.position,
            direction: init.direction,
            animation: init.animation,
            afk,
            gui_open: false,
            chat_open: false,
            alpha,
            draw_depth,
            speed_px_per_s: 0.0,
            avatar: Some(avatar),
            nameplate: Some(nameplate),
            selector: AnimationSelector::new(init.custom_animation_prefix),
            overlay: OverlayBubbles::default(),
            scatter: None,
            water: init.water_aware.then(WaterEffects::default),
            last_sample: SubmersionSample::dry(),
        };

        if !init.already_present {
            let bounds = entity.avatar_bounds(config, scene, entity.target);
            entity.scatter = Some(ScatterEffect::start(
                ScatterKind::Spawn,
                bounds,
                tint,
                draw_depth.depth,
                &config.spawn_effect,
                rng,
                scene,
            ));
            entity.state = LifecycleState::Spawning;
        }
        debug!(
            session_id = %entity.session_id,
            state = entity.state.label(),
            "remote_entity_created"
        );
        Ok(entity)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn_order(&self) -> u64 {
        self.spawn_order
    }

    pub fn tint(&self) -> Tint {
        self.tint
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.state, LifecycleState::Spawning | LifecycleState::Active)
    }

    pub fn target_position(&self) -> Vec2 {
        self.target
    }

    pub fn rendered_position(&self) -> Vec2 {
        self.rendered
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn animation(&self) -> &str {
        &self.animation
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn draw_depth(&self) -> f32 {
        self.draw_depth.depth
    }

    pub fn depth_source(&self) -> DepthSource {
        self.draw_depth.source
    }

    pub fn speed_px_per_s(&self) -> f32 {
        self.speed_px_per_s
    }

    pub fn afk(&self) -> &AfkState {
        &self.afk
    }

    pub fn is_ghosted(&self, config: &PresenceConfig, now_ms: f64) -> bool {
        self.afk.is_ghosted(&config.afk, now_ms)
    }

    pub fn gui_open(&self) -> bool {
        self.gui_open
    }

    pub fn chat_open(&self) -> bool {
        self.chat_open
    }

    pub fn avatar_visual(&self) -> Option<VisualId> {
        self.avatar
    }

    pub fn nameplate_visual(&self) -> Option<VisualId> {
        self.nameplate
    }

    pub fn nameplate_text(&self) -> &str {
        &self.nameplate_text
    }

    pub fn overlay(&self) -> &OverlayBubbles {
        &self.overlay
    }

    pub fn scatter(&self) -> Option<&ScatterEffect> {
        self.scatter.as_ref()
    }

    pub fn submersion(&self) -> &SubmersionSample {
        &self.last_sample
    }

    pub fn splash(&self) -> Option<&SplashDriver> {
        self.water.as_ref().map(|water| &water.splash)
    }

    /// Overwrites the authoritative fields present in `update`. A
    /// non-finite position is rejected; the other fields still apply.
    pub fn apply_movement(&mut self, update: MovementUpdate) -> Result<(), PresenceError> {
        if self.state == LifecycleState::Destroyed {
            return Ok(());
        }
        if let Some(direction) = update.direction {
            self.direction = direction;
        }
        if let Some(animation) = update.animation {
            self.animation = animation;
        }
        let Some(position) = update.position else {
            return Ok(());
        };
        if !position.is_finite() {
            return Err(PresenceError::NonFinitePosition {
                session_id: self.session_id.clone(),
                x: position.x,
                y: position.y,
            });
        }
        if self.state == LifecycleState::Spawning {
            if let Some(scatter) = &mut self.scatter {
                scatter.translate(position - self.target);
            }
        }
        self.target = position;
        Ok(())
    }

    pub fn apply_afk(
        &mut self,
        afk: bool,
        afk_since: Option<f64>,
        premium: Option<bool>,
        now_ms: f64,
    ) {
        if let Some(premium) = premium {
            self.afk.set_premium(premium);
        }
        if self.afk.apply(afk, afk_since, now_ms) {
            debug!(session_id = %self.session_id, afk, "remote_entity_afk_changed");
        }
    }

    pub fn set_gui_open(
        &mut self,
        open: bool,
        now_ms: f64,
        config: &PresenceConfig,
        scene: &mut dyn SceneSink,
    ) {
        self.gui_open = open;
        self.refresh_activity_indicator(now_ms, config, scene);
    }

    pub fn set_chat_open(
        &mut self,
        open: bool,
        now_ms: f64,
        config: &PresenceConfig,
        scene: &mut dyn SceneSink,
    ) {
        self.chat_open = open;
        self.refresh_activity_indicator(now_ms, config, scene);
    }

    fn refresh_activity_indicator(
        &mut self,
        now_ms: f64,
        config: &PresenceConfig,
        scene: &mut dyn SceneSink,
    ) {
        if !self.is_alive() {
            return;
        }
        let icon = if self.gui_open {
            Some(config.overlay.menu_icon.as_str())
        } else if self.chat_open {
            Some(config.overlay.typing_icon.as_str())
        } else {
            None
        };
        match icon {
            Some(icon) => {
                self.overlay.show_activity(icon, None, now_ms, scene);
            }
            None => self.overlay.expire_sticky_activity(now_ms),
        }
    }

    pub fn show_chat(
        &mut self,
        text: &str,
        now_ms: f64,
        config: &PresenceConfig,
        scene: &mut dyn SceneSink,
    ) {
        if self.is_alive() {
            self.overlay.show_chat(text, now_ms, &config.overlay, scene);
        }
    }

    pub fn show_activity(
        &mut self,
        icon: &str,
        duration_ms: Option<f64>,
        now_ms: f64,
        config: &PresenceConfig,
        scene: &mut dyn SceneSink,
    ) {
        if !self.is_alive() {
            return;
        }
        let duration = duration_ms.unwrap_or(config.overlay.activity_duration_ms);
        self.overlay.show_activity(icon, Some(duration), now_ms, scene);
    }

    /// Starts the despawn effect. Returns `false` when the entity is already
    /// despawning or gone.
    pub fn despawn<R: Rng>(
        &mut self,
        config: &PresenceConfig,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Result<bool, PresenceError> {
        let anchor = match self.state {
            LifecycleState::Despawning | LifecycleState::Destroyed => return Ok(false),
            LifecycleState::Spawning => self.target,
            LifecycleState::Active => self.rendered,
        };
        if let Some(mut scatter) = self.scatter.take() {
            scatter.release(scene);
        }
        self.overlay.release(scene);
        if let Some(water) = &mut self.water {
            water.splash.release(scene);
        }
        for visual in [self.avatar, self.nameplate].into_iter().flatten() {
            scene.set_visible(visual, false)?;
        }

        let bounds = self.avatar_bounds(config, scene, anchor);
        self.scatter = Some(ScatterEffect::start(
            ScatterKind::Despawn,
            bounds,
            self.tint,
            self.draw_depth.depth,
            &config.spawn_effect,
            rng,
            scene,
        ));
        self.state = LifecycleState::Despawning;
        debug!(session_id = %self.session_id, "remote_entity_despawning");
        Ok(true)
    }

    /// Releases every owned visual immediately. Returns `false` when the
    /// entity was already destroyed.
    pub fn destroy(&mut self, scene: &mut dyn SceneSink) -> bool {
        if self.state == LifecycleState::Destroyed {
            return false;
        }
        if let Some(mut scatter) = self.scatter.take() {
            scatter.release(scene);
        }
        self.overlay.release(scene);
        if let Some(water) = &mut self.water {
            water.splash.release(scene);
            water.sampler.reset();
        }
        for visual in [self.avatar.take(), self.nameplate.take()]
            .into_iter()
            .flatten()
        {
            scene.remove_visual(visual);
        }
        self.state = LifecycleState::Destroyed;
        debug!(session_id = %self.session_id, "remote_entity_destroyed");
        true
    }

    pub fn update<R: Rng>(
        &mut self,
        ctx: &TickContext<'_>,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Result<Option<EntityEvent>, PresenceError> {
        match self.state {
            LifecycleState::Destroyed => Ok(None),
            LifecycleState::Spawning => self.update_spawning(ctx, scene),
            LifecycleState::Active => {
                self.update_active(ctx, rng, scene)?;
                Ok(None)
            }
            LifecycleState::Despawning => self.update_despawning(ctx, scene),
        }
    }

    fn update_spawning(
        &mut self,
        ctx: &TickContext<'_>,
        scene: &mut dyn SceneSink,
    ) -> Result<Option<EntityEvent>, PresenceError> {
        self.draw_depth = compute_draw_depth(&ctx.config.depth, self.target, ctx.occlusion);
        let status = match &mut self.scatter {
            Some(scatter) => {
                scatter.set_depth(self.draw_depth.depth, scene)?;
                scatter.update(ctx.dt_ms, scene)?
            }
            None => ScatterStatus::JustCompleted,
        };
        if status == ScatterStatus::Running {
            return Ok(None);
        }

        self.scatter = None;
        self.rendered = self.target;
        self.alpha = self.afk.target_alpha(&ctx.config.afk);
        self.state = LifecycleState::Active;
        if let Some(avatar) = self.avatar {
            scene.set_position(avatar, self.rendered)?;
            scene.set_depth(avatar, self.draw_depth.depth)?;
            scene.set_alpha(avatar, self.alpha)?;
            scene.set_visible(avatar, true)?;
        }
        if let Some(nameplate) = self.nameplate {
            scene.set_alpha(nameplate, self.alpha)?;
            scene.set_visible(nameplate, true)?;
        }
        let nameplate_top = self.sync_nameplate(ctx, scene)?;
        self.overlay.update(
            ctx.now_ms,
            &ctx.config.overlay,
            nameplate_top,
            self.draw_depth.depth,
            scene,
        )?;
        debug!(session_id = %self.session_id, "remote_entity_spawn_completed");
        Ok(Some(EntityEvent::SpawnCompleted))
    }

    fn update_despawning(
        &mut self,
        ctx: &TickContext<'_>,
        scene: &mut dyn SceneSink,
    ) -> Result<Option<EntityEvent>, PresenceError> {
        let status = match &mut self.scatter {
            Some(scatter) => scatter.update(ctx.dt_ms, scene)?,
            None => ScatterStatus::JustCompleted,
        };
        if status == ScatterStatus::Running {
            return Ok(None);
        }
        self.destroy(scene);
        Ok(Some(EntityEvent::Destroyed))
    }

    fn update_active<R: Rng>(
        &mut self,
        ctx: &TickContext<'_>,
        rng: &mut R,
        scene: &mut dyn SceneSink,
    ) -> Result<(), PresenceError> {
        let Some(avatar) = self.avatar else {
            return Ok(());
        };
        if !scene.is_loaded(avatar) {
            return Ok(());
        }
        let config = ctx.config;

        if let Some(water) = &mut self.water {
            self.last_sample = water
                .sampler
                .update(ctx.now_ms, self.rendered, ctx.tiles, &config.submersion);
        }

        let previous = self.rendered;
        let fraction =
            config.interpolation.smoothing_fraction * self.last_sample.speed_multiplier;
        self.rendered = interpolate(
            self.rendered,
            self.target,
            fraction,
            config.interpolation.snap_epsilon_px,
        );
        let moved = self.rendered - previous;
        self.speed_px_per_s = if ctx.dt_ms > 0.0 {
            moved.length() / (ctx.dt_ms / 1000.0) as f32
        } else {
            0.0
        };

        self.draw_depth = compute_draw_depth(&config.depth, self.rendered, ctx.occlusion);
        self.alpha = fade_alpha(
            &config.afk,
            self.alpha,
            self.afk.target_alpha(&config.afk),
            ctx.dt_ms,
        );

        scene.set_position(avatar, self.rendered)?;
        scene.set_depth(avatar, self.draw_depth.depth)?;
        scene.set_alpha(avatar, self.alpha)?;
        scene.set_clip_bottom(avatar, self.last_sample.sink_offset_px)?;

        let input = AnimationInput {
            animation: &self.animation,
            direction: self.direction,
            speed_px_per_s: self.speed_px_per_s,
            water_time_scale: self.last_sample.animation_time_scale,
        };
        self.selector
            .apply(&config.animation, scene, avatar, &input)?;

        if let Some(water) = &mut self.water {
            let velocity = if ctx.dt_ms > 0.0 {
                moved * (1000.0 / ctx.dt_ms) as f32
            } else {
                Vec2::ZERO
            };
            let contact = WaterContact {
                foot: self.rendered,
                velocity,
                facing: self.direction,
                depth: self.draw_depth.depth,
                sample: &self.last_sample,
            };
            water.splash.update(
                ctx.dt_ms,
                &contact,
                &config.splash,
                &config.footprints,
                rng,
                scene,
            )?;
        }

        let nameplate_top = self.sync_nameplate(ctx, scene)?;
        self.overlay.update(
            ctx.now_ms,
            &config.overlay,
            nameplate_top,
            self.draw_depth.depth,
            scene,
        )?;
        Ok(())
    }

    /// Places the nameplate above the avatar and refreshes its text. Returns
    /// the nameplate's top-center point.
    fn sync_nameplate(
        &mut self,
        ctx: &TickContext<'_>,
        scene: &mut dyn SceneSink,
    ) -> Result<Vec2, PresenceError> {
        let overlay = &ctx.config.overlay;
        let avatar_height = self
            .avatar
            .and_then(|avatar| scene.visual_size(avatar))
            .map(|size| size.height)
            .unwrap_or(ctx.config.spawn_effect.default_bounds_height);
        let position = Vec2::new(
            self.rendered.x,
            self.rendered.y - avatar_height - overlay.nameplate_gap_px,
        );
        let Some(nameplate) = self.nameplate else {
            return Ok(position);
        };

        let text = match self.afk.countdown(&ctx.config.afk, ctx.now_ms) {
            Some(countdown) => format!("{} ({countdown})", self.name),
            None => self.name.clone(),
        };
        if text != self.nameplate_text {
            scene.set_text(nameplate, &text)?;
            self.nameplate_text = text;
        }
        scene.set_position(nameplate, position)?;
        scene.set_depth(nameplate, self.draw_depth.depth + NAMEPLATE_DEPTH_OFFSET)?;
        scene.set_alpha(nameplate, self.alpha)?;

        let plate_height = scene
            .visual_size(nameplate)
            .map(|size| size.height)
            .unwrap_or(overlay.default_nameplate_height_px);
        Ok(Vec2::new(position.x, position.y - plate_height))
    }

    fn avatar_bounds(&self, config: &PresenceConfig, scene: &dyn SceneSink, foot: Vec2) -> Rect {
        let (width, height) = self
            .avatar
            .and_then(|avatar| scene.visual_size(avatar))
            .map(|size| (size.width, size.height))
            .unwrap_or((
                config.spawn_effect.default_bounds_width,
                config.spawn_effect.default_bounds_height,
            ));
        Rect::anchored_at_foot(foot, width, height)
    }
}

/// Exponential smoothing toward `target` that snaps once within `epsilon`.
pub fn interpolate(current: Vec2, target: Vec2, fraction: f32, epsilon: f32) -> Vec2 {
    if current.distance(target) < epsilon {
        return target;
    }
    let next = current.lerp(target, fraction.clamp(0.0, 1.0));
    if next.distance(target) < epsilon {
        target
    } else {
        next
    }
}
