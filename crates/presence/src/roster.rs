use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::config::PresenceConfig;
use crate::depth::{sort_draw_order, DrawKey};
use crate::entity::{
    EntityEvent, EntityInit, LifecycleState, MovementUpdate, RemoteEntity, TickContext,
};
use crate::error::PresenceError;
use crate::math::Vec2;
use crate::messages::{AfkUpdate, MoveUpdate, PeerJoined, ServerMessage};
use crate::oracle::{OcclusionOracle, TileOracle};
use crate::scene::SceneSink;
use crate::tint::TintCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    Spawned { session_id: String },
    Destroyed { session_id: String },
}

/// Owns every remote entity in the room, keyed by session id.
#[derive(Debug)]
pub struct Roster {
    config: PresenceConfig,
    entities: BTreeMap<String, RemoteEntity>,
    tints: TintCache,
    rng: StdRng,
    next_spawn_order: u64,
    local_session_id: Option<String>,
    water_effects: bool,
}

impl Roster {
    pub fn new(config: PresenceConfig, seed: u64) -> Self {
        Self {
            config,
            entities: BTreeMap::new(),
            tints: TintCache::default(),
            rng: StdRng::seed_from_u64(seed),
            next_spawn_order: 0,
            local_session_id: None,
            water_effects: true,
        }
    }

    /// Messages about this session are the local player's own echo and are ignored.
    pub fn with_local_session(mut self, session_id: impl Into<String>) -> Self {
        self.local_session_id = Some(session_id.into());
        self
    }

    pub fn set_water_effects(&mut self, enabled: bool) {
        self.water_effects = enabled;
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn tints(&self) -> &TintCache {
        &self.tints
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, session_id: &str) -> Option<&RemoteEntity> {
        self.entities.get(session_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.entities.values()
    }

    pub fn apply(
        &mut self,
        message: &ServerMessage,
        now_ms: f64,
        scene: &mut dyn SceneSink,
    ) -> Result<(), PresenceError> {
        if self.local_session_id.as_deref() == Some(message.session_id()) {
            return Ok(());
        }
        match message {
            ServerMessage::PeerJoined(joined) => self.join(joined, now_ms, scene),
            ServerMessage::PeerLeft { session_id } => self.leave(session_id, scene),
            ServerMessage::Move(update) => self.apply_move(update),
            ServerMessage::Afk(update) => self.apply_afk(update, now_ms),
            ServerMessage::GuiOpen {
                session_id,
                gui_open,
            } => {
                let config = &self.config;
                let entity = lookup(&mut self.entities, session_id)?;
                entity.set_gui_open(*gui_open, now_ms, config, scene);
                Ok(())
            }
            ServerMessage::ChatOpen {
                session_id,
                chat_open,
            } => {
                let config = &self.config;
                let entity = lookup(&mut self.entities, session_id)?;
                entity.set_chat_open(*chat_open, now_ms, config, scene);
                Ok(())
            }
            ServerMessage::Chat { session_id, text } => {
                let config = &self.config;
                let entity = lookup(&mut self.entities, session_id)?;
                entity.show_chat(text, now_ms, config, scene);
                Ok(())
            }
            ServerMessage::Activity {
                session_id,
                icon,
                duration_ms,
            } => {
                let config = &self.config;
                let entity = lookup(&mut self.entities, session_id)?;
                entity.show_activity(icon, *duration_ms, now_ms, config, scene);
                Ok(())
            }
        }
    }

    fn join(
        &mut self,
        joined: &PeerJoined,
        now_ms: f64,
        scene: &mut dyn SceneSink,
    ) -> Result<(), PresenceError> {
        if let Some(existing) = self.entities.get_mut(&joined.session_id) {
            if existing.is_alive() {
                return Err(PresenceError::DuplicateSession(joined.session_id.clone()));
            }
            // Rejoin while the old avatar is still dissolving.
            existing.destroy(scene);
            self.entities.remove(&joined.session_id);
        }

        let init = EntityInit {
            session_id: joined.session_id.clone(),
            name: if joined.name.is_empty() {
                joined.session_id.clone()
            } else {
                joined.name.clone()
            },
            position: Vec2::new(joined.x, joined.y),
            direction: joined.direction,
            animation: joined.animation.clone(),
            skin: joined.skin.clone(),
            custom_animation_prefix: joined.custom_animation_prefix.clone(),
            premium: joined.premium,
            already_present: joined.already_present,
            afk: joined.afk,
            afk_since: joined.afk_since,
            water_aware: self.water_effects,
        };
        let tint = self.tints.tint_for(&joined.session_id);
        let entity = RemoteEntity::new(
            init,
            self.next_spawn_order,
            tint,
            now_ms,
            &self.config,
            &mut self.rng,
            scene,
        )?;
        self.next_spawn_order += 1;
        info!(
            session_id = %joined.session_id,
            tint = %tint.to_hex(),
            already_present = joined.already_present,
            "remote_peer_joined"
        );
        self.entities.insert(joined.session_id.clone(), entity);
        Ok(())
    }

    fn leave(&mut self, session_id: &str, scene: &mut dyn SceneSink) -> Result<(), PresenceError> {
        let entity = lookup(&mut self.entities, session_id)?;
        if entity.despawn(&self.config, &mut self.rng, scene)? {
            info!(session_id = %session_id, "remote_peer_left");
        }
        Ok(())
    }

    fn apply_move(&mut self, update: &MoveUpdate) -> Result<(), PresenceError> {
        let entity = lookup(&mut self.entities, &update.session_id)?;
        let position = match (update.x, update.y) {
            (Some(x), Some(y)) => Some(Vec2::new(x, y)),
            (None, None) => None,
            _ => {
                warn!(session_id = %update.session_id, "move_update_missing_coordinate");
                None
            }
        };
        entity.apply_movement(MovementUpdate {
            position,
            direction: update.direction,
            animation: update.animation.clone(),
        })
    }

    fn apply_afk(&mut self, update: &AfkUpdate, now_ms: f64) -> Result<(), PresenceError> {
        let entity = lookup(&mut self.entities, &update.session_id)?;
        entity.apply_afk(update.afk, update.afk_since, update.premium, now_ms);
        Ok(())
    }

    /// Removes an entity without the despawn effect.
    pub fn remove_immediately(&mut self, session_id: &str, scene: &mut dyn SceneSink) -> bool {
        match self.entities.remove(session_id) {
            Some(mut entity) => entity.destroy(scene),
            None => false,
        }
    }

    /// Advances every entity one frame. A failing entity is logged and
    /// skipped; the rest still tick.
    pub fn tick(
        &mut self,
        dt_ms: f64,
        now_ms: f64,
        scene: &mut dyn SceneSink,
        tiles: Option<&dyn TileOracle>,
        occlusion: Option<&dyn OcclusionOracle>,
    ) -> Vec<RosterEvent> {
        let ctx = TickContext {
            now_ms,
            dt_ms,
            config: &self.config,
            tiles,
            occlusion,
        };
        let mut events = Vec::new();
        for (session_id, entity) in &mut self.entities {
            match entity.update(&ctx, &mut self.rng, scene) {
                Ok(Some(EntityEvent::SpawnCompleted)) => events.push(RosterEvent::Spawned {
                    session_id: session_id.clone(),
                }),
                Ok(Some(EntityEvent::Destroyed)) => events.push(RosterEvent::Destroyed {
                    session_id: session_id.clone(),
                }),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        session_id = %session_id,
                        state = entity.state().label(),
                        error = %error,
                        "remote_entity_tick_failed"
                    );
                }
            }
        }
        self.entities
            .retain(|_, entity| entity.state() != LifecycleState::Destroyed);
        for event in &events {
            debug!(event = ?event, "roster_event");
        }
        events
    }

    /// Live entities that are not ghosted, in session id order.
    pub fn interactable_session_ids(&self, now_ms: f64) -> Vec<&str> {
        self.entities
            .values()
            .filter(|entity| entity.is_alive() && !entity.is_ghosted(&self.config, now_ms))
            .map(RemoteEntity::session_id)
            .collect()
    }

    /// Session ids back to front.
    pub fn draw_order(&self) -> Vec<&str> {
        let mut entities: Vec<&RemoteEntity> = self.entities.values().collect();
        sort_draw_order(&mut entities, |entity| DrawKey {
            depth: entity.draw_depth(),
            spawn_order: entity.spawn_order(),
        });
        entities.into_iter().map(RemoteEntity::session_id).collect()
    }

    /// Releases every entity's visuals.
    pub fn clear(&mut self, scene: &mut dyn SceneSink) {
        for entity in self.entities.values_mut() {
            entity.destroy(scene);
        }
        self.entities.clear();
    }
}

fn lookup<'a>(
    entities: &'a mut BTreeMap<String, RemoteEntity>,
    session_id: &str,
) -> Result<&'a mut RemoteEntity, PresenceError> {
    entities
        .get_mut(session_id)
        .ok_or_else(|| PresenceError::UnknownSession(session_id.to_string()))
}
