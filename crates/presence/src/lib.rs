pub mod afk;
pub mod animation;
pub mod config;
pub mod depth;
pub mod direction;
pub mod entity;
pub mod error;
pub mod math;
pub mod messages;
pub mod oracle;
pub mod overlay;
pub mod particles;
pub mod roster;
pub mod scene;
pub mod splash;
pub mod submersion;
pub mod tint;

pub use afk::{format_countdown, AfkSinceSource, AfkState};
pub use config::PresenceConfig;
pub use depth::{compute_draw_depth, sort_draw_order, DepthSource, DrawDepth, DrawKey};
pub use direction::{Direction, MirrorPolicy};
pub use entity::{
    EntityEvent, EntityInit, LifecycleState, MovementUpdate, RemoteEntity, TickContext,
};
pub use error::{ConfigError, PresenceError, SceneError};
pub use math::{Rect, Vec2};
pub use messages::{AfkUpdate, MoveUpdate, PeerJoined, ServerMessage};
pub use oracle::{
    OcclusionOracle, RegionMap, TileCoord, TileKind, TileOracle, TileSize, TilemapError,
    WaterTilemap,
};
pub use particles::{ScatterEffect, ScatterKind, ScatterStatus};
pub use roster::{Roster, RosterEvent};
pub use scene::{SceneGraph, SceneSink, VisualDesc, VisualId, VisualKind, VisualNode};
pub use submersion::{DepthFlowSampler, SubmersionSample};
pub use tint::{Tint, TintCache};
