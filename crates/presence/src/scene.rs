use std::collections::BTreeSet;

use crate::direction::Direction;
use crate::error::SceneError;
use crate::math::{Rect, Vec2};
use crate::tint::Tint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum VisualKind {
    Avatar { skin: String },
    Nameplate { text: String },
    ChatBubble { text: String },
    ActivityIcon { icon: String },
    Particle { size: f32, tint: Tint },
    Droplet { size: f32 },
    Footprint { facing: Direction },
}

impl VisualKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Avatar { .. } => "avatar",
            Self::Nameplate { .. } => "nameplate",
            Self::ChatBubble { .. } => "chat_bubble",
            Self::ActivityIcon { .. } => "activity_icon",
            Self::Particle { .. } => "particle",
            Self::Droplet { .. } => "droplet",
            Self::Footprint { .. } => "footprint",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualDesc {
    pub kind: VisualKind,
    pub position: Vec2,
    pub depth: f32,
    pub alpha: f32,
    pub visible: bool,
}

impl VisualDesc {
    pub fn new(kind: VisualKind, position: Vec2) -> Self {
        Self {
            kind,
            position,
            depth: 0.0,
            alpha: 1.0,
            visible: true,
        }
    }

    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationRequest {
    pub key: String,
    pub time_scale: f32,
    pub flip_x: bool,
}

/// Scene capabilities the presentation layer drives. Every visual is anchored
/// at its bottom-center: `position` is where it touches the ground.
pub trait SceneSink {
    fn add_visual(&mut self, desc: VisualDesc) -> VisualId;

    /// Returns `false` when the visual was already gone.
    fn remove_visual(&mut self, id: VisualId) -> bool;

    fn set_position(&mut self, id: VisualId, position: Vec2) -> Result<(), SceneError>;

    fn set_depth(&mut self, id: VisualId, depth: f32) -> Result<(), SceneError>;

    fn set_alpha(&mut self, id: VisualId, alpha: f32) -> Result<(), SceneError>;

    fn set_visible(&mut self, id: VisualId, visible: bool) -> Result<(), SceneError>;

    /// Masks the lowest `clip_px` pixels of the visual.
    fn set_clip_bottom(&mut self, id: VisualId, clip_px: f32) -> Result<(), SceneError>;

    fn set_text(&mut self, id: VisualId, text: &str) -> Result<(), SceneError>;

    fn play_animation(
        &mut self,
        id: VisualId,
        request: &AnimationRequest,
    ) -> Result<(), SceneError>;

    fn has_animation(&self, key: &str) -> bool;

    fn has_texture(&self, key: &str) -> bool;

    fn is_loaded(&self, id: VisualId) -> bool;

    fn visual_size(&self, id: VisualId) -> Option<VisualSize>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualNode {
    pub id: VisualId,
    pub kind: VisualKind,
    pub position: Vec2,
    pub depth: f32,
    pub alpha: f32,
    pub visible: bool,
    pub clip_bottom: f32,
    pub animation: Option<AnimationRequest>,
    pub size: VisualSize,
    loaded: bool,
}

impl VisualNode {
    pub fn bounds(&self) -> Rect {
        Rect::anchored_at_foot(self.position, self.size.width, self.size.height)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            VisualKind::Nameplate { text } | VisualKind::ChatBubble { text } => {
                Some(text.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct VisualIdAllocator {
    next: u64,
}

impl VisualIdAllocator {
    pub fn allocate(&mut self) -> VisualId {
        let id = VisualId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Retained in-memory scene used by the replay driver and tests.
#[derive(Debug)]
pub struct SceneGraph {
    allocator: VisualIdAllocator,
    nodes: Vec<VisualNode>,
    loaded_animations: BTreeSet<String>,
    missing_textures: BTreeSet<String>,
    avatar_size: VisualSize,
    nameplate_size: VisualSize,
    stream_avatars: bool,
    removed_count: u64,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self {
            allocator: VisualIdAllocator::default(),
            nodes: Vec::new(),
            loaded_animations: BTreeSet::new(),
            missing_textures: BTreeSet::new(),
            avatar_size: VisualSize {
                width: 32.0,
                height: 48.0,
            },
            nameplate_size: VisualSize {
                width: 64.0,
                height: 12.0,
            },
            stream_avatars: false,
            removed_count: 0,
        }
    }
}

impl SceneGraph {
    pub fn with_animations<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scene = Self::default();
        for key in keys {
            scene.register_animation(key);
        }
        scene
    }

    pub fn register_animation(&mut self, key: impl Into<String>) {
        self.loaded_animations.insert(key.into());
    }

    pub fn unregister_animation(&mut self, key: &str) -> bool {
        self.loaded_animations.remove(key)
    }

    /// Textures are assumed present unless marked missing.
    pub fn mark_texture_missing(&mut self, key: impl Into<String>) {
        self.missing_textures.insert(key.into());
    }

    pub fn set_avatar_size(&mut self, size: VisualSize) {
        self.avatar_size = size;
    }

    /// New avatars start unloaded until [`SceneGraph::finish_loading`].
    pub fn set_stream_avatars(&mut self, stream: bool) {
        self.stream_avatars = stream;
    }

    pub fn finish_loading(&mut self, id: VisualId) -> bool {
        match self.find_mut(id) {
            Some(node) => {
                node.loaded = true;
                true
            }
            None => false,
        }
    }

    pub fn finish_loading_all(&mut self) {
        for node in &mut self.nodes {
            node.loaded = true;
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn removed_count(&self) -> u64 {
        self.removed_count
    }

    pub fn nodes(&self) -> &[VisualNode] {
        &self.nodes
    }

    pub fn find(&self, id: VisualId) -> Option<&VisualNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    fn find_mut(&mut self, id: VisualId) -> Option<&mut VisualNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    fn node_mut(&mut self, id: VisualId) -> Result<&mut VisualNode, SceneError> {
        self.find_mut(id).ok_or(SceneError::UnknownVisual(id))
    }

    pub fn count_label(&self, label: &str) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.kind.label() == label)
            .count()
    }

    /// Visible nodes back to front; equal depths keep creation order.
    pub fn draw_list(&self) -> Vec<VisualId> {
        let mut visible: Vec<&VisualNode> =
            self.nodes.iter().filter(|node| node.visible).collect();
        visible.sort_by(|left, right| {
            left.depth
                .total_cmp(&right.depth)
                .then_with(|| left.id.cmp(&right.id))
        });
        visible.into_iter().map(|node| node.id).collect()
    }

    fn default_size_for(&self, kind: &VisualKind) -> VisualSize {
        match kind {
            VisualKind::Avatar { .. } => self.avatar_size,
            VisualKind::Nameplate { text } => VisualSize {
                width: (text.chars().count() as f32 * 6.0).max(self.nameplate_size.width),
                height: self.nameplate_size.height,
            },
            VisualKind::ChatBubble { text } => VisualSize {
                width: (text.chars().count() as f32 * 6.0 + 8.0).min(160.0),
                height: 18.0,
            },
            VisualKind::ActivityIcon { .. } => VisualSize {
                width: 16.0,
                height: 16.0,
            },
            VisualKind::Particle { size, .. } | VisualKind::Droplet { size } => VisualSize {
                width: *size,
                height: *size,
            },
            VisualKind::Footprint { .. } => VisualSize {
                width: 4.0,
                height: 3.0,
            },
        }
    }
}

impl SceneSink for SceneGraph {
    fn add_visual(&mut self, desc: VisualDesc) -> VisualId {
        let id = self.allocator.allocate();
        let size = self.default_size_for(&desc.kind);
        let loaded = !(self.stream_avatars && matches!(desc.kind, VisualKind::Avatar { .. }));
        self.nodes.push(VisualNode {
            id,
            kind: desc.kind,
            position: desc.position,
            depth: desc.depth,
            alpha: desc.alpha,
            visible: desc.visible,
            clip_bottom: 0.0,
            animation: None,
            size,
            loaded,
        });
        id
    }

    fn remove_visual(&mut self, id: VisualId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|node| node.id != id);
        let removed = self.nodes.len() != before;
        if removed {
            self.removed_count = self.removed_count.saturating_add(1);
        }
        removed
    }

    fn set_position(&mut self, id: VisualId, position: Vec2) -> Result<(), SceneError> {
        self.node_mut(id)?.position = position;
        Ok(())
    }

    fn set_depth(&mut self, id: VisualId, depth: f32) -> Result<(), SceneError> {
        self.node_mut(id)?.depth = depth;
        Ok(())
    }

    fn set_alpha(&mut self, id: VisualId, alpha: f32) -> Result<(), SceneError> {
        self.node_mut(id)?.alpha = alpha.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_visible(&mut self, id: VisualId, visible: bool) -> Result<(), SceneError> {
        self.node_mut(id)?.visible = visible;
        Ok(())
    }

    fn set_clip_bottom(&mut self, id: VisualId, clip_px: f32) -> Result<(), SceneError> {
        let node = self.node_mut(id)?;
        node.clip_bottom = clip_px.clamp(0.0, node.size.height);
        Ok(())
    }

    fn set_text(&mut self, id: VisualId, text: &str) -> Result<(), SceneError> {
        let node = self.node_mut(id)?;
        match &mut node.kind {
            VisualKind::Nameplate { text: current } | VisualKind::ChatBubble { text: current } => {
                if current.as_str() != text {
                    *current = text.to_string();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn play_animation(
        &mut self,
        id: VisualId,
        request: &AnimationRequest,
    ) -> Result<(), SceneError> {
        self.node_mut(id)?.animation = Some(request.clone());
        Ok(())
    }

    fn has_animation(&self, key: &str) -> bool {
        self.loaded_animations.contains(key)
    }

    fn has_texture(&self, key: &str) -> bool {
        !self.missing_textures.contains(key)
    }

    fn is_loaded(&self, id: VisualId) -> bool {
        self.find(id).map(|node| node.loaded).unwrap_or(false)
    }

    fn visual_size(&self, id: VisualId) -> Option<VisualSize> {
        self.find(id).map(|node| node.size)
    }
}
