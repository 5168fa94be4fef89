use std::collections::HashSet;

use tracing::warn;

use crate::config::OverlayConfig;
use crate::error::SceneError;
use crate::math::Vec2;
use crate::scene::{SceneSink, VisualDesc, VisualId, VisualKind};

const OVERLAY_DEPTH_OFFSET: f32 = 0.003;
const FALLBACK_BUBBLE_HEIGHT: f32 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleKind {
    Chat,
    Activity,
}

#[derive(Debug, Clone, PartialEq)]
struct Bubble {
    visual: VisualId,
    content: String,
    /// `None` keeps the bubble up until it is cleared explicitly.
    expires_at_ms: Option<f64>,
    alpha: f32,
}

impl Bubble {
    fn alpha_at(&self, now_ms: f64, fade_ms: f64) -> f32 {
        let Some(expires_at) = self.expires_at_ms else {
            return 1.0;
        };
        if now_ms < expires_at {
            return 1.0;
        }
        if fade_ms <= 0.0 {
            return 0.0;
        }
        (1.0 - ((now_ms - expires_at) / fade_ms).clamp(0.0, 1.0)) as f32
    }
}

/// Chat and activity bubbles floating above one entity's nameplate. At most
/// one of each kind exists at a time.
#[derive(Debug, Default)]
pub struct OverlayBubbles {
    chat: Option<Bubble>,
    activity: Option<Bubble>,
    warned_missing_icons: HashSet<String>,
}

impl OverlayBubbles {
    pub fn chat_text(&self) -> Option<&str> {
        self.chat.as_ref().map(|bubble| bubble.content.as_str())
    }

    pub fn activity_icon(&self) -> Option<&str> {
        self.activity.as_ref().map(|bubble| bubble.content.as_str())
    }

    pub fn is_activity_sticky(&self) -> bool {
        self.activity
            .as_ref()
            .map(|bubble| bubble.expires_at_ms.is_none())
            .unwrap_or(false)
    }

    pub fn alpha(&self, kind: BubbleKind) -> Option<f32> {
        self.slot(kind).as_ref().map(|bubble| bubble.alpha)
    }

    pub fn visual(&self, kind: BubbleKind) -> Option<VisualId> {
        self.slot(kind).as_ref().map(|bubble| bubble.visual)
    }

    fn slot(&self, kind: BubbleKind) -> &Option<Bubble> {
        match kind {
            BubbleKind::Chat => &self.chat,
            BubbleKind::Activity => &self.activity,
        }
    }

    fn slot_mut(&mut self, kind: BubbleKind) -> &mut Option<Bubble> {
        match kind {
            BubbleKind::Chat => &mut self.chat,
            BubbleKind::Activity => &mut self.activity,
        }
    }

    pub fn show_chat(
        &mut self,
        text: &str,
        now_ms: f64,
        config: &OverlayConfig,
        scene: &mut dyn SceneSink,
    ) {
        self.clear(BubbleKind::Chat, scene);
        let visual = scene.add_visual(VisualDesc::new(
            VisualKind::ChatBubble {
                text: text.to_string(),
            },
            Vec2::ZERO,
        )
        .hidden());
        self.chat = Some(Bubble {
            visual,
            content: text.to_string(),
            expires_at_ms: Some(now_ms + config.chat_duration_ms),
            alpha: 1.0,
        });
    }

    /// Shows `icon` in the activity slot. `duration_ms = None` makes it sticky.
    /// A missing icon texture leaves the current bubble untouched.
    pub fn show_activity(
        &mut self,
        icon: &str,
        duration_ms: Option<f64>,
        now_ms: f64,
        scene: &mut dyn SceneSink,
    ) -> bool {
        if !scene.has_texture(icon) {
            if self.warned_missing_icons.insert(icon.to_string()) {
                warn!(icon = %icon, "activity_icon_missing");
            }
            return false;
        }
        let expires_at_ms = duration_ms.map(|duration| now_ms + duration);
        if let Some(current) = &self.activity {
            if current.content == icon
                && current.expires_at_ms.is_none()
                && expires_at_ms.is_none()
            {
                return true;
            }
        }
        self.clear(BubbleKind::Activity, scene);
        let visual = scene.add_visual(VisualDesc::new(
            VisualKind::ActivityIcon {
                icon: icon.to_string(),
            },
            Vec2::ZERO,
        )
        .hidden());
        self.activity = Some(Bubble {
            visual,
            content: icon.to_string(),
            expires_at_ms,
            alpha: 1.0,
        });
        true
    }

    /// Starts the fade of a sticky activity bubble.
    pub fn expire_sticky_activity(&mut self, now_ms: f64) {
        if let Some(bubble) = &mut self.activity {
            if bubble.expires_at_ms.is_none() {
                bubble.expires_at_ms = Some(now_ms);
            }
        }
    }

    pub fn clear(&mut self, kind: BubbleKind, scene: &mut dyn SceneSink) {
        if let Some(bubble) = self.slot_mut(kind).take() {
            scene.remove_visual(bubble.visual);
        }
    }

    /// Fades, expires and repositions the bubbles above `nameplate_top`.
    /// Bubbles are created hidden and first shown here, once placed.
    pub fn update(
        &mut self,
        now_ms: f64,
        config: &OverlayConfig,
        nameplate_top: Vec2,
        depth: f32,
        scene: &mut dyn SceneSink,
    ) -> Result<(), SceneError> {
        for kind in [BubbleKind::Chat, BubbleKind::Activity] {
            let expired = match self.slot_mut(kind) {
                Some(bubble) => {
                    bubble.alpha = bubble.alpha_at(now_ms, config.fade_ms);
                    bubble.alpha <= 0.0
                }
                None => false,
            };
            if expired {
                self.clear(kind, scene);
            }
        }

        let overlay_depth = depth + OVERLAY_DEPTH_OFFSET;
        let mut anchor = Vec2::new(nameplate_top.x, nameplate_top.y - config.bubble_gap_px);
        if let Some(chat) = &self.chat {
            scene.set_position(chat.visual, anchor)?;
            scene.set_depth(chat.visual, overlay_depth)?;
            scene.set_alpha(chat.visual, chat.alpha)?;
            scene.set_visible(chat.visual, true)?;
            let height = scene
                .visual_size(chat.visual)
                .map(|size| size.height)
                .unwrap_or(FALLBACK_BUBBLE_HEIGHT);
            anchor.y -= height + config.bubble_gap_px;
        }
        if let Some(activity) = &self.activity {
            scene.set_position(activity.visual, anchor)?;
            scene.set_depth(activity.visual, overlay_depth)?;
            scene.set_alpha(activity.visual, activity.alpha)?;
            scene.set_visible(activity.visual, true)?;
        }
        Ok(())
    }

    pub fn release(&mut self, scene: &mut dyn SceneSink) {
        self.clear(BubbleKind::Chat, scene);
        self.clear(BubbleKind::Activity, scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;

    fn top() -> Vec2 {
        Vec2::new(100.0, 40.0)
    }

    #[test]
    fn new_chat_replaces_previous_immediately() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_chat("hello", 0.0, &config, &mut scene);
        let first = overlay.visual(BubbleKind::Chat).expect("chat");
        overlay.show_chat("again", 10.0, &config, &mut scene);

        assert!(scene.find(first).is_none());
        assert_eq!(scene.count_label("chat_bubble"), 1);
        assert_eq!(overlay.chat_text(), Some("again"));
    }

    #[test]
    fn chat_fades_after_duration_then_disappears() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_chat("hi", 0.0, &config, &mut scene);

        overlay
            .update(4_999.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        assert_eq!(overlay.alpha(BubbleKind::Chat), Some(1.0));

        overlay
            .update(5_150.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        let alpha = overlay.alpha(BubbleKind::Chat).expect("fading");
        assert!((alpha - 0.5).abs() < 1e-4);

        overlay
            .update(5_300.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        assert_eq!(overlay.chat_text(), None);
        assert!(scene.is_empty());
    }

    #[test]
    fn bubbles_stay_hidden_until_first_placed() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_chat("hi", 0.0, &config, &mut scene);
        let chat = overlay.visual(BubbleKind::Chat).expect("chat");
        assert!(!scene.find(chat).expect("chat node").visible);

        overlay
            .update(16.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        let node = scene.find(chat).expect("chat node");
        assert!(node.visible);
        assert_eq!(node.position, Vec2::new(100.0, 40.0 - config.bubble_gap_px));
    }

    #[test]
    fn bubbles_track_the_nameplate_top() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_chat("hi", 0.0, &config, &mut scene);
        overlay.show_activity("icons/menu", None, 0.0, &mut scene);

        overlay
            .update(16.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        let chat = scene
            .find(overlay.visual(BubbleKind::Chat).expect("chat"))
            .expect("chat node");
        assert_eq!(chat.position, Vec2::new(100.0, 40.0 - config.bubble_gap_px));
        let activity = scene
            .find(overlay.visual(BubbleKind::Activity).expect("icon"))
            .expect("icon node");
        assert!(activity.position.y < chat.position.y - chat.size.height);
        assert!(activity.depth > 10.0);

        let moved = Vec2::new(130.0, 60.0);
        overlay
            .update(32.0, &config, moved, 10.0, &mut scene)
            .expect("update");
        let chat = scene
            .find(overlay.visual(BubbleKind::Chat).expect("chat"))
            .expect("chat node");
        assert_eq!(chat.position.x, 130.0);
    }

    #[test]
    fn sticky_activity_stays_until_expired_explicitly() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        assert!(overlay.show_activity("icons/typing", None, 0.0, &mut scene));
        assert!(overlay.is_activity_sticky());

        overlay
            .update(600_000.0, &config, top(), 10.0, &mut scene)
            .expect("update");
        assert_eq!(overlay.activity_icon(), Some("icons/typing"));

        overlay.expire_sticky_activity(600_000.0);
        overlay
            .update(600_000.0 + config.fade_ms, &config, top(), 10.0, &mut scene)
            .expect("update");
        assert_eq!(overlay.activity_icon(), None);
        assert_eq!(scene.count_label("activity_icon"), 0);
    }

    #[test]
    fn repeated_sticky_request_keeps_the_same_visual() {
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_activity("icons/menu", None, 0.0, &mut scene);
        let first = overlay.visual(BubbleKind::Activity);
        overlay.show_activity("icons/menu", None, 50.0, &mut scene);
        assert_eq!(overlay.visual(BubbleKind::Activity), first);
    }

    #[test]
    fn missing_icon_keeps_previous_bubble() {
        let mut scene = SceneGraph::default();
        scene.mark_texture_missing("icons/dance");
        let mut overlay = OverlayBubbles::default();
        overlay.show_activity("icons/menu", Some(3_000.0), 0.0, &mut scene);
        assert!(!overlay.show_activity("icons/dance", Some(3_000.0), 10.0, &mut scene));
        assert_eq!(overlay.activity_icon(), Some("icons/menu"));
    }

    #[test]
    fn release_is_idempotent() {
        let config = OverlayConfig::default();
        let mut scene = SceneGraph::default();
        let mut overlay = OverlayBubbles::default();
        overlay.show_chat("bye", 0.0, &config, &mut scene);
        overlay.release(&mut scene);
        overlay.release(&mut scene);
        assert!(scene.is_empty());
        assert_eq!(scene.removed_count(), 1);
    }
}
