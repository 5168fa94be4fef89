use serde::{Deserialize, Serialize};

use crate::direction::Direction;

/// Inbound server state, already decoded by the network layer. Optional
/// fields that are absent leave the entity's current value unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PeerJoined(PeerJoined),
    PeerLeft {
        session_id: String,
    },
    Move(MoveUpdate),
    Afk(AfkUpdate),
    GuiOpen {
        session_id: String,
        gui_open: bool,
    },
    ChatOpen {
        session_id: String,
        chat_open: bool,
    },
    Chat {
        session_id: String,
        text: String,
    },
    Activity {
        session_id: String,
        icon: String,
        #[serde(default)]
        duration_ms: Option<f64>,
    },
}

impl ServerMessage {
    pub fn session_id(&self) -> &str {
        match self {
            Self::PeerJoined(joined) => &joined.session_id,
            Self::Move(update) => &update.session_id,
            Self::Afk(update) => &update.session_id,
            Self::PeerLeft { session_id }
            | Self::GuiOpen { session_id, .. }
            | Self::ChatOpen { session_id, .. }
            | Self::Chat { session_id, .. }
            | Self::Activity { session_id, .. } => session_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PeerJoined(_) => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::Move(_) => "move",
            Self::Afk(_) => "afk",
            Self::GuiOpen { .. } => "gui_open",
            Self::ChatOpen { .. } => "chat_open",
            Self::Chat { .. } => "chat",
            Self::Activity { .. } => "activity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerJoined {
    pub session_id: String,
    #[serde(default)]
    pub name: String,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default = "default_animation")]
    pub animation: String,
    #[serde(default)]
    pub skin: Option<String>,
    #[serde(default)]
    pub custom_animation_prefix: Option<String>,
    #[serde(default)]
    pub premium: bool,
    /// Peer existed before the local client joined; no spawn effect.
    #[serde(default)]
    pub already_present: bool,
    #[serde(default)]
    pub afk: bool,
    #[serde(default)]
    pub afk_since: Option<f64>,
}

fn default_animation() -> String {
    "idle".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveUpdate {
    pub session_id: String,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub animation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfkUpdate {
    pub session_id: String,
    pub afk: bool,
    #[serde(default)]
    pub afk_since: Option<f64>,
    #[serde(default)]
    pub premium: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_joined_fills_defaults() {
        let raw = r#"{"type":"peer_joined","session_id":"s1","name":"ada","x":10,"y":20}"#;
        let message: ServerMessage = serde_json::from_str(raw).expect("parse");
        let ServerMessage::PeerJoined(joined) = message else {
            panic!("expected peer_joined");
        };
        assert_eq!(joined.direction, Direction::South);
        assert_eq!(joined.animation, "idle");
        assert!(!joined.already_present);
        assert_eq!(joined.afk_since, None);
    }

    #[test]
    fn partial_move_keeps_absent_fields_empty() {
        let raw = r#"{"type":"move","session_id":"s1","direction":"nw"}"#;
        let message: ServerMessage = serde_json::from_str(raw).expect("parse");
        assert_eq!(message.session_id(), "s1");
        assert_eq!(message.kind(), "move");
        let ServerMessage::Move(update) = message else {
            panic!("expected move");
        };
        assert_eq!(update.direction, Some(Direction::NorthWest));
        assert_eq!(update.x, None);
        assert_eq!(update.animation, None);
    }

    #[test]
    fn flag_messages_parse() {
        let raw = r#"[
            {"type":"afk","session_id":"s1","afk":true,"afk_since":1234},
            {"type":"gui_open","session_id":"s1","gui_open":true},
            {"type":"chat_open","session_id":"s1","chat_open":false},
            {"type":"chat","session_id":"s1","text":"hi"},
            {"type":"activity","session_id":"s1","icon":"icons/wave"},
            {"type":"peer_left","session_id":"s1"}
        ]"#;
        let messages: Vec<ServerMessage> = serde_json::from_str(raw).expect("parse");
        let kinds: Vec<&str> = messages.iter().map(ServerMessage::kind).collect();
        assert_eq!(
            kinds,
            vec!["afk", "gui_open", "chat_open", "chat", "activity", "peer_left"]
        );
        assert!(messages.iter().all(|message| message.session_id() == "s1"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let raw = r#"{"type":"teleport","session_id":"s1"}"#;
        assert!(serde_json::from_str::<ServerMessage>(raw).is_err());
    }
}
