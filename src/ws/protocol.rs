//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is a JSON text message `{"type": <event>, "data": <payload>}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::game::entity::{
    Direction, EnemyAction, EnemyEntity, EnemyId, PlayerAction, PlayerEntity, PlayerId, Vec2,
};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Claim a player id and join the world
    Init(InitRequest),

    /// Partial input state; any subset of fields
    PlayerInput(PlayerInputMsg),

    /// Chat line to relay to everyone
    ChatMessage(ChatIn),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub player_id: PlayerId,
}

/// Player input message. Unset fields read as false / absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerInputMsg {
    pub left: Option<bool>,
    pub right: Option<bool>,
    pub up: Option<bool>,
    pub down: Option<bool>,
    pub direction: Option<Direction>,
    pub action: Option<PlayerAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatIn {
    pub message: String,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Reply to `init` with the caller's own state and the current world
    Init(InitPayload),

    /// Full world snapshot, every tick
    GameState(Snapshot),

    /// Player joined the world
    PlayerJoined {
        #[serde(rename = "playerData")]
        player_data: PlayerPublic,
    },

    /// Player left the world
    PlayerLeft {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },

    /// Sent only to the player who levelled
    LevelUp { level: u32 },

    /// Relayed chat line
    ChatMessage { id: PlayerId, message: String },

    /// Error message
    Error { code: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    pub player_data: PlayerPublic,
    pub players: BTreeMap<PlayerId, PlayerPublic>,
    pub enemies: BTreeMap<EnemyId, EnemyPublic>,
}

/// Public state of every entity at the end of a tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: BTreeMap<PlayerId, PlayerPublic>,
    /// Alive enemies only
    pub enemies: BTreeMap<EnemyId, EnemyPublic>,
}

/// Player fields visible to every client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPublic {
    pub id: PlayerId,
    pub position: Vec2,
    pub level: u32,
    pub exp: u32,
    pub health: i32,
    pub direction: Direction,
    pub action: PlayerAction,
}

impl From<&PlayerEntity> for PlayerPublic {
    fn from(p: &PlayerEntity) -> Self {
        Self {
            id: p.id.clone(),
            position: p.position,
            level: p.level,
            exp: p.exp,
            health: p.health,
            direction: p.direction,
            action: p.action,
        }
    }
}

/// Enemy fields visible to every client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyPublic {
    pub id: EnemyId,
    pub position: Vec2,
    pub health: i32,
    pub direction: Direction,
    pub action: EnemyAction,
}

impl From<&EnemyEntity> for EnemyPublic {
    fn from(e: &EnemyEntity) -> Self {
        Self {
            id: e.id.clone(),
            position: e.position,
            health: e.health.max(0),
            direction: e.direction,
            action: e.action,
        }
    }
}

/// A serialized server message, shared between all receivers
pub type Frame = Arc<str>;

impl ServerMsg {
    pub fn encode(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_input_parses_with_missing_fields_unset() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"playerInput","data":{"up":true,"unknown":1}}"#).unwrap();
        let ClientMsg::PlayerInput(input) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(input.up, Some(true));
        assert_eq!(input.left, None);
        assert_eq!(input.action, None);

        let msg: ClientMsg = serde_json::from_str(
            r#"{"type":"playerInput","data":{"action":"attack","direction":"left"}}"#,
        )
        .unwrap();
        let ClientMsg::PlayerInput(input) = msg else {
            panic!("wrong variant");
        };
        assert_eq!(input.action, Some(PlayerAction::Attack));
        assert_eq!(input.direction, Some(Direction::Left));
    }

    #[test]
    fn init_uses_camel_case_player_id() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"init","data":{"playerId":"alice"}}"#).unwrap();
        assert!(matches!(msg, ClientMsg::Init(InitRequest { ref player_id }) if player_id == "alice"));
    }

    #[test]
    fn server_events_use_wire_names() {
        let json: serde_json::Value =
            serde_json::from_str(&ServerMsg::LevelUp { level: 3 }.encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "levelUp", "data": {"level": 3}}));

        let left = ServerMsg::PlayerLeft {
            player_id: "bob".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&left.encode().unwrap()).unwrap();
        assert_eq!(json["type"], "playerLeft");
        assert_eq!(json["data"]["playerId"], "bob");

        let enemy = EnemyEntity::new("enemy-1".to_string(), Vec2::new(1.0, 2.0));
        let json = serde_json::to_value(EnemyPublic::from(&enemy)).unwrap();
        assert_eq!(json["action"], "idle");
        assert_eq!(json["position"]["y"], 2.0);
    }
}
