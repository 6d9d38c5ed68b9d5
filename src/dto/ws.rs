use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::game::GameState;

/// Push-channel event carrying the current scoreboard from the relay.
pub const EVENT_GAME_DATA: &str = "gameData";
/// Push-channel event carrying a client write towards the relay.
pub const EVENT_UPDATE_GAME_DATA: &str = "updateGameData";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
/// Frames exchanged on the push channel, encoded as `{"event": .., "data": ..}`.
#[serde(tag = "event", content = "data")]
pub enum PushMessage {
    /// Relay to client: the full stored document.
    #[serde(rename = "gameData")]
    GameData(GameState),
    /// Client to relay: a full-document overwrite.
    #[serde(rename = "updateGameData")]
    UpdateGameData(GameState),
}

impl PushMessage {
    /// Parse a text frame received on the push channel.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Name of the event carried by this frame.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::GameData(_) => EVENT_GAME_DATA,
            Self::UpdateGameData(_) => EVENT_UPDATE_GAME_DATA,
        }
    }

    /// Consume the frame and return its document.
    pub fn into_state(self) -> GameState {
        match self {
            Self::GameData(state) | Self::UpdateGameData(state) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn frames_use_event_and_data_keys() {
        let frame = PushMessage::UpdateGameData(GameState::default());
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["event"], EVENT_UPDATE_GAME_DATA);
        assert_eq!(value["data"]["gameStarted"], false);
    }

    #[test]
    fn parses_relay_frames() {
        let text = json!({
            "event": "gameData",
            "data": { "gameStarted": true, "teamNames": { "teamA": "Lions", "teamB": "Tigers" } }
        })
        .to_string();

        let frame = PushMessage::from_json_str(&text).unwrap();
        assert_eq!(frame.event_name(), EVENT_GAME_DATA);
        let state = frame.into_state();
        assert!(state.started);
        assert_eq!(state.team_names.team_b, "Tigers");
    }

    #[test]
    fn rejects_unknown_events() {
        let text = json!({ "event": "chat", "data": {} }).to_string();
        assert!(PushMessage::from_json_str(&text).is_err());
    }
}
