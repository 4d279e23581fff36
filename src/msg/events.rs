//! Snapshot and one-shot event payloads pushed on the `shooter` channel.

use serde::Serialize;

use crate::systems::weapon::Ammo;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaInfo {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
    pub movement_speed: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: String,
    pub name: String,
    pub alive: bool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Heading in degrees.
    pub angle: f64,
    pub health: i32,
    pub lives: u32,
    pub weapon: &'static str,
    pub ammo: Ammo,
    pub kills: u32,
    pub score: u32,
    pub character_id: String,
    pub moving: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub kills: u32,
    pub lives: u32,
    pub alive: bool,
    pub score: u32,
    /// Cumulative seconds across lives.
    pub survival_time: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObstacleBox {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub max_z: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub match_id: String,
    pub phase: String,
    pub tick: u64,
    pub time_remaining: u64,
    pub arena: ArenaInfo,
    pub players: Vec<PlayerSnapshot>,
    pub pickups: Vec<PickupSnapshot>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub obstacles: Vec<ObstacleBox>,
}

/// Per-agent projection: the caller's entry moves into `you`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentView {
    pub match_id: String,
    pub phase: String,
    pub tick: u64,
    pub time_remaining: u64,
    pub arena: ArenaInfo,
    pub you: PlayerSnapshot,
    pub players: Vec<PlayerSnapshot>,
    pub pickups: Vec<PickupSnapshot>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub obstacles: Vec<ObstacleBox>,
}

// ─── One-shot events ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotEvent {
    pub from_x: f64,
    pub from_z: f64,
    pub to_x: f64,
    pub to_z: f64,
    pub weapon: &'static str,
    pub shooter_id: String,
    pub hit: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitEvent {
    pub victim_id: String,
    pub damage: i32,
    pub weapon: &'static str,
    pub killer_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndEvent {
    pub match_id: String,
    pub winner_name: Option<String>,
    pub is_draw: bool,
    pub rankings: Vec<LeaderboardEntry>,
    pub ended_at: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyOpenEvent {
    pub match_id: String,
    pub lobby_opened_at: u64,
}

/// Envelope for the spectator WebSocket; `type` discriminates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsEvent {
    Snapshot(Snapshot),
    Shot(ShotEvent),
    Hit(HitEvent),
    MatchEnd(MatchEndEvent),
    LobbyOpen(LobbyOpenEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_event_is_tagged_by_type() {
        let event = WsEvent::LobbyOpen(LobbyOpenEvent {
            match_id: "shooter_4".into(),
            lobby_opened_at: 1_700_000_000_000,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"lobbyOpen\""));
        assert!(json.contains("\"matchId\":\"shooter_4\""));
    }

    #[test]
    fn shot_event_field_names_are_contractual() {
        let event = ShotEvent {
            from_x: 0.0,
            from_z: 0.0,
            to_x: 1.25,
            to_z: 2.5,
            weapon: "pistol",
            shooter_id: "player_1".into(),
            hit: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        for field in ["fromX", "fromZ", "toX", "toZ", "weapon", "shooterId", "hit"] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn pickup_uses_type_for_weapon_kind() {
        let p = PickupSnapshot { id: "pickup_1".into(), kind: "smg", x: 0.0, y: 0.5, z: 0.0 };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"type\":\"smg\""));
    }
}
