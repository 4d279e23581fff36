//! Read models: the spectator snapshot, the per-agent projection, and the
//! `WorldView` the tick loop publishes for gateway workers.

use std::collections::HashMap;

use crate::config;
use crate::msg::events::{
    AgentView, ArenaInfo, LeaderboardEntry, ObstacleBox, PickupSnapshot, PlayerSnapshot, Snapshot,
};
use crate::msg::{round1, round2};

use super::{MatchEngine, Phase};

/// Build the per-tick spectator snapshot. Field names are contractual.
pub fn build_snapshot(engine: &MatchEngine, now_ms: u64) -> Snapshot {
    let players: Vec<PlayerSnapshot> = engine
        .players
        .values()
        .map(|p| PlayerSnapshot {
            id: p.id.clone(),
            name: p.name.clone(),
            alive: p.alive,
            x: round2(p.x),
            y: round2(p.y),
            z: round2(p.z),
            angle: round1(p.angle.to_degrees()),
            health: p.health,
            lives: p.lives,
            weapon: p.weapon.as_str(),
            ammo: p.ammo,
            kills: p.kills,
            score: p.score(),
            character_id: p.character_id.clone(),
            moving: p.moving,
        })
        .collect();

    let pickups: Vec<PickupSnapshot> = engine
        .pickups
        .iter()
        .filter(|p| !p.taken)
        .map(|p| PickupSnapshot {
            id: p.id.clone(),
            kind: p.kind.as_str(),
            x: round2(p.x),
            y: 0.5,
            z: round2(p.z),
        })
        .collect();

    let obstacles: Vec<ObstacleBox> = engine
        .geometry()
        .buildings
        .iter()
        .map(|b| ObstacleBox {
            min_x: round2(b.min_x),
            min_y: round2(b.min_y),
            min_z: round2(b.min_z),
            max_x: round2(b.max_x),
            max_y: round2(b.max_y),
            max_z: round2(b.max_z),
        })
        .collect();

    let time_remaining = if engine.phase == Phase::Active {
        engine.end_ms.saturating_sub(now_ms)
    } else {
        0
    };

    Snapshot {
        match_id: engine.match_id.clone(),
        phase: engine.phase.as_str().to_string(),
        tick: engine.tick,
        time_remaining,
        arena: ArenaInfo {
            min_x: config::ARENA_MIN_X,
            max_x: config::ARENA_MAX_X,
            min_z: config::ARENA_MIN_Z,
            max_z: config::ARENA_MAX_Z,
            movement_speed: config::MOVE_SPEED,
        },
        players,
        pickups,
        leaderboard: leaderboard(engine, now_ms),
        obstacles,
    }
}

/// Total order: survival desc, kills desc, score desc. Ids break the
/// remaining ties so the order is stable across rebuilds.
pub fn leaderboard(engine: &MatchEngine, now_ms: u64) -> Vec<LeaderboardEntry> {
    let at = match engine.phase {
        Phase::Finished => engine.effective_end_ms(),
        _ => now_ms,
    };
    let mut entries: Vec<(u64, LeaderboardEntry)> = engine
        .players
        .values()
        .map(|p| {
            let survival_ms = p.survival_ms_at(at);
            (
                survival_ms,
                LeaderboardEntry {
                    id: p.id.clone(),
                    name: p.name.clone(),
                    kills: p.kills,
                    lives: p.lives,
                    alive: p.alive,
                    score: p.score(),
                    survival_time: round2(survival_ms as f64 / 1000.0),
                },
            )
        })
        .collect();

    entries.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then(b.kills.cmp(&a.kills))
            .then(b.score.cmp(&a.score))
            .then(a.id.cmp(&b.id))
    });
    entries.into_iter().map(|(_, e)| e).collect()
}

/// The shared snapshot with `you` split out and the caller removed from
/// `players`. `None` when the player is not part of the match.
pub fn agent_view(snapshot: &Snapshot, player_id: &str) -> Option<AgentView> {
    let you = snapshot.players.iter().find(|p| p.id == player_id)?.clone();
    let players = snapshot.players.iter().filter(|p| p.id != player_id).cloned().collect();
    Some(AgentView {
        match_id: snapshot.match_id.clone(),
        phase: snapshot.phase.clone(),
        tick: snapshot.tick,
        time_remaining: snapshot.time_remaining,
        arena: snapshot.arena.clone(),
        you,
        players,
        pickups: snapshot.pickups.clone(),
        leaderboard: snapshot.leaderboard.clone(),
        obstacles: snapshot.obstacles.clone(),
    })
}

// ─── Published view ──────────────────────────────────────────────────

/// What the tick loop publishes after every tick. Workers clone whatever
/// is current; the tick loop never blocks on them.
#[derive(Debug, Clone)]
pub struct WorldView {
    pub snapshot: Snapshot,
    pub phase: Phase,
    pub match_id: String,
    /// Countdown end, while counting down.
    pub starts_at_ms: Option<u64>,
    /// Next lobby opening, while showing results.
    pub lobby_opens_at_ms: Option<u64>,
    pub next_match_id: Option<String>,
    /// api key → player id, for gateway-side request validation.
    pub key_to_player: HashMap<String, String>,
}

impl WorldView {
    /// Placeholder published before the first lobby opens.
    pub fn startup() -> Self {
        Self {
            snapshot: Snapshot {
                match_id: String::new(),
                phase: Phase::Lobby.as_str().to_string(),
                tick: 0,
                time_remaining: 0,
                arena: ArenaInfo {
                    min_x: config::ARENA_MIN_X,
                    max_x: config::ARENA_MAX_X,
                    min_z: config::ARENA_MIN_Z,
                    max_z: config::ARENA_MAX_Z,
                    movement_speed: config::MOVE_SPEED,
                },
                players: Vec::new(),
                pickups: Vec::new(),
                leaderboard: Vec::new(),
                obstacles: Vec::new(),
            },
            phase: Phase::Lobby,
            match_id: String::new(),
            starts_at_ms: None,
            lobby_opens_at_ms: None,
            next_match_id: None,
            key_to_player: HashMap::new(),
        }
    }

    pub fn has_match(&self) -> bool {
        !self.match_id.is_empty()
    }

    pub fn player_snapshot(&self, player_id: &str) -> Option<&PlayerSnapshot> {
        self.snapshot.players.iter().find(|p| p.id == player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena;
    use crate::game::player::Action;
    use crate::systems::weapon::{Ammo, WeaponKind};
    use std::sync::Arc;

    fn engine_with_two() -> (MatchEngine, String, String) {
        let mut engine = MatchEngine::new("shooter_7".into(), Arc::new(arena::empty_arena()));
        let a = engine.add_agent("ka".into(), "Alpha".into(), None, None, None, 1_000).unwrap();
        let b = engine.add_agent("kb".into(), "Beta".into(), None, None, None, 1_000).unwrap();
        (engine, a, b)
    }

    #[test]
    fn snapshot_carries_contractual_sections() {
        let (mut engine, _, _) = engine_with_two();
        engine.start(10_000);
        let snap = build_snapshot(&engine, 10_050);

        assert_eq!(snap.match_id, "shooter_7");
        assert_eq!(snap.phase, "active");
        assert_eq!(snap.players.len(), 2);
        assert_eq!(snap.pickups.len(), crate::config::INITIAL_PICKUP_COUNT);
        assert_eq!(snap.leaderboard.len(), 2);
        assert_eq!(snap.arena.movement_speed, crate::config::MOVE_SPEED);
        assert!(snap.time_remaining <= crate::config::MATCH_DURATION_MS);
    }

    #[test]
    fn snapshot_positions_are_rounded() {
        let (mut engine, a, _) = engine_with_two();
        engine.start(10_000);
        engine.place_player(&a, 1.23456, -2.98765, 1.0);
        let snap = build_snapshot(&engine, 10_050);
        let you = snap.players.iter().find(|p| p.id == a).unwrap();
        assert_eq!(you.x, 1.23);
        assert_eq!(you.z, -2.99);
        assert_eq!(you.angle, 57.3); // 1 rad in degrees, one decimal
    }

    #[test]
    fn score_is_hundred_per_kill() {
        let (mut engine, a, _) = engine_with_two();
        engine.players.get_mut(&a).unwrap().kills = 3;
        let snap = build_snapshot(&engine, 2_000);
        let you = snap.players.iter().find(|p| p.id == a).unwrap();
        assert_eq!(you.score, 300);
    }

    #[test]
    fn leaderboard_orders_by_survival_then_kills_then_score() {
        let (mut engine, a, b) = engine_with_two();
        engine.start(10_000);
        {
            let pa = engine.players.get_mut(&a).unwrap();
            pa.alive = false;
            pa.survival_ms = 4_000;
            pa.kills = 5;
        }
        {
            let pb = engine.players.get_mut(&b).unwrap();
            pb.alive = false;
            pb.survival_ms = 9_000;
            pb.kills = 0;
        }
        let board = leaderboard(&engine, 20_000);
        assert_eq!(board[0].id, b, "longer survivor ranks first despite fewer kills");
        assert_eq!(board[1].id, a);
    }

    #[test]
    fn agent_view_splits_you_from_players() {
        let (mut engine, a, b) = engine_with_two();
        engine.start(10_000);
        let snap = build_snapshot(&engine, 10_050);

        let view = agent_view(&snap, &a).expect("player is in the match");
        assert_eq!(view.you.id, a);
        assert_eq!(view.players.len(), 1);
        assert_eq!(view.players[0].id, b);

        assert!(agent_view(&snap, "ghost").is_none());
    }

    #[test]
    fn taken_pickups_leave_the_snapshot() {
        let (mut engine, a, _) = engine_with_two();
        engine.start(10_000);
        engine.pickups.clear();
        engine.arm_player(&a, WeaponKind::Knife, Ammo::Unlimited);
        let (x, z) = {
            let p = engine.players.get(&a).unwrap();
            (p.x, p.z)
        };
        engine.enqueue(&a, Action::Stop);
        engine.add_pickup(WeaponKind::Smg, x, z + 0.5);
        engine.run_tick(10_050);

        let snap = build_snapshot(&engine, 10_050);
        assert!(snap.pickups.is_empty(), "taken pickups must not be broadcast");
    }
}
