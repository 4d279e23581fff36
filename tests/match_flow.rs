//! End-to-end match scenarios against the engine and its broadcast
//! schema, driven tick by tick with a hand-rolled clock.

use std::sync::Arc;

use skirmish_server::arena::{self, Aabb};
use skirmish_server::config;
use skirmish_server::game::player::Action;
use skirmish_server::game::snapshot::{agent_view, build_snapshot};
use skirmish_server::game::{EngineEvent, MatchEngine, Phase};
use skirmish_server::systems::weapon::{weapon_config, Ammo, WeaponKind};

const T0: u64 = 1_000_000;

fn open_engine() -> MatchEngine {
    MatchEngine::new("shooter_1".into(), Arc::new(arena::empty_arena()))
}

fn start_duel(engine: &mut MatchEngine) -> (String, String, u64) {
    let a = engine
        .add_agent("key_a".into(), "A".into(), None, None, None, T0)
        .expect("join A");
    let b = engine
        .add_agent("key_b".into(), "B".into(), None, None, None, T0)
        .expect("join B");
    let now = T0 + config::LOBBY_COUNTDOWN_MS;
    engine.start(now);
    engine.pickups.clear();
    (a, b, now)
}

// ─── Scenario: simple kill with a pistol ─────────────────────────────

#[test]
fn pistol_duel_kill_drop_and_respawn() {
    let mut engine = open_engine();
    let (a, b, mut now) = start_duel(&mut engine);
    engine.place_player(&a, 0.0, 0.0, 0.0);
    engine.place_player(&b, 0.0, 20.0, std::f64::consts::PI);
    engine.arm_player(&a, WeaponKind::Pistol, Ammo::Rounds(12));
    engine.arm_player(&b, WeaponKind::Smg, Ammo::Rounds(30));

    let pistol = weapon_config(WeaponKind::Pistol);
    let shots_to_kill = (100 + pistol.damage - 1) / pistol.damage; // ceil

    let mut hits = 0;
    for _ in 0..shots_to_kill {
        now += pistol.fire_rate_ms;
        engine.enqueue(&a, Action::Shoot(0.0));
        let out = engine.run_tick(now);
        for event in &out.events {
            match event {
                EngineEvent::Shot(s) => {
                    assert!(s.hit, "every aimed shot at 20 units must land");
                    assert_eq!(s.shooter_id, a);
                }
                EngineEvent::Hit(h) => {
                    assert_eq!(h.victim_id, b);
                    assert_eq!(h.killer_id, a);
                    assert_eq!(h.damage, pistol.damage);
                    hits += 1;
                }
            }
        }
    }
    assert_eq!(hits, shots_to_kill as usize);

    // B dropped, A credited; the smg lies at the death position.
    let pb = engine.players.get(&b).unwrap();
    assert!(!pb.alive);
    assert_eq!(pb.deaths, 1);
    assert_eq!(engine.players.get(&a).unwrap().kills, 1);
    let death_pos = pb.death_pos.unwrap();
    let dropped = engine
        .pickups
        .iter()
        .find(|p| p.kind == WeaponKind::Smg && !p.taken)
        .expect("victim's gun dropped");
    assert!((dropped.x - death_pos.0).abs() < 1e-9);
    assert!((dropped.z - death_pos.1).abs() < 1e-9);

    // B returns on a fresh life after the delay, away from the corpse.
    now += config::RESPAWN_DELAY_MS + config::TICK_INTERVAL_MS;
    engine.run_tick(now);
    let pb = engine.players.get(&b).unwrap();
    assert!(pb.alive);
    assert_eq!(pb.health, config::MAX_HEALTH);
    assert_eq!(pb.weapon, WeaponKind::Knife);
    assert_eq!(pb.lives, config::MAX_LIVES - 1);
    let moved = ((pb.x - death_pos.0).powi(2) + (pb.z - death_pos.1).powi(2)).sqrt();
    assert!(moved >= config::MIN_RESPAWN_DISTANCE);
}

// ─── Scenario: line of sight blocked by a building ───────────────────

#[test]
fn building_absorbs_the_shot() {
    let building = Aabb::new(-2.0, 0.0, 5.0, 2.0, 4.0, 25.0);
    let mut engine =
        MatchEngine::new("shooter_1".into(), Arc::new(arena::arena_from_boxes(vec![building], vec![])));
    let (a, b, mut now) = start_duel(&mut engine);
    engine.place_player(&a, 0.0, 0.0, 0.0);
    engine.place_player(&b, 0.0, 28.0, std::f64::consts::PI);
    engine.arm_player(&a, WeaponKind::AssaultRifle, Ammo::Rounds(24));

    now += 1_000;
    engine.enqueue(&a, Action::Shoot(0.0));
    let out = engine.run_tick(now);

    assert_eq!(engine.players.get(&b).unwrap().health, 100);
    let shot = out
        .events
        .iter()
        .find_map(|e| match e {
            EngineEvent::Shot(s) => Some(s),
            _ => None,
        })
        .expect("tracer event");
    assert!(!shot.hit);
    assert!(
        (shot.to_z - 5.0).abs() < 0.6,
        "tracer must end at the wall, got z = {}",
        shot.to_z
    );
    assert!(!out.events.iter().any(|e| matches!(e, EngineEvent::Hit(_))));
}

// ─── Scenario: ammo exhaustion downgrades in the same tick ───────────

#[test]
fn last_round_downgrades_and_redistributes_the_gun() {
    let mut engine = open_engine();
    let (a, _, mut now) = start_duel(&mut engine);
    engine.arm_player(&a, WeaponKind::Smg, Ammo::Rounds(1));

    now += 1_000;
    engine.enqueue(&a, Action::Shoot(1.0));
    engine.run_tick(now);

    let pa = engine.players.get(&a).unwrap();
    assert_eq!(pa.weapon, WeaponKind::Knife);
    assert_eq!(pa.ammo, Ammo::Unlimited);

    let replacement = engine
        .pickups
        .iter()
        .find(|p| p.kind == WeaponKind::Smg && !p.taken)
        .expect("a fresh smg pickup exists");
    assert!(
        replacement.x >= config::ARENA_MIN_X && replacement.x <= config::ARENA_MAX_X,
        "pickup must be placed in bounds"
    );
}

// ─── Scenario: termination by last agent standing ────────────────────

#[test]
fn last_survivor_ends_the_match_with_full_survival_time() {
    let mut engine = open_engine();
    let (a, b, start) = start_duel(&mut engine);
    engine.place_player(&a, 0.0, 0.0, 0.0);
    engine.place_player(&b, 0.0, 10.0, std::f64::consts::PI);
    engine.arm_player(&a, WeaponKind::Pistol, Ammo::Rounds(999));

    // Burn through every one of B's lives.
    let pistol = weapon_config(WeaponKind::Pistol);
    let mut now = start;
    let mut out = skirmish_server::game::TickOutput::default();
    for _ in 0..(config::MAX_LIVES as usize) {
        for _ in 0..32 {
            let pb = engine.players.get(&b).unwrap();
            if !pb.alive {
                break;
            }
            let (bx, bz) = (pb.x, pb.z);
            engine.place_player(&a, bx, bz - 5.0, 0.0);
            now += pistol.fire_rate_ms;
            engine.enqueue(&a, Action::Shoot(0.0));
            out = engine.run_tick(now);
            if engine.phase == Phase::Finished {
                break;
            }
        }
        if engine.phase == Phase::Finished {
            break;
        }
        now += config::RESPAWN_DELAY_MS + config::TICK_INTERVAL_MS;
        engine.run_tick(now);
    }

    assert_eq!(engine.phase, Phase::Finished, "eliminating B must end the duel");
    assert!(out.finished);
    assert!(engine.players.get(&b).unwrap().eliminated);

    // The survivor's cumulative time spans the whole match.
    let ended_at = engine.ended_at_ms.unwrap();
    let pa = engine.players.get(&a).unwrap();
    assert_eq!(pa.survival_ms_at(ended_at), ended_at - start);

    let board = skirmish_server::game::snapshot::leaderboard(&engine, ended_at);
    assert_eq!(board[0].id, a, "survivor ranks first");
    assert_eq!(board[0].survival_time, (ended_at - start) as f64 / 1000.0);
}

// ─── Broadcast schema ────────────────────────────────────────────────

#[test]
fn snapshot_json_matches_the_spectator_contract() {
    let mut engine = open_engine();
    let (_, _, now) = start_duel(&mut engine);

    let snap = build_snapshot(&engine, now + 50);
    let json = serde_json::to_value(&snap).unwrap();

    for key in ["matchId", "phase", "tick", "timeRemaining", "arena", "players", "pickups", "leaderboard", "obstacles"] {
        assert!(json.get(key).is_some(), "snapshot missing {key}");
    }
    let arena_obj = &json["arena"];
    for key in ["minX", "maxX", "minZ", "maxZ", "movementSpeed"] {
        assert!(arena_obj.get(key).is_some(), "arena missing {key}");
    }
    let player = &json["players"][0];
    for key in [
        "id", "name", "alive", "x", "y", "z", "angle", "health", "lives", "weapon", "ammo",
        "kills", "score", "characterId", "moving",
    ] {
        assert!(player.get(key).is_some(), "player missing {key}");
    }
    let entry = &json["leaderboard"][0];
    for key in ["id", "name", "kills", "lives", "alive", "score", "survivalTime"] {
        assert!(entry.get(key).is_some(), "leaderboard missing {key}");
    }
}

#[test]
fn agent_view_merges_you_and_hides_self() {
    let mut engine = open_engine();
    let (a, b, now) = start_duel(&mut engine);

    let snap = build_snapshot(&engine, now + 50);
    let view = agent_view(&snap, &a).expect("agent is in the match");
    let json = serde_json::to_value(&view).unwrap();

    assert_eq!(json["you"]["id"], serde_json::json!(a));
    let others: Vec<String> = json["players"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap().to_string())
        .collect();
    assert!(others.contains(&b));
    assert!(!others.contains(&a), "the caller must not appear in players");
}

#[test]
fn knife_ammo_is_the_string_unlimited_on_the_wire() {
    let mut engine = open_engine();
    let (a, _, now) = start_duel(&mut engine);
    let snap = build_snapshot(&engine, now + 50);
    let json = serde_json::to_value(&snap).unwrap();
    let me = json["players"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["id"] == serde_json::json!(a))
        .unwrap();
    assert_eq!(me["weapon"], serde_json::json!("knife"));
    assert_eq!(me["ammo"], serde_json::json!("unlimited"));
}
