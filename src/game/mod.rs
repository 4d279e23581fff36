//! The match engine.
//!
//! Owns the match data model and runs the fixed-tick simulation: drain
//! queued actions, move capsules, resolve fire and melee, hand out
//! pickups, respawn the dead, and detect termination. The engine never
//! touches the network or the database; the lifecycle controller drives
//! it and fans out its events.

pub mod lifecycle;
pub mod player;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

use crate::arena::StaticArenaGeometry;
use crate::config;
use crate::msg::events::{HitEvent, ShotEvent};
use crate::msg::round2;
use crate::physics::PhysicsWorld;
use crate::systems::bot::{personality_config, BotBrain, BotSelf, BotView, EnemyInfo, Personality, PickupInfo};
use crate::systems::combat;
use crate::systems::weapon::{
    can_fire, consume_ammo, full_ammo, resolve_melee, resolve_shot, weapon_config, Ammo, ShotTarget,
    WeaponKind,
};

use self::player::{Action, ActionSlots, Player};

// ─── Phase ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    Countdown,
    Active,
    Finished,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::Countdown => "countdown",
            Self::Active => "active",
            Self::Finished => "finished",
        }
    }
}

// ─── Pickups ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Pickup {
    pub id: String,
    pub kind: WeaponKind,
    pub x: f64,
    pub z: f64,
    /// Terminal once set.
    pub taken: bool,
}

// ─── Tick output ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum EngineEvent {
    Shot(ShotEvent),
    Hit(HitEvent),
}

#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<EngineEvent>,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    LobbyFull,
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct MatchEngine {
    pub match_id: String,
    pub phase: Phase,
    pub tick: u64,
    pub start_ms: u64,
    pub end_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub players: BTreeMap<String, Player>,
    pub pickups: Vec<Pickup>,
    physics: PhysicsWorld,
    pending: HashMap<String, ActionSlots>,
    brains: HashMap<String, BotBrain>,
    next_player_seq: u32,
    next_pickup_seq: u32,
}

impl MatchEngine {
    pub fn new(match_id: String, geometry: std::sync::Arc<StaticArenaGeometry>) -> Self {
        Self {
            match_id,
            phase: Phase::Lobby,
            tick: 0,
            start_ms: 0,
            end_ms: 0,
            ended_at_ms: None,
            players: BTreeMap::new(),
            pickups: Vec::new(),
            physics: PhysicsWorld::new(geometry),
            pending: HashMap::new(),
            brains: HashMap::new(),
            next_player_seq: 1,
            next_pickup_seq: 1,
        }
    }

    pub fn geometry(&self) -> &StaticArenaGeometry {
        self.physics.geometry()
    }

    /// Wall-clock end of the match: actual end once finished, scheduled
    /// end while running.
    pub fn effective_end_ms(&self) -> u64 {
        self.ended_at_ms.unwrap_or(self.end_ms)
    }

    pub fn find_by_key(&self, api_key: &str) -> Option<&Player> {
        self.players.values().find(|p| p.api_key.as_deref() == Some(api_key))
    }

    // ── Joining ─────────────────────────────────────────────────────

    /// Add a remote agent's player at a free spawn point.
    #[allow(clippy::too_many_arguments)]
    pub fn add_agent(
        &mut self,
        api_key: String,
        name: String,
        wallet: Option<String>,
        strategy: Option<String>,
        character_id: Option<String>,
        now_ms: u64,
    ) -> Result<String, JoinError> {
        if self.players.len() >= config::MAX_PLAYERS {
            return Err(JoinError::LobbyFull);
        }
        let id = format!("player_{}", self.next_player_seq);
        self.next_player_seq += 1;

        let (x, z) = self.pick_join_spawn();
        let mut p = Player::new(id.clone(), name, x, z, now_ms);
        p.api_key = Some(api_key);
        p.wallet = wallet;
        p.strategy = strategy;
        if let Some(c) = character_id {
            p.character_id = c;
        }
        self.physics.create_capsule(&id, x, z);
        self.players.insert(id.clone(), p);
        Ok(id)
    }

    /// Add a house bot. Indistinguishable from an agent in every broadcast.
    pub fn add_bot(&mut self, name: String, personality: Personality, now_ms: u64) -> Option<String> {
        if self.players.len() >= config::MAX_PLAYERS {
            return None;
        }
        let id = format!("bot_{}", self.next_player_seq);
        self.next_player_seq += 1;

        let (x, z) = self.pick_join_spawn();
        let mut p = Player::new(id.clone(), name, x, z, now_ms);
        p.is_ai = true;
        p.personality = Some(personality);
        p.character_id = format!("bot_skin_{}", personality_config(personality).name);
        self.physics.create_capsule(&id, x, z);
        self.players.insert(id.clone(), p);
        self.brains.insert(id.clone(), BotBrain::new(personality));
        Some(id)
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Queue an action; the latest of each kind wins within a tick.
    pub fn enqueue(&mut self, player_id: &str, action: Action) {
        if !self.players.contains_key(player_id) {
            return;
        }
        self.pending.entry(player_id.to_string()).or_default().apply(action);
    }

    // ── Lifecycle hooks ─────────────────────────────────────────────

    pub fn start(&mut self, now_ms: u64) {
        self.phase = Phase::Active;
        self.start_ms = now_ms;
        self.end_ms = now_ms + config::MATCH_DURATION_MS;
        for p in self.players.values_mut() {
            p.alive_since_ms = now_ms;
        }
        self.spawn_initial_pickups();
    }

    fn finish(&mut self, now_ms: u64) {
        self.phase = Phase::Finished;
        self.ended_at_ms = Some(now_ms);
    }

    /// ≤1 player still in contention, with a real match having formed.
    fn termination_reached(&self) -> bool {
        self.players.len() >= 2
            && self.players.values().filter(|p| p.in_contention()).count() <= 1
    }

    // ── Tick ────────────────────────────────────────────────────────

    pub fn run_tick(&mut self, now_ms: u64) -> TickOutput {
        let mut out = TickOutput::default();
        if self.phase != Phase::Active {
            return out;
        }

        // 1. Advance, then check time and contention.
        self.tick += 1;
        if now_ms >= self.end_ms || self.termination_reached() {
            self.finish(now_ms);
            out.finished = true;
            return out;
        }

        // 2. Pre-tick hook: bot brains queue into this tick's action map.
        self.run_bot_brains(now_ms);

        // 3. Take the effective action set and clear the queue.
        let actions = std::mem::take(&mut self.pending);

        // 4. Movement.
        self.step_movement(&actions);

        // 5 + 6. Fire, then melee.
        self.step_shooting(&actions, now_ms, &mut out.events);
        self.step_melee(&actions, now_ms, &mut out.events);

        // 7. Contact pickups (the explicit action is advisory).
        self.step_pickups();

        // 8. Respawns.
        self.step_respawns(now_ms);

        // 9. Termination by last player standing.
        if self.termination_reached() {
            self.finish(now_ms);
            out.finished = true;
        }

        out
    }

    // ── Step 2: bots ────────────────────────────────────────────────

    fn run_bot_brains(&mut self, now_ms: u64) {
        let bot_ids: Vec<String> = self
            .players
            .values()
            .filter(|p| p.is_ai && p.alive)
            .map(|p| p.id.clone())
            .collect();

        let mut rng = rand::thread_rng();
        for id in bot_ids {
            let Some(me) = self.players.get(&id) else { continue };
            let me_view = BotSelf {
                id: id.clone(),
                x: me.x,
                z: me.z,
                health: me.health,
                weapon: me.weapon,
            };
            let enemies: Vec<EnemyInfo> = self
                .players
                .values()
                .filter(|p| p.alive && p.id != id)
                .map(|p| EnemyInfo {
                    id: p.id.clone(),
                    x: p.x,
                    z: p.z,
                    health: p.health,
                    weapon_tier: p.weapon.tier(),
                })
                .collect();
            let pickups: Vec<PickupInfo> = self
                .pickups
                .iter()
                .filter(|p| !p.taken)
                .map(|p| PickupInfo { x: p.x, z: p.z })
                .collect();

            let physics = &self.physics;
            let ray = move |ox: f64, oz: f64, a: f64, max: f64| physics.ray_first_hit(ox, oz, a, max);
            let view = BotView {
                now_ms,
                me: me_view,
                enemies: &enemies,
                pickups: &pickups,
                ray: &ray,
            };

            let Some(brain) = self.brains.get_mut(&id) else { continue };
            for action in brain.think(&view, &mut rng) {
                self.pending.entry(id.clone()).or_default().apply(action);
            }
        }
    }

    // ── Step 4: movement ────────────────────────────────────────────

    fn step_movement(&mut self, actions: &HashMap<String, ActionSlots>) {
        let dt = config::TICK_INTERVAL_MS as f64 / 1000.0;
        let ids: Vec<String> = self.players.keys().cloned().collect();

        for id in ids {
            let slots = actions.get(&id).copied().unwrap_or_default();
            let alive = self.players.get(&id).map_or(false, |p| p.alive);
            if !alive {
                if let Some(p) = self.players.get_mut(&id) {
                    p.moving = false;
                }
                continue;
            }

            match slots.move_angle {
                Some(angle) => {
                    // Server-computed displacement; no client velocity is trusted.
                    let dx = config::MOVE_SPEED * dt * angle.sin();
                    let dz = config::MOVE_SPEED * dt * angle.cos();
                    let moved = self.physics.move_capsule(&id, dx, dz);
                    if let Some(p) = self.players.get_mut(&id) {
                        p.angle = angle;
                        if let Some((x, z)) = moved {
                            p.x = x;
                            p.z = z;
                        }
                        p.moving = true;
                    }
                }
                None => {
                    if let Some(p) = self.players.get_mut(&id) {
                        p.moving = false;
                    }
                }
            }

            // Bounded corruption check: a non-finite pose becomes a teleport.
            let corrupted = self
                .players
                .get(&id)
                .map_or(false, |p| !p.x.is_finite() || !p.z.is_finite() || !p.angle.is_finite());
            if corrupted {
                warn!("Player {id} has a non-finite pose, teleporting to a clear point");
                let (x, z) = self.random_clear_point(&mut rand::thread_rng());
                if let Some(p) = self.players.get_mut(&id) {
                    p.x = x;
                    p.z = z;
                    p.angle = 0.0;
                }
                self.physics.teleport(&id, x, z);
            }
        }
    }

    // ── Step 5: shooting ────────────────────────────────────────────

    fn step_shooting(
        &mut self,
        actions: &HashMap<String, ActionSlots>,
        now_ms: u64,
        events: &mut Vec<EngineEvent>,
    ) {
        struct FiredShot {
            shooter_id: String,
            ox: f64,
            oz: f64,
            aim: f64,
            weapon: WeaponKind,
            accuracy: f64,
        }

        // Targets and eligibility are fixed before any damage lands, so
        // two shooters can trade kills on the same tick.
        let targets_all: Vec<ShotTarget> = self
            .players
            .values()
            .filter(|p| p.alive)
            .map(|p| ShotTarget { id: p.id.clone(), x: p.x, z: p.z })
            .collect();

        let mut fired: Vec<FiredShot> = Vec::new();
        let shooter_ids: Vec<String> = self.players.keys().cloned().collect();
        for id in shooter_ids {
            let Some(aim) = actions.get(&id).and_then(|s| s.shoot_aim) else { continue };
            let Some(p) = self.players.get_mut(&id) else { continue };
            if !p.alive || !can_fire(p.weapon, p.ammo, p.last_shot_ms, now_ms) {
                continue;
            }

            // Decrement on fire-apply.
            p.last_shot_ms = now_ms;
            p.ammo = consume_ammo(p.ammo);
            fired.push(FiredShot {
                shooter_id: id.clone(),
                ox: p.x,
                oz: p.z,
                aim,
                weapon: p.weapon,
                accuracy: p.personality.map(|pp| personality_config(pp).accuracy).unwrap_or(1.0),
            });

            // Dry magazine: downgrade now and respawn the gun elsewhere.
            if p.ammo.is_empty() {
                let kind = p.weapon;
                p.weapon = WeaponKind::Knife;
                p.ammo = Ammo::Unlimited;
                self.spawn_pickup_at_eligible_point(kind);
            }
        }

        let mut rng = rand::thread_rng();
        for shot in fired {
            let targets: Vec<ShotTarget> = targets_all
                .iter()
                .filter(|t| t.id != shot.shooter_id)
                .cloned()
                .collect();
            let physics = &self.physics;
            let outcomes = resolve_shot(
                shot.ox,
                shot.oz,
                shot.aim,
                shot.weapon,
                shot.accuracy,
                &targets,
                |ox, oz, a, max| physics.ray_first_hit(ox, oz, a, max),
                &mut rng,
            );

            let weapon_name = weapon_config(shot.weapon).name;
            let first_hit = outcomes.iter().find(|o| o.target_id.is_some());
            let tracer_end = first_hit
                .or(outcomes.first())
                .map(|o| (o.end_x, o.end_z))
                .unwrap_or((shot.ox, shot.oz));

            events.push(EngineEvent::Shot(ShotEvent {
                from_x: round2(shot.ox),
                from_z: round2(shot.oz),
                to_x: round2(tracer_end.0),
                to_z: round2(tracer_end.1),
                weapon: weapon_name,
                shooter_id: shot.shooter_id.clone(),
                hit: first_hit.is_some(),
            }));

            for outcome in outcomes {
                let Some(victim_id) = outcome.target_id else { continue };
                self.apply_hit(&victim_id, &shot.shooter_id, outcome.damage, weapon_name, now_ms, events);
            }
        }
    }

    // ── Step 6: melee ───────────────────────────────────────────────

    fn step_melee(
        &mut self,
        actions: &HashMap<String, ActionSlots>,
        now_ms: u64,
        events: &mut Vec<EngineEvent>,
    ) {
        let knife = weapon_config(WeaponKind::Knife);
        let ids: Vec<String> = self.players.keys().cloned().collect();

        for id in ids {
            if !actions.get(&id).map_or(false, |s| s.melee) {
                continue;
            }
            let Some(p) = self.players.get(&id) else { continue };
            if !p.alive || now_ms.saturating_sub(p.last_shot_ms) < knife.fire_rate_ms {
                continue;
            }
            let (ox, oz) = (p.x, p.z);

            let targets: Vec<ShotTarget> = self
                .players
                .values()
                .filter(|t| t.alive && t.id != id)
                .map(|t| ShotTarget { id: t.id.clone(), x: t.x, z: t.z })
                .collect();

            if let Some(p) = self.players.get_mut(&id) {
                p.last_shot_ms = now_ms;
            }

            if let Some(hit) = resolve_melee(ox, oz, &targets) {
                let victim_id = hit.target_id.clone().unwrap_or_default();
                self.apply_hit(&victim_id, &id, hit.damage, knife.name, now_ms, events);
            }
        }
    }

    fn apply_hit(
        &mut self,
        victim_id: &str,
        killer_id: &str,
        damage: i32,
        weapon_name: &'static str,
        now_ms: u64,
        events: &mut Vec<EngineEvent>,
    ) {
        let Some(victim) = self.players.get_mut(victim_id) else { return };
        if !victim.alive {
            return; // already down this tick
        }

        let outcome = combat::apply_damage(victim, damage, now_ms);
        events.push(EngineEvent::Hit(HitEvent {
            victim_id: victim.id.clone(),
            damage,
            weapon: weapon_name,
            killer_id: killer_id.to_string(),
            x: round2(victim.x),
            y: round2(victim.y),
            z: round2(victim.z),
        }));

        if outcome.killed {
            let dropped = (victim.weapon != WeaponKind::Knife).then_some((victim.weapon, victim.x, victim.z));
            self.physics.remove(victim_id);
            if let Some((kind, x, z)) = dropped {
                self.add_pickup(kind, x, z);
            }
            if let Some(killer) = self.players.get_mut(killer_id) {
                killer.kills += 1;
            }
        }
    }

    // ── Step 7: pickups ─────────────────────────────────────────────

    fn step_pickups(&mut self) {
        let ids: Vec<String> = self.players.keys().cloned().collect();
        for id in ids {
            let Some(p) = self.players.get(&id) else { continue };
            if !p.alive {
                continue;
            }
            let (px, pz) = (p.x, p.z);

            let grabbed = self
                .pickups
                .iter_mut()
                .filter(|pk| !pk.taken)
                .filter_map(|pk| {
                    let dx = pk.x - px;
                    let dz = pk.z - pz;
                    let d = (dx * dx + dz * dz).sqrt();
                    (d <= config::PICKUP_RADIUS).then_some((pk, d))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));

            if let Some((pickup, _)) = grabbed {
                pickup.taken = true;
                let kind = pickup.kind;
                if let Some(p) = self.players.get_mut(&id) {
                    p.weapon = kind;
                    p.ammo = full_ammo(kind);
                }
            }
        }
    }

    // ── Step 8: respawns ────────────────────────────────────────────

    fn step_respawns(&mut self, now_ms: u64) {
        let due: Vec<String> = self
            .players
            .values()
            .filter(|p| combat::respawn_due(p, now_ms))
            .map(|p| p.id.clone())
            .collect();

        for id in due {
            let death_pos = self.players.get(&id).and_then(|p| p.death_pos);
            let (x, z) = self.pick_respawn_point(death_pos);
            if let Some(p) = self.players.get_mut(&id) {
                combat::respawn(p, x, z, now_ms);
            }
            self.physics.create_capsule(&id, x, z);
            if let Some(brain) = self.brains.get_mut(&id) {
                brain.reset();
            }
        }
    }

    // ── Spawn selection ─────────────────────────────────────────────

    fn living_positions(&self) -> Vec<(f64, f64)> {
        self.players.values().filter(|p| p.alive).map(|p| (p.x, p.z)).collect()
    }

    fn clear_of(positions: &[(f64, f64)], x: f64, z: f64, min_dist: f64) -> bool {
        positions.iter().all(|(px, pz)| {
            let dx = x - px;
            let dz = z - pz;
            dx * dx + dz * dz >= min_dist * min_dist
        })
    }

    fn pick_join_spawn(&self) -> (f64, f64) {
        let mut rng = rand::thread_rng();
        let occupied = self.living_positions();
        let mut candidates: Vec<_> = self.geometry().spawn_points.clone();
        candidates.shuffle(&mut rng);
        for sp in &candidates {
            if Self::clear_of(&occupied, sp.x, sp.z, config::MIN_SPAWN_SEPARATION) {
                return (sp.x, sp.z);
            }
        }
        self.random_clear_point(&mut rng)
    }

    /// Unoccupied spawn far from the death position, then any unoccupied
    /// spawn, then a random clear point.
    fn pick_respawn_point(&self, death_pos: Option<(f64, f64)>) -> (f64, f64) {
        let mut rng = rand::thread_rng();
        let occupied = self.living_positions();
        let spawns = &self.geometry().spawn_points;
        if !spawns.is_empty() {
            for _ in 0..config::RESPAWN_MAX_TRIES {
                let sp = spawns[rng.gen_range(0..spawns.len())];
                if !Self::clear_of(&occupied, sp.x, sp.z, config::MIN_SPAWN_SEPARATION) {
                    continue;
                }
                let far_enough = death_pos.map_or(true, |(dx, dz)| {
                    let ddx = sp.x - dx;
                    let ddz = sp.z - dz;
                    ddx * ddx + ddz * ddz >= config::MIN_RESPAWN_DISTANCE * config::MIN_RESPAWN_DISTANCE
                });
                if far_enough {
                    return (sp.x, sp.z);
                }
            }
            for sp in spawns {
                if Self::clear_of(&occupied, sp.x, sp.z, config::MIN_SPAWN_SEPARATION) {
                    return (sp.x, sp.z);
                }
            }
        }
        self.random_clear_point(&mut rng)
    }

    /// Random in-bounds point outside every building.
    fn random_clear_point<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let margin = config::PLAYER_RADIUS * 2.0;
        for _ in 0..64 {
            let x = rng.gen_range(config::ARENA_MIN_X + margin..config::ARENA_MAX_X - margin);
            let z = rng.gen_range(config::ARENA_MIN_Z + margin..config::ARENA_MAX_Z - margin);
            if !self.physics.is_inside_building(x, z, config::PLAYER_RADIUS) {
                return (x, z);
            }
        }
        (0.0, 0.0)
    }

    // ── Pickup placement ────────────────────────────────────────────

    fn add_pickup(&mut self, kind: WeaponKind, x: f64, z: f64) {
        let id = format!("pickup_{}", self.next_pickup_seq);
        self.next_pickup_seq += 1;
        self.pickups.push(Pickup { id, kind, x, z, taken: false });
    }

    /// Initial drops: spawn points away from players and from each other.
    fn spawn_initial_pickups(&mut self) {
        let mut rng = rand::thread_rng();
        let occupied = self.living_positions();
        let mut chosen: Vec<(f64, f64)> = Vec::new();
        let mut candidates: Vec<_> = self.geometry().spawn_points.clone();
        candidates.shuffle(&mut rng);

        for sp in candidates {
            if chosen.len() >= config::INITIAL_PICKUP_COUNT {
                break;
            }
            if Self::clear_of(&occupied, sp.x, sp.z, config::PICKUP_SPACING)
                && Self::clear_of(&chosen, sp.x, sp.z, config::PICKUP_SPACING)
            {
                chosen.push((sp.x, sp.z));
            }
        }
        for _ in 0..200 {
            if chosen.len() >= config::INITIAL_PICKUP_COUNT {
                break;
            }
            let (x, z) = self.random_clear_point(&mut rng);
            if Self::clear_of(&chosen, x, z, config::PICKUP_SPACING) {
                chosen.push((x, z));
            }
        }

        for (x, z) in chosen {
            let kind = *WeaponKind::GUNS.choose(&mut rng).unwrap_or(&WeaponKind::Pistol);
            self.add_pickup(kind, x, z);
        }
    }

    /// A dry gun respawns somewhere pickup-eligible, not on a player.
    fn spawn_pickup_at_eligible_point(&mut self, kind: WeaponKind) {
        let mut rng = rand::thread_rng();
        let occupied = self.living_positions();
        let spawns = &self.geometry().spawn_points;
        let spot = spawns
            .iter()
            .filter(|sp| Self::clear_of(&occupied, sp.x, sp.z, config::PICKUP_SPACING))
            .map(|sp| (sp.x, sp.z))
            .collect::<Vec<_>>()
            .choose(&mut rng)
            .copied()
            .unwrap_or_else(|| self.random_clear_point(&mut rng));
        self.add_pickup(kind, spot.0, spot.1);
    }

    // ── Debug/test helpers ──────────────────────────────────────────

    /// Force a player's pose; used by tests and the corruption teleport.
    pub fn place_player(&mut self, player_id: &str, x: f64, z: f64, angle: f64) {
        if let Some(p) = self.players.get_mut(player_id) {
            p.x = x;
            p.z = z;
            p.angle = angle;
        }
        self.physics.teleport(player_id, x, z);
    }

    /// Hand a player a specific weapon with the given magazine.
    pub fn arm_player(&mut self, player_id: &str, kind: WeaponKind, ammo: Ammo) {
        if let Some(p) = self.players.get_mut(player_id) {
            p.weapon = kind;
            p.ammo = ammo;
        }
    }

}
