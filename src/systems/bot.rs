//! House-bot brains.
//!
//! Every AI player runs one `BotBrain` per tick. The brain sees the world
//! only through [`BotView`] (positions, pickups, and a ray query) and
//! produces the same actions an external agent would POST. It never holds
//! a reference into the engine.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::game::player::Action;
use crate::systems::weapon::{weapon_config, WeaponKind};

// ─── Personalities ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Aggressive,
    Cautious,
    Hunter,
    Wanderer,
    Defender,
}

pub const PERSONALITIES: [Personality; 5] = [
    Personality::Aggressive,
    Personality::Cautious,
    Personality::Hunter,
    Personality::Wanderer,
    Personality::Defender,
];

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct PersonalityConfig {
    pub personality: Personality,
    pub name: &'static str,
    /// Legacy tuning knob; the revised brain targets without a gate.
    pub detect_radius: f64,
    pub preferred_dist: f64,
    /// All players share `MOVE_SPEED` for fairness.
    pub speed_mult: f64,
    /// Below this health an armed bot backs off instead of closing.
    pub flee_health: i32,
    /// 0..1; higher shrinks aim jitter.
    pub accuracy: f64,
}

pub static PERSONALITY_CONFIGS: [PersonalityConfig; 5] = [
    PersonalityConfig {
        personality: Personality::Aggressive,
        name: "aggressive",
        detect_radius: 30.0,
        preferred_dist: 6.0,
        speed_mult: 1.0,
        flee_health: 15,
        accuracy: 0.75,
    },
    PersonalityConfig {
        personality: Personality::Cautious,
        name: "cautious",
        detect_radius: 22.0,
        preferred_dist: 14.0,
        speed_mult: 1.0,
        flee_health: 45,
        accuracy: 0.85,
    },
    PersonalityConfig {
        personality: Personality::Hunter,
        name: "hunter",
        detect_radius: 35.0,
        preferred_dist: 10.0,
        speed_mult: 1.0,
        flee_health: 25,
        accuracy: 0.9,
    },
    PersonalityConfig {
        personality: Personality::Wanderer,
        name: "wanderer",
        detect_radius: 18.0,
        preferred_dist: 12.0,
        speed_mult: 1.0,
        flee_health: 35,
        accuracy: 0.7,
    },
    PersonalityConfig {
        personality: Personality::Defender,
        name: "defender",
        detect_radius: 25.0,
        preferred_dist: 16.0,
        speed_mult: 1.0,
        flee_health: 50,
        accuracy: 0.8,
    },
];

pub fn personality_config(p: Personality) -> &'static PersonalityConfig {
    &PERSONALITY_CONFIGS[PERSONALITIES.iter().position(|&c| c == p).unwrap_or(0)]
}

// Brain-local tuning.
const STRAFE_OFFSET_RAD: f64 = 72.0 * std::f64::consts::PI / 180.0;
const OSCILLATION_CONE_RAD: f64 = 55.0 * std::f64::consts::PI / 180.0;
const STANDOFF_BREAK_MS: u64 = 1_200;
const OPPORTUNISTIC_PICKUP_DIST: f64 = 3.0;
const FORWARD_BLOCKED_DIST: f64 = 1.5;
const STEER_CONE_STEPS: [f64; 9] = [0.0, -0.26, 0.26, -0.52, 0.52, -0.79, 0.79, -1.05, 1.05];

// ─── World view ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BotSelf {
    pub id: String,
    pub x: f64,
    pub z: f64,
    pub health: i32,
    pub weapon: WeaponKind,
}

#[derive(Debug, Clone)]
pub struct EnemyInfo {
    pub id: String,
    pub x: f64,
    pub z: f64,
    pub health: i32,
    pub weapon_tier: u32,
}

#[derive(Debug, Clone)]
pub struct PickupInfo {
    pub x: f64,
    pub z: f64,
}

/// Read-only capability record handed to the brain each tick. `ray`
/// returns the distance to the first static collider, like the physics
/// world's query.
pub struct BotView<'a> {
    pub now_ms: u64,
    pub me: BotSelf,
    /// Living non-self players.
    pub enemies: &'a [EnemyInfo],
    /// Untaken pickups.
    pub pickups: &'a [PickupInfo],
    pub ray: &'a dyn Fn(f64, f64, f64, f64) -> Option<f64>,
}

impl BotView<'_> {
    fn los_clear(&self, to_x: f64, to_z: f64) -> bool {
        let dx = to_x - self.me.x;
        let dz = to_z - self.me.z;
        let dist = (dx * dx + dz * dz).sqrt();
        if dist < 1e-6 {
            return true;
        }
        (self.ray)(self.me.x, self.me.z, dx.atan2(dz), dist).is_none()
    }
}

// ─── Goals ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoalKind {
    Gun,
    Rush,
    Hunt,
}

#[derive(Debug, Clone)]
struct Goal {
    kind: GoalKind,
    until_ms: u64,
    target_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Override {
    heading: f64,
    until_ms: u64,
}

// ─── Brain ───────────────────────────────────────────────────────────

pub struct BotBrain {
    pub personality: Personality,
    goal: Option<Goal>,
    target_id: Option<String>,

    // Wander
    wander_heading: f64,
    wander_until_ms: u64,

    // Strafe
    strafe_dir: f64,
    strafe_flipped_ms: u64,

    // Stuck recovery
    recovery: Option<Override>,
    consecutive_stucks: u32,
    recovery_side: f64,
    stuck_anchor: Option<(f64, f64, u64)>,
    stuck_accum_ms: u64,

    // Oscillation damping
    recent_headings: VecDeque<f64>,
    oscillation: Option<Override>,

    // No-LOS standoff
    no_los_since_ms: Option<u64>,
    standoff: Option<Override>,

    // Obstacle avoidance cache
    cached_avoid: Option<Override>,
}

impl BotBrain {
    pub fn new(personality: Personality) -> Self {
        Self {
            personality,
            goal: None,
            target_id: None,
            wander_heading: 0.0,
            wander_until_ms: 0,
            strafe_dir: 1.0,
            strafe_flipped_ms: 0,
            recovery: None,
            consecutive_stucks: 0,
            recovery_side: 1.0,
            stuck_anchor: None,
            stuck_accum_ms: 0,
            recent_headings: VecDeque::new(),
            oscillation: None,
            no_los_since_ms: None,
            standoff: None,
            cached_avoid: None,
        }
    }

    /// Forget everything tied to the previous life.
    pub fn reset(&mut self) {
        let personality = self.personality;
        *self = BotBrain::new(personality);
    }

    /// Produce this tick's actions.
    pub fn think<R: Rng + ?Sized>(&mut self, view: &BotView, rng: &mut R) -> Vec<Action> {
        let now = view.now_ms;
        let cfg = personality_config(self.personality);
        let mut actions = Vec::new();

        self.expire_goal(view);
        let target = self.select_target(view);
        let armed = view.me.weapon != WeaponKind::Knife;

        // Track LOS to the current target for the standoff overlay.
        if let Some(t) = &target {
            if view.los_clear(t.x, t.z) {
                self.no_los_since_ms = None;
            } else if self.no_los_since_ms.is_none() {
                self.no_los_since_ms = Some(now);
            }
        } else {
            self.no_los_since_ms = None;
        }

        let nearest_pickup = view
            .pickups
            .iter()
            .map(|p| (p, dist(view.me.x, view.me.z, p.x, p.z)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        // Priority machine. Each arm sets a desired heading (and combat
        // actions); overlays then adjust the heading.
        let mut desired_move: Option<f64> = None;

        let committed = self.goal.as_ref().map(|g| g.kind);

        // A gun is worth a detour when it is nearer than the enemy, when
        // the enemy is too far to rush, or when it is at arm's reach.
        let gun_seek = if !armed && committed != Some(GoalKind::Rush) {
            nearest_pickup.filter(|(_, d)| {
                // A committed gun goal holds until its own exit conditions.
                committed == Some(GoalKind::Gun)
                    || match &target {
                        None => true,
                        Some(t) => {
                            let enemy_d = dist(view.me.x, view.me.z, t.x, t.z);
                            *d < enemy_d
                                || enemy_d > config::KNIFE_RUSH_RADIUS
                                || *d < OPPORTUNISTIC_PICKUP_DIST
                        }
                    }
            })
        } else {
            None
        };

        if let Some((p, d)) = gun_seek {
            self.commit(GoalKind::Gun, now + config::GOAL_GUN_MS, None);
            desired_move = Some(angle_to(view.me.x, view.me.z, p.x, p.z));
            if d < config::PICKUP_RADIUS + 0.5 {
                actions.push(Action::Pickup);
            }
        } else if armed {
            if let Some(t) = &target {
                let d = dist(view.me.x, view.me.z, t.x, t.z);
                let wcfg = weapon_config(view.me.weapon);
                let aim = angle_to(view.me.x, view.me.z, t.x, t.z);

                if d <= wcfg.range && view.los_clear(t.x, t.z) {
                    let jitter = gauss(rng) * wcfg.spread_rad * (2.0 - cfg.accuracy);
                    actions.push(Action::Shoot(aim + jitter));
                }

                desired_move = Some(if d < config::BOT_KITE_DIST {
                    aim + std::f64::consts::PI // back off
                } else if view.me.health < cfg.flee_health {
                    aim + std::f64::consts::PI
                } else if d > cfg.preferred_dist * 0.9 {
                    aim // close
                } else if view.enemies.len() == 1 {
                    aim
                } else {
                    // Circle-strafe off the aim, side toggled on an interval.
                    if now.saturating_sub(self.strafe_flipped_ms) >= config::STRAFE_CHANGE_INTERVAL_MS {
                        self.strafe_dir = -self.strafe_dir;
                        self.strafe_flipped_ms = now;
                    }
                    aim + self.strafe_dir * STRAFE_OFFSET_RAD
                });
            } else {
                desired_move = Some(self.patrol_or_wander(view, now, rng));
            }
        } else if let Some(t) = &target {
            let d = dist(view.me.x, view.me.z, t.x, t.z);
            let opportunistic = nearest_pickup.map_or(false, |(_, pd)| pd < OPPORTUNISTIC_PICKUP_DIST);
            if committed == Some(GoalKind::Rush) && opportunistic {
                self.goal = None; // rush breaks for a gun at arm's reach
            }
            if d <= config::KNIFE_RUSH_RADIUS || self.goal.as_ref().map(|g| g.kind) == Some(GoalKind::Rush) {
                self.commit(GoalKind::Rush, now + config::GOAL_RUSH_MS, Some(t.id.clone()));
                desired_move = Some(angle_to(view.me.x, view.me.z, t.x, t.z));
                if d <= config::MELEE_RANGE {
                    actions.push(Action::Melee);
                }
            } else {
                self.commit(GoalKind::Hunt, now + config::GOAL_HUNT_MS, Some(t.id.clone()));
                desired_move = Some(angle_to(view.me.x, view.me.z, t.x, t.z));
            }
        } else {
            desired_move = Some(self.patrol_or_wander(view, now, rng));
        }

        // Movement overlays, strongest first.
        if let Some(heading) = desired_move {
            let heading = self.apply_overlays(view, heading, target.as_ref(), now, rng);
            self.record_heading(heading);
            actions.push(Action::Move(heading));
        } else {
            actions.push(Action::Stop);
        }

        self.update_stuck(view, now, target.as_ref(), rng);
        actions
    }

    // ── Goal bookkeeping ────────────────────────────────────────────

    fn commit(&mut self, kind: GoalKind, until_ms: u64, target_id: Option<String>) {
        match &self.goal {
            Some(g) if g.kind == kind => {}
            _ => self.goal = Some(Goal { kind, until_ms, target_id }),
        }
    }

    fn expire_goal(&mut self, view: &BotView) {
        let Some(goal) = &self.goal else { return };
        let armed = view.me.weapon != WeaponKind::Knife;
        let expired = view.now_ms >= goal.until_ms;
        let broken = match goal.kind {
            // Armed, or an enemy at melee range, ends the gun hunt.
            GoalKind::Gun => {
                armed
                    || view.enemies.iter().any(|e| {
                        dist(view.me.x, view.me.z, e.x, e.z) <= config::MELEE_RANGE
                    })
            }
            // Rush ends when its target is gone.
            GoalKind::Rush => goal
                .target_id
                .as_ref()
                .map_or(true, |id| !view.enemies.iter().any(|e| &e.id == id)),
            GoalKind::Hunt => false,
        };
        if expired || broken {
            self.goal = None;
        }
    }

    // ── Targeting ───────────────────────────────────────────────────

    /// Proximity-sorted; inside a 2-unit band prefer lower health, then
    /// lower weapon tier. Sticks to the current target while it is alive
    /// and outside melee range.
    fn select_target(&mut self, view: &BotView) -> Option<EnemyInfo> {
        if let Some(current) = &self.target_id {
            if let Some(e) = view.enemies.iter().find(|e| &e.id == current) {
                if dist(view.me.x, view.me.z, e.x, e.z) > config::MELEE_RANGE {
                    return Some(e.clone());
                }
            }
        }

        let mut ranked: Vec<(&EnemyInfo, f64)> = view
            .enemies
            .iter()
            .map(|e| (e, dist(view.me.x, view.me.z, e.x, e.z)))
            .collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = ranked.first().copied()?;
        let pick = ranked
            .iter()
            .take_while(|(_, d)| d - best.1 < 2.0)
            .min_by_key(|(e, _)| (e.health, e.weapon_tier))
            .copied()
            .unwrap_or(best);

        self.target_id = Some(pick.0.id.clone());
        Some(pick.0.clone())
    }

    // ── Idle movement ───────────────────────────────────────────────

    fn patrol_or_wander<R: Rng + ?Sized>(&mut self, view: &BotView, now: u64, rng: &mut R) -> f64 {
        let from_center = (view.me.x * view.me.x + view.me.z * view.me.z).sqrt();
        if from_center > config::PATROL_CENTER_RADIUS {
            return angle_to(view.me.x, view.me.z, 0.0, 0.0);
        }
        if now >= self.wander_until_ms {
            self.wander_heading = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
            self.wander_until_ms =
                now + rng.gen_range(config::WANDER_MIN_MS..=config::WANDER_MAX_MS);
        }
        self.wander_heading
    }

    // ── Overlays ────────────────────────────────────────────────────

    fn apply_overlays<R: Rng + ?Sized>(
        &mut self,
        view: &BotView,
        desired: f64,
        target: Option<&EnemyInfo>,
        now: u64,
        rng: &mut R,
    ) -> f64 {
        // 1. Stuck recovery owns the heading outright.
        if let Some(r) = self.recovery {
            if now < r.until_ms {
                return r.heading;
            }
            self.recovery = None;
        }

        // 2. Oscillation turn.
        if let Some(o) = self.oscillation {
            if now < o.until_ms {
                return o.heading;
            }
            self.oscillation = None;
        }
        if self.reversal_count(desired) >= config::OSCILLATION_REVERSALS {
            let heading = desired + std::f64::consts::FRAC_PI_2 * if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            self.oscillation = Some(Override { heading, until_ms: now + config::OSCILLATION_TURN_MS });
            self.recent_headings.clear();
            return heading;
        }

        // 3. No-LOS standoff: swing wide around the blocker.
        if let Some(s) = self.standoff {
            if now < s.until_ms {
                return self.steer_clear(view, s.heading, now);
            }
            self.standoff = None;
        }
        if let (Some(since), Some(t)) = (self.no_los_since_ms, target) {
            if now.saturating_sub(since) >= config::NO_LOS_STANDOFF_MS {
                let to_target = angle_to(view.me.x, view.me.z, t.x, t.z);
                let side = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                let jitter = rng.gen_range(-0.3..0.3);
                let heading = to_target + side * (std::f64::consts::FRAC_PI_2 + jitter);
                self.standoff = Some(Override { heading, until_ms: now + STANDOFF_BREAK_MS });
                self.no_los_since_ms = None;
                return self.steer_clear(view, heading, now);
            }
        }

        // 4 + 5. Cached avoid / obstacle-aware steering.
        self.steer_clear(view, desired, now)
    }

    /// Replace a heading with the nearest clear one. Reuses a cached pick
    /// while it stays fresh and its short forward ray is clear.
    fn steer_clear(&mut self, view: &BotView, desired: f64, now: u64) -> f64 {
        if let Some(c) = self.cached_avoid {
            if now < c.until_ms
                && (view.ray)(view.me.x, view.me.z, c.heading, config::BOT_OBSTACLE_LOOKAHEAD * 0.5).is_none()
            {
                return c.heading;
            }
            self.cached_avoid = None;
        }

        let forward =
            (view.ray)(view.me.x, view.me.z, desired, config::BOT_OBSTACLE_LOOKAHEAD).unwrap_or(f64::INFINITY);
        if forward >= config::BOT_OBSTACLE_LOOKAHEAD {
            return desired; // clear, no cache needed
        }

        let chosen = if forward < FORWARD_BLOCKED_DIST {
            find_longest_clear_direction(view, desired)
        } else {
            STEER_CONE_STEPS
                .iter()
                .map(|off| desired + off)
                .find(|h| (view.ray)(view.me.x, view.me.z, *h, config::BOT_OBSTACLE_LOOKAHEAD).is_none())
                .unwrap_or_else(|| find_longest_clear_direction(view, desired))
        };

        self.cached_avoid = Some(Override { heading: chosen, until_ms: now + config::AVOID_CACHE_MS });
        chosen
    }

    // ── Oscillation bookkeeping ─────────────────────────────────────

    fn record_heading(&mut self, heading: f64) {
        self.recent_headings.push_back(heading);
        while self.recent_headings.len() > config::OSCILLATION_WINDOW {
            self.recent_headings.pop_front();
        }
    }

    fn reversal_count(&self, heading: f64) -> usize {
        let reversed = heading + std::f64::consts::PI;
        self.recent_headings
            .iter()
            .filter(|h| angle_diff(**h, reversed).abs() < OSCILLATION_CONE_RAD)
            .count()
    }

    // ── Stuck detection ─────────────────────────────────────────────

    fn update_stuck<R: Rng + ?Sized>(
        &mut self,
        view: &BotView,
        now: u64,
        target: Option<&EnemyInfo>,
        rng: &mut R,
    ) {
        let (ax, az, at) = match self.stuck_anchor {
            Some(a) => a,
            None => {
                self.stuck_anchor = Some((view.me.x, view.me.z, now));
                return;
            }
        };
        if now.saturating_sub(at) < config::STUCK_CHECK_INTERVAL_MS {
            return;
        }

        let moved = dist(ax, az, view.me.x, view.me.z);
        self.stuck_anchor = Some((view.me.x, view.me.z, now));
        if moved >= config::STUCK_DISTANCE_THRESHOLD {
            self.stuck_accum_ms = 0;
            self.consecutive_stucks = 0;
            return;
        }

        self.stuck_accum_ms += now.saturating_sub(at);
        if self.stuck_accum_ms < config::STUCK_TIME_THRESHOLD_MS {
            return;
        }

        // Escape: prefer perpendicular to the target, alternate sides on
        // consecutive recoveries, escalate the hold duration.
        let base = match target {
            Some(t) => angle_to(view.me.x, view.me.z, t.x, t.z) + self.recovery_side * std::f64::consts::FRAC_PI_2,
            None => rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
        };
        self.recovery_side = -self.recovery_side;

        let heading = find_longest_clear_direction(view, base);
        let idx = (self.consecutive_stucks as usize).min(config::STUCK_RECOVERY_DURATIONS_MS.len() - 1);
        self.recovery = Some(Override {
            heading,
            until_ms: now + config::STUCK_RECOVERY_DURATIONS_MS[idx],
        });
        self.consecutive_stucks += 1;
        self.stuck_accum_ms = 0;
        self.cached_avoid = None;
    }
}

// ─── Free helpers ────────────────────────────────────────────────────

fn dist(ax: f64, az: f64, bx: f64, bz: f64) -> f64 {
    let dx = ax - bx;
    let dz = az - bz;
    (dx * dx + dz * dz).sqrt()
}

fn angle_to(from_x: f64, from_z: f64, to_x: f64, to_z: f64) -> f64 {
    (to_x - from_x).atan2(to_z - from_z)
}

fn angle_diff(a: f64, b: f64) -> f64 {
    crate::systems::weapon::wrap_angle(a - b)
}

/// Eight-way scan over an extended lookahead, longest clear ray wins.
pub fn find_longest_clear_direction(view: &BotView, preferred: f64) -> f64 {
    let lookahead = config::BOT_OBSTACLE_LOOKAHEAD * 2.5;
    let mut best = preferred;
    let mut best_clear = -1.0_f64;
    for i in 0..8 {
        let heading = preferred + i as f64 * std::f64::consts::FRAC_PI_4;
        let clear = (view.ray)(view.me.x, view.me.z, heading, lookahead).unwrap_or(lookahead);
        if clear > best_clear {
            best_clear = clear;
            best = heading;
        }
    }
    best
}

/// Standard normal via Box–Muller.
fn gauss<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
