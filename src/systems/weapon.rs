//! Weapon definitions and hit resolution.
//!
//! Pure tables and helpers: the engine collects target data first, then
//! resolves shots against it with a caller-supplied ray query.

use rand::Rng;
use serde::{Deserialize, Serialize, Serializer};

use crate::config;

// ─── Weapon kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Knife = 0,
    Pistol = 1,
    Smg = 2,
    Shotgun = 3,
    AssaultRifle = 4,
}

impl WeaponKind {
    pub fn as_str(&self) -> &'static str {
        weapon_config(*self).name
    }

    /// Upgrade ordering used by bot target preference; knife is tier 0.
    pub fn tier(&self) -> u32 {
        *self as u32
    }

    pub const GUNS: [WeaponKind; 4] = [
        WeaponKind::Pistol,
        WeaponKind::Smg,
        WeaponKind::Shotgun,
        WeaponKind::AssaultRifle,
    ];
}

// ─── Ammo ────────────────────────────────────────────────────────────

/// Knife carries unlimited ammo; every gun counts rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ammo {
    Unlimited,
    Rounds(u32),
}

impl Ammo {
    pub fn is_empty(&self) -> bool {
        matches!(self, Ammo::Rounds(0))
    }
}

impl Serialize for Ammo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Ammo::Unlimited => serializer.serialize_str("unlimited"),
            Ammo::Rounds(n) => serializer.serialize_u32(*n),
        }
    }
}

// ─── Weapon configuration ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WeaponConfig {
    pub kind: WeaponKind,
    pub name: &'static str,
    pub damage: i32,
    /// Minimum interval between shots.
    pub fire_rate_ms: u64,
    /// Maximum range in world units.
    pub range: f64,
    /// `None` = unlimited (knife only).
    pub ammo_capacity: Option<u32>,
    pub is_melee: bool,
    /// Base aim jitter in radians, scaled by shooter accuracy.
    pub spread_rad: f64,
    pub pellets: u32,
}

pub static WEAPON_CONFIGS: [WeaponConfig; 5] = [
    WeaponConfig {
        kind: WeaponKind::Knife,
        name: "knife",
        damage: 35,
        fire_rate_ms: 400,
        range: config::MELEE_RANGE,
        ammo_capacity: None,
        is_melee: true,
        spread_rad: 0.0,
        pellets: 1,
    },
    WeaponConfig {
        kind: WeaponKind::Pistol,
        name: "pistol",
        damage: 15,
        fire_rate_ms: 500,
        range: 25.0,
        ammo_capacity: Some(12),
        is_melee: false,
        spread_rad: 0.02,
        pellets: 1,
    },
    WeaponConfig {
        kind: WeaponKind::Smg,
        name: "smg",
        damage: 8,
        fire_rate_ms: 120,
        range: 20.0,
        ammo_capacity: Some(30),
        is_melee: false,
        spread_rad: 0.06,
        pellets: 1,
    },
    WeaponConfig {
        kind: WeaponKind::Shotgun,
        name: "shotgun",
        damage: 7,
        fire_rate_ms: 900,
        range: 12.0,
        ammo_capacity: Some(8),
        is_melee: false,
        spread_rad: 0.12,
        pellets: 6,
    },
    WeaponConfig {
        kind: WeaponKind::AssaultRifle,
        name: "assault_rifle",
        damage: 12,
        fire_rate_ms: 180,
        range: 30.0,
        ammo_capacity: Some(24),
        is_melee: false,
        spread_rad: 0.04,
        pellets: 1,
    },
];

pub fn weapon_config(kind: WeaponKind) -> &'static WeaponConfig {
    &WEAPON_CONFIGS[kind as usize]
}

pub fn parse_weapon(name: &str) -> Option<WeaponKind> {
    WEAPON_CONFIGS.iter().find(|c| c.name == name).map(|c| c.kind)
}

/// Full magazine for a freshly picked up weapon.
pub fn full_ammo(kind: WeaponKind) -> Ammo {
    match weapon_config(kind).ammo_capacity {
        None => Ammo::Unlimited,
        Some(cap) => Ammo::Rounds(cap),
    }
}

// ─── Fire gates ──────────────────────────────────────────────────────

/// Cooldown + ammo gate.
pub fn can_fire(kind: WeaponKind, ammo: Ammo, last_shot_ms: u64, now_ms: u64) -> bool {
    if ammo.is_empty() {
        return false;
    }
    now_ms.saturating_sub(last_shot_ms) >= weapon_config(kind).fire_rate_ms
}

/// Decrement on fire-apply; unlimited is a no-op.
pub fn consume_ammo(ammo: Ammo) -> Ammo {
    match ammo {
        Ammo::Unlimited => Ammo::Unlimited,
        Ammo::Rounds(n) => Ammo::Rounds(n.saturating_sub(1)),
    }
}

// ─── Shot resolution ─────────────────────────────────────────────────

/// Living non-self target data, collected by the engine before resolution.
#[derive(Debug, Clone)]
pub struct ShotTarget {
    pub id: String,
    pub x: f64,
    pub z: f64,
}

/// Outcome of one pellet: either a hit on a target, or a tracer that ends
/// at weapon range or the first wall.
#[derive(Debug, Clone)]
pub struct PelletOutcome {
    pub target_id: Option<String>,
    pub damage: i32,
    pub end_x: f64,
    pub end_z: f64,
}

pub fn wrap_angle(a: f64) -> f64 {
    let mut a = a % std::f64::consts::TAU;
    if a > std::f64::consts::PI {
        a -= std::f64::consts::TAU;
    } else if a < -std::f64::consts::PI {
        a += std::f64::consts::TAU;
    }
    a
}

/// Resolve one trigger pull. One pellet for guns, `pellets` for the
/// shotgun; each pellet jitters the aim by `spread · (2 − accuracy)` and
/// damages the nearest living non-self target inside the range/cone with
/// clear line of sight.
pub fn resolve_shot<F, R>(
    ox: f64,
    oz: f64,
    aim_rad: f64,
    kind: WeaponKind,
    accuracy: f64,
    targets: &[ShotTarget],
    ray_first_hit: F,
    rng: &mut R,
) -> Vec<PelletOutcome>
where
    F: Fn(f64, f64, f64, f64) -> Option<f64>,
    R: Rng + ?Sized,
{
    let cfg = weapon_config(kind);
    let mut outcomes = Vec::with_capacity(cfg.pellets as usize);

    for _ in 0..cfg.pellets {
        let jitter = cfg.spread_rad * (2.0 - accuracy) * rng.gen_range(-1.0..=1.0);
        let pellet_aim = wrap_angle(aim_rad + jitter);

        let mut best: Option<(&ShotTarget, f64)> = None;
        for target in targets {
            let dx = target.x - ox;
            let dz = target.z - oz;
            let dist = (dx * dx + dz * dz).sqrt();
            if dist > cfg.range || dist < 1e-6 {
                continue;
            }
            let angle_to = dx.atan2(dz);
            let half_cone = (config::PLAYER_RADIUS / dist).min(1.0).asin();
            if wrap_angle(angle_to - pellet_aim).abs() > half_cone {
                continue;
            }
            if ray_first_hit(ox, oz, angle_to, dist).is_some() {
                continue; // wall in the way
            }
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((target, dist));
            }
        }

        match best {
            Some((target, _)) => outcomes.push(PelletOutcome {
                target_id: Some(target.id.clone()),
                damage: cfg.damage,
                end_x: target.x,
                end_z: target.z,
            }),
            None => {
                let t = ray_first_hit(ox, oz, pellet_aim, cfg.range).unwrap_or(cfg.range);
                outcomes.push(PelletOutcome {
                    target_id: None,
                    damage: 0,
                    end_x: ox + pellet_aim.sin() * t,
                    end_z: oz + pellet_aim.cos() * t,
                });
            }
        }
    }

    outcomes
}

/// Melee swing: nearest living non-self target within `MELEE_RANGE`,
/// any direction, no wall test. At most one hit, no ammo.
pub fn resolve_melee(ox: f64, oz: f64, targets: &[ShotTarget]) -> Option<PelletOutcome> {
    let cfg = weapon_config(WeaponKind::Knife);
    targets
        .iter()
        .filter_map(|t| {
            let dx = t.x - ox;
            let dz = t.z - oz;
            let dist = (dx * dx + dz * dz).sqrt();
            (dist <= cfg.range).then_some((t, dist))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(t, _)| PelletOutcome {
            target_id: Some(t.id.clone()),
            damage: cfg.damage,
            end_x: t.x,
            end_z: t.z,
        })
}
