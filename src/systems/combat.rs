//! Damage → health → life → elimination arithmetic.

use crate::config;
use crate::game::player::Player;
use crate::systems::weapon::{Ammo, WeaponKind};

/// Outcome of applying one hit.
#[derive(Debug, Clone, Copy)]
pub struct DamageOutcome {
    pub killed: bool,
    pub eliminated: bool,
    pub remaining_health: i32,
}

/// Apply damage to a living player. On reaching zero health the player is
/// marked dead, loses a life, banks the current life's survival time, and
/// is eliminated when no lives remain.
pub fn apply_damage(victim: &mut Player, damage: i32, now_ms: u64) -> DamageOutcome {
    victim.health = (victim.health - damage).max(0);

    if victim.health > 0 {
        return DamageOutcome { killed: false, eliminated: false, remaining_health: victim.health };
    }

    victim.alive = false;
    victim.deaths += 1;
    victim.lives = victim.lives.saturating_sub(1);
    victim.survival_ms += now_ms.saturating_sub(victim.alive_since_ms);
    victim.died_at_ms = Some(now_ms);
    victim.death_pos = Some((victim.x, victim.z));
    if victim.lives == 0 {
        victim.eliminated = true;
    }

    DamageOutcome { killed: true, eliminated: victim.eliminated, remaining_health: 0 }
}

/// Reset a dead (non-eliminated) player for a fresh life at `(x, z)`.
pub fn respawn(player: &mut Player, x: f64, z: f64, now_ms: u64) {
    player.x = x;
    player.z = z;
    player.y = config::PLAYER_Y;
    player.health = config::MAX_HEALTH;
    player.weapon = WeaponKind::Knife;
    player.ammo = Ammo::Unlimited;
    player.alive = true;
    player.alive_since_ms = now_ms;
    player.died_at_ms = None;
    player.death_pos = None;
}

/// True when the respawn delay has elapsed for a dead, non-eliminated player.
pub fn respawn_due(player: &Player, now_ms: u64) -> bool {
    if player.alive || player.eliminated {
        return false;
    }
    player
        .died_at_ms
        .map(|died| died + config::RESPAWN_DELAY_MS <= now_ms)
        .unwrap_or(false)
}
