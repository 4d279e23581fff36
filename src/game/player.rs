use crate::config;
use crate::systems::bot::Personality;
use crate::systems::weapon::{Ammo, WeaponKind};

/// The one mutable entity of significance. Owned by the match engine;
/// everything outside the tick task sees it only through snapshots.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: String,
    /// `None` for house bots.
    pub api_key: Option<String>,
    pub name: String,
    pub strategy: Option<String>,
    pub character_id: String,
    pub is_ai: bool,
    pub personality: Option<Personality>,
    pub wallet: Option<String>,

    // Pose. Y is constant at the arena floor plus the capsule offset.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Heading in radians; broadcast in degrees.
    pub angle: f64,
    pub moving: bool,

    // Combat
    pub weapon: WeaponKind,
    pub ammo: Ammo,
    pub health: i32,
    pub lives: u32,
    pub alive: bool,
    /// Terminal once lives hit zero; never cleared.
    pub eliminated: bool,

    // Scoring
    pub kills: u32,
    pub deaths: u32,
    pub survival_ms: u64,
    pub alive_since_ms: u64,

    // Pacing
    pub last_shot_ms: u64,
    pub died_at_ms: Option<u64>,
    pub death_pos: Option<(f64, f64)>,
}

impl Player {
    pub fn new(id: String, name: String, x: f64, z: f64, now_ms: u64) -> Self {
        Self {
            id,
            api_key: None,
            name,
            strategy: None,
            character_id: "default".to_string(),
            is_ai: false,
            personality: None,
            wallet: None,
            x,
            y: config::PLAYER_Y,
            z,
            angle: 0.0,
            moving: false,
            weapon: WeaponKind::Knife,
            ammo: Ammo::Unlimited,
            health: config::MAX_HEALTH,
            lives: config::MAX_LIVES,
            alive: true,
            eliminated: false,
            kills: 0,
            deaths: 0,
            survival_ms: 0,
            alive_since_ms: now_ms,
            last_shot_ms: 0,
            died_at_ms: None,
            death_pos: None,
        }
    }

    pub fn score(&self) -> u32 {
        self.kills * 100
    }

    /// Still in the running: not eliminated, either up or awaiting respawn.
    pub fn in_contention(&self) -> bool {
        !self.eliminated && (self.alive || self.lives > 0)
    }

    /// Cumulative survival including the current life.
    pub fn survival_ms_at(&self, now_ms: u64) -> u64 {
        if self.alive {
            self.survival_ms + now_ms.saturating_sub(self.alive_since_ms)
        } else {
            self.survival_ms
        }
    }
}

// ─── Pending actions ─────────────────────────────────────────────────

/// One inbound command, as posted by an agent or produced by a bot brain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Heading in radians.
    Move(f64),
    /// Aim in radians.
    Shoot(f64),
    Melee,
    Pickup,
    Stop,
}

/// Per-player override slots, cleared every tick. At most one action of
/// each kind; later writes overwrite earlier ones within the same tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionSlots {
    pub move_angle: Option<f64>,
    pub shoot_aim: Option<f64>,
    pub melee: bool,
    pub pickup: bool,
    pub stop: bool,
}

impl ActionSlots {
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Move(angle) => {
                self.move_angle = Some(angle);
                self.stop = false;
            }
            Action::Shoot(aim) => self.shoot_aim = Some(aim),
            Action::Melee => self.melee = true,
            Action::Pickup => self.pickup = true,
            Action::Stop => {
                self.stop = true;
                self.move_angle = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_starts_with_knife_and_full_lives() {
        let p = Player::new("p1".into(), "A".into(), 0.0, 0.0, 1_000);
        assert_eq!(p.weapon, WeaponKind::Knife);
        assert_eq!(p.ammo, Ammo::Unlimited);
        assert_eq!(p.health, config::MAX_HEALTH);
        assert_eq!(p.lives, config::MAX_LIVES);
        assert!(p.alive && !p.eliminated);
        assert!(p.in_contention());
    }

    #[test]
    fn survival_accrues_while_alive() {
        let mut p = Player::new("p1".into(), "A".into(), 0.0, 0.0, 1_000);
        assert_eq!(p.survival_ms_at(3_500), 2_500);
        p.alive = false;
        p.survival_ms = 2_500;
        assert_eq!(p.survival_ms_at(9_999), 2_500);
    }

    #[test]
    fn later_move_overwrites_earlier_one() {
        let mut slots = ActionSlots::default();
        slots.apply(Action::Move(1.0));
        slots.apply(Action::Move(2.0));
        assert_eq!(slots.move_angle, Some(2.0));
    }

    #[test]
    fn stop_clears_pending_move() {
        let mut slots = ActionSlots::default();
        slots.apply(Action::Move(1.0));
        slots.apply(Action::Stop);
        assert!(slots.stop);
        assert_eq!(slots.move_angle, None);

        // And a move after a stop wins again.
        slots.apply(Action::Move(0.5));
        assert!(!slots.stop);
        assert_eq!(slots.move_angle, Some(0.5));
    }

    #[test]
    fn action_kinds_accumulate_independently() {
        let mut slots = ActionSlots::default();
        slots.apply(Action::Shoot(0.1));
        slots.apply(Action::Melee);
        slots.apply(Action::Pickup);
        assert_eq!(slots.shoot_aim, Some(0.1));
        assert!(slots.melee && slots.pickup);
    }
}
