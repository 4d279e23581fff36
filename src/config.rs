#![allow(dead_code)]
/// All game constants. Times are milliseconds unless noted.

pub const DEFAULT_PORT: u16 = 8970;
pub const TICK_RATE: u32 = 20;
pub const TICK_INTERVAL_MS: u64 = 50; // 1000 / TICK_RATE
pub const GAME_TYPE: &str = "shooter";

// Arena
pub const ARENA_SIZE: f64 = 60.0;
pub const ARENA_MIN_X: f64 = -ARENA_SIZE / 2.0;
pub const ARENA_MAX_X: f64 = ARENA_SIZE / 2.0;
pub const ARENA_MIN_Z: f64 = -ARENA_SIZE / 2.0;
pub const ARENA_MAX_Z: f64 = ARENA_SIZE / 2.0;
pub const FLOOR_Y: f64 = 0.0;
pub const WALL_THICKNESS: f64 = 1.0;
pub const WALL_HEIGHT: f64 = 4.0;

// Geometry classification (see arena::classify)
pub const FLOOR_MAX_HEIGHT: f64 = 0.5;
pub const FLOOR_MIN_EXTENT_FRAC: f64 = 0.6;
pub const CLUTTER_MAX_HEIGHT: f64 = 2.0;
pub const CLUTTER_MIN_EXTENT: f64 = 2.0;
pub const CLUTTER_MAX_EXTENT_FRAC: f64 = 0.5;

// Players
pub const MAX_PLAYERS: usize = 8;
pub const MOVE_SPEED: f64 = 8.0; // units/sec, shared by agents and bots
pub const PLAYER_RADIUS: f64 = 0.5;
pub const CAPSULE_HALF_HEIGHT: f64 = 0.9;
/// Capsule center height: floor + half height + radius.
pub const PLAYER_Y: f64 = FLOOR_Y + CAPSULE_HALF_HEIGHT + PLAYER_RADIUS;
pub const MAX_HEALTH: i32 = 100;
pub const MAX_LIVES: u32 = 3;
pub const STEP_HEIGHT: f64 = 0.5;

// Match lifecycle
pub const LOBBY_COUNTDOWN_MS: u64 = 30_000;
pub const MATCH_DURATION_MS: u64 = 300_000;
pub const RESULTS_DURATION_MS: u64 = 10_000;
pub const RESPAWN_DELAY_MS: u64 = 3_000;
pub const MIN_RESPAWN_DISTANCE: f64 = 8.0;
pub const MIN_SPAWN_SEPARATION: f64 = 6.0;
pub const RESPAWN_MAX_TRIES: usize = 15;
/// Survival times within this window count as tied for settlement.
pub const SURVIVAL_TIE_MS: u64 = 50;

// House bots
pub const HOUSE_BOT_FILL: usize = 6;

// Pickups
pub const INITIAL_PICKUP_COUNT: usize = 5;
pub const PICKUP_RADIUS: f64 = 1.2;
/// Initial pickups avoid spawn points this close to players or each other.
pub const PICKUP_SPACING: f64 = 4.0;

// Melee
pub const MELEE_RANGE: f64 = 1.8;

// Gateway
pub const ACTIONS_PER_SECOND: usize = 10;
pub const RATE_WINDOW_MS: u64 = 1_000;
pub const AUTH_SUCCESS_TTL_MS: u64 = 60_000;
pub const AUTH_FAILURE_TTL_MS: u64 = 300_000;
pub const AUTH_TIMEOUT_MS: u64 = 2_000;
pub const AUTH_LOG_THROTTLE_MS: u64 = 60_000;

// Bot steering
pub const BOT_KITE_DIST: f64 = 4.0;
pub const KNIFE_RUSH_RADIUS: f64 = 10.0;
pub const STRAFE_CHANGE_INTERVAL_MS: u64 = 1_500;
pub const WANDER_MIN_MS: u64 = 1_200;
pub const WANDER_MAX_MS: u64 = 3_000;
pub const GOAL_GUN_MS: u64 = 1_500;
pub const GOAL_RUSH_MS: u64 = 2_000;
pub const GOAL_HUNT_MS: u64 = 2_000;
pub const BOT_OBSTACLE_LOOKAHEAD: f64 = 3.0;
pub const AVOID_CACHE_MS: u64 = 400;
pub const NO_LOS_STANDOFF_MS: u64 = 2_500;
pub const STUCK_CHECK_INTERVAL_MS: u64 = 400;
pub const STUCK_DISTANCE_THRESHOLD: f64 = 0.35;
pub const STUCK_TIME_THRESHOLD_MS: u64 = 1_200;
pub const STUCK_RECOVERY_DURATIONS_MS: [u64; 3] = [900, 1_400, 2_000];
pub const OSCILLATION_WINDOW: usize = 8;
pub const OSCILLATION_REVERSALS: usize = 3;
pub const OSCILLATION_TURN_MS: u64 = 1_800;
/// Bots far from the origin patrol back toward the middle of the arena.
pub const PATROL_CENTER_RADIUS: f64 = 20.0;

// Environment variable names
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_NODE_ENV: &str = "NODE_ENV";
pub const ENV_AUTH_SERVICE_URL: &str = "AUTH_SERVICE_URL";
pub const ENV_SETTLEMENT_URL: &str = "SETTLEMENT_URL";
pub const ENV_MAP_PATH: &str = "MAP_PATH";
pub const ENV_PORT: &str = "PORT";

/// Current wall-clock time in milliseconds since the unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
