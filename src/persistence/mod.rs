//! Match persistence.
//!
//! Two append-only tables: `matches` and `match_players`. Without a
//! `DATABASE_URL` the sink is disabled and every call no-ops. Failures
//! never propagate to the tick loop; they are logged, throttled to once
//! a minute.

use std::cell::Cell;

use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::config;

pub struct FinalScore {
    pub agent_name: String,
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
}

pub struct AgentJoinRecord {
    pub agent_name: String,
    /// Carried by the interface; the table intentionally has no key column.
    #[allow(dead_code)]
    pub api_key: Option<String>,
    pub player_id: String,
    pub match_id: String,
    pub skin_id: Option<String>,
    pub strategy_tag: Option<String>,
}

pub struct Database {
    conn: Option<Connection>,
    last_warn_ms: Cell<u64>,
}

// SAFETY: Database is only accessed from the game loop task (single-threaded
// access). The bundled sqlite3 is compiled in serialized mode.
unsafe impl Send for Database {}

impl Database {
    /// Open from `DATABASE_URL`; absence disables persistence.
    pub fn from_env() -> Self {
        match std::env::var(config::ENV_DATABASE_URL) {
            Ok(url) if !url.is_empty() => {
                let path = url.strip_prefix("sqlite://").unwrap_or(&url).to_string();
                Self::open(&path)
            }
            _ => {
                info!("{} not set, persistence disabled", config::ENV_DATABASE_URL);
                Self::disabled()
            }
        }
    }

    pub fn open(path: &str) -> Self {
        match Connection::open(path).and_then(|conn| {
            init_tables(&conn)?;
            Ok(conn)
        }) {
            Ok(conn) => {
                info!("Database initialized at {path}");
                Self { conn: Some(conn), last_warn_ms: Cell::new(0) }
            }
            Err(e) => {
                warn!("Failed to open database {path}: {e}; persistence disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { conn: None, last_warn_ms: Cell::new(0) }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    fn warn_throttled(&self, what: &str, err: &rusqlite::Error) {
        let now = config::now_ms();
        if now.saturating_sub(self.last_warn_ms.get()) >= 60_000 {
            self.last_warn_ms.set(now);
            warn!("Persistence {what} failed: {err}");
        }
    }

    // ─── Match id allocation ────────────────────────────────────────

    /// Highest prior match number for a game type. Parses the canonical
    /// `shooter_<N>` ids and tolerates legacy `shooter_match_<N>` rows.
    pub fn highest_match_id(&self, game_type: &str) -> u64 {
        let Some(conn) = &self.conn else { return 0 };

        let mut stmt = match conn.prepare("SELECT id FROM matches WHERE game_type = ?1") {
            Ok(s) => s,
            Err(e) => {
                self.warn_throttled("highest_match_id", &e);
                return 0;
            }
        };
        let rows = stmt.query_map(params![game_type], |row| row.get::<_, String>(0));
        match rows {
            Ok(rows) => rows
                .filter_map(|r| r.ok())
                .filter_map(|id| parse_match_number(&id, game_type))
                .max()
                .unwrap_or(0),
            Err(e) => {
                self.warn_throttled("highest_match_id", &e);
                0
            }
        }
    }

    // ─── Appends ────────────────────────────────────────────────────

    pub fn ensure_match_exists(&self, match_id: &str, game_type: &str) {
        let Some(conn) = &self.conn else { return };
        let result = conn.execute(
            "INSERT INTO matches (id, game_type) VALUES (?1, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![match_id, game_type],
        );
        if let Err(e) = result {
            self.warn_throttled("ensure_match_exists", &e);
        }
    }

    pub fn record_agent_join(&self, rec: &AgentJoinRecord) {
        let Some(conn) = &self.conn else { return };
        let result = conn.execute(
            "INSERT INTO match_players (match_id, player_id, agent_name, skin_id, strategy_tag)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(match_id, agent_name) DO UPDATE SET
                 player_id = excluded.player_id,
                 skin_id = excluded.skin_id,
                 strategy_tag = excluded.strategy_tag",
            params![rec.match_id, rec.player_id, rec.agent_name, rec.skin_id, rec.strategy_tag],
        );
        if let Err(e) = result {
            self.warn_throttled("record_agent_join", &e);
        }
    }

    pub fn record_match_end(
        &self,
        match_id: &str,
        winner_name: Option<&str>,
        ended_at_ms: u64,
        final_scores: &[FinalScore],
    ) {
        let Some(conn) = &self.conn else { return };
        let result = (|| -> rusqlite::Result<()> {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE matches SET winner_name = ?2, ended_at = ?3 WHERE id = ?1",
                params![match_id, winner_name, ended_at_ms as i64],
            )?;
            for fs in final_scores {
                tx.execute(
                    "UPDATE match_players SET score = ?3, kills = ?4, deaths = ?5
                     WHERE match_id = ?1 AND agent_name = ?2",
                    params![match_id, fs.agent_name, fs.score, fs.kills, fs.deaths],
                )?;
            }
            tx.commit()
        })();
        if let Err(e) = result {
            self.warn_throttled("record_match_end", &e);
        }
    }
}

fn init_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            winner_name TEXT,
            ended_at TIMESTAMP,
            game_type TEXT
        );

        CREATE TABLE IF NOT EXISTS match_players (
            match_id TEXT NOT NULL REFERENCES matches(id),
            player_id TEXT,
            agent_name TEXT NOT NULL,
            color TEXT,
            skin_id TEXT,
            strategy_tag TEXT,
            score INTEGER NOT NULL DEFAULT 0,
            kills INTEGER NOT NULL DEFAULT 0,
            deaths INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (match_id, agent_name)
        );",
    )
}

/// `shooter_12` → 12; legacy `shooter_match_12` → 12; anything else → None.
fn parse_match_number(id: &str, game_type: &str) -> Option<u64> {
    let rest = id.strip_prefix(game_type)?.strip_prefix('_')?;
    let rest = rest.strip_prefix("match_").unwrap_or(rest);
    rest.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_db() -> Database {
        let mut db = Database::disabled();
        db.conn = Some(Connection::open_in_memory().expect("in-memory DB should open"));
        init_tables(db.conn.as_ref().unwrap()).unwrap();
        db
    }

    fn join(db: &Database, match_id: &str, agent: &str, player: &str) {
        db.record_agent_join(&AgentJoinRecord {
            agent_name: agent.to_string(),
            api_key: Some(format!("key_{agent}")),
            player_id: player.to_string(),
            match_id: match_id.to_string(),
            skin_id: None,
            strategy_tag: Some("rush".to_string()),
        });
    }

    #[test]
    fn disabled_database_noops() {
        let db = Database::disabled();
        assert!(!db.is_enabled());
        db.ensure_match_exists("shooter_1", "shooter");
        join(&db, "shooter_1", "alice", "player_1");
        db.record_match_end("shooter_1", Some("alice"), 123, &[]);
        assert_eq!(db.highest_match_id("shooter"), 0);
    }

    #[test]
    fn highest_match_id_parses_canonical_and_legacy() {
        let db = make_db();
        db.ensure_match_exists("shooter_3", "shooter");
        db.ensure_match_exists("shooter_7", "shooter");
        db.ensure_match_exists("shooter_match_11", "shooter");
        db.ensure_match_exists("arena_99", "arena"); // different game type
        assert_eq!(db.highest_match_id("shooter"), 11);
        assert_eq!(db.highest_match_id("arena"), 99);
        assert_eq!(db.highest_match_id("unknown"), 0);
    }

    #[test]
    fn ensure_match_exists_is_idempotent() {
        let db = make_db();
        db.ensure_match_exists("shooter_1", "shooter");
        db.ensure_match_exists("shooter_1", "shooter");
        let count: i64 = db
            .conn
            .as_ref()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn rejoin_updates_instead_of_duplicating() {
        let db = make_db();
        db.ensure_match_exists("shooter_1", "shooter");
        join(&db, "shooter_1", "alice", "player_1");
        join(&db, "shooter_1", "alice", "player_1");
        let count: i64 = db
            .conn
            .as_ref()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM match_players", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn match_end_records_winner_and_scores() {
        let db = make_db();
        db.ensure_match_exists("shooter_1", "shooter");
        join(&db, "shooter_1", "alice", "player_1");
        join(&db, "shooter_1", "bob", "player_2");

        db.record_match_end(
            "shooter_1",
            Some("alice"),
            1_700_000_000_000,
            &[
                FinalScore { agent_name: "alice".into(), score: 300, kills: 3, deaths: 1 },
                FinalScore { agent_name: "bob".into(), score: 100, kills: 1, deaths: 3 },
            ],
        );

        let conn = db.conn.as_ref().unwrap();
        let (winner, ended): (String, i64) = conn
            .query_row("SELECT winner_name, ended_at FROM matches WHERE id = 'shooter_1'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(winner, "alice");
        assert_eq!(ended, 1_700_000_000_000);

        let (score, kills, deaths): (u32, u32, u32) = conn
            .query_row(
                "SELECT score, kills, deaths FROM match_players
                 WHERE match_id = 'shooter_1' AND agent_name = 'alice'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((score, kills, deaths), (300, 3, 1));
    }

    #[test]
    fn parse_match_number_rejects_foreign_ids() {
        assert_eq!(parse_match_number("shooter_5", "shooter"), Some(5));
        assert_eq!(parse_match_number("shooter_match_8", "shooter"), Some(8));
        assert_eq!(parse_match_number("shooterx_5", "shooter"), None);
        assert_eq!(parse_match_number("other_5", "shooter"), None);
        assert_eq!(parse_match_number("shooter_", "shooter"), None);
    }
}
