//! Match lifecycle controller.
//!
//! Owns exactly one match at a time and drives lobby → countdown → active
//! → finished. Commands arrive over a channel from the gateway workers;
//! ticks come from the dedicated loop in `main`. Persistence and
//! settlement are best-effort collaborators: their failures are logged
//! and the tick proceeds.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};

use crate::arena::StaticArenaGeometry;
use crate::config;
use crate::msg::api::ErrorKind;
use crate::msg::events::{LobbyOpenEvent, MatchEndEvent, WsEvent};
use crate::persistence::{AgentJoinRecord, Database, FinalScore};
use crate::settlement::{MatchResolution, SettlementNotifier};

use super::player::Action;
use super::snapshot::{self, WorldView};
use super::{EngineEvent, MatchEngine, Phase};

const BOT_NAMES: [&str; 10] = [
    "Vex", "Rico", "Moss", "Juno", "Saber", "Twitch", "Drift", "Hollow", "Pike", "Ember",
];

/// Successful join, echoed back to the HTTP worker.
#[derive(Debug, Clone)]
pub struct JoinOk {
    pub player_id: String,
    pub match_id: String,
    pub starts_at_ms: Option<u64>,
}

/// Inbound requests from the gateway. Actions are fire-and-forget; joins
/// mutate the match and reply over a oneshot.
pub enum Command {
    Join {
        api_key: String,
        agent_name: String,
        wallet: Option<String>,
        display_name: Option<String>,
        strategy: Option<String>,
        character_id: Option<String>,
        reply: oneshot::Sender<Result<JoinOk, ErrorKind>>,
    },
    Action {
        player_id: String,
        action: Action,
    },
}

pub struct MatchController {
    geometry: Arc<StaticArenaGeometry>,
    engine: MatchEngine,
    db: Database,
    settlement: SettlementNotifier,
    rx: mpsc::UnboundedReceiver<Command>,
    events_tx: broadcast::Sender<WsEvent>,
    view_tx: watch::Sender<Arc<WorldView>>,
    next_match_seq: u64,
    countdown_ends_ms: Option<u64>,
    results_until_ms: Option<u64>,

    // Watchdog
    tick_times_ms: VecDeque<f64>,
    last_watchdog_warn_ms: u64,
}

impl MatchController {
    pub fn new(
        geometry: Arc<StaticArenaGeometry>,
        db: Database,
        settlement: SettlementNotifier,
        rx: mpsc::UnboundedReceiver<Command>,
        events_tx: broadcast::Sender<WsEvent>,
        view_tx: watch::Sender<Arc<WorldView>>,
        now_ms: u64,
    ) -> Self {
        // The persisted maximum is the single source of truth for ids.
        let next_match_seq = db.highest_match_id(config::GAME_TYPE) + 1;
        let mut controller = Self {
            geometry: geometry.clone(),
            engine: MatchEngine::new(String::new(), geometry),
            db,
            settlement,
            rx,
            events_tx,
            view_tx,
            next_match_seq,
            countdown_ends_ms: None,
            results_until_ms: None,
            tick_times_ms: VecDeque::new(),
            last_watchdog_warn_ms: 0,
        };
        controller.open_lobby(now_ms);
        controller
    }

    pub fn match_id(&self) -> &str {
        &self.engine.match_id
    }

    pub fn phase(&self) -> Phase {
        self.engine.phase
    }

    /// One iteration of the loop: drain commands, advance the phase
    /// machine, publish the fresh view.
    pub fn run_tick(&mut self, now_ms: u64) {
        let started = std::time::Instant::now();

        self.drain_commands(now_ms);

        match self.engine.phase {
            Phase::Lobby => {}
            Phase::Countdown => {
                if self.countdown_ends_ms.map_or(false, |t| now_ms >= t) {
                    self.start_match(now_ms);
                }
            }
            Phase::Active => {
                let out = self.engine.run_tick(now_ms);
                for event in out.events {
                    let ws = match event {
                        EngineEvent::Shot(s) => WsEvent::Shot(s),
                        EngineEvent::Hit(h) => WsEvent::Hit(h),
                    };
                    let _ = self.events_tx.send(ws);
                }
                if out.finished {
                    self.finish_match(now_ms);
                } else {
                    let snap = snapshot::build_snapshot(&self.engine, now_ms);
                    let _ = self.events_tx.send(WsEvent::Snapshot(snap));
                }
            }
            Phase::Finished => {
                if self.results_until_ms.map_or(false, |t| now_ms >= t) {
                    self.open_lobby(now_ms);
                }
            }
        }

        self.publish(now_ms);
        self.watchdog(started.elapsed().as_secs_f64() * 1000.0, now_ms);
    }

    // ── Commands ────────────────────────────────────────────────────

    fn drain_commands(&mut self, now_ms: u64) {
        while let Ok(cmd) = self.rx.try_recv() {
            match cmd {
                Command::Join {
                    api_key,
                    agent_name,
                    wallet,
                    display_name,
                    strategy,
                    character_id,
                    reply,
                } => {
                    let result = self.join(
                        api_key,
                        agent_name,
                        wallet,
                        display_name,
                        strategy,
                        character_id,
                        now_ms,
                    );
                    let _ = reply.send(result);
                }
                Command::Action { player_id, action } => {
                    self.engine.enqueue(&player_id, action);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn join(
        &mut self,
        api_key: String,
        agent_name: String,
        wallet: Option<String>,
        display_name: Option<String>,
        strategy: Option<String>,
        character_id: Option<String>,
        now_ms: u64,
    ) -> Result<JoinOk, ErrorKind> {
        // Re-entry with the same key returns the existing player.
        if let Some(existing) = self.engine.find_by_key(&api_key) {
            return Ok(JoinOk {
                player_id: existing.id.clone(),
                match_id: self.engine.match_id.clone(),
                starts_at_ms: self.countdown_ends_ms,
            });
        }

        match self.engine.phase {
            Phase::Lobby | Phase::Countdown => {}
            Phase::Active | Phase::Finished => return Err(ErrorKind::MatchInProgress),
        }

        let name = display_name.filter(|n| !n.is_empty()).unwrap_or_else(|| agent_name.clone());
        let player_id = self
            .engine
            .add_agent(api_key.clone(), name, wallet, strategy.clone(), character_id.clone(), now_ms)
            .map_err(|_| ErrorKind::LobbyFull)?;

        self.db.record_agent_join(&AgentJoinRecord {
            agent_name: agent_name.clone(),
            api_key: Some(api_key),
            player_id: player_id.clone(),
            match_id: self.engine.match_id.clone(),
            skin_id: character_id,
            strategy_tag: strategy,
        });
        self.settlement.add_betting_agent(&self.engine.match_id, &agent_name);

        let agents = self.engine.players.values().filter(|p| !p.is_ai).count();
        info!(
            "Agent \"{agent_name}\" joined {} as {player_id} ({agents} agents)",
            self.engine.match_id
        );

        // The second distinct agent arms the countdown.
        if agents >= 2 && self.engine.phase == Phase::Lobby {
            self.begin_countdown(now_ms);
        }

        Ok(JoinOk {
            player_id,
            match_id: self.engine.match_id.clone(),
            starts_at_ms: self.countdown_ends_ms,
        })
    }

    // ── Phase transitions ───────────────────────────────────────────

    fn begin_countdown(&mut self, now_ms: u64) {
        let ends = now_ms + config::LOBBY_COUNTDOWN_MS;
        self.engine.phase = Phase::Countdown;
        self.countdown_ends_ms = Some(ends);
        self.fill_house_bots(now_ms);
        info!("Countdown started for {}, match begins at {ends}", self.engine.match_id);
    }

    fn fill_house_bots(&mut self, now_ms: u64) {
        let mut rng = rand::thread_rng();
        let mut name_offset = rng.gen_range(0..BOT_NAMES.len());
        let mut personality_offset = rng.gen_range(0..crate::systems::bot::PERSONALITIES.len());

        while self.engine.players.len() < config::HOUSE_BOT_FILL.min(config::MAX_PLAYERS) {
            let name = BOT_NAMES[name_offset % BOT_NAMES.len()].to_string();
            let personality =
                crate::systems::bot::PERSONALITIES[personality_offset % crate::systems::bot::PERSONALITIES.len()];
            name_offset += 1;
            personality_offset += 1;

            let Some(bot_id) = self.engine.add_bot(name.clone(), personality, now_ms) else { break };
            self.db.record_agent_join(&AgentJoinRecord {
                agent_name: name.clone(),
                api_key: None,
                player_id: bot_id,
                match_id: self.engine.match_id.clone(),
                skin_id: None,
                strategy_tag: None,
            });
            self.settlement.add_betting_agent(&self.engine.match_id, &name);
        }
    }

    fn start_match(&mut self, now_ms: u64) {
        self.settlement.close_betting(&self.engine.match_id);
        self.engine.start(now_ms);
        self.countdown_ends_ms = None;
        info!(
            "Match {} active with {} players, ends at {}",
            self.engine.match_id,
            self.engine.players.len(),
            self.engine.end_ms
        );
    }

    fn finish_match(&mut self, now_ms: u64) {
        let ended_at = self.engine.effective_end_ms();
        let board = snapshot::leaderboard(&self.engine, now_ms);

        // Winners: everyone within the survival tie window of the best,
        // narrowed by kills, then score. More than one left is a draw.
        let survivors: Vec<(u64, &super::player::Player)> = {
            let mut v: Vec<_> = self
                .engine
                .players
                .values()
                .map(|p| (p.survival_ms_at(ended_at), p))
                .collect();
            v.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.kills.cmp(&a.1.kills)).then(b.1.score().cmp(&a.1.score())));
            v
        };
        let winners: Vec<&super::player::Player> = match survivors.first() {
            None => Vec::new(),
            Some((best_ms, _)) => {
                let tied: Vec<&super::player::Player> = survivors
                    .iter()
                    .filter(|(ms, _)| best_ms.saturating_sub(*ms) <= config::SURVIVAL_TIE_MS)
                    .map(|(_, p)| *p)
                    .collect();
                let best_kills = tied.iter().map(|p| p.kills).max().unwrap_or(0);
                let tied: Vec<_> = tied.into_iter().filter(|p| p.kills == best_kills).collect();
                let best_score = tied.iter().map(|p| p.score()).max().unwrap_or(0);
                tied.into_iter().filter(|p| p.score() == best_score).collect()
            }
        };
        let is_draw = winners.len() > 1;
        let winner_name = (!is_draw).then(|| winners.first().map(|p| p.name.clone())).flatten();

        let event = MatchEndEvent {
            match_id: self.engine.match_id.clone(),
            winner_name: winner_name.clone(),
            is_draw,
            rankings: board,
            ended_at,
        };
        let _ = self.events_tx.send(WsEvent::MatchEnd(event));

        let final_scores: Vec<FinalScore> = self
            .engine
            .players
            .values()
            .map(|p| FinalScore {
                agent_name: p.name.clone(),
                score: p.score(),
                kills: p.kills,
                deaths: p.deaths,
            })
            .collect();
        self.db
            .record_match_end(&self.engine.match_id, winner_name.as_deref(), ended_at, &final_scores);

        self.settlement.resolve_match(&MatchResolution {
            match_id: self.engine.match_id.clone(),
            winner_agent_names: winners.iter().map(|p| p.name.clone()).collect(),
            winner_agent_wallets: winners.iter().filter_map(|p| p.wallet.clone()).collect(),
            is_draw,
        });

        self.results_until_ms = Some(now_ms + config::RESULTS_DURATION_MS);
        match &winner_name {
            Some(w) => info!("Match {} finished, winner: {w}", self.engine.match_id),
            None => info!("Match {} finished in a draw", self.engine.match_id),
        }
    }

    fn open_lobby(&mut self, now_ms: u64) {
        let match_id = format!("{}_{}", config::GAME_TYPE, self.next_match_seq);
        self.next_match_seq += 1;

        self.engine = MatchEngine::new(match_id.clone(), self.geometry.clone());
        self.countdown_ends_ms = None;
        self.results_until_ms = None;

        self.db.ensure_match_exists(&match_id, config::GAME_TYPE);
        self.settlement.open_betting(&match_id, &[], true);
        let _ = self.events_tx.send(WsEvent::LobbyOpen(LobbyOpenEvent {
            match_id: match_id.clone(),
            lobby_opened_at: now_ms,
        }));
        info!("Lobby open for {match_id}");
    }

    // ── Publishing ──────────────────────────────────────────────────

    fn publish(&self, now_ms: u64) {
        let key_to_player = self
            .engine
            .players
            .values()
            .filter_map(|p| p.api_key.clone().map(|k| (k, p.id.clone())))
            .collect();

        let view = WorldView {
            snapshot: snapshot::build_snapshot(&self.engine, now_ms),
            phase: self.engine.phase,
            match_id: self.engine.match_id.clone(),
            starts_at_ms: self.countdown_ends_ms,
            lobby_opens_at_ms: self.results_until_ms,
            next_match_id: (self.engine.phase == Phase::Finished)
                .then(|| format!("{}_{}", config::GAME_TYPE, self.next_match_seq)),
            key_to_player,
        };
        self.view_tx.send_replace(Arc::new(view));
    }

    // ── Watchdog ────────────────────────────────────────────────────

    fn watchdog(&mut self, tick_ms: f64, now_ms: u64) {
        self.tick_times_ms.push_back(tick_ms);
        while self.tick_times_ms.len() > 100 {
            self.tick_times_ms.pop_front();
        }
        if self.tick_times_ms.len() < 20 {
            return;
        }
        let mean = self.tick_times_ms.iter().sum::<f64>() / self.tick_times_ms.len() as f64;
        let budget = config::TICK_INTERVAL_MS as f64 * 0.8;
        if mean > budget && now_ms.saturating_sub(self.last_watchdog_warn_ms) >= 5_000 {
            self.last_watchdog_warn_ms = now_ms;
            warn!("Tick loop is running hot: mean {mean:.1}ms of a {}ms budget", config::TICK_INTERVAL_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena;
    use crate::msg::events::WsEvent;
    use crate::systems::weapon::{Ammo, WeaponKind};

    const T0: u64 = 5_000_000;

    struct Rig {
        controller: MatchController,
        cmd_tx: mpsc::UnboundedSender<Command>,
        events_rx: broadcast::Receiver<WsEvent>,
        view_rx: watch::Receiver<Arc<WorldView>>,
    }

    fn rig() -> Rig {
        rig_with_db(Database::disabled())
    }

    fn rig_with_db(db: Database) -> Rig {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = broadcast::channel(1024);
        let (view_tx, view_rx) = watch::channel(Arc::new(WorldView::startup()));
        let controller = MatchController::new(
            Arc::new(arena::empty_arena()),
            db,
            SettlementNotifier::disabled(),
            cmd_rx,
            events_tx,
            view_tx,
            T0,
        );
        Rig { controller, cmd_tx, events_rx, view_rx }
    }

    fn join(rig: &mut Rig, key: &str, name: &str, now: u64) -> Result<JoinOk, ErrorKind> {
        let (reply, mut reply_rx) = oneshot::channel();
        rig.cmd_tx
            .send(Command::Join {
                api_key: key.into(),
                agent_name: name.into(),
                wallet: Some(format!("wallet_{name}")),
                display_name: Some(name.into()),
                strategy: None,
                character_id: None,
                reply,
            })
            .unwrap();
        rig.controller.run_tick(now);
        reply_rx.try_recv().expect("join reply must arrive on the same tick")
    }

    fn drain_events(rig: &mut Rig) -> Vec<WsEvent> {
        let mut out = Vec::new();
        loop {
            match rig.events_rx.try_recv() {
                Ok(e) => out.push(e),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }

    fn run_until(rig: &mut Rig, from: u64, to: u64) -> u64 {
        let mut now = from;
        while now < to {
            now += config::TICK_INTERVAL_MS;
            rig.controller.run_tick(now);
        }
        now
    }

    // ── Lobby and countdown ─────────────────────────────────────────────

    #[test]
    fn solo_join_never_starts_the_match() {
        let mut rig = rig();
        join(&mut rig, "key_a", "A", T0).unwrap();
        drain_events(&mut rig);

        let end = run_until(&mut rig, T0, T0 + config::LOBBY_COUNTDOWN_MS + 1_000);
        assert_eq!(rig.controller.phase(), Phase::Lobby);
        assert!(
            !drain_events(&mut rig).iter().any(|e| matches!(e, WsEvent::Snapshot(_))),
            "no tick snapshots before the match starts"
        );
        let view = rig.view_rx.borrow().clone();
        assert_eq!(view.phase, Phase::Lobby);
        assert!(view.starts_at_ms.is_none());
        let _ = end;
    }

    #[test]
    fn second_join_arms_the_countdown_and_fills_bots() {
        let mut rig = rig();
        join(&mut rig, "key_a", "A", T0).unwrap();
        let ok = join(&mut rig, "key_b", "B", T0 + 100).unwrap();

        assert_eq!(rig.controller.phase(), Phase::Countdown);
        assert_eq!(ok.starts_at_ms, Some(T0 + 100 + config::LOBBY_COUNTDOWN_MS));

        let view = rig.view_rx.borrow().clone();
        assert_eq!(view.snapshot.players.len(), config::HOUSE_BOT_FILL);
    }

    #[test]
    fn countdown_expiry_activates_the_match() {
        let mut rig = rig();
        join(&mut rig, "key_a", "A", T0).unwrap();
        join(&mut rig, "key_b", "B", T0).unwrap();
        drain_events(&mut rig);

        run_until(&mut rig, T0, T0 + config::LOBBY_COUNTDOWN_MS + 100);
        assert_eq!(rig.controller.phase(), Phase::Active);

        // Snapshots now flow every tick.
        let events = drain_events(&mut rig);
        assert!(events.iter().any(|e| matches!(e, WsEvent::Snapshot(_))));

        // Both agents sit at separated spawn points.
        let view = rig.view_rx.borrow().clone();
        let a = view.snapshot.players.iter().find(|p| p.name == "A").unwrap();
        let b = view.snapshot.players.iter().find(|p| p.name == "B").unwrap();
        let d = ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt();
        assert!(d >= config::MIN_SPAWN_SEPARATION - 0.01, "agents {d} apart");
    }

    #[test]
    fn rejoin_with_same_key_is_idempotent() {
        let mut rig = rig();
        let first = join(&mut rig, "key_a", "A", T0).unwrap();
        let second = join(&mut rig, "key_a", "A", T0 + 50).unwrap();
        assert_eq!(first.player_id, second.player_id);

        let view = rig.view_rx.borrow().clone();
        assert_eq!(view.snapshot.players.len(), 1);
    }

    #[test]
    fn join_rejected_while_active() {
        let mut rig = rig();
        join(&mut rig, "key_a", "A", T0).unwrap();
        join(&mut rig, "key_b", "B", T0).unwrap();
        let now = run_until(&mut rig, T0, T0 + config::LOBBY_COUNTDOWN_MS + 100);
        assert_eq!(rig.controller.phase(), Phase::Active);

        let err = join(&mut rig, "key_c", "C", now + 50).unwrap_err();
        assert_eq!(err, ErrorKind::MatchInProgress);
    }

    // ── Match end and the next lobby ────────────────────────────────────

    /// Arms one agent, eliminates everyone else, and returns the end time.
    fn play_to_finish(rig: &mut Rig) -> u64 {
        join(rig, "key_a", "A", T0).unwrap();
        join(rig, "key_b", "B", T0).unwrap();
        let mut now = run_until(rig, T0, T0 + config::LOBBY_COUNTDOWN_MS + 100);
        assert_eq!(rig.controller.phase(), Phase::Active);

        // Flatten every other player from the engine directly; the last
        // tick then observes ≤1 contender and ends the match.
        let ids: Vec<String> = rig.controller.engine.players.keys().cloned().collect();
        for id in ids {
            let p = rig.controller.engine.players.get_mut(&id).unwrap();
            if p.name != "A" {
                p.health = 1;
                p.lives = 1;
            }
        }
        let winner_id = rig
            .controller
            .engine
            .players
            .values()
            .find(|p| p.name == "A")
            .map(|p| p.id.clone())
            .unwrap();
        rig.controller.engine.arm_player(&winner_id, WeaponKind::Smg, Ammo::Rounds(999));

        let victims: Vec<String> = rig
            .controller
            .engine
            .players
            .values()
            .filter(|p| p.id != winner_id)
            .map(|p| p.id.clone())
            .collect();
        for victim in victims {
            for _ in 0..200 {
                if rig.controller.phase() != Phase::Active {
                    break;
                }
                let Some(v) = rig.controller.engine.players.get(&victim) else { break };
                if !v.in_contention() {
                    break;
                }
                let (vx, vz, valive) = (v.x, v.z, v.alive);

                // Keep the designated winner topped up and armed so stray
                // bot swings cannot change the outcome under test.
                if let Some(w) = rig.controller.engine.players.get_mut(&winner_id) {
                    w.health = 100;
                    w.lives = config::MAX_LIVES;
                    w.weapon = WeaponKind::Smg;
                    w.ammo = Ammo::Rounds(999);
                }

                if !valive {
                    now += config::TICK_INTERVAL_MS;
                    rig.controller.run_tick(now);
                    continue;
                }
                rig.controller.engine.place_player(&winner_id, vx, vz - 3.0, 0.0);
                let aim = {
                    let w = rig.controller.engine.players.get(&winner_id).unwrap();
                    (vx - w.x).atan2(vz - w.z)
                };
                rig.controller.engine.enqueue(&winner_id, Action::Shoot(aim));
                now += weapon_cooldown_step();
                rig.controller.run_tick(now);
            }
        }
        assert_eq!(rig.controller.phase(), Phase::Finished, "all victims down should end the match");
        now
    }

    fn weapon_cooldown_step() -> u64 {
        crate::systems::weapon::weapon_config(WeaponKind::Smg).fire_rate_ms.max(config::TICK_INTERVAL_MS)
    }

    #[test]
    fn last_agent_standing_wins_and_results_reopen_lobby() {
        let mut rig = rig();
        let end = play_to_finish(&mut rig);

        let events = drain_events(&mut rig);
        let end_event = events
            .iter()
            .find_map(|e| match e {
                WsEvent::MatchEnd(m) => Some(m),
                _ => None,
            })
            .expect("matchEnd must broadcast");
        assert_eq!(end_event.winner_name.as_deref(), Some("A"));
        assert!(!end_event.is_draw);
        assert_eq!(end_event.rankings.first().map(|r| r.name.as_str()), Some("A"));

        let first_match = rig.controller.match_id().to_string();
        run_until(&mut rig, end, end + config::RESULTS_DURATION_MS + 100);
        assert_eq!(rig.controller.phase(), Phase::Lobby);
        assert_ne!(rig.controller.match_id(), first_match);

        let events = drain_events(&mut rig);
        assert!(events.iter().any(|e| matches!(e, WsEvent::LobbyOpen(_))));
    }

    #[test]
    fn match_ids_resume_from_the_database() {
        let db = Database::open(":memory:");
        db.ensure_match_exists("shooter_41", config::GAME_TYPE);
        let rig = rig_with_db(db);
        assert_eq!(rig.controller.match_id(), "shooter_42");
    }

    #[test]
    fn leaderboard_is_recorded_on_match_end() {
        let db = Database::open(":memory:");
        let mut rig = rig_with_db(db);
        play_to_finish(&mut rig);

        // The winner row carries the final tallies.
        let view = rig.view_rx.borrow().clone();
        let top = view.snapshot.leaderboard.first().expect("leaderboard populated");
        assert_eq!(top.name, "A");
        assert!(top.kills > 0);
    }

    #[test]
    fn actions_flow_from_channel_to_engine() {
        let mut rig = rig();
        let a = join(&mut rig, "key_a", "A", T0).unwrap();
        join(&mut rig, "key_b", "B", T0).unwrap();
        let now = run_until(&mut rig, T0, T0 + config::LOBBY_COUNTDOWN_MS + 100);

        let before = {
            let view = rig.view_rx.borrow().clone();
            let p = view.player_snapshot(&a.player_id).unwrap().clone();
            (p.x, p.z)
        };
        rig.cmd_tx
            .send(Command::Action { player_id: a.player_id.clone(), action: Action::Move(0.0) })
            .unwrap();
        rig.controller.run_tick(now + config::TICK_INTERVAL_MS);

        let view = rig.view_rx.borrow().clone();
        let p = view.player_snapshot(&a.player_id).unwrap();
        assert!(
            (p.x - before.0).abs() > 1e-6 || (p.z - before.1).abs() > 1e-6,
            "queued move must displace the player"
        );
    }
}
