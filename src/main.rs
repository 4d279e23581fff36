use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::info;

use skirmish_server::arena;
use skirmish_server::config;
use skirmish_server::game::lifecycle::{Command, MatchController};
use skirmish_server::game::snapshot::WorldView;
use skirmish_server::msg::events::WsEvent;
use skirmish_server::net::auth::IdentityVerifier;
use skirmish_server::net::http::{router, AppState};
use skirmish_server::net::rate_limit::RateLimiter;
use skirmish_server::persistence::Database;
use skirmish_server::settlement::SettlementNotifier;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    // The map is parsed exactly once; everything downstream reads the
    // baked geometry. A file with no mesh refuses to start.
    let map_path =
        std::env::var(config::ENV_MAP_PATH).unwrap_or_else(|_| "assets/arena.glb".to_string());
    let geometry = Arc::new(arena::load(&map_path).expect("Failed to load arena geometry"));

    let db = Database::from_env();
    let settlement = SettlementNotifier::from_env();
    let verifier = Arc::new(IdentityVerifier::from_env());
    let limiter = Arc::new(RateLimiter::default());

    // Gateway workers -> tick loop.
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
    // Tick loop -> spectator sockets.
    let (events_tx, _) = broadcast::channel::<WsEvent>(1024);
    // Tick loop -> read-only view for response serialization.
    let (view_tx, view_rx) = watch::channel(Arc::new(WorldView::startup()));

    // The simulation runs on one dedicated task; all match state lives there.
    let events_for_loop = events_tx.clone();
    tokio::spawn(async move {
        let mut controller = MatchController::new(
            geometry,
            db,
            settlement,
            cmd_rx,
            events_for_loop,
            view_tx,
            config::now_ms(),
        );

        let mut interval = tokio::time::interval(Duration::from_millis(config::TICK_INTERVAL_MS));
        // An overrun tick starts the next one immediately; missed ticks
        // are never queued up.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping tick loop");
                    break;
                }
            }
            controller.run_tick(config::now_ms());
        }
        std::process::exit(0);
    });

    let state = AppState { cmd_tx, view_rx, events_tx, verifier, limiter };

    let port = std::env::var(config::ENV_PORT)
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config::DEFAULT_PORT);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("Failed to bind");

    info!("Skirmish server listening on http://{addr}");
    info!("Tick rate: {} Hz ({}ms)", config::TICK_RATE, config::TICK_INTERVAL_MS);

    axum::serve(listener, router(state)).await.expect("Server error");
}
