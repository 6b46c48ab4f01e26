//! CTF notice bot binary entrypoint.
//! Boots the notice poller and the Axum server (OneBot event webhook,
//! broadcast switch, health and metrics), then waits for Ctrl-C / SIGTERM.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ctf_notice_bot::{
    api::{self, AppState},
    commands::CommandHandler,
    config::BotConfig,
    metrics::Metrics,
    notice::PgNoticeStore,
    poller::shutdown_within,
    BroadcastGate, DeliverySink, LogSink, OneBotSink, Poller, WatermarkTracker,
};

/// Compact text logs by default; `LOG_FORMAT=json` for structured output.
/// Filter comes from `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ctf_notice_bot=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = BotConfig::load().context("load bot config")?;
    cfg.validate().context("invalid bot config")?;
    let metrics = Metrics::init()?;
    let started_at = Utc::now();

    let store = Arc::new(
        PgNoticeStore::connect_lazy(
            &cfg.postgres_dsn,
            cfg.game_id,
            cfg.max_connections,
            Duration::from_secs(cfg.store_timeout_secs),
        )
        .context("build notice store")?,
    );

    let sink: Arc<dyn DeliverySink> = match OneBotSink::from_config(&cfg.onebot) {
        Some(s) => Arc::new(s),
        None => {
            warn!("onebot.api_url not set; running in dry-run mode (messages are only logged)");
            Arc::new(LogSink)
        }
    };

    if cfg.onebot.secret.is_none() {
        warn!("onebot.secret not set; inbound events are rejected and chat commands are off");
    }

    let gate = BroadcastGate::new(cfg.broadcast_enabled);
    let tracker = WatermarkTracker::new(
        cfg.boot_policy,
        started_at,
        chrono::Duration::seconds(cfg.poll_interval_secs as i64),
    );
    info!(
        game_id = cfg.game_id,
        groups = ?cfg.groups,
        broadcast_enabled = cfg.broadcast_enabled,
        boot_policy = ?cfg.boot_policy,
        "starting notice bot"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poller_task = Poller::new(
        store.clone(),
        sink.clone(),
        gate.clone(),
        tracker,
        cfg.groups.clone(),
        Duration::from_secs(cfg.poll_interval_secs),
    )
    .with_catalog(store.clone())
    .spawn(shutdown_rx);

    let commands = CommandHandler::new(
        gate.clone(),
        store.clone(),
        cfg.groups.clone(),
        cfg.admins.clone(),
    );
    let app = api::router(AppState {
        gate,
        commands,
        sink,
        admin_token: cfg.admin_token.clone(),
        event_secret: cfg.onebot.secret.clone(),
    })
    .merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    info!(addr = %cfg.bind_addr, "http server listening");
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // The poller only returns once told to; an early exit takes the process down.
    tokio::select! {
        res = server => res.context("http server")?,
        res = &mut poller_task => {
            match res {
                Ok(mark) => error!(last_seen_id = ?mark.last_seen_id, "notice poller exited before shutdown"),
                Err(e) => error!(error = %e, "notice poller task failed"),
            }
            anyhow::bail!("notice poller stopped unexpectedly");
        }
    }

    // Let the in-flight cycle finish, bounded by the grace period.
    shutdown_within(
        poller_task,
        &shutdown_tx,
        Duration::from_secs(cfg.shutdown_grace_secs),
    )
    .await;
    Ok(())
}
