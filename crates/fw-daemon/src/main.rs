//! fw-daemon entry point.
//!
//! Thin on purpose: tracing, configuration, dependency wiring, then the
//! instrument loops and the status server until SIGINT/SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use fw_broker::HttpPublisher;
use fw_config::WatcherConfig;
use fw_daemon::{engine_settings, orchestrator::Orchestrator, retry_policy, routes, state::AppState};
use fw_db::PgStateStore;
use fw_observe::DirectoryObserver;
use fw_reconcile::{shutdown_channel, ReconciliationEngine};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = WatcherConfig::from_env().context("invalid configuration")?;
    info!(
        instruments = cfg.instruments.len(),
        archive_root = %cfg.archive_root.display(),
        poll_ms = cfg.poll_interval.as_millis() as u64,
        "configuration loaded"
    );

    let pool = fw_db::connect(&cfg.database)
        .await
        .context("state store unreachable at startup")?;
    fw_db::migrate(&pool).await?;

    let publisher = HttpPublisher::new(&cfg.broker, cfg.timeouts.publish)
        .context("broker client setup failed")?;
    info!(endpoint = %publisher.endpoint(), "broker publisher ready");

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(PgStateStore::new(pool)),
        Arc::new(publisher),
        Arc::new(DirectoryObserver::new(cfg.scan_depth)),
        engine_settings(&cfg),
    ));

    let shared = Arc::new(AppState::new(cfg.instruments.iter().map(|i| i.id.as_str())));
    let (trigger, shutdown) = shutdown_channel();

    let orchestrator = Arc::new(Orchestrator::new(
        engine,
        Arc::clone(&shared),
        cfg.poll_interval,
        retry_policy(&cfg),
    ));
    let loops = orchestrator.spawn(cfg.instruments.clone(), &shutdown);

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );
    let listener = tokio::net::TcpListener::bind(cfg.daemon_addr)
        .await
        .with_context(|| format!("bind status server on {}", cfg.daemon_addr))?;
    info!("fw-daemon status on http://{}", cfg.daemon_addr);

    let server = tokio::spawn({
        let mut signal = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.requested().await })
                .await
        }
    });

    wait_for_termination().await;
    info!("shutdown requested; finishing in-flight runs");
    trigger.trigger();

    for handle in loops {
        if let Err(e) = handle.await {
            error!(error = %e, "instrument loop panicked");
        }
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "status server error"),
        Err(e) => error!(error = %e, "status server task panicked"),
    }

    info!("fw-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn wait_for_termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "SIGINT handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
