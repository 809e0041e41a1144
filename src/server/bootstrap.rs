use crate::config::{LogConfig, Settings};
use crate::metrics::Metrics;
use crate::{gateway, server};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: String,
    pub admin_listen: String,
}

/// Gateway lifecycle: load config → init telemetry → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    let settings = Settings::load(&args.config_path)?;
    init_tracing(&settings.log);

    let metrics = Metrics::install();
    let state = server::GatewayState::new(settings, metrics);

    let shutdown = Arc::new(Notify::new());
    start_breaker_gauge_loop(&state, &shutdown);
    start_admin_server(&state, &args);

    tracing::info!("server: starting gateway, listen={}", args.listen);

    let proxy_handle = tokio::spawn({
        let listen = args.listen.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move {
            server::run_server("gateway", &listen, state, shutdown, gateway::handle_request).await
        }
    });

    // Block until signal, then drain.
    wait_for_shutdown(&shutdown).await;

    match proxy_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("server: gateway error: {}", e),
        Err(e) => tracing::error!("server: gateway task error: {}", e),
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

/// Install the global tracing subscriber. Shared by all four binaries.
pub fn init_tracing(log: &LogConfig) {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false);

    if log.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }

    // The writer guard must live for the process lifetime.
    std::mem::forget(guard);
}

/// Sleep for `duration`, but return `true` immediately if shutdown is signalled.
/// Returns `false` if the full duration elapsed normally.
async fn sleep_or_shutdown(duration: std::time::Duration, shutdown: &Notify) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.notified() => true,
    }
}

/// Export breaker states as a gauge. The breaker itself only flips atomics on
/// the request path, so exposition happens on a slow timer here.
fn start_breaker_gauge_loop(state: &server::GatewayState, shutdown: &Arc<Notify>) {
    let breakers = state.breakers().clone();
    let shutdown = shutdown.clone();

    tokio::spawn(async move {
        loop {
            if sleep_or_shutdown(std::time::Duration::from_secs(10), &shutdown).await {
                return;
            }
            for b in breakers.snapshot() {
                let value = match b.state {
                    crate::breaker::BreakerState::Closed => 0.0,
                    crate::breaker::BreakerState::Open => 1.0,
                    crate::breaker::BreakerState::HalfOpen => 2.0,
                };
                metrics::gauge!(
                    "gateway_circuit_breaker_state",
                    "service" => b.service.clone(),
                )
                .set(value);
            }
        }
    });
}

fn start_admin_server(state: &server::GatewayState, args: &BootstrapArgs) {
    let s = state.clone();
    let admin_addr = args.admin_listen.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_admin_server(&admin_addr, s).await {
            tracing::error!("server: admin failed, error={}", e);
        }
    });
}

/// Block until SIGINT/SIGTERM, then signal all background loops to stop.
pub async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("server: received SIGINT, shutting down"),
        _ = terminate => tracing::info!("server: received SIGTERM, shutting down"),
    }

    shutdown.notify_waiters();
}
