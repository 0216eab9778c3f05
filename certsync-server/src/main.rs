// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  certsync: dynamic SNI certificates without proxy reloads
//
//  Data plane:  tokio-rustls listener, per-handshake store lookup
//  Control:     single reload engine task fed through an mpsc handle
//  Admin API:   axum, same runtime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use certsync_admin::server::{AdminState, start_admin};
use certsync_core::{CertSyncConfig, DesiredState};
use certsync_engine::{
    CommandReloader, ConfigReloader, EngineHandle, NoopReloader, ReloadEngine,
};
use certsync_observability::{EventLog, MetricsCollector};
use certsync_proxy::{DefaultCertificateProvider, SniResolver, TlsListener, build_server_config};
use certsync_store::CertStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Global shutdown flag, set by the signal handler.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "certsync", version, about = "Dynamic SNI certificate resolution")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/certsync/certsync.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "certsync starting");

    #[cfg(unix)]
    raise_fd_limit();

    // ── Config ──
    let config = if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
        CertSyncConfig::load(&cli.config)?
    } else {
        info!("No config file found, using defaults");
        CertSyncConfig::default()
    };

    setup_signal_handler();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("certsync")
        .build()?;
    rt.block_on(run(config))?;

    info!("certsync stopped");
    Ok(())
}

async fn run(config: CertSyncConfig) -> anyhow::Result<()> {
    let metrics = Arc::new(MetricsCollector::new(config.observability.prometheus.enabled)?);

    // ── Store + fallback certificate ──
    let store = Arc::new(CertStore::new());
    let default = Arc::new(DefaultCertificateProvider::from_config(
        config.tls.default_certificate.as_ref(),
    )?);
    let resolver = Arc::new(
        SniResolver::new(Arc::clone(&store), default).with_metrics(Arc::clone(&metrics)),
    );

    // ── Reload engine ──
    let events = Arc::new(EventLog::new(config.engine.event_history));
    let reloader: Arc<dyn ConfigReloader> = match config.engine.reload_command {
        Some(ref command) => Arc::new(CommandReloader::new(
            &config.engine.rendered_config_path,
            command.clone(),
        )),
        None => Arc::new(NoopReloader),
    };
    let engine = ReloadEngine::from_config(
        &config.engine,
        Arc::clone(&store),
        Arc::clone(&events),
        reloader,
    )
    .with_metrics(Arc::clone(&metrics));
    let committed = engine.committed();
    let status = engine.status();
    let (handle, engine_task) = EngineHandle::spawn(engine, config.engine.queue_capacity);

    if let Some(ref path) = config.engine.desired_state_path {
        let desired = DesiredState::load(path)?;
        info!(path = %path.display(), hosts = desired.hosts.len(), "Loaded initial desired state");
        handle.submit_desired_state(desired).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = move || {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    };

    // ── Admin API ──
    let admin_state = Arc::new(AdminState {
        store: Arc::clone(&store),
        resolver: Arc::clone(&resolver),
        engine: handle.clone(),
        committed,
        status,
        events,
        metrics,
        metrics_path: config.observability.prometheus.path.clone(),
    });
    let admin_task = tokio::spawn(start_admin(config.admin.clone(), admin_state, shutdown()));

    // ── TLS listener ──
    let server_config = build_server_config(resolver)?;
    let listener = TlsListener::bind(
        &config.tls.addr,
        server_config,
        Duration::from_millis(config.tls.handshake_timeout_ms),
    )
    .await?;
    let listener_task = tokio::spawn(listener.serve(shutdown()));

    info!(
        tls_addr = %config.tls.addr,
        admin_addr = %config.admin.addr,
        dynamic_certificates = config.engine.dynamic_certificates,
        "certsync is ready, serving traffic"
    );

    // ── Graceful shutdown: wait for SIGTERM/SIGINT ──
    while !SHUTDOWN.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = listener_task.await {
        warn!(error = %e, "TLS listener task failed");
    }
    match admin_task.await {
        Ok(Err(e)) => error!(error = %e, "Admin API failed"),
        Err(e) => warn!(error = %e, "Admin task failed"),
        Ok(Ok(())) => {}
    }
    // The engine exits once the last handle is gone.
    drop(handle);
    if tokio::time::timeout(Duration::from_secs(5), engine_task).await.is_err() {
        warn!("Reload engine did not stop in time");
    }
    Ok(())
}

/// Raise RLIMIT_NOFILE to min(hard_limit, 65536) so the listener can hold
/// many concurrent TLS connections without hitting EMFILE.
#[cfg(unix)]
fn raise_fd_limit() {
    unsafe {
        let mut rl = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) != 0 {
            tracing::warn!("getrlimit(RLIMIT_NOFILE) failed, fd limit unchanged");
            return;
        }
        let hard = rl.rlim_max;
        let target: libc::rlim_t = if hard == libc::RLIM_INFINITY || hard > 65536 {
            65536
        } else {
            hard
        };
        if rl.rlim_cur >= target {
            tracing::debug!(limit = rl.rlim_cur, "fd limit already sufficient");
            return;
        }
        rl.rlim_cur = target;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &rl) != 0 {
            tracing::warn!(tried = target, "setrlimit(RLIMIT_NOFILE) failed, run 'ulimit -n 65536'");
        } else {
            tracing::info!(limit = target, "File descriptor limit raised");
        }
    }
}

fn setup_signal_handler() {
    // SIGTERM (docker stop) + SIGINT (Ctrl+C)
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
