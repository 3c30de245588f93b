//! service-shell
//!
//! Runs an application router behind the serving shell:
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!   request ─────▶│ driver (axum-server, optional TLS)           │
//!                 │   ├─ /healthz/liveness   → ok                │
//!                 │   ├─ /healthz/readiness  → warm-up + probes  │
//!                 │   └─ /*  → trace → access log → application  │
//!                 └──────────────────────────────────────────────┘
//!                       ▲
//!   dependency probes ──┘ (background, backoff 250ms → 30s)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::{http::Uri, routing::get, Json, Router};
use clap::Parser;
use serde_json::{json, Value};

use service_shell::config::{
    load_config, parse_config, validation::validate_config, ConfigError, DependencyConfig,
    DependencyKind, SamplingPolicy, ServiceConfig,
};
use service_shell::health::{AsyncProbe, HealthChecker, HttpPing, TcpPing, WarmupCheck};
use service_shell::http::{DefaultDriver, DriverError, Options, Server, ServerError};
use service_shell::lifecycle::shutdown_signal;
use service_shell::net::parse_listen_addr;
use service_shell::observability::{
    logging::init_logging,
    metrics::init_metrics,
    tracing::{AlwaysSample, LogExporter, NeverSample, ProbabilitySampler, Sampler},
};
use service_shell::requestlog::{NcsaLogger, RequestLogger};
use service_shell::resilience::Backoff;

#[derive(Parser)]
#[command(name = "service-shell", version)]
#[command(about = "HTTP service shell with health checks and access logging", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (`host:port` or `:port`).
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    if cli.check_config {
        println!("configuration OK");
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-shell starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        tls = config.server.tls.is_some(),
        dependencies = config.health.dependencies.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match parse_listen_addr(&config.observability.metrics_address) {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let probes = spawn_probes(&config)?;
    let mut health_checks: Vec<Arc<dyn HealthChecker>> = Vec::new();
    if config.health.warmup_secs > 0 {
        health_checks.push(Arc::new(WarmupCheck::new(std::time::Duration::from_secs(
            config.health.warmup_secs,
        ))));
    }
    health_checks.extend(probes.iter().map(|p| p.clone() as Arc<dyn HealthChecker>));

    let request_logger: Option<Arc<dyn RequestLogger>> = config.observability.access_log.then(|| {
        Arc::new(NcsaLogger::new(std::io::stdout()).with_error_callback(|e| {
            tracing::warn!(error = %e, "Failed to write request log");
        })) as Arc<dyn RequestLogger>
    });

    let options = Options {
        request_logger,
        health_checks,
        trace_exporter: Some(Arc::new(LogExporter)),
        sampler: Some(sampler(&config)),
        driver: Some(Box::new(DefaultDriver::new(config.server.request_timeout()))),
    };
    let server = Arc::new(Server::new(app(), options));

    let mut serving = {
        let server = server.clone();
        let addr = config.server.bind_address.clone();
        let tls = config.server.tls.clone();
        tokio::spawn(async move {
            match tls {
                Some(tls) => {
                    server
                        .listen_and_serve_tls(&addr, &tls.cert_path, &tls.key_path)
                        .await
                }
                None => server.listen_and_serve(&addr).await,
            }
        })
    };

    let stop_requested = async {
        if let Err(e) = shutdown_signal().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signals, serving until the listener exits");
            std::future::pending::<()>().await;
        }
    };

    let finished = tokio::select! {
        joined = &mut serving => Some(joined),
        _ = stop_requested => None,
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            let grace = config.server.shutdown_grace();
            if let Err(e) = server.shutdown(grace).await {
                tracing::warn!(error = %e, "Graceful shutdown incomplete");
            }
            serving.await
        }
    };

    for probe in &probes {
        probe.stop().await;
    }

    match joined? {
        // Shutdown won the race against startup; the listener never bound.
        Err(ServerError::Driver(DriverError::Closed)) | Ok(()) => {}
        Err(e) => return Err(e.into()),
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

fn spawn_probes(config: &ServiceConfig) -> Result<Vec<Arc<AsyncProbe>>, Box<dyn std::error::Error>> {
    let backoff = Backoff::new(config.health.initial_backoff(), config.health.max_backoff());
    config
        .health
        .dependencies
        .iter()
        .map(|dep| spawn_probe(dep, backoff.clone()))
        .collect()
}

fn spawn_probe(
    dep: &DependencyConfig,
    backoff: Backoff,
) -> Result<Arc<AsyncProbe>, Box<dyn std::error::Error>> {
    let timeout = std::time::Duration::from_millis(dep.timeout_ms);
    let probe = match dep.kind {
        DependencyKind::Tcp => {
            AsyncProbe::spawn(&dep.name, TcpPing::new(&dep.address, timeout), backoff)
        }
        DependencyKind::Http => {
            let uri: Uri = dep.address.parse()?;
            AsyncProbe::spawn(&dep.name, HttpPing::new(uri, timeout), backoff)
        }
    };
    Ok(Arc::new(probe))
}

fn sampler(config: &ServiceConfig) -> Arc<dyn Sampler> {
    match config.observability.sampling {
        SamplingPolicy::Always => Arc::new(AlwaysSample),
        SamplingPolicy::Never => Arc::new(NeverSample),
        SamplingPolicy::Probability => {
            Arc::new(ProbabilitySampler::new(config.observability.sample_probability))
        }
    }
}

fn app() -> Router {
    Router::new().route("/", get(service_info))
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
