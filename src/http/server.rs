//! HTTP server shell.
//!
//! # Responsibilities
//! - Wrap the application router with request logging and tracing
//! - Mount the liveness and readiness routes next to it
//! - Register the trace exporter and sampler
//! - Delegate binding, serving and shutdown to a `Driver`
//!
//! # Design Decisions
//! - Wiring is lazy and happens exactly once, on the first serve call
//! - The composed router is immutable after that and shared by every listener
//! - TLS on a driver without the capability is a configuration error, never
//!   a silent downgrade to plaintext
//! - Shutdown closes the server even if no serve call has started yet, so a
//!   late serve call fails instead of running forever

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{body::Body, http::Request, middleware, Router};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::health::{aggregator, HealthChecker, HealthHandler};
use crate::http::driver::{DefaultDriver, Driver, DriverError};
use crate::observability::tracing::{trace_requests, Sampler, TraceExporter, Tracer};
use crate::requestlog::{log_requests, RequestLogger};

/// Path prefix reserved for the health routes.
pub const HEALTH_PREFIX: &str = "/healthz/";

/// Optional collaborators for [`Server::new`].
#[derive(Default)]
pub struct Options {
    pub request_logger: Option<Arc<dyn RequestLogger>>,
    /// Readiness checks, evaluated in this order.
    pub health_checks: Vec<Arc<dyn HealthChecker>>,
    pub trace_exporter: Option<Arc<dyn TraceExporter>>,
    pub sampler: Option<Arc<dyn Sampler>>,
    /// Defaults to [`DefaultDriver`] when absent.
    pub driver: Option<Box<dyn Driver>>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("driver {driver} does not support listen_and_serve_tls")]
    TlsUnsupported { driver: &'static str },

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Serving shell around an application router.
pub struct Server {
    handler: Router,
    request_logger: Option<Arc<dyn RequestLogger>>,
    health: Arc<HealthHandler>,
    tracer: Arc<Tracer>,
    trace_exporter: Option<Arc<dyn TraceExporter>>,
    sampler: Option<Arc<dyn Sampler>>,
    driver: OnceLock<Box<dyn Driver>>,
    composed: OnceLock<Router>,
    closed: AtomicBool,
}

impl Server {
    pub fn new(handler: Router, options: Options) -> Self {
        let mut health = HealthHandler::new();
        for check in options.health_checks {
            health.add(check);
        }

        Self {
            handler,
            request_logger: options.request_logger,
            health: Arc::new(health),
            tracer: Arc::new(Tracer::new()),
            trace_exporter: options.trace_exporter,
            sampler: options.sampler,
            driver: options.driver.map(OnceLock::from).unwrap_or_default(),
            composed: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Serve on `addr` until the driver stops.
    pub async fn listen_and_serve(&self, addr: &str) -> Result<(), ServerError> {
        let driver = self.open_driver()?;
        let app = self.init().clone();
        driver.listen_and_serve(addr, app).await?;
        Ok(())
    }

    /// Serve over TLS on `addr` until the driver stops.
    ///
    /// Fails immediately, before any wiring or binding, if the driver has no
    /// TLS capability.
    pub async fn listen_and_serve_tls(
        &self,
        addr: &str,
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<(), ServerError> {
        let driver = self.open_driver()?;
        let tls = driver.as_tls().ok_or(ServerError::TlsUnsupported {
            driver: driver.name(),
        })?;
        let app = self.init().clone();
        tls.listen_and_serve_tls(addr, cert_path.as_ref(), key_path.as_ref(), app)
            .await?;
        Ok(())
    }

    /// Gracefully stop the driver, waiting at most `grace`.
    ///
    /// Returns immediately if no driver was ever installed. Either way, serve
    /// calls made afterwards fail with [`DriverError::Closed`].
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ServerError> {
        self.closed.store(true, Ordering::SeqCst);
        match self.driver.get() {
            Some(driver) => Ok(driver.shutdown(grace).await?),
            None => Ok(()),
        }
    }

    /// Readiness aggregator built from the configured checks.
    pub fn health(&self) -> &Arc<HealthHandler> {
        &self.health
    }

    /// The composed router, wiring it first if needed.
    pub fn router(&self) -> Router {
        self.init().clone()
    }

    fn driver(&self) -> &dyn Driver {
        self.driver
            .get_or_init(|| -> Box<dyn Driver> { Box::new(DefaultDriver::default()) })
            .as_ref()
    }

    /// The driver, unless shutdown has already been requested.
    ///
    /// The driver is installed before the flag is read; `shutdown` sets the
    /// flag before looking for a driver. One of the two always sees the other.
    fn open_driver(&self) -> Result<&dyn Driver, ServerError> {
        let driver = self.driver();
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed.into());
        }
        Ok(driver)
    }

    fn init(&self) -> &Router {
        self.composed.get_or_init(|| {
            if let Some(exporter) = &self.trace_exporter {
                self.tracer.register_exporter(exporter.clone());
            }
            if let Some(sampler) = &self.sampler {
                self.tracer.set_sampler(sampler.clone());
            }
            let driver = self.driver();

            let mut app = self.handler.clone();
            if let Some(logger) = &self.request_logger {
                app = app.layer(middleware::from_fn_with_state(logger.clone(), log_requests));
            }
            let app = app
                .layer(middleware::from_fn_with_state(
                    self.tracer.clone(),
                    trace_requests,
                ))
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                        trace_id = tracing::field::Empty,
                    )
                }));

            tracing::debug!(
                driver = driver.name(),
                health_checks = self.health.len(),
                request_log = self.request_logger.is_some(),
                exporters = self.tracer.exporter_count(),
                "Server wired"
            );

            aggregator::routes(HEALTH_PREFIX, self.health.clone()).fallback_service(app)
        })
    }
}
