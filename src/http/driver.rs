//! Pluggable network drivers.
//!
//! # Responsibilities
//! - Bind a listener and serve a router until shutdown
//! - Graceful shutdown bounded by a grace period
//! - Optional TLS capability, discoverable through `Driver::as_tls`
//!
//! # Design Decisions
//! - Futures are boxed so drivers stay object-safe behind `Box<dyn Driver>`
//! - Shutdown with nothing serving returns at once, but the driver stays
//!   closed: a serve call that starts afterwards fails with `Closed`
//! - One driver may serve several listeners; shutdown drains all of them

use std::io;
use std::net::{AddrParseError, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use futures_util::future::{join_all, BoxFuture};
use thiserror::Error;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;

use crate::net::{parse_listen_addr, tls::load_tls_config};

pub type DriverFuture<'a> = BoxFuture<'a, Result<(), DriverError>>;

/// Errors reported by drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("invalid listen address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    #[error("server error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[source] io::Error),

    #[error("graceful shutdown did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("driver is shut down")]
    Closed,
}

/// Binds a listener and serves a router on it.
pub trait Driver: Send + Sync + 'static {
    /// Serve `app` on `addr` until a fatal error or shutdown.
    fn listen_and_serve<'a>(&'a self, addr: &'a str, app: Router) -> DriverFuture<'a>;

    /// Stop accepting, let in-flight requests finish, and give up after `grace`.
    fn shutdown(&self, grace: Duration) -> DriverFuture<'_>;

    /// TLS capability, if this driver has one.
    fn as_tls(&self) -> Option<&dyn TlsDriver> {
        None
    }

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Optional capability: terminate TLS at the listener.
pub trait TlsDriver: Send + Sync {
    fn listen_and_serve_tls<'a>(
        &'a self,
        addr: &'a str,
        cert_path: &'a Path,
        key_path: &'a Path,
        app: Router,
    ) -> DriverFuture<'a>;
}

impl<T: Driver + ?Sized> Driver for Arc<T> {
    fn listen_and_serve<'a>(&'a self, addr: &'a str, app: Router) -> DriverFuture<'a> {
        (**self).listen_and_serve(addr, app)
    }

    fn shutdown(&self, grace: Duration) -> DriverFuture<'_> {
        (**self).shutdown(grace)
    }

    fn as_tls(&self) -> Option<&dyn TlsDriver> {
        (**self).as_tls()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

struct Listener {
    handle: Handle,
    stopped: watch::Receiver<bool>,
}

/// Marks its listener stopped when the serve future ends or is dropped.
struct Registration {
    stopped: watch::Sender<bool>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.stopped.send_replace(true);
    }
}

#[derive(Default)]
struct Registry {
    closed: bool,
    listeners: Vec<Listener>,
}

/// Production driver built on `axum-server`, with TLS via rustls.
pub struct DefaultDriver {
    request_timeout: Duration,
    registry: Mutex<Registry>,
}

impl DefaultDriver {
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(request_timeout: Duration) -> Self {
        Self {
            request_timeout,
            registry: Mutex::new(Registry::default()),
        }
    }

    fn register(&self) -> Result<(Handle, Registration), DriverError> {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.closed {
            return Err(DriverError::Closed);
        }
        let handle = Handle::new();
        let (tx, rx) = watch::channel(false);
        registry.listeners.retain(|l| !*l.stopped.borrow());
        registry.listeners.push(Listener {
            handle: handle.clone(),
            stopped: rx,
        });
        Ok((handle, Registration { stopped: tx }))
    }

    #[allow(deprecated)]
    fn wrap(&self, app: Router) -> Router {
        app.layer(TimeoutLayer::new(self.request_timeout))
    }
}

impl Default for DefaultDriver {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REQUEST_TIMEOUT)
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, DriverError> {
    parse_listen_addr(addr).map_err(|source| DriverError::InvalidAddress {
        address: addr.to_string(),
        source,
    })
}

impl Driver for DefaultDriver {
    fn listen_and_serve<'a>(&'a self, addr: &'a str, app: Router) -> DriverFuture<'a> {
        Box::pin(async move {
            let addr = resolve(addr)?;
            let (handle, _registration) = self.register()?;
            let app = self.wrap(app);

            tracing::info!(address = %addr, "HTTP server starting");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
            tracing::info!(address = %addr, "HTTP server stopped");
            Ok(())
        })
    }

    fn shutdown(&self, grace: Duration) -> DriverFuture<'_> {
        Box::pin(async move {
            let active: Vec<(Handle, watch::Receiver<bool>)> = {
                let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
                registry.closed = true;
                let active = registry
                    .listeners
                    .iter()
                    .filter(|l| !*l.stopped.borrow())
                    .map(|l| (l.handle.clone(), l.stopped.clone()))
                    .collect();
                active
            };

            if active.is_empty() {
                return Ok(());
            }

            tracing::info!(listeners = active.len(), grace = ?grace, "Graceful shutdown requested");
            for (handle, _) in &active {
                handle.graceful_shutdown(Some(grace));
            }

            let drained = join_all(active.iter().map(|(_, stopped)| {
                let mut stopped = stopped.clone();
                async move {
                    let _ = stopped.wait_for(|s| *s).await;
                }
            }));

            match tokio::time::timeout(grace, drained).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    tracing::warn!(grace = ?grace, "Grace period elapsed, closing remaining connections");
                    for (handle, _) in &active {
                        handle.shutdown();
                    }
                    Err(DriverError::DeadlineExceeded(grace))
                }
            }
        })
    }

    fn as_tls(&self) -> Option<&dyn TlsDriver> {
        Some(self)
    }
}

impl TlsDriver for DefaultDriver {
    fn listen_and_serve_tls<'a>(
        &'a self,
        addr: &'a str,
        cert_path: &'a Path,
        key_path: &'a Path,
        app: Router,
    ) -> DriverFuture<'a> {
        Box::pin(async move {
            let addr = resolve(addr)?;
            let tls = load_tls_config(cert_path, key_path)
                .await
                .map_err(DriverError::Tls)?;
            let (handle, _registration) = self.register()?;
            let app = self.wrap(app);

            tracing::info!(address = %addr, "HTTPS server starting");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
            tracing::info!(address = %addr, "HTTPS server stopped");
            Ok(())
        })
    }
}
