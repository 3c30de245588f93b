//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use service_shell::http::{Driver, DriverFuture, TlsDriver};
use service_shell::observability::tracing::{SpanRecord, TraceExporter};
use service_shell::requestlog::{Entry, RequestLogger};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

/// Driver that records calls and returns immediately instead of binding.
#[derive(Default)]
pub struct RecordingDriver {
    pub serves: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub addresses: Mutex<Vec<String>>,
    pub apps: Mutex<Vec<Router>>,
}

impl RecordingDriver {
    pub fn serve_count(&self) -> usize {
        self.serves.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn record(&self, addr: &str, app: Router) {
        self.serves.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(addr.to_string());
        self.apps.lock().unwrap().push(app);
    }
}

impl Driver for RecordingDriver {
    fn listen_and_serve<'a>(&'a self, addr: &'a str, app: Router) -> DriverFuture<'a> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.record(addr, app);
            Ok(())
        })
    }

    fn shutdown(&self, _grace: Duration) -> DriverFuture<'_> {
        Box::pin(async move {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// `RecordingDriver` with the TLS capability.
#[derive(Default)]
pub struct RecordingTlsDriver {
    pub plain: RecordingDriver,
    pub tls_serves: AtomicUsize,
    pub cert_paths: Mutex<Vec<String>>,
}

impl Driver for RecordingTlsDriver {
    fn listen_and_serve<'a>(&'a self, addr: &'a str, app: Router) -> DriverFuture<'a> {
        self.plain.listen_and_serve(addr, app)
    }

    fn shutdown(&self, grace: Duration) -> DriverFuture<'_> {
        self.plain.shutdown(grace)
    }

    fn as_tls(&self) -> Option<&dyn TlsDriver> {
        Some(self)
    }
}

impl TlsDriver for RecordingTlsDriver {
    fn listen_and_serve_tls<'a>(
        &'a self,
        addr: &'a str,
        cert_path: &'a Path,
        _key_path: &'a Path,
        app: Router,
    ) -> DriverFuture<'a> {
        Box::pin(async move {
            self.tls_serves.fetch_add(1, Ordering::SeqCst);
            self.cert_paths
                .lock()
                .unwrap()
                .push(cert_path.display().to_string());
            self.plain.record(addr, app);
            Ok(())
        })
    }
}

/// Exporter that counts registrations and keeps every span.
#[derive(Default)]
pub struct CountingExporter {
    pub registrations: AtomicUsize,
    pub spans: Mutex<Vec<SpanRecord>>,
}

impl CountingExporter {
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn span_count(&self) -> usize {
        self.spans.lock().unwrap().len()
    }
}

impl TraceExporter for CountingExporter {
    fn on_register(&self) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
    }

    fn export(&self, span: &SpanRecord) {
        self.spans.lock().unwrap().push(span.clone());
    }
}

/// Request logger that keeps entries in memory.
#[derive(Default)]
pub struct CollectingLogger {
    pub entries: Mutex<Vec<Entry>>,
}

impl CollectingLogger {
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }
}

impl RequestLogger for CollectingLogger {
    fn log(&self, entry: &Entry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

/// In-memory `io::Write` sink that can be read back while still shared.
#[derive(Clone, Default)]
pub struct SharedSink(pub Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Start a simple mock backend that returns a fixed response.
pub async fn start_mock_backend(addr: SocketAddr, response: &'static str) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let response_str = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            response.len(),
                            response
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}
