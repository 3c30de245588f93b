//! Request tracing: sampling and span export.
//!
//! # Responsibilities
//! - Hold the registered span exporters and the sampling policy
//! - Give every request a fresh trace id and time it
//! - Hand sampled span records to the exporters
//!
//! # Design Decisions
//! - The tracer belongs to one server; registration happens in its one-time init
//! - Endpoints are public: incoming trace headers are never adopted as parent
//! - With no sampler configured, 1 in 10,000 requests is sampled

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant, SystemTime};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use uuid::Uuid;

use crate::observability::metrics;

/// Sampling probability used until a sampler is registered.
pub const DEFAULT_SAMPLE_PROBABILITY: f64 = 1e-4;

/// Decides whether a trace is recorded.
pub trait Sampler: Send + Sync {
    fn should_sample(&self, trace_id: &Uuid) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSample;

impl Sampler for AlwaysSample {
    fn should_sample(&self, _trace_id: &Uuid) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSample;

impl Sampler for NeverSample {
    fn should_sample(&self, _trace_id: &Uuid) -> bool {
        false
    }
}

/// Samples each trace independently with the given probability.
#[derive(Debug, Clone, Copy)]
pub struct ProbabilitySampler {
    probability: f64,
}

impl ProbabilitySampler {
    /// `probability` is clamped to `[0, 1]`.
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Sampler for ProbabilitySampler {
    fn should_sample(&self, _trace_id: &Uuid) -> bool {
        if self.probability >= 1.0 {
            return true;
        }
        if self.probability <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(self.probability)
    }
}

/// A finished, sampled request span.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub trace_id: Uuid,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub start_time: SystemTime,
    pub duration: Duration,
}

/// Receives sampled spans.
pub trait TraceExporter: Send + Sync {
    /// Called once, when the exporter is registered with a tracer.
    fn on_register(&self) {}

    fn export(&self, span: &SpanRecord);
}

/// Exporter that emits span records as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl TraceExporter for LogExporter {
    fn export(&self, span: &SpanRecord) {
        tracing::info!(
            trace_id = %span.trace_id,
            method = %span.method,
            path = %span.path,
            status = span.status,
            duration_ms = span.duration.as_secs_f64() * 1000.0,
            "span"
        );
    }
}

/// Per-server registry of exporters and the active sampler.
pub struct Tracer {
    exporters: RwLock<Vec<Arc<dyn TraceExporter>>>,
    sampler: RwLock<Arc<dyn Sampler>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            exporters: RwLock::new(Vec::new()),
            sampler: RwLock::new(Arc::new(ProbabilitySampler::new(DEFAULT_SAMPLE_PROBABILITY))),
        }
    }

    pub fn register_exporter(&self, exporter: Arc<dyn TraceExporter>) {
        exporter.on_register();
        self.exporters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(exporter);
    }

    pub fn set_sampler(&self, sampler: Arc<dyn Sampler>) {
        *self.sampler.write().unwrap_or_else(PoisonError::into_inner) = sampler;
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn should_sample(&self, trace_id: &Uuid) -> bool {
        let sampler = self
            .sampler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        sampler.should_sample(trace_id)
    }

    fn export(&self, span: &SpanRecord) {
        let exporters = self.exporters.read().unwrap_or_else(PoisonError::into_inner);
        for exporter in exporters.iter() {
            exporter.export(span);
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`.
///
/// Runs inside `TraceLayer`'s span, so log events from the handler carry the
/// trace id field recorded here.
pub async fn trace_requests(
    State(tracer): State<Arc<Tracer>>,
    request: Request,
    next: Next,
) -> Response {
    let trace_id = Uuid::new_v4();
    let sampled = tracer.should_sample(&trace_id);
    tracing::Span::current().record("trace_id", tracing::field::display(trace_id));

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start_time = SystemTime::now();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration = started.elapsed();
    metrics::record_request(&method, status, duration);

    if sampled {
        tracer.export(&SpanRecord {
            trace_id,
            method,
            path,
            status,
            start_time,
            duration,
        });
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recording {
        registered: AtomicUsize,
        spans: Mutex<Vec<SpanRecord>>,
    }

    impl TraceExporter for Recording {
        fn on_register(&self) {
            self.registered.fetch_add(1, Ordering::SeqCst);
        }

        fn export(&self, span: &SpanRecord) {
            self.spans.lock().unwrap().push(span.clone());
        }
    }

    #[test]
    fn probability_bounds() {
        let id = Uuid::new_v4();
        assert!(ProbabilitySampler::new(1.0).should_sample(&id));
        assert!(!ProbabilitySampler::new(0.0).should_sample(&id));
        assert_eq!(ProbabilitySampler::new(7.0).probability(), 1.0);
        assert_eq!(ProbabilitySampler::new(-1.0).probability(), 0.0);
        assert!(AlwaysSample.should_sample(&id));
        assert!(!NeverSample.should_sample(&id));
    }

    #[test]
    fn register_calls_hook_once() {
        let tracer = Tracer::new();
        let exporter = Arc::new(Recording::default());
        tracer.register_exporter(exporter.clone());
        assert_eq!(exporter.registered.load(Ordering::SeqCst), 1);
        assert_eq!(tracer.exporter_count(), 1);
    }

    #[tokio::test]
    async fn exports_only_sampled_requests() {
        use axum::{body::Body, middleware, routing::get, Router};
        use tower::ServiceExt;

        let tracer = Arc::new(Tracer::new());
        let exporter = Arc::new(Recording::default());
        tracer.register_exporter(exporter.clone());
        tracer.set_sampler(Arc::new(NeverSample));

        let app = Router::new()
            .route("/a", get(|| async { "a" }))
            .layer(middleware::from_fn_with_state(tracer.clone(), trace_requests));

        let request = Request::builder().uri("/a").body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap();
        assert!(exporter.spans.lock().unwrap().is_empty());

        tracer.set_sampler(Arc::new(AlwaysSample));
        let request = Request::builder().uri("/a?q=1").body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap();

        let spans = exporter.spans.lock().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].path, "/a");
        assert_eq!(spans[0].method, "GET");
        assert_eq!(spans[0].status, 200);
    }
}
