//! Per-request spans and metrics.
//!
//! # Responsibilities
//! - Open one server span per request, parented on an incoming `traceparent`
//! - Tag the span and the duration metric with the matched route pattern
//! - Track in-flight requests
//!
//! # Design Decisions
//! - The outer layer (around the whole router) owns the recording, so
//!   unmatched paths are recorded too
//! - Route layers only name the route on the outer recording; they open their
//!   own only when no outer layer ran
//! - The recording ends in `Drop`, so a panicking or cancelled request still
//!   closes its span
//! - The span is the current OpenTelemetry context while the inner service
//!   runs, so handler spans and bridged log records join the request's trace
//!
//! # Data Flow
//! ```text
//! request
//!     → layer(): extract parent, start span, insert MatchedRoute slot
//!     → router → route(pattern): fill slot
//!     → handler
//!     → response status → span name, attributes, duration histogram
//! ```

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use std::time::Instant;

use axum::http::{Method, Request, Response, StatusCode};
use futures_util::future::BoxFuture;
use opentelemetry::trace::{FutureExt as _, SpanKind, Status, TraceContextExt as _, Tracer as _};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_semantic_conventions::attribute::{
    HTTP_REQUEST_METHOD, HTTP_RESPONSE_STATUS_CODE, HTTP_ROUTE, URL_PATH,
};
use tower::{Layer, Service};

use crate::observability::propagation::extract_parent;
use crate::observability::{HttpServerMetrics, Telemetry};

/// Route pattern matched for the current request, shared between the outer
/// recording and the route layer that matched.
#[derive(Debug, Clone, Default)]
pub struct MatchedRoute(Arc<OnceLock<&'static str>>);

impl MatchedRoute {
    /// Record the pattern. The first one recorded wins.
    pub fn set(&self, pattern: &'static str) {
        let _ = self.0.set(pattern);
    }

    pub fn get(&self) -> Option<&'static str> {
        self.0.get().copied()
    }
}

struct Shared {
    tracer: SdkTracer,
    metrics: HttpServerMetrics,
    propagator: TraceContextPropagator,
}

/// Factory for the instrumentation layers, built from the telemetry bundle.
#[derive(Clone)]
pub struct HttpInstrumentation {
    shared: Arc<Shared>,
}

impl HttpInstrumentation {
    pub fn new(telemetry: &Telemetry) -> Self {
        Self {
            shared: Arc::new(Shared {
                tracer: telemetry.tracer(),
                metrics: HttpServerMetrics::new(&telemetry.meter()),
                propagator: TraceContextPropagator::new(),
            }),
        }
    }

    /// Layer for the whole router.
    pub fn layer(&self) -> InstrumentLayer {
        InstrumentLayer {
            shared: self.shared.clone(),
            route: None,
        }
    }

    /// Layer for the handler registered under `pattern`.
    pub fn route(&self, pattern: &'static str) -> InstrumentLayer {
        InstrumentLayer {
            shared: self.shared.clone(),
            route: Some(pattern),
        }
    }
}

#[derive(Clone)]
pub struct InstrumentLayer {
    shared: Arc<Shared>,
    route: Option<&'static str>,
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrumented<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrumented {
            inner,
            shared: self.shared.clone(),
            route: self.route,
        }
    }
}

#[derive(Clone)]
pub struct Instrumented<S> {
    inner: S,
    shared: Arc<Shared>,
    route: Option<&'static str>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for Instrumented<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Call the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if let Some(matched) = req.extensions().get::<MatchedRoute>() {
            if let Some(pattern) = self.route {
                matched.set(pattern);
            }
            return Box::pin(inner.call(req));
        }

        let matched = MatchedRoute::default();
        if let Some(pattern) = self.route {
            matched.set(pattern);
        }
        req.extensions_mut().insert(matched.clone());
        let recording = Recording::start(self.shared.clone(), &req, matched);
        let cx = recording.cx.clone();

        let future = {
            let _attached = cx.clone().attach();
            inner.call(req)
        };

        Box::pin(
            async move {
                let result = future.await;
                if let Ok(response) = &result {
                    recording.finish(response.status());
                }
                result
            }
            .with_context(cx),
        )
    }
}

/// An open request span plus what is needed to close it.
struct Recording {
    shared: Arc<Shared>,
    /// Parent context with the request span active.
    cx: OtelContext,
    method: Method,
    route: MatchedRoute,
    started: Instant,
    status: Option<StatusCode>,
}

impl Recording {
    fn start<B>(shared: Arc<Shared>, req: &Request<B>, route: MatchedRoute) -> Self {
        let method = req.method().clone();
        let parent = extract_parent(&shared.propagator, req.headers());

        let span = shared
            .tracer
            .span_builder(method.as_str().to_owned())
            .with_kind(SpanKind::Server)
            .with_attributes([
                KeyValue::new(HTTP_REQUEST_METHOD, method.as_str().to_owned()),
                KeyValue::new(URL_PATH, req.uri().path().to_owned()),
            ])
            .start_with_context(&shared.tracer, &parent);
        let cx = parent.with_span(span);

        shared
            .metrics
            .active_requests
            .add(1, &[KeyValue::new(HTTP_REQUEST_METHOD, method.as_str().to_owned())]);

        Self {
            shared,
            cx,
            method,
            route,
            started: Instant::now(),
            status: None,
        }
    }

    fn finish(mut self, status: StatusCode) {
        self.status = Some(status);
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        let method = KeyValue::new(HTTP_REQUEST_METHOD, self.method.as_str().to_owned());
        let mut attributes = vec![method.clone()];
        let span = self.cx.span();

        if let Some(route) = self.route.get() {
            span.update_name(format!("{} {route}", self.method));
            span.set_attribute(KeyValue::new(HTTP_ROUTE, route));
            attributes.push(KeyValue::new(HTTP_ROUTE, route));
        }

        match self.status {
            Some(status) => {
                let code = KeyValue::new(HTTP_RESPONSE_STATUS_CODE, i64::from(status.as_u16()));
                span.set_attribute(code.clone());
                attributes.push(code);
                if status.is_server_error() {
                    span.set_status(Status::error(Cow::Owned(status.to_string())));
                }
            }
            None => span.set_status(Status::error("request ended before a response was produced")),
        }
        span.end();

        let metrics = &self.shared.metrics;
        metrics
            .request_duration
            .record(self.started.elapsed().as_secs_f64(), &attributes);
        metrics.active_requests.add(-1, &[method]);
    }
}
