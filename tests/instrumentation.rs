//! Request instrumentation tests, driven in-process through the router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use dice_server::config::TimeoutConfig;
use dice_server::http::{router, HttpInstrumentation, RouteTable, ROLL_DICE};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, Value};
use tower::ServiceExt;

mod common;

fn get_request(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn timeouts() -> TimeoutConfig {
    TimeoutConfig::default()
}

#[tokio::test]
async fn test_route_span_named_by_pattern() {
    let (telemetry, exporters) = common::telemetry();
    let app = router(&HttpInstrumentation::new(&telemetry), &timeouts());

    let res = app.oneshot(get_request("/rolldice")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);

    let span = &spans[0];
    assert_eq!(span.name, "GET /rolldice");
    assert_eq!(span.span_kind, SpanKind::Server);
    assert_eq!(
        common::attribute(span, "http.route"),
        Some(Value::from(ROLL_DICE))
    );
    assert_eq!(
        common::attribute(span, "http.response.status_code"),
        Some(Value::I64(200))
    );
    assert_eq!(common::attribute(span, "http.request.method"), Some(Value::from("GET")));
}

#[tokio::test]
async fn test_no_op_handler_still_recorded_once() {
    let (telemetry, exporters) = common::telemetry();
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let app = RouteTable::new(&instrumentation, &timeouts())
        .handle("/noop", get(|| async {}))
        .build();

    for _ in 0..3 {
        let res = app.clone().oneshot(get_request("/noop")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 3);
    for span in &spans {
        assert_eq!(common::attribute(span, "http.route"), Some(Value::from("/noop")));
    }
}

#[tokio::test]
async fn test_unmatched_path_recorded_without_route() {
    let (telemetry, exporters) = common::telemetry();
    let app = router(&HttpInstrumentation::new(&telemetry), &timeouts());

    let res = app.oneshot(get_request("/unknown")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "GET");
    assert_eq!(common::attribute(&spans[0], "http.route"), None);
    assert_eq!(
        common::attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(404))
    );
}

#[tokio::test]
async fn test_panicking_handler_closes_span() {
    let (telemetry, exporters) = common::telemetry();
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let app = RouteTable::new(&instrumentation, &timeouts())
        .handle(
            "/boom",
            get(|| async { panic!("handler exploded") as () }),
        )
        .build();

    let res = app.oneshot(get_request("/boom")).await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "GET /boom");
    assert!(matches!(spans[0].status, Status::Error { .. }));
}

#[tokio::test]
async fn test_write_timeout_recorded_as_408() {
    let (telemetry, exporters) = common::telemetry();
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let timeouts = TimeoutConfig {
        write_secs: 1,
        ..TimeoutConfig::default()
    };
    let app = RouteTable::new(&instrumentation, &timeouts)
        .handle(
            "/slow",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                "late"
            }),
        )
        .build();

    let res = app.oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "GET /slow");
    assert_eq!(
        common::attribute(&spans[0], "http.response.status_code"),
        Some(Value::I64(408))
    );
    assert!(!matches!(spans[0].status, Status::Error { .. }));
}

#[tokio::test]
async fn test_handler_runs_inside_request_span() {
    let (telemetry, exporters) = common::telemetry();
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let app = RouteTable::new(&instrumentation, &timeouts())
        .handle(
            "/whoami",
            get(|| async {
                let cx = Context::current();
                let span = cx.span();
                let span_context = span.span_context();
                format!(
                    "{} {} {}",
                    cx.has_active_span(),
                    span_context.trace_id(),
                    span_context.span_id()
                )
            }),
        )
        .build();

    let res = app.oneshot(get_request("/whoami")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    let expected = format!(
        "true {} {}",
        spans[0].span_context.trace_id(),
        spans[0].span_context.span_id()
    );
    assert_eq!(body, expected);
    assert!(!Context::current().has_active_span());
}

#[tokio::test]
async fn test_route_layer_alone_opens_its_own_span() {
    let (telemetry, exporters) = common::telemetry();
    let instrumentation = HttpInstrumentation::new(&telemetry);
    let app: Router = Router::new().route(
        "/solo",
        get(|| async { "solo" }).layer(instrumentation.route("/solo")),
    );

    let res = app.oneshot(get_request("/solo")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "GET /solo");
}

#[tokio::test]
async fn test_traceparent_continues_remote_trace() {
    let (telemetry, exporters) = common::telemetry();
    let app = router(&HttpInstrumentation::new(&telemetry), &timeouts());

    let req = Request::builder()
        .uri("/rolldice")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::empty())
        .unwrap();
    app.oneshot(req).await.unwrap();

    telemetry.force_flush().unwrap();
    let spans = exporters.finished_spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(
        spans[0].span_context.trace_id().to_string(),
        "4bf92f3577b34da6a3ce929d0e0e4736"
    );
    assert_eq!(spans[0].parent_span_id.to_string(), "00f067aa0ba902b7");
}

#[tokio::test]
async fn test_request_duration_recorded() {
    let (telemetry, exporters) = common::telemetry();
    let app = router(&HttpInstrumentation::new(&telemetry), &timeouts());

    app.oneshot(get_request("/rolldice")).await.unwrap();
    telemetry.force_flush().unwrap();

    let names: Vec<String> = exporters
        .metrics
        .get_finished_metrics()
        .unwrap()
        .iter()
        .flat_map(|resource| resource.scope_metrics())
        .flat_map(|scope| scope.metrics())
        .map(|metric| metric.name().to_string())
        .collect();

    assert!(
        names.iter().any(|name| name == "http.server.request.duration"),
        "exported metrics: {names:?}"
    );
    assert!(names.iter().any(|name| name == "http.server.active_requests"));
}
