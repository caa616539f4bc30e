mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::LogCapture;
use gateway_edge::health::{DownstreamHealthAggregator, HealthChecker, ProbeError};
use gateway_edge::middleware::response::{empty_body, text_response};
use gateway_edge::middleware::{Request, Response, CORRELATION_ID_HEADER};
use gateway_edge::proxy::{ProxyError, Upstream};
use gateway_edge::routes::{default_routes, RouteConfig};
use gateway_edge::server::Pipeline;
use gateway_edge::settings::{Environment, Settings};
use http_body_util::BodyExt;
use hyper::StatusCode;
use serde_json::Value;
use tracing::Level;

struct ScriptedUpstream;

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn forward(&self, req: Request, route: &RouteConfig) -> Result<Response, ProxyError> {
        if req.uri().path().ends_with("/boom") {
            panic!("processing failed for {}", route.service);
        }
        Ok(text_response(StatusCode::OK, "upstream ok"))
    }
}

struct Down;

#[async_trait]
impl HealthChecker for Down {
    fn name(&self) -> &str {
        "Telemetria API"
    }

    async fn check(&self) -> Result<bool, ProbeError> {
        Ok(false)
    }
}

fn open_settings(environment: Environment) -> Settings {
    Settings {
        environment,
        routes: default_routes()
            .into_iter()
            .map(|route| RouteConfig {
                authenticate: false,
                ..route
            })
            .collect(),
        ..Settings::default()
    }
}

fn pipeline(settings: &Settings, health: Vec<Arc<dyn HealthChecker>>) -> Pipeline {
    Pipeline::with_parts(
        settings,
        Arc::new(ScriptedUpstream),
        Arc::new(DownstreamHealthAggregator::new(health)),
    )
    .unwrap()
}

fn get(path: &str) -> hyper::http::request::Builder {
    hyper::Request::builder().method("GET").uri(path)
}

async fn json_body(res: Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generated_correlation_id_matches_log() {
    let (capture, _guard) = LogCapture::install();
    let pipeline = pipeline(&open_settings(Environment::Production), Vec::new());

    let res = pipeline.chain.execute(get("/gestao/fazendas").body(empty_body()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);

    let header = res.headers().get(CORRELATION_ID_HEADER).unwrap().to_str().unwrap().to_string();
    assert!(!header.trim().is_empty());
    assert_eq!(res.headers().get_all(CORRELATION_ID_HEADER).iter().count(), 1);

    let completions = capture.matching("Outgoing Response");
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].field("correlation_id"), Some(header.as_str()));
}

#[tokio::test]
async fn test_inbound_correlation_id_is_echoed() {
    let pipeline = pipeline(&open_settings(Environment::Production), Vec::new());

    let req = get("/dashboard/resumo")
        .header(CORRELATION_ID_HEADER, "foo")
        .body(empty_body())
        .unwrap();
    let res = pipeline.chain.execute(req).await;

    assert_eq!(res.headers().get(CORRELATION_ID_HEADER).unwrap(), "foo");
}

#[tokio::test]
async fn test_panic_becomes_single_canonical_500() {
    let (capture, _guard) = LogCapture::install();
    let pipeline = pipeline(&open_settings(Environment::Production), Vec::new());

    let req = get("/gestao/boom")
        .header(CORRELATION_ID_HEADER, "corr-500")
        .body(empty_body())
        .unwrap();
    let res = pipeline.chain.execute(req).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers().get(CORRELATION_ID_HEADER).unwrap(), "corr-500");

    let body = json_body(res).await;
    assert_eq!(body["statusCode"], 500);
    assert_eq!(body["message"], "An error occurred while processing your request.");
    assert_eq!(body["path"], "/gestao/boom");
    assert_eq!(body["correlationId"], "corr-500");
    assert!(body["details"].is_null());
    assert!(body["timestamp"].as_str().is_some());

    let failures = capture.matching("Unhandled exception occurred");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);

    assert_eq!(capture.matching("Incoming Request").len(), 1);
    let completions = capture.matching("Outgoing Response");
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].level, Level::ERROR);
    assert_eq!(completions[0].field("status"), Some("500"));
}

#[tokio::test]
async fn test_development_error_carries_details() {
    let pipeline = pipeline(&open_settings(Environment::Development), Vec::new());

    let res = pipeline.chain.execute(get("/gestao/boom").body(empty_body()).unwrap()).await;
    let body = json_body(res).await;

    assert!(body["details"].as_str().unwrap().contains("processing failed"));
}

#[tokio::test]
async fn test_severity_follows_status_bucket() {
    let (capture, _guard) = LogCapture::install();
    let pipeline = pipeline(&open_settings(Environment::Production), vec![Arc::new(Down)]);

    let ok = pipeline.chain.execute(get("/gestao/x").body(empty_body()).unwrap()).await;
    let missing = pipeline.chain.execute(get("/nowhere").body(empty_body()).unwrap()).await;
    let degraded = pipeline.chain.execute(get("/health").body(empty_body()).unwrap()).await;

    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(degraded.status(), StatusCode::SERVICE_UNAVAILABLE);

    let levels: Vec<Level> = capture
        .matching("Outgoing Response")
        .into_iter()
        .map(|event| event.level)
        .collect();
    assert_eq!(levels, vec![Level::INFO, Level::WARN, Level::ERROR]);
    assert_eq!(capture.matching("Incoming Request").len(), 3);
}

#[tokio::test]
async fn test_cancelled_request_still_logs_completion() {
    let (capture, _guard) = LogCapture::install();

    let mut settings = open_settings(Environment::Production);
    settings.rate_limit.policies.insert(
        "default".to_string(),
        gateway_edge::middleware::rate_limit::PolicyConfig {
            permit_limit: 1,
            queue_limit: 1,
            ..gateway_edge::middleware::rate_limit::PolicyConfig::default_policy()
        },
    );
    let pipeline = pipeline(&settings, Vec::new());

    let first = pipeline.chain.execute(get("/gestao/a").body(empty_body()).unwrap()).await;
    assert_eq!(first.status(), StatusCode::OK);

    // 두 번째 요청은 대기열에 들어간 채로 취소됩니다.
    let queued = pipeline.chain.execute(get("/gestao/b").body(empty_body()).unwrap());
    let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), queued).await;
    assert!(timed_out.is_err());

    let completions = capture.matching("Outgoing Response");
    assert_eq!(completions.len(), 2);
    assert_eq!(completions[1].field("status"), Some("499"));
    assert_eq!(completions[1].level, Level::WARN);
}

#[tokio::test]
async fn test_inbound_correlation_id_on_both_log_lines() {
    let (capture, _guard) = LogCapture::install();
    let pipeline = pipeline(&open_settings(Environment::Production), Vec::new());

    let req = get("/gestao/fazendas")
        .header(CORRELATION_ID_HEADER, "foo")
        .body(empty_body())
        .unwrap();
    pipeline.chain.execute(req).await;

    let started = capture.matching("Incoming Request");
    let completed = capture.matching("Outgoing Response");
    assert_eq!(started.len(), 1);
    assert_eq!(completed.len(), 1);
    assert_eq!(started[0].field("correlation_id"), Some("foo"));
    assert_eq!(completed[0].field("correlation_id"), Some("foo"));
}

#[tokio::test]
async fn test_metrics_count_requests_and_rejections() {
    let mut settings = open_settings(Environment::Production);
    settings.rate_limit.policies.insert(
        "read".to_string(),
        gateway_edge::middleware::rate_limit::PolicyConfig {
            permit_limit: 1,
            tokens_per_period: 1,
            queue_limit: 0,
            ..gateway_edge::middleware::rate_limit::PolicyConfig::read_policy()
        },
    );
    let pipeline = pipeline(&settings, Vec::new());

    let first = pipeline.chain.execute(get("/telemetria/sensores").body(empty_body()).unwrap()).await;
    let second = pipeline.chain.execute(get("/telemetria/sensores").body(empty_body()).unwrap()).await;
    let other = pipeline.chain.execute(get("/gestao/x").body(empty_body()).unwrap()).await;
    let missing = pipeline.chain.execute(get("/nowhere").body(empty_body()).unwrap()).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    assert_eq!(pipeline.metrics.request_count("GET", 200), 2.0);
    assert_eq!(pipeline.metrics.request_count("GET", 429), 1.0);
    assert_eq!(pipeline.metrics.request_count("GET", 404), 1.0);
    assert_eq!(pipeline.metrics.rejection_count("read"), 1.0);

    let res = pipeline.chain.execute(get("/metrics").body(empty_body()).unwrap()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(text.contains(r#"gateway_http_requests_total{method="GET",status="200"} 2"#));
    assert!(text.contains(r#"gateway_http_requests_total{method="GET",status="429"} 1"#));
    assert!(text.contains(r#"gateway_rate_limit_rejections_total{policy="read"} 1"#));
    assert!(text.contains(r#"gateway_http_request_duration_seconds_count{method="GET",status="404"} 1"#));
}
