//! Prometheus 지표
//!
//! 요청 수와 처리 시간, 속도 제한 거부 수를 모으고 `/metrics`에서 텍스트
//! 형식으로 내보냅니다. 지표는 파이프라인마다 별도 레지스트리에 등록됩니다.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, StatusCode};
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tracing::error;

use crate::middleware::response::{internal_server_error, text_response};
use crate::middleware::Response;

/// HTTP 처리 시간 버킷 (초)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// 표준 메서드가 아니면 라벨 값을 하나로 묶습니다.
const KNOWN_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

fn method_label(method: &str) -> &str {
    if KNOWN_METHODS.contains(&method) {
        method
    } else {
        "OTHER"
    }
}

/// 게이트웨이 지표 모음
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,

    /// 라벨: method, status
    http_requests_total: CounterVec,

    /// 라벨: method, status
    http_request_duration_seconds: HistogramVec,

    /// 라벨: policy
    rate_limit_rejections_total: CounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("gateway_http_requests_total", "Total number of HTTP requests"),
            &["method", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "status"],
        )?;
        let rate_limit_rejections_total = CounterVec::new(
            Opts::new(
                "gateway_rate_limit_rejections_total",
                "Total number of requests rejected by rate limiting",
            ),
            &["policy"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(rate_limit_rejections_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            rate_limit_rejections_total,
        })
    }

    pub fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        let labels = [method_label(method), status.as_str()];
        self.http_requests_total.with_label_values(&labels).inc();
        self.http_request_duration_seconds
            .with_label_values(&labels)
            .observe(duration_secs);
    }

    pub fn record_rate_limit_rejection(&self, policy: &str) {
        self.rate_limit_rejections_total.with_label_values(&[policy]).inc();
    }

    pub fn request_count(&self, method: &str, status: u16) -> f64 {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method_label(method), status.as_str()])
            .get()
    }

    pub fn rejection_count(&self, policy: &str) -> f64 {
        self.rate_limit_rejections_total.with_label_values(&[policy]).get()
    }

    /// 텍스트 노출 형식으로 인코딩합니다.
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// `GET /metrics` 응답
    pub fn response(&self) -> Response {
        match self.render() {
            Ok(buffer) => hyper::Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, TextEncoder::new().format_type())
                .body(Full::new(Bytes::from(buffer)))
                .unwrap_or_else(|_| internal_server_error()),
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to encode metrics: {}", e),
                )
            }
        }
    }
}
