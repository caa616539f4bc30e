use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{Method, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;
use tracing::debug;

use super::config::DownstreamService;

/// 점검 자체를 끝내지 못한 경우
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("잘못된 점검 URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("요청 실패: {0}")]
    Request(String),

    #[error("타임아웃 ({0:?})")]
    Timeout(Duration),
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &str;

    /// 서비스가 2xx로 응답하면 `Ok(true)`, 다른 상태 코드면 `Ok(false)`
    async fn check(&self) -> Result<bool, ProbeError>;
}

/// HTTP 헬스 체커
pub struct HttpHealthChecker {
    name: String,
    uri: Uri,
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl HttpHealthChecker {
    pub fn new(service: &DownstreamService, timeout: Duration) -> Result<Self, ProbeError> {
        let uri = service
            .url
            .parse::<Uri>()
            .map_err(|e| ProbeError::InvalidUrl {
                url: service.url.clone(),
                reason: e.to_string(),
            })?;
        let client = Client::builder(TokioExecutor::new()).build::<_, Empty<Bytes>>(HttpConnector::new());

        Ok(Self {
            name: service.name.clone(),
            uri,
            client,
            timeout,
        })
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> Result<bool, ProbeError> {
        debug!("HTTP 헬스 체크 시작: {}", self.uri);

        let request = hyper::Request::builder()
            .method(Method::GET)
            .uri(self.uri.clone())
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::Request(format!("요청 생성 실패: {}", e)))?;

        match timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.status().is_success()),
            Ok(Err(e)) => Err(ProbeError::Request(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}
