use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use super::endpoint::GatewayEndpoint;
use super::info::InfoService;
use super::Result;
use crate::health::DownstreamHealthAggregator;
use crate::metrics::GatewayMetrics;
use crate::middleware::{
    AccessLogMiddleware, CorrelationMiddleware, CorsMiddleware, FaultTranslatorMiddleware, JwtAuthMiddleware,
    MiddlewareChain, RateLimitMiddleware, RateLimiter, TokenVerifier,
};
use crate::proxy::{HttpForwarder, Upstream};
use crate::settings::Settings;

/// 설정으로 조립한 요청 파이프라인
///
/// 순서: 접근 로그 → 장애 변환 → 상관관계 ID → CORS → 속도 제한 → 토큰 검증 → 종착점.
/// 속도 제한은 꺼져 있으면, 토큰 검증은 인증이 필요한 라우트가 없으면 빠집니다.
pub struct Pipeline {
    pub chain: MiddlewareChain,
    pub metrics: Arc<GatewayMetrics>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub verifier: Option<Arc<TokenVerifier>>,
}

impl Pipeline {
    pub fn build(settings: &Settings) -> Result<Self> {
        let upstream = Arc::new(HttpForwarder::new(
            settings.server.upstream.clone(),
            std::time::Duration::from_secs(settings.server.upstream_timeout_secs),
        ));
        let health = Arc::new(DownstreamHealthAggregator::from_settings(&settings.health)?);
        Self::with_parts(settings, upstream, health)
    }

    /// 업스트림과 헬스 집계기를 직접 지정해서 조립합니다.
    pub fn with_parts(
        settings: &Settings,
        upstream: Arc<dyn Upstream>,
        health: Arc<DownstreamHealthAggregator>,
    ) -> Result<Self> {
        let routes = Arc::new(settings.route_table());
        let info = InfoService::new(settings.environment, routes.clone());
        let metrics = Arc::new(GatewayMetrics::new()?);
        let endpoint = GatewayEndpoint::new(health, info, metrics.clone(), routes.clone(), upstream);

        let mut chain = MiddlewareChain::new(Arc::new(endpoint));
        chain.add(AccessLogMiddleware::new(metrics.clone()));
        chain.add(FaultTranslatorMiddleware::new(settings.environment));
        chain.add(CorrelationMiddleware::new());
        chain.add(CorsMiddleware::new(settings.cors.clone()));

        let limiter = if settings.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::new(&settings.rate_limit));
            chain.add(RateLimitMiddleware::new(
                limiter.clone(),
                routes.clone(),
                metrics.clone(),
                settings.server.trust_forwarded_for,
            ));
            Some(limiter)
        } else {
            None
        };

        let verifier = if routes.any_authenticated() {
            let verifier = Arc::new(TokenVerifier::new(settings.auth.clone())?);
            chain.add(JwtAuthMiddleware::new(verifier.clone(), routes.clone()));
            Some(verifier)
        } else {
            None
        };

        info!(middlewares = ?chain.names(), "요청 파이프라인 구성 완료");
        Ok(Self {
            chain,
            metrics,
            limiter,
            verifier,
        })
    }

    /// 파티션 정리와 서명 키 갱신 작업을 띄웁니다.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        if let Some(limiter) = &self.limiter {
            tasks.push(limiter.spawn_eviction());
        }
        if let Some(task) = self.verifier.as_ref().and_then(|v| v.spawn_key_refresh()) {
            tasks.push(task);
        }
        tasks
    }
}
