//! 라우트 테이블
//!
//! 경로 패턴별로 서비스 이름, 허용 메서드, 속도 제한 정책, 인증 필요 여부를
//! 보관합니다. 실제 백엔드 선택은 업스트림 포워더가 담당합니다.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::middleware::rate_limit::{DEFAULT_POLICY, INGEST_POLICY, READ_POLICY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// `/gestao/*` 같은 경로 패턴. `*`로 끝나면 접두사, 아니면 정확히 일치
    pub path: String,

    /// 서비스 표시 이름
    pub service: String,

    /// 허용 메서드 (비어 있으면 모두 허용)
    #[serde(default)]
    pub methods: Vec<String>,

    /// 속도 제한 정책 이름
    #[serde(default = "default_policy_name")]
    pub policy: String,

    /// 베어러 토큰 검증 필요 여부
    #[serde(default = "default_authenticate")]
    pub authenticate: bool,

    /// 라우트 전용 업스트림 (없으면 서버 기본값)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
}

fn default_policy_name() -> String {
    DEFAULT_POLICY.to_string()
}

fn default_authenticate() -> bool {
    true
}

impl RouteConfig {
    fn new(path: &str, service: &str, methods: &[&str], policy: &str) -> Self {
        Self {
            path: path.to_string(),
            service: service.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            policy: policy.to_string(),
            authenticate: true,
            upstream: None,
        }
    }

    fn is_prefix(&self) -> bool {
        self.path.ends_with('*')
    }

    fn pattern(&self) -> &str {
        self.path.trim_end_matches('*').trim_end_matches('/')
    }

    pub fn matches(&self, path: &str) -> bool {
        let pattern = self.pattern();
        if pattern.is_empty() {
            return self.is_prefix() || path == "/";
        }

        let path = path.trim_end_matches('/');
        if self.is_prefix() {
            path == pattern || path.starts_with(&format!("{}/", pattern))
        } else {
            path == pattern
        }
    }

    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }
}

/// 기본 라우트 목록
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("/gestao/*", "Gestão API", &["GET", "POST", "PUT", "DELETE"], DEFAULT_POLICY),
        RouteConfig::new("/ingestao/*", "Ingestão API", &["POST"], INGEST_POLICY),
        RouteConfig::new("/telemetria/*", "Telemetria API", &["GET"], READ_POLICY),
        RouteConfig::new("/alertas/*", "Alertas API", &["GET", "POST", "PUT"], DEFAULT_POLICY),
        RouteConfig::new("/dashboard/*", "Dashboard API", &["GET"], READ_POLICY),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// 설정된 순서
    routes: Vec<RouteConfig>,
    /// 매칭 순서 (긴 패턴 우선)
    lookup: Vec<usize>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        let mut lookup: Vec<usize> = (0..routes.len()).collect();
        lookup.sort_by(|&a, &b| {
            let (a, b) = (&routes[a], &routes[b]);
            b.pattern()
                .len()
                .cmp(&a.pattern().len())
                .then_with(|| a.is_prefix().cmp(&b.is_prefix()))
        });
        Self { routes, lookup }
    }

    pub fn routes(&self) -> &[RouteConfig] {
        &self.routes
    }

    /// 경로에 맞는 라우트를 찾습니다. 가장 구체적인 패턴이 우선합니다.
    pub fn find(&self, path: &str) -> Option<&RouteConfig> {
        let found = self
            .lookup
            .iter()
            .map(|&i| &self.routes[i])
            .find(|route| route.matches(path));
        debug!(path = %path, service = ?found.map(|r| r.service.as_str()), "라우트 조회");
        found
    }

    pub fn policy_for(&self, path: &str) -> &str {
        self.find(path)
            .map(|route| route.policy.as_str())
            .unwrap_or(DEFAULT_POLICY)
    }

    pub fn requires_authentication(&self, path: &str) -> bool {
        self.find(path).is_some_and(|route| route.authenticate)
    }

    pub fn any_authenticated(&self) -> bool {
        self.routes.iter().any(|route| route.authenticate)
    }

    pub fn validate(&self) -> Result<(), String> {
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(format!("라우트 경로는 '/'로 시작해야 합니다: {}", route.path));
            }
            if route.service.trim().is_empty() {
                return Err(format!("라우트 {}의 서비스 이름이 비어 있습니다", route.path));
            }
        }
        Ok(())
    }
}
