use serde::{Deserialize, Serialize};

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 허용할 Origin 목록
    #[serde(default = "wildcard")]
    pub allow_origins: Vec<String>,

    /// 허용할 HTTP 메서드 목록
    #[serde(default = "wildcard")]
    pub allow_methods: Vec<String>,

    /// 허용할 헤더 목록
    #[serde(default = "wildcard")]
    pub allow_headers: Vec<String>,

    /// 노출할 헤더 목록
    #[serde(default = "default_expose_headers")]
    pub expose_headers: Vec<String>,

    /// preflight 요청 캐시 시간 (초)
    #[serde(default)]
    pub max_age: Option<u32>,

    /// credentials 허용 여부
    #[serde(default)]
    pub allow_credentials: bool,
}

fn wildcard() -> Vec<String> {
    vec![WILDCARD.to_string()]
}

fn default_expose_headers() -> Vec<String> {
    vec!["X-Correlation-Id".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: wildcard(),
            allow_methods: wildcard(),
            allow_headers: wildcard(),
            expose_headers: default_expose_headers(),
            max_age: None,
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allow_origins.iter().any(|o| o == WILDCARD)
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.allows_any_origin() || self.allow_origins.iter().any(|o| o == origin)
    }

    pub fn allows_any_method(&self) -> bool {
        self.allow_methods.iter().any(|m| m == WILDCARD)
    }

    pub fn allows_any_header(&self) -> bool {
        self.allow_headers.iter().any(|h| h == WILDCARD)
    }
}
