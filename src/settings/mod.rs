use std::{env, fs, path::Path};

use serde::Deserialize;
use tracing::info;

use crate::health::HealthSettings;
use crate::middleware::{CorsConfig, RateLimitConfig, TrustConfig};
use crate::routes::{default_routes, RouteConfig, RouteTable};

mod environment;
mod error;
pub mod logging;
mod server;

pub use environment::Environment;
pub use error::SettingsError;
pub use logging::LogSettings;
pub use server::ServerSettings;

pub type Result<T> = std::result::Result<T, SettingsError>;
pub use server::parse_env_var;

pub const CONFIG_FILE_ENV: &str = "GATEWAY_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // 서버 설정
    #[serde(default)]
    pub server: ServerSettings,

    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    #[serde(default)]
    pub environment: Environment,

    /// 토큰 신뢰 설정
    #[serde(default)]
    pub auth: TrustConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default = "default_routes")]
    pub routes: Vec<RouteConfig>,

    /// 다운스트림 헬스 점검 대상
    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LogSettings::default(),
            environment: Environment::default(),
            auth: TrustConfig::default(),
            rate_limit: RateLimitConfig::default(),
            routes: default_routes(),
            health: HealthSettings::default(),
            cors: CorsConfig::default(),
        }
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect()
    })
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Settings {
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var(CONFIG_FILE_ENV) {
            Self::from_toml_file(&config_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_string_lossy().to_string(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)?;
        settings.validate().await?;

        info!(path = %path.as_ref().display(), "설정 파일 로드 완료");
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let defaults = TrustConfig::default();
        let auth = TrustConfig {
            authority: env_string("GATEWAY_AUTH_AUTHORITY"),
            secret: env_string("GATEWAY_AUTH_SECRET"),
            audience: env_string("GATEWAY_AUTH_AUDIENCE").unwrap_or_default(),
            accepted_issuers: env_list("GATEWAY_AUTH_ISSUERS").unwrap_or_default(),
            clock_skew_secs: parse_env_var("GATEWAY_AUTH_CLOCK_SKEW_SECS", || defaults.clock_skew_secs)?,
            ..defaults
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_env_var("GATEWAY_RATE_LIMIT_ENABLED", || true)?,
            ..RateLimitConfig::default()
        };

        let mut cors = CorsConfig::default();
        if let Some(origins) = env_list("GATEWAY_CORS_ORIGINS").filter(|o| !o.is_empty()) {
            cors.allow_origins = origins;
        }

        let settings = Self {
            server: ServerSettings::from_env()?,
            logging: LogSettings::from_env()?,
            environment: parse_env_var("GATEWAY_ENVIRONMENT", Environment::default)?,
            auth,
            rate_limit,
            routes: default_routes(),
            health: HealthSettings::default(),
            cors,
        };

        // 설정 생성 시점에 바로 검증
        settings.validate().await?;
        Ok(settings)
    }

    /// 설정 유효성 검증
    pub async fn validate(&self) -> Result<()> {
        self.server.validate()?;

        let table = RouteTable::new(self.routes.clone());
        table.validate().map_err(SettingsError::InvalidConfig)?;
        for route in &self.routes {
            if let Some(upstream) = &route.upstream {
                server::validate_upstream(&format!("routes[{}].upstream", route.path), upstream)?;
            }
        }

        // 인증이 필요한 라우트가 있을 때만 토큰 설정을 요구합니다.
        if table.any_authenticated() {
            self.auth.validate().map_err(SettingsError::InvalidConfig)?;
        }

        self.rate_limit.validate().map_err(SettingsError::InvalidConfig)?;
        for route in &self.routes {
            if !self.rate_limit.resolved_policies().contains_key(&route.policy) {
                return Err(SettingsError::InvalidConfig(format!(
                    "라우트 {}가 알 수 없는 정책 {}을 사용합니다",
                    route.path, route.policy
                )));
            }
        }

        self.health.validate().map_err(SettingsError::InvalidConfig)?;
        Ok(())
    }

    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(self.routes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_toml() {
        let toml_content = r#"
            environment = "development"

            [server]
            http_port = 9090

            [logging]
            format = "json"
            level = "info"

            [auth]
            secret = "local-secret"
            audience = "agro-gateway"
            accepted_issuers = ["agro-identity"]

            [rate_limit.policies.ingest]
            algorithm = "token_bucket"
            permit_limit = 50
            tokens_per_period = 10
        "#;

        let settings: Settings = toml::from_str(toml_content).unwrap();
        assert_eq!(settings.server.http_port, 9090);
        assert!(settings.environment.is_development());
        assert_eq!(settings.routes.len(), default_routes().len());
        assert_eq!(settings.rate_limit.policies["ingest"].permit_limit, 50);
    }

    #[tokio::test]
    async fn test_authenticated_routes_need_trust_config() {
        let settings = Settings::default();
        assert!(matches!(settings.validate().await, Err(SettingsError::InvalidConfig(_))));

        let open = Settings {
            routes: default_routes()
                .into_iter()
                .map(|route| RouteConfig {
                    authenticate: false,
                    ..route
                })
                .collect(),
            ..Settings::default()
        };
        assert!(open.validate().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_policy_rejected() {
        let mut settings = Settings {
            auth: TrustConfig {
                secret: Some("s".to_string()),
                audience: "api".to_string(),
                accepted_issuers: vec!["issuer".to_string()],
                ..TrustConfig::default()
            },
            ..Settings::default()
        };
        assert!(settings.validate().await.is_ok());

        settings.routes[0].policy = "burst".to_string();
        assert!(settings.validate().await.is_err());
    }
}
