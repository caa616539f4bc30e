use serde::Deserialize;
use std::env;
use super::SettingsError;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    /// HTTP 포트 (기본값: 8080)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// 라우트에 별도 주소가 없을 때 요청을 넘길 기본 업스트림 (예: `http://127.0.0.1:9000`)
    #[serde(default)]
    pub upstream: Option<String>,

    /// 업스트림 응답 대기 시간 (초)
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// `X-Forwarded-For`의 첫 주소를 클라이언트 IP로 신뢰할지 여부
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_http_port() -> u16 { 8080 }
fn default_upstream_timeout_secs() -> u64 { 30 }

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

/// 업스트림 주소가 `http://host[:port]` 형태인지 확인합니다.
pub(crate) fn validate_upstream(var_name: &str, value: &str) -> Result<(), SettingsError> {
    let invalid = |reason: &str| SettingsError::EnvVarInvalid {
        var_name: var_name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let url = url::Url::parse(value).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("업스트림은 http 주소여야 합니다"));
    }
    if url.host_str().is_none() {
        return Err(invalid("업스트림 호스트가 없습니다"));
    }
    Ok(())
}

impl ServerSettings {
    const MIN_PORT: u16 = 1;

    fn parse_port(name: &str, value: &str) -> Result<u16, SettingsError> {
        let port = value.parse::<u16>().map_err(|_| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: value.to_string(),
            reason: format!("포트는 {}-{} 범위여야 합니다", Self::MIN_PORT, u16::MAX),
        })?;

        if port < Self::MIN_PORT {
            return Err(SettingsError::EnvVarInvalid {
                var_name: name.to_string(),
                value: value.to_string(),
                reason: "포트는 0이 될 수 없습니다".to_string(),
            });
        }

        Ok(port)
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        let http_port = Self::parse_port(
            "GATEWAY_HTTP_PORT",
            &env::var("GATEWAY_HTTP_PORT").unwrap_or_else(|_| default_http_port().to_string()),
        )?;

        let settings = Self {
            http_port,
            upstream: env::var("GATEWAY_UPSTREAM").ok().filter(|v| !v.trim().is_empty()),
            upstream_timeout_secs: parse_env_var(
                "GATEWAY_UPSTREAM_TIMEOUT_SECS",
                default_upstream_timeout_secs,
            )?,
            trust_forwarded_for: parse_env_var::<bool, _>("GATEWAY_TRUST_FORWARDED_FOR", || false)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.http_port < Self::MIN_PORT {
            return Err(SettingsError::InvalidConfig("server.http_port는 0이 될 수 없습니다".to_string()));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(SettingsError::InvalidConfig(
                "server.upstream_timeout_secs는 0보다 커야 합니다".to_string(),
            ));
        }
        if let Some(upstream) = &self.upstream {
            validate_upstream("server.upstream", upstream)?;
        }
        Ok(())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            upstream: None,
            upstream_timeout_secs: default_upstream_timeout_secs(),
            trust_forwarded_for: false,
        }
    }
}
