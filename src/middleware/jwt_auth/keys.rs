use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use super::error::AuthError;

/// 알 수 없는 `kid` 때문에 다시 조회할 때의 최소 간격
const MIN_MISS_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// 서명 키 묶음을 가져오는 곳
#[async_trait]
pub trait KeySource: Send + Sync {
    async fn fetch(&self) -> Result<JwkSet, AuthError>;
}

#[derive(Debug, Deserialize)]
struct OpenIdConfiguration {
    jwks_uri: String,
}

/// `{authority}/.well-known/openid-configuration`에서 `jwks_uri`를 찾아 키를 가져옵니다.
#[derive(Debug, Clone)]
pub struct OidcDiscovery {
    client: reqwest::Client,
    metadata_url: String,
}

impl OidcDiscovery {
    pub fn new(authority: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::key_resolution(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            metadata_url: format!(
                "{}/.well-known/openid-configuration",
                authority.trim_end_matches('/')
            ),
        })
    }

    pub fn metadata_url(&self) -> &str {
        &self.metadata_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AuthError::key_resolution(format!("{} 요청 실패: {}", url, e)))?;

        response
            .json::<T>()
            .await
            .map_err(|e| AuthError::key_resolution(format!("{} 응답 파싱 실패: {}", url, e)))
    }
}

#[async_trait]
impl KeySource for OidcDiscovery {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let metadata: OpenIdConfiguration = self.get_json(&self.metadata_url).await?;
        self.get_json::<JwkSet>(&metadata.jwks_uri).await
    }
}

/// 디코딩 키로 변환해 둔 키 묶음
#[derive(Clone, Default)]
pub struct KeySet {
    keys: Vec<(Option<String>, DecodingKey)>,
}

impl KeySet {
    /// 변환할 수 없는 키는 건너뜁니다.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some((jwk.common.key_id.clone(), key)),
                Err(e) => {
                    warn!(kid = ?jwk.common.key_id, error = %e, "사용할 수 없는 서명 키 건너뜀");
                    None
                }
            })
            .collect();
        Self { keys }
    }

    /// `kid`가 없으면 키가 하나뿐일 때만 그 키를 씁니다.
    pub fn find(&self, kid: Option<&str>) -> Option<&DecodingKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|(id, _)| id.as_deref() == Some(kid))
                .map(|(_, key)| key),
            None if self.keys.len() == 1 => self.keys.first().map(|(_, key)| key),
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    failures: u32,
    retry_at: Option<Instant>,
    last_refreshed: Option<Instant>,
}

/// 원격 서명 키 캐시
///
/// 검증 경로는 원자적으로 교체되는 포인터만 읽고 잠그지 않습니다. 갱신은 한 번에
/// 하나씩 일어나며 실패하면 지수적으로 늘어나는 간격이 지나야 다시 시도합니다.
pub struct JwksCache {
    source: Arc<dyn KeySource>,
    keys: ArcSwapOption<KeySet>,
    state: Mutex<RefreshState>,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySource>, backoff_initial: Duration, backoff_max: Duration) -> Self {
        Self {
            source,
            keys: ArcSwapOption::empty(),
            state: Mutex::new(RefreshState::default()),
            backoff_initial,
            backoff_max,
        }
    }

    pub fn current(&self) -> Option<Arc<KeySet>> {
        self.keys.load_full()
    }

    /// `kid`에 맞는 디코딩 키를 찾습니다. 캐시에 없으면 한 번 갱신을 시도합니다.
    pub async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let observed = self.keys.load_full();
        if let Some(key) = observed.as_ref().and_then(|set| set.find(kid)) {
            return Ok(key.clone());
        }

        let refreshed = self.refresh_after_miss(observed).await?;
        refreshed
            .find(kid)
            .cloned()
            .ok_or_else(|| AuthError::authentication("No signing key matches the token"))
    }

    async fn refresh_after_miss(&self, observed: Option<Arc<KeySet>>) -> Result<Arc<KeySet>, AuthError> {
        let mut state = self.state.lock().await;

        if let Some(current) = self.keys.load_full() {
            // 기다리는 동안 다른 요청이 이미 갱신했거나, 방금 갱신했거나, 재시도 대기 중
            let replaced = observed.as_ref().map_or(true, |seen| !Arc::ptr_eq(seen, &current));
            let fresh = state
                .last_refreshed
                .is_some_and(|at| at.elapsed() < MIN_MISS_REFRESH_INTERVAL);
            let backing_off = state.retry_at.is_some_and(|at| Instant::now() < at);
            if replaced || fresh || backing_off {
                return Ok(current);
            }
        }

        self.fetch_locked(&mut state).await
    }

    /// 재시도 대기 중이 아니면 즉시 키를 다시 가져옵니다.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, AuthError> {
        let mut state = self.state.lock().await;
        self.fetch_locked(&mut state).await
    }

    async fn fetch_locked(&self, state: &mut RefreshState) -> Result<Arc<KeySet>, AuthError> {
        if let Some(retry_at) = state.retry_at {
            let now = Instant::now();
            if now < retry_at {
                return Err(AuthError::key_resolution(format!(
                    "재시도 대기 중 ({}초 남음)",
                    retry_at.saturating_duration_since(now).as_secs()
                )));
            }
        }

        match self.source.fetch().await {
            Ok(jwks) => {
                let set = Arc::new(KeySet::from_jwks(&jwks));
                self.keys.store(Some(Arc::clone(&set)));
                state.failures = 0;
                state.retry_at = None;
                state.last_refreshed = Some(Instant::now());
                info!(keys = set.len(), "서명 키 갱신 완료");
                Ok(set)
            }
            Err(e) => {
                state.failures = state.failures.saturating_add(1);
                let delay = self.backoff_delay(state.failures);
                state.retry_at = Some(Instant::now() + delay);
                warn!(
                    error = %e,
                    failures = state.failures,
                    retry_in_secs = delay.as_secs(),
                    "서명 키 조회 실패"
                );
                Err(e)
            }
        }
    }

    fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.backoff_initial
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// 서명 검증 키를 어디서 얻는지
pub enum KeyResolver {
    Static(DecodingKey),
    Discovered(Arc<JwksCache>),
}

impl KeyResolver {
    pub async fn resolve(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        match self {
            KeyResolver::Static(key) => Ok(key.clone()),
            KeyResolver::Discovered(cache) => cache.decoding_key(kid).await,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, KeyResolver::Static(_))
    }
}
