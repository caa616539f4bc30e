use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::config::TrustConfig;
use super::error::AuthError;
use super::identity::VerifiedIdentity;
use super::keys::{JwksCache, KeyResolver, KeySource, OidcDiscovery};

const REQUIRED_CLAIMS: [&str; 4] = ["exp", "iss", "aud", "sub"];
const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// 베어러 토큰 검증기
///
/// 서명, 발급자, 대상, 만료를 검증한 뒤 스코프를 정규화한 `VerifiedIdentity`를
/// 돌려줍니다. 시도마다 정확히 한 줄의 로그를 남깁니다.
pub struct TokenVerifier {
    config: TrustConfig,
    issuers: Vec<String>,
    keys: KeyResolver,
}

impl TokenVerifier {
    /// 설정에 `secret`이 있으면 대칭 키, 아니면 `authority`의 OIDC 메타데이터를 씁니다.
    pub fn new(config: TrustConfig) -> Result<Self, AuthError> {
        if let Some(secret) = config.secret.as_deref().filter(|s| !s.is_empty()) {
            let key = DecodingKey::from_secret(secret.as_bytes());
            return Ok(Self::with_resolver(config, KeyResolver::Static(key)));
        }

        let authority = config
            .authority
            .clone()
            .ok_or_else(|| AuthError::key_resolution("authority가 설정되지 않았습니다"))?;
        let discovery = OidcDiscovery::new(&authority, config.metadata_timeout())?;
        info!(metadata = %discovery.metadata_url(), "OIDC 메타데이터로 서명 키를 조회합니다");
        Ok(Self::with_key_source(config, Arc::new(discovery)))
    }

    pub fn with_key_source(config: TrustConfig, source: Arc<dyn KeySource>) -> Self {
        let cache = JwksCache::new(source, config.backoff_initial(), config.backoff_max());
        Self::with_resolver(config, KeyResolver::Discovered(Arc::new(cache)))
    }

    fn with_resolver(config: TrustConfig, keys: KeyResolver) -> Self {
        let issuers = config.issuers();
        Self { config, issuers, keys }
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// 토큰을 검증합니다.
    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let result = self.verify_token(token).await;
        match &result {
            Ok(identity) => info!(
                subject = %identity.subject,
                scopes = %identity.scope_list(),
                "Token validated for user {} with scopes: {}",
                identity.subject,
                identity.scope_list()
            ),
            Err(AuthError::Authentication(reason)) => warn!(
                reason = %reason,
                "JWT authentication failed: {}",
                reason
            ),
            Err(e @ AuthError::KeyResolution(_)) => error!(
                error = %e,
                "JWT authentication failed: {}",
                e
            ),
        }
        result
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| map_jwt_error(e.kind()))?;
        self.check_algorithm(header.alg)?;

        let key = self.keys.resolve(header.kid.as_deref()).await?;
        let data = decode::<Map<String, Value>>(token, &key, &self.validation(header.alg))
            .map_err(|e| map_jwt_error(e.kind()))?;

        let mut identity = VerifiedIdentity::from_claims(&data.claims)?;
        identity.normalize_scopes();
        Ok(identity)
    }

    /// 대칭 키에는 HMAC 알고리즘만 허용합니다. 원격 키는 키 종류와 알고리즘이
    /// 맞는지 디코딩 단계에서 확인됩니다.
    fn check_algorithm(&self, alg: Algorithm) -> Result<(), AuthError> {
        if self.keys.is_static() && !HMAC_ALGORITHMS.contains(&alg) {
            return Err(AuthError::authentication("The token signing algorithm is not accepted"));
        }
        Ok(())
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.config.clock_skew_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&self.issuers);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_required_spec_claims(&REQUIRED_CLAIMS[..]);
        validation
    }

    /// 원격 키를 주기적으로 갱신하는 작업을 띄웁니다. 대칭 키면 `None`.
    pub fn spawn_key_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let KeyResolver::Discovered(cache) = &self.keys else {
            return None;
        };
        let cache = Arc::clone(cache);
        let period = self.config.metadata_refresh();

        Some(tokio::spawn(async move {
            // 첫 갱신은 바로 수행해서 첫 요청이 기다리지 않게 합니다.
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                // 실패는 fetch 단계에서 이미 기록됩니다.
                let _ = cache.refresh().await;
            }
        }))
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    let reason = match kind {
        ErrorKind::ExpiredSignature => "The token has expired",
        ErrorKind::ImmatureSignature => "The token is not yet valid",
        ErrorKind::InvalidIssuer => "The token issuer is not accepted",
        ErrorKind::InvalidAudience => "The token audience is invalid",
        ErrorKind::InvalidSignature => "The token signature is invalid",
        ErrorKind::InvalidSubject => "The token subject is invalid",
        ErrorKind::MissingRequiredClaim(claim) => {
            return AuthError::authentication(format!("The token is missing the '{}' claim", claim))
        }
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm | ErrorKind::InvalidAlgorithmName => {
            "The token signing algorithm is not accepted"
        }
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) => {
            "The token could not be verified"
        }
        _ => "The token is malformed",
    };
    AuthError::authentication(reason)
}
