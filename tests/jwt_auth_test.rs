mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use common::LogCapture;
use gateway_edge::middleware::jwt_auth::{AuthError, KeySource, SCOPE_CLAIM};
use gateway_edge::middleware::response::{empty_body, text_response};
use gateway_edge::middleware::{
    Endpoint, JwtAuthMiddleware, MiddlewareChain, MiddlewareError, Request, Response, TokenVerifier,
    TrustConfig, VerifiedIdentity,
};
use gateway_edge::routes::{default_routes, RouteTable};
use hyper::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use hyper::StatusCode;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tracing::Level;

const SECRET: &str = "integration-test-secret";
const ISSUER: &str = "http://keycloak:8080/realms/agro";
const LOCAL_ISSUER: &str = "http://localhost:8080/realms/agro";
const AUDIENCE: &str = "agro-gateway";

/// `jwks-shared-secret-for-tests-0123`의 base64url 인코딩
const JWK_SECRET: &[u8] = b"jwks-shared-secret-for-tests-0123";
const JWK_SECRET_B64: &str = "andrcy1zaGFyZWQtc2VjcmV0LWZvci10ZXN0cy0wMTIz";

fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn claims(overrides: Value) -> Value {
    let mut claims = json!({
        "sub": "user-123",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now() + 300,
        "scope": "read write",
    });
    for (key, value) in overrides.as_object().unwrap() {
        claims[key] = value.clone();
    }
    claims
}

fn sign(claims: &Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn trust(issuers: &[&str]) -> TrustConfig {
    TrustConfig {
        secret: Some(SECRET.to_string()),
        audience: AUDIENCE.to_string(),
        accepted_issuers: issuers.iter().map(|s| s.to_string()).collect(),
        ..TrustConfig::default()
    }
}

fn verifier(issuers: &[&str]) -> TokenVerifier {
    TokenVerifier::new(trust(issuers)).unwrap()
}

#[tokio::test]
async fn test_valid_token_yields_identity() {
    let (capture, _guard) = LogCapture::install();

    let identity = verifier(&[ISSUER]).verify(&sign(&claims(json!({})))).await.unwrap();

    assert_eq!(identity.subject, "user-123");
    assert!(identity.has_scope("read"));
    assert!(identity.has_scope("write"));
    assert_eq!(identity.claims_of(SCOPE_CLAIM).count(), 2);

    let logs = capture.matching("Token validated for user");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, Level::INFO);
    assert!(logs[0].message.contains("user-123"));
}

#[tokio::test]
async fn test_token_expired_one_second_ago_is_rejected() {
    let (capture, _guard) = LogCapture::install();
    let token = sign(&claims(json!({ "exp": now() - 1 })));

    let err = verifier(&[ISSUER]).verify(&token).await.unwrap_err();

    assert_eq!(err, AuthError::Authentication("The token has expired".to_string()));
    let failures = capture.matching("JWT authentication failed");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::WARN);
}

#[tokio::test]
async fn test_clock_skew_tolerates_small_drift() {
    let config = TrustConfig {
        clock_skew_secs: 30,
        ..trust(&[ISSUER])
    };
    let token = sign(&claims(json!({ "exp": now() - 5 })));

    assert!(TokenVerifier::new(config).unwrap().verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_secondary_issuer_only_when_configured() {
    let token = sign(&claims(json!({ "iss": LOCAL_ISSUER })));

    assert!(matches!(
        verifier(&[ISSUER]).verify(&token).await,
        Err(AuthError::Authentication(_))
    ));
    assert!(verifier(&[ISSUER, LOCAL_ISSUER]).verify(&token).await.is_ok());
}

#[tokio::test]
async fn test_audience_and_signature_checked() {
    let wrong_audience = sign(&claims(json!({ "aud": "another-api" })));
    assert!(verifier(&[ISSUER]).verify(&wrong_audience).await.is_err());

    let forged = encode(
        &Header::new(Algorithm::HS256),
        &claims(json!({})),
        &EncodingKey::from_secret(b"not-the-secret"),
    )
    .unwrap();
    assert_eq!(
        verifier(&[ISSUER]).verify(&forged).await.unwrap_err(),
        AuthError::Authentication("The token signature is invalid".to_string())
    );

    assert!(verifier(&[ISSUER]).verify("not.a.jwt").await.is_err());
}

#[tokio::test]
async fn test_missing_subject_is_rejected() {
    let mut payload = claims(json!({}));
    payload.as_object_mut().unwrap().remove("sub");

    let err = verifier(&[ISSUER]).verify(&sign(&payload)).await.unwrap_err();
    assert!(matches!(err, AuthError::Authentication(_)));
}

struct StaticJwks {
    fetches: AtomicUsize,
}

#[async_trait]
impl KeySource for StaticJwks {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::from_value(json!({
            "keys": [{ "kty": "oct", "kid": "k1", "alg": "HS256", "k": JWK_SECRET_B64 }]
        }))
        .unwrap())
    }
}

struct Unreachable;

#[async_trait]
impl KeySource for Unreachable {
    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        Err(AuthError::KeyResolution("connection refused".to_string()))
    }
}

fn sign_with_kid(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(JWK_SECRET)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_discovered_keys_are_fetched_once_and_cached() {
    let source = Arc::new(StaticJwks {
        fetches: AtomicUsize::new(0),
    });
    let verifier = TokenVerifier::with_key_source(trust(&[ISSUER]), source.clone());

    let token = sign_with_kid("k1", &claims(json!({})));
    assert!(verifier.verify(&token).await.is_ok());
    assert!(verifier.verify(&token).await.is_ok());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    // 방금 갱신했으므로 모르는 kid라도 다시 조회하지 않습니다.
    let unknown = sign_with_kid("k2", &claims(json!({})));
    assert!(matches!(
        verifier.verify(&unknown).await,
        Err(AuthError::Authentication(_))
    ));
    assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

    // 최소 간격이 지나면 한 번 다시 조회하고, 곧바로 다시 오면 조회하지 않습니다.
    tokio::time::advance(std::time::Duration::from_secs(31)).await;
    assert!(verifier.verify(&unknown).await.is_err());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    assert!(verifier.verify(&unknown).await.is_err());
    assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unreachable_authority_is_key_resolution_error() {
    let (capture, _guard) = LogCapture::install();
    let verifier = TokenVerifier::with_key_source(trust(&[ISSUER]), Arc::new(Unreachable));

    let err = verifier
        .verify(&sign_with_kid("k1", &claims(json!({}))))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::KeyResolution(_)));
    let failures = capture.matching("JWT authentication failed");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);
}

struct SubjectEcho;

#[async_trait]
impl Endpoint for SubjectEcho {
    async fn call(&self, req: Request) -> Result<Response, MiddlewareError> {
        let subject = req
            .extensions()
            .get::<VerifiedIdentity>()
            .map(|identity| identity.subject.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        Ok(text_response(StatusCode::OK, subject))
    }
}

fn chain(verifier: TokenVerifier) -> MiddlewareChain {
    let mut chain = MiddlewareChain::new(Arc::new(SubjectEcho));
    chain.add(JwtAuthMiddleware::new(
        Arc::new(verifier),
        Arc::new(RouteTable::new(default_routes())),
    ));
    chain
}

fn request(path: &str, token: Option<&str>) -> Request {
    let mut builder = hyper::Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(empty_body()).unwrap()
}

async fn body_text(res: Response) -> String {
    use http_body_util::BodyExt;
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_middleware_attaches_identity() {
    let chain = chain(verifier(&[ISSUER]));
    let token = sign(&claims(json!({})));

    let res = chain.execute(request("/gestao/fazendas", Some(&token))).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "user-123");
}

#[tokio::test]
async fn test_middleware_rejects_missing_and_invalid_tokens() {
    let chain = chain(verifier(&[ISSUER]));

    let res = chain.execute(request("/gestao/fazendas", None)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");

    let expired = sign(&claims(json!({ "exp": now() - 1 })));
    let res = chain.execute(request("/gestao/fazendas", Some(&expired))).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let challenge = res.headers().get(WWW_AUTHENTICATE).unwrap().to_str().unwrap();
    assert!(challenge.starts_with("Bearer error=\"invalid_token\""));
}

#[tokio::test]
async fn test_unprotected_paths_skip_verification() {
    let chain = chain(verifier(&[ISSUER]));

    let res = chain.execute(request("/health", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "anonymous");
}

#[tokio::test]
async fn test_key_resolution_failure_fails_closed() {
    let chain = chain(TokenVerifier::with_key_source(trust(&[ISSUER]), Arc::new(Unreachable)));
    let token = sign_with_kid("k1", &claims(json!({})));

    let res = chain.execute(request("/gestao/fazendas", Some(&token))).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
