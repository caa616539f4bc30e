//! AgroSolutions API 게이트웨이의 요청 처리 파이프라인입니다.
//!
//! # 주요 기능
//!
//! - 상관관계 ID 부여와 요청별 로깅 범위
//! - 요청마다 시작/완료 접근 로그
//! - 처리되지 않은 실패를 표준 500 응답으로 변환
//! - 경로별 정책에 따른 속도 제한 (고정/슬라이딩 윈도우, 토큰 버킷, FIFO 대기열)
//! - 베어러 토큰 검증 (대칭 키 또는 OIDC 메타데이터)
//! - 다운스트림 서비스 헬스 집계
//! - Prometheus 지표 (`/metrics`)
//!
//! # 예제
//!
//! ```no_run
//! use gateway_edge::server::ServerManager;
//! use gateway_edge::settings::Settings;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load().await?;
//! ServerManager::new(settings)?.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod settings;
