//! CORS 미들웨어
//!
//! 기본 정책은 모든 Origin, 메서드, 헤더를 허용합니다. preflight 요청은
//! 다운스트림으로 넘기지 않고 여기서 응답합니다.

mod config;
mod middleware;

pub use config::CorsConfig;
pub use middleware::CorsMiddleware;
