use super::{MiddlewareError, Next, Request, Response};
use async_trait::async_trait;

/// 미들웨어 트레이트
///
/// 각 미들웨어는 요청을 받아 `next`로 나머지 파이프라인을 감싸 실행하고,
/// 그 결과 응답을 그대로 돌려주거나 가공해서 돌려줍니다.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// 미들웨어의 고유 이름을 반환합니다.
    fn name(&self) -> &str;

    /// HTTP 요청을 처리합니다.
    async fn handle(&self, req: Request, next: Next<'_>) -> Result<Response, MiddlewareError>;
}

/// 파이프라인의 종착점
///
/// 미들웨어 체인이 모두 통과된 요청을 실제로 처리합니다 (헬스 체크, 프록시 엔진 등).
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, req: Request) -> Result<Response, MiddlewareError>;
}
