use std::sync::Arc;
use tracing::{debug, error};

use super::response::internal_server_error;
use super::{Endpoint, Middleware, MiddlewareError, Request, RequestScope, Response};

/// 순서가 정해진 미들웨어 체인
///
/// 먼저 추가된 미들웨어가 바깥쪽에 위치하며, 나중에 추가된 미들웨어와
/// 종착점(`Endpoint`)을 감싸서 실행합니다.
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

impl MiddlewareChain {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            middlewares: Vec::new(),
            endpoint,
        }
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// 실행 순서대로 미들웨어 이름을 반환합니다.
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// 요청 하나를 전체 파이프라인에 통과시킵니다.
    ///
    /// 요청 범위(`RequestScope`)를 만들어 확장에 넣고, 응답이 확정되면
    /// 등록된 응답 시작 훅을 정확히 한 번 실행합니다.
    pub async fn execute(&self, mut req: Request) -> Response {
        let scope = RequestScope::new();
        req.extensions_mut().insert(Arc::clone(&scope));

        let next = Next {
            middlewares: &self.middlewares,
            endpoint: self.endpoint.as_ref(),
        };

        let mut response = match next.run(req).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "파이프라인 밖으로 전파된 오류");
                internal_server_error()
            }
        };

        scope.finalize(response.headers_mut());
        debug!(status = %response.status(), "응답 헤더 확정");
        response
    }
}

/// 체인의 남은 부분
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(middlewares: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { middlewares, endpoint }
    }

    /// 다음 미들웨어 (없으면 종착점)를 실행합니다.
    pub async fn run(self, req: Request) -> Result<Response, MiddlewareError> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    endpoint: self.endpoint,
                };
                current.handle(req, next).await
            }
            None => self.endpoint.call(req).await,
        }
    }
}
