use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;

use crate::middleware::{ClientAddr, MiddlewareChain, Response};

/// 연결 하나를 받아 요청마다 미들웨어 체인을 실행합니다.
pub struct RequestHandler {
    chain: Arc<MiddlewareChain>,
}

impl RequestHandler {
    pub fn new(chain: MiddlewareChain) -> Self {
        Self {
            chain: Arc::new(chain),
        }
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    pub async fn handle_request(
        &self,
        req: hyper::Request<Incoming>,
        remote: Option<SocketAddr>,
    ) -> Result<Response, Infallible> {
        let mut req = req.map(|body| body.boxed_unsync());
        if let Some(addr) = remote {
            req.extensions_mut().insert(ClientAddr(addr));
        }
        Ok(self.chain.execute(req).await)
    }

    pub async fn handle_connection<I>(&self, io: I, remote: SocketAddr) -> Result<(), hyper::Error>
    where
        I: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
    {
        http1::Builder::new()
            .serve_connection(io, service_fn(|req| self.handle_request(req, Some(remote))))
            .await
    }
}
