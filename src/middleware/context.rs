use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use hyper::HeaderMap;

use super::Request;

type ResponseHook = Box<dyn FnOnce(&mut HeaderMap) + Send>;

/// 요청 하나에만 속하는 범위 상태
///
/// 체인 진입 시 생성되어 요청 확장(extensions)에 `Arc`로 들어갑니다.
/// 상관관계 ID는 한 번만 기록되며, 응답 시작 훅은 응답 헤더가 확정되는
/// 시점에 정확히 한 번 실행됩니다.
pub struct RequestScope {
    correlation_id: OnceLock<String>,
    response_hooks: Mutex<Vec<ResponseHook>>,
}

impl RequestScope {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            correlation_id: OnceLock::new(),
            response_hooks: Mutex::new(Vec::new()),
        })
    }

    pub fn from_request(req: &Request) -> Option<Arc<Self>> {
        req.extensions().get::<Arc<Self>>().cloned()
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.get().map(String::as_str)
    }

    /// 상관관계 ID를 기록합니다. 이미 기록되어 있으면 `false`를 반환하고 기존 값을 유지합니다.
    pub fn set_correlation_id(&self, id: String) -> bool {
        self.correlation_id.set(id).is_ok()
    }

    /// 응답 헤더가 확정될 때 실행할 훅을 등록합니다.
    pub fn on_response_start<F>(&self, hook: F)
    where
        F: FnOnce(&mut HeaderMap) + Send + 'static,
    {
        self.hooks().push(Box::new(hook));
    }

    pub(crate) fn finalize(&self, headers: &mut HeaderMap) {
        let hooks = std::mem::take(&mut *self.hooks());
        for hook in hooks {
            hook(headers);
        }
    }

    fn hooks(&self) -> MutexGuard<'_, Vec<ResponseHook>> {
        self.response_hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("correlation_id", &self.correlation_id.get())
            .field("response_hooks", &self.hooks().len())
            .finish()
    }
}

/// 연결의 원격 주소
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

impl ClientAddr {
    pub fn from_request(req: &Request) -> Option<Self> {
        req.extensions().get::<Self>().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_is_set_once() {
        let scope = RequestScope::new();
        assert!(scope.correlation_id().is_none());
        assert!(scope.set_correlation_id("first".to_string()));
        assert!(!scope.set_correlation_id("second".to_string()));
        assert_eq!(scope.correlation_id(), Some("first"));
    }

    #[test]
    fn test_finalize_drains_hooks() {
        let scope = RequestScope::new();
        scope.on_response_start(|headers| {
            headers.insert("x-test", "1".parse().unwrap());
        });

        let mut headers = HeaderMap::new();
        scope.finalize(&mut headers);
        assert_eq!(headers.get("x-test").unwrap(), "1");

        headers.clear();
        scope.finalize(&mut headers);
        assert!(headers.is_empty());
    }
}
