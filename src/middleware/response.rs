use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{header, StatusCode};
use serde::Serialize;
use tracing::error;

use super::{Body, Response};

/// 빈 요청 본문
pub fn empty_body() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// 고정 요청 본문
pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// 직렬화 가능한 값을 JSON 응답으로 변환합니다.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => build_json(status, bytes),
        Err(e) => {
            error!(error = %e, "JSON 응답 직렬화 실패");
            internal_server_error()
        }
    }
}

/// 들여쓰기된 JSON 응답 (개발 환경용)
pub fn pretty_json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec_pretty(body) {
        Ok(bytes) => build_json(status, bytes),
        Err(e) => {
            error!(error = %e, "JSON 응답 직렬화 실패");
            internal_server_error()
        }
    }
}

pub fn text_response(status: StatusCode, message: impl Into<Bytes>) -> Response {
    hyper::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(message.into()))
        .unwrap_or_else(|_| internal_server_error())
}

/// 응답 생성조차 실패했을 때 사용하는 최후의 응답
pub fn internal_server_error() -> Response {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn build_json(status: StatusCode, bytes: Vec<u8>) -> Response {
    hyper::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|e| {
            error!(error = %e, "에러 응답 생성 실패");
            internal_server_error()
        })
}
