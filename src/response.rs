use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::Response;
use serde::Serialize;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// 200 response with a serialized JSON body.
pub fn json(value: &impl Serialize) -> Response<BoxBody> {
    json_with_status(StatusCode::OK, value)
}

pub fn json_with_status(status: StatusCode, value: &impl Serialize) -> Response<BoxBody> {
    let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(body))
        .unwrap()
}

/// Error response in the cluster-wide shape: `{"detail": "..."}`.
pub fn error_json(status: StatusCode, detail: &str) -> Response<BoxBody> {
    json_with_status(status, &serde_json::json!({ "detail": detail }))
}
