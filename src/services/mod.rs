pub mod auth;
pub mod data;
pub mod user;

use crate::error::GatewayError;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::Request;
use serde::de::DeserializeOwned;
use std::time::SystemTime;

/// Extract a raw query parameter value. No percent-decoding — demo services
/// only see simple identifiers.
pub(crate) fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then_some(v)
    })
}

/// Buffer the request body and parse it as JSON into `T`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    req: Request<Incoming>,
) -> Result<T, GatewayError> {
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))
}

/// Current wall-clock time as an RFC 3339 string with seconds precision.
/// Seconds precision keeps the strings fixed-width so they sort correctly.
pub(crate) fn now_rfc3339() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
