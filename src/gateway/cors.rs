use crate::config::CorsConfig;
use crate::response::{empty_body, BoxBody};
use http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use http::StatusCode;
use hyper::Response;

/// Stamp CORS headers onto an outgoing response. Applied to every gateway
/// response, including errors.
pub fn apply(headers: &mut HeaderMap, cors: &CorsConfig) {
    if let Ok(v) = HeaderValue::from_str(&cors.allow_origins.join(", ")) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, v);
    }
    if cors.allow_credentials {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

/// Answer an OPTIONS preflight without touching the route table.
pub fn preflight(cors: &CorsConfig) -> Response<BoxBody> {
    let mut resp = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(empty_body())
        .unwrap();

    let headers = resp.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&cors.allow_methods.join(", ")) {
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, v);
    }
    if let Ok(v) = HeaderValue::from_str(&cors.allow_headers.join(", ")) {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, v);
    }
    headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));

    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_origin_and_credentials() {
        let cors = CorsConfig::default();
        let mut headers = HeaderMap::new();
        apply(&mut headers, &cors);

        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[test]
    fn preflight_advertises_methods_and_headers() {
        let resp = preflight(&CorsConfig::default());
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().contains_key(ACCESS_CONTROL_ALLOW_METHODS));
        assert!(resp.headers().contains_key(ACCESS_CONTROL_ALLOW_HEADERS));
    }

    #[test]
    fn credentials_header_omitted_when_disabled() {
        let cors = CorsConfig {
            allow_credentials: false,
            ..CorsConfig::default()
        };
        let mut headers = HeaderMap::new();
        apply(&mut headers, &cors);
        assert!(!headers.contains_key(ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }
}
