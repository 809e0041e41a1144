use crate::error::GatewayError;
use crate::response::{error_json, BoxBody};
use std::net::IpAddr;
use std::time::Instant;

/// Per-request bookkeeping for metrics and the access log.
pub struct RequestContext {
    pub method: String,
    pub uri_path: String,
    /// Downstream service the request resolved to, empty for local routes.
    pub service: String,
    pub client_ip: IpAddr,
    pub request_id: String,
    pub start: Instant,
}

impl RequestContext {
    pub fn new(method: String, uri_path: String, client_ip: IpAddr, request_id: String) -> Self {
        metrics::gauge!("gateway_http_requests_in_flight").increment(1.0);
        Self {
            method,
            uri_path,
            service: String::new(),
            client_ip,
            request_id,
            start: Instant::now(),
        }
    }

    /// Convert an error into its JSON response and record final metrics.
    pub fn error_response(&self, err: &GatewayError) -> hyper::Response<BoxBody> {
        let status = err.status_code();
        self.finalize_metrics(status.as_u16());
        error_json(status, &err.to_string())
    }

    pub fn finalize_metrics(&self, resp_status: u16) {
        let mut buf = itoa::Buffer::new();
        let status_str = buf.format(resp_status);

        metrics::counter!(
            "gateway_http_requests_total",
            "method" => self.method.clone(),
            "service" => self.service.clone(),
            "status_code" => status_str.to_owned(),
        )
        .increment(1);

        metrics::histogram!(
            "gateway_http_request_duration_seconds",
            "method" => self.method.clone(),
            "service" => self.service.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());

        metrics::gauge!("gateway_http_requests_in_flight").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::net::Ipv4Addr;

    fn ctx() -> RequestContext {
        RequestContext::new(
            "GET".to_string(),
            "/api/users/1".to_string(),
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            "req-1".to_string(),
        )
    }

    #[test]
    fn error_response_maps_status_and_body() {
        let resp = ctx().error_response(&GatewayError::ServiceNotFound("billing".to_string()));
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn error_response_various_status() {
        let ctx = ctx();
        let cases = [
            (
                GatewayError::BadRequest("bad json".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::MethodNotAllowed("PATCH".into()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (
                GatewayError::BreakerOpen("user".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GatewayError::UpstreamTimeout("data".into()),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ctx.error_response(&err).status(), status);
        }
    }

    #[test]
    fn finalize_metrics_smoke() {
        let mut c = ctx();
        c.service = "user".to_string();
        c.finalize_metrics(200);
        c.finalize_metrics(503);
    }
}
