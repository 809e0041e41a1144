use crate::breaker::CircuitBreakerRegistry;
use crate::config::ProxyConfig;
use crate::error::GatewayError;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Transient description of one proxied call. Built per inbound request,
/// discarded after the response.
pub struct ProxyRequest<'a> {
    pub service: &'a str,
    pub base_url: &'a str,
    /// Downstream path, starting with '/'.
    pub path: &'a str,
    pub method: Method,
    pub body: Option<serde_json::Value>,
    /// Headers forwarded verbatim to the downstream service.
    pub headers: Vec<(String, String)>,
    /// Per-call override; the client default applies when `None`.
    pub timeout: Option<Duration>,
}

impl<'a> ProxyRequest<'a> {
    pub fn new(service: &'a str, base_url: &'a str, path: &'a str, method: Method) -> Self {
        Self {
            service,
            base_url,
            path,
            method,
            body: None,
            headers: Vec::new(),
            timeout: None,
        }
    }
}

const SUPPORTED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Outbound HTTP caller gated by the circuit breaker.
///
/// Every proxied route goes through here — there is deliberately no
/// ungated proxy path. Per attempted call exactly one of
/// `on_success`/`on_failure` is recorded; a breaker rejection records
/// neither (the breaker state already reflects the failure run).
#[derive(Clone)]
pub struct ProxyClient {
    http: reqwest::Client,
    breakers: Arc<CircuitBreakerRegistry>,
    default_timeout: Duration,
}

impl ProxyClient {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, config: &ProxyConfig) -> Self {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("failed to build proxy http client");
        Self {
            http,
            breakers,
            default_timeout: config.timeout(),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Forward one call to a downstream service and return the parsed JSON
    /// body of a successful response.
    pub async fn call(&self, req: ProxyRequest<'_>) -> Result<serde_json::Value, GatewayError> {
        // Client error, not a downstream failure: no breaker signal.
        if !SUPPORTED_METHODS.contains(&req.method) {
            return Err(GatewayError::MethodNotAllowed(req.method.to_string()));
        }

        if !self.breakers.can_execute(req.service) {
            debug!(
                "proxy: circuit breaker open, rejecting call, service={}, path={}",
                req.service, req.path
            );
            metrics::counter!(
                "gateway_circuit_breaker_rejected_total",
                "service" => req.service.to_string(),
            )
            .increment(1);
            return Err(GatewayError::BreakerOpen(req.service.to_string()));
        }

        let url = format!("{}{}", req.base_url.trim_end_matches('/'), req.path);
        let timeout = req.timeout.unwrap_or(self.default_timeout);

        let mut builder = self
            .http
            .request(req.method.clone(), &url)
            .timeout(timeout);
        for (name, value) in &req.headers {
            builder = builder.header(name, value);
        }
        if let Some(ref body) = req.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.breakers.on_failure(req.service);
                let reason = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "other"
                };
                warn!(
                    "proxy: upstream error, service={}, url={}, reason={}, error={}",
                    req.service, url, reason, e
                );
                metrics::counter!(
                    "gateway_upstream_failures_total",
                    "service" => req.service.to_string(),
                    "reason" => reason,
                )
                .increment(1);
                return Err(classify_transport_error(e, req.service));
            }
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            self.breakers.on_failure(req.service);
            warn!(
                "proxy: downstream error status, service={}, url={}, status={}",
                req.service, url, status
            );
            metrics::counter!(
                "gateway_upstream_failures_total",
                "service" => req.service.to_string(),
                "reason" => "status",
            )
            .increment(1);
            return Err(GatewayError::Downstream {
                service: req.service.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        self.breakers.on_success(req.service);
        response.json().await.map_err(GatewayError::Http)
    }
}

fn classify_transport_error(e: reqwest::Error, service: &str) -> GatewayError {
    if e.is_timeout() {
        GatewayError::UpstreamTimeout(service.to_string())
    } else if e.is_connect() {
        GatewayError::UpstreamConnect {
            service: service.to_string(),
            detail: e.to_string(),
        }
    } else {
        GatewayError::Http(e)
    }
}
