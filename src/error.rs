use http::StatusCode;
use std::fmt;

#[derive(Debug)]
pub enum GatewayError {
    /// No gateway route matches the request path.
    RouteNotFound,
    /// Target service name is not in the endpoint registry.
    ServiceNotFound(String),
    /// HTTP method not supported for the matched route.
    MethodNotAllowed(String),
    /// Malformed request from the client (bad JSON body, bad parameter).
    BadRequest(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Circuit breaker rejected the call before any network attempt.
    BreakerOpen(String),
    /// Downstream answered with a 4xx/5xx status.
    Downstream {
        service: String,
        status: u16,
        body: String,
    },
    /// Connection to the downstream service could not be established.
    UpstreamConnect { service: String, detail: String },
    /// Downstream did not answer within the call timeout.
    UpstreamTimeout(String),
    Http(reqwest::Error),
    Internal(String),
}

impl GatewayError {
    /// HTTP status surfaced to the caller for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::BreakerOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Downstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::UpstreamConnect { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Http(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::RouteNotFound => write!(f, "Not Found"),
            GatewayError::ServiceNotFound(name) => write!(f, "Service '{}' not found", name),
            GatewayError::MethodNotAllowed(method) => {
                write!(f, "Method {} not allowed", method)
            }
            GatewayError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            GatewayError::Unauthorized(msg) => write!(f, "{}", msg),
            GatewayError::BreakerOpen(service) => write!(
                f,
                "Service {} is temporarily unavailable (circuit breaker open)",
                service
            ),
            GatewayError::Downstream { service, body, .. } => {
                write!(f, "Service error from {}: {}", service, body)
            }
            GatewayError::UpstreamConnect { service, .. } => {
                write!(f, "Cannot connect to {} service", service)
            }
            GatewayError::UpstreamTimeout(service) => {
                write!(f, "Timeout calling {} service", service)
            }
            GatewayError::Http(e) => write!(f, "http error: {}", e),
            GatewayError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_service_not_found() {
        assert_eq!(
            GatewayError::ServiceNotFound("billing".to_string()).to_string(),
            "Service 'billing' not found"
        );
    }

    #[test]
    fn display_method_not_allowed() {
        assert_eq!(
            GatewayError::MethodNotAllowed("PATCH".to_string()).to_string(),
            "Method PATCH not allowed"
        );
    }

    #[test]
    fn display_breaker_open() {
        assert_eq!(
            GatewayError::BreakerOpen("user".to_string()).to_string(),
            "Service user is temporarily unavailable (circuit breaker open)"
        );
    }

    #[test]
    fn display_upstream_connect() {
        let err = GatewayError::UpstreamConnect {
            service: "data".to_string(),
            detail: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot connect to data service");
    }

    #[test]
    fn display_upstream_timeout() {
        assert_eq!(
            GatewayError::UpstreamTimeout("auth".to_string()).to_string(),
            "Timeout calling auth service"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            GatewayError::RouteNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::ServiceNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::MethodNotAllowed("PATCH".into()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            GatewayError::BadRequest("bad json".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Unauthorized("Could not validate credentials".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::BreakerOpen("user".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamConnect {
                service: "user".into(),
                detail: String::new()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamTimeout("user".into()).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::Internal("oops".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn downstream_status_passthrough() {
        let err = GatewayError::Downstream {
            service: "user".into(),
            status: 422,
            body: "invalid".into(),
        };
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        // Out-of-range status falls back to 502.
        let err = GatewayError::Downstream {
            service: "user".into(),
            status: 99,
            body: String::new(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
