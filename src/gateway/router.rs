use crate::error::GatewayError;
use http::Method;

/// Where a matched route sends the request.
#[derive(Debug, PartialEq, Eq)]
pub enum RouteTarget {
    /// `GET /` — gateway identity page.
    Root,
    /// `GET /health` — the gateway's own liveness.
    GatewayHealth,
    /// `GET /health/services` — aggregated downstream health.
    ServicesHealth,
    /// Forward to a downstream service through the resilient client.
    Proxy {
        service: &'static str,
        /// Downstream path, query string not included.
        path: String,
    },
}

/// Resolve a request against the fixed route table.
///
/// Resolution order: unsupported method first (405, before any matching),
/// then unknown path (404), then a known path with the wrong method (405).
/// OPTIONS never reaches this function — the handler answers preflights
/// before routing.
pub fn resolve(method: &Method, path: &str) -> Result<RouteTarget, GatewayError> {
    if ![Method::GET, Method::POST, Method::PUT, Method::DELETE].contains(method) {
        return Err(GatewayError::MethodNotAllowed(method.to_string()));
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let target = match (method.as_str(), segments.as_slice()) {
        ("GET", []) => RouteTarget::Root,
        ("GET", ["health"]) => RouteTarget::GatewayHealth,
        ("GET", ["health", "services"]) => RouteTarget::ServicesHealth,

        ("POST", ["api", "users"]) => RouteTarget::Proxy {
            service: "user",
            path: "/users".to_string(),
        },
        ("GET" | "PUT" | "DELETE", ["api", "users", id]) => RouteTarget::Proxy {
            service: "user",
            path: format!("/users/{}", id),
        },

        ("POST", ["api", "auth", op @ ("login" | "logout" | "refresh")]) => RouteTarget::Proxy {
            service: "auth",
            path: format!("/{}", op),
        },

        ("GET", ["api", "data", resource @ ("analytics" | "reports")]) => RouteTarget::Proxy {
            service: "data",
            path: format!("/{}", resource),
        },
        ("GET", ["api", "data", "charts", chart_type]) => RouteTarget::Proxy {
            service: "data",
            path: format!("/charts/{}", chart_type),
        },

        (_, segments) => {
            return if path_is_known(segments) {
                Err(GatewayError::MethodNotAllowed(method.to_string()))
            } else {
                Err(GatewayError::RouteNotFound)
            };
        }
    };

    Ok(target)
}

/// Whether any route exists for this path shape, regardless of method.
/// Distinguishes 405 from 404.
fn path_is_known(segments: &[&str]) -> bool {
    matches!(
        segments,
        []
            | ["health"]
            | ["health", "services"]
            | ["api", "users"]
            | ["api", "users", _]
            | ["api", "auth", "login" | "logout" | "refresh"]
            | ["api", "data", "analytics" | "reports"]
            | ["api", "data", "charts", _]
    )
}
