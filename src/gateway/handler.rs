use crate::error::GatewayError;
use crate::gateway::context::RequestContext;
use crate::gateway::cors;
use crate::gateway::router::{self, RouteTarget};
use crate::health;
use crate::proxy::ProxyRequest;
use crate::response::{self, BoxBody};
use crate::server::GatewayState;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::Method;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::net::SocketAddr;
use tracing::warn;

/// Handle an inbound gateway request end to end:
///
/// 1. identify the client and assign/propagate `x-request-id`
/// 2. answer OPTIONS preflights from the CORS layer
/// 3. resolve the route table (405/404 decided here, before any network)
/// 4. serve local routes or forward through the resilient proxy client
/// 5. stamp CORS headers + request id on every response, errors included
pub async fn handle_request(
    req: Request<Incoming>,
    state: GatewayState,
    peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let uri_path = req.uri().path().to_string();

    // Trust the left-most X-Forwarded-For entry when present, otherwise the
    // TCP peer.
    let client_ip = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok())
        .unwrap_or_else(|| peer_addr.ip());

    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut ctx = RequestContext::new(
        method.as_str().to_string(),
        uri_path,
        client_ip,
        request_id.clone(),
    );

    let mut response = match dispatch(req, &mut ctx, &state).await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            ctx.finalize_metrics(status);
            tracing::info!(
                client_ip = %ctx.client_ip,
                method = %ctx.method,
                path = %ctx.uri_path,
                status = status,
                service = %ctx.service,
                request_id = %ctx.request_id,
                latency_ms = %ctx.start.elapsed().as_millis(),
                "access"
            );
            resp
        }
        Err(e) => {
            warn!(
                "gateway: request failed, method={}, path={}, request_id={}, error={}",
                ctx.method, ctx.uri_path, ctx.request_id, e
            );
            ctx.error_response(&e)
        }
    };

    cors::apply(response.headers_mut(), &state.settings.cors);
    if let Ok(v) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), v);
    }

    Ok(response)
}

async fn dispatch(
    req: Request<Incoming>,
    ctx: &mut RequestContext,
    state: &GatewayState,
) -> Result<Response<BoxBody>, GatewayError> {
    let method = req.method().clone();

    if method == Method::OPTIONS {
        return Ok(cors::preflight(&state.settings.cors));
    }

    match router::resolve(&method, req.uri().path())? {
        RouteTarget::Root => Ok(response::json(&serde_json::json!({
            "message": "API Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "services": state.settings.services.keys().collect::<Vec<_>>(),
        }))),

        RouteTarget::GatewayHealth => Ok(response::json(&serde_json::json!({
            "status": "healthy",
            "service": "api-gateway",
        }))),

        RouteTarget::ServicesHealth => {
            let summary = health::aggregate(
                &state.health_client,
                &state.settings.services,
                state.settings.proxy.health_timeout(),
            )
            .await;
            Ok(response::json(&serde_json::json!({
                "gateway": "healthy",
                "services": summary.services,
            })))
        }

        RouteTarget::Proxy { service, path } => {
            ctx.service = service.to_string();

            let base_url = state
                .settings
                .service_url(service)
                .ok_or_else(|| GatewayError::ServiceNotFound(service.to_string()))?
                .to_string();

            let mut downstream_path = path;
            if let Some(q) = req.uri().query() {
                downstream_path.push('?');
                downstream_path.push_str(q);
            }

            let mut headers = vec![("x-request-id".to_string(), ctx.request_id.clone())];
            if let Some(auth) = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
            {
                headers.push(("authorization".to_string(), auth.to_string()));
            }

            let body = read_json_body(req, &method).await?;

            let mut proxy_req = ProxyRequest::new(service, &base_url, &downstream_path, method);
            proxy_req.body = body;
            proxy_req.headers = headers;

            let value = state.proxy.call(proxy_req).await?;
            Ok(response::json(&value))
        }
    }
}

/// Buffer and parse the request body for methods that carry one. An empty
/// body is forwarded as no body; a non-empty body must be valid JSON.
async fn read_json_body(
    req: Request<Incoming>,
    method: &Method,
) -> Result<Option<serde_json::Value>, GatewayError> {
    if *method != Method::POST && *method != Method::PUT {
        return Ok(None);
    }

    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("failed to read body: {}", e)))?
        .to_bytes();

    if bytes.is_empty() {
        return Ok(None);
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {}", e)))
}
