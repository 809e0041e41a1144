use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unreachable,
}

/// Probe outcome for one downstream service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Combined report over all registered services, keyed by service name.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub services: BTreeMap<String, ServiceHealth>,
}

/// Build the shared HTTP client used for health probes.
pub fn build_health_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build health check client")
}

/// Probe `GET {base}/health` on every registered service concurrently and
/// aggregate the outcomes. Probes are independent: one slow or unreachable
/// service bounds total latency at its own timeout, never the sum, and the
/// aggregation itself never fails.
pub async fn aggregate(
    client: &reqwest::Client,
    services: &BTreeMap<String, String>,
    timeout: Duration,
) -> HealthSummary {
    let probes = services
        .iter()
        .map(|(name, base_url)| probe_one(client, name, base_url, timeout));

    let results = join_all(probes).await;

    HealthSummary {
        services: results.into_iter().collect(),
    }
}

async fn probe_one(
    client: &reqwest::Client,
    name: &str,
    base_url: &str,
    timeout: Duration,
) -> (String, ServiceHealth) {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    let start = Instant::now();

    let health = match client.get(&url).timeout(timeout).send().await {
        Ok(resp) => {
            let elapsed = start.elapsed().as_secs_f64();
            let status = if resp.status().is_success() {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            debug!(
                "health: probe completed, service={}, status={}, elapsed={:.3}s",
                name,
                resp.status(),
                elapsed
            );
            ServiceHealth {
                status,
                url: base_url.to_string(),
                response_time: Some(elapsed),
                error: None,
            }
        }
        Err(e) => {
            debug!("health: probe failed, service={}, error={}", name, e);
            ServiceHealth {
                status: HealthStatus::Unreachable,
                url: base_url.to_string(),
                response_time: None,
                error: Some(e.to_string()),
            }
        }
    };

    metrics::counter!(
        "gateway_health_check_total",
        "service" => name.to_string(),
        "result" => match health.status {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unreachable => "unreachable",
        },
    )
    .increment(1);

    (name.to_string(), health)
}
