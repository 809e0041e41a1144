use crate::error::GatewayError;
use crate::response::{error_json, json, BoxBody};
use http::Method;
use hyper::body::Incoming;
use hyper::{Request, Response};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsRecord {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    report_type: String,
    #[serde(default)]
    date_range: BTreeMap<String, String>,
    #[serde(default)]
    filters: Option<serde_json::Value>,
}

const CATEGORIES: [(&str, [&str; 3]); 4] = [
    (
        "user_activity",
        ["page_views", "user_logins", "session_duration"],
    ),
    (
        "system_performance",
        ["cpu_usage", "memory_usage", "disk_usage"],
    ),
    (
        "business_metrics",
        ["revenue", "conversion_rate", "customer_satisfaction"],
    ),
    (
        "security",
        ["failed_logins", "security_alerts", "blocked_requests"],
    ),
];

/// Randomized analytics records across all categories, newest first.
fn generate_analytics() -> Vec<AnalyticsRecord> {
    let mut rng = rand::thread_rng();
    let now = SystemTime::now();

    let mut records = Vec::new();
    for (category, metrics) in CATEGORIES {
        for metric in metrics {
            let age = Duration::from_secs(rng.gen_range(0u64..24) * 3600);
            records.push(AnalyticsRecord {
                metric_name: metric.to_string(),
                value: round2(rng.gen_range(10.0..100.0)),
                timestamp: humantime::format_rfc3339_seconds(now - age).to_string(),
                category: category.to_string(),
            });
        }
    }

    // RFC 3339 with fixed precision sorts lexicographically.
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
}

fn generate_dashboard_metrics() -> serde_json::Value {
    let mut rng = rand::thread_rng();
    serde_json::json!({
        "total_users": rng.gen_range(1000..=5000),
        "active_sessions": rng.gen_range(50..=200),
        "daily_transactions": rng.gen_range(500..=2000),
        "system_uptime": round2(rng.gen_range(95.0..99.9)),
        "response_time_avg": round3(rng.gen_range(0.1..2.0)),
    })
}

fn generate_chart(chart_type: &str) -> serde_json::Value {
    let mut rng = rand::thread_rng();
    match chart_type {
        "line" => serde_json::json!({
            "labels": (1..=7).map(|i| format!("Day {}", i)).collect::<Vec<_>>(),
            "datasets": [{
                "label": "User Activity",
                "data": (0..7).map(|_| rng.gen_range(100..=500)).collect::<Vec<i64>>(),
                "borderColor": "rgb(75, 192, 192)",
                "tension": 0.1,
            }],
        }),
        "bar" => serde_json::json!({
            "labels": ["Jan", "Feb", "Mar", "Apr", "May", "Jun"],
            "datasets": [{
                "label": "Monthly Revenue",
                "data": (0..6).map(|_| rng.gen_range(1000..=5000)).collect::<Vec<i64>>(),
                "backgroundColor": "rgba(54, 162, 235, 0.5)",
            }],
        }),
        "pie" => serde_json::json!({
            "labels": ["Desktop", "Mobile", "Tablet"],
            "datasets": [{
                "data": [
                    rng.gen_range(20..=60),
                    rng.gen_range(20..=60),
                    rng.gen_range(10..=30),
                ],
                "backgroundColor": [
                    "rgba(255, 99, 132, 0.5)",
                    "rgba(54, 162, 235, 0.5)",
                    "rgba(255, 205, 86, 0.5)",
                ],
            }],
        }),
        _ => serde_json::json!({ "error": "Unsupported chart type" }),
    }
}

fn generate_report_data(report_type: &str) -> serde_json::Value {
    let mut rng = rand::thread_rng();
    let now = SystemTime::now();
    match report_type {
        "user_activity" => serde_json::json!({
            "summary": {
                "total_users": rng.gen_range(1000..=5000),
                "active_users": rng.gen_range(500..=2500),
                "new_users": rng.gen_range(50..=200),
            },
            "daily_breakdown": (0u64..7).map(|i| {
                let day = now - Duration::from_secs(i * 24 * 3600);
                serde_json::json!({
                    "date": humantime::format_rfc3339_seconds(day).to_string(),
                    "logins": rng.gen_range(100..=500),
                    "page_views": rng.gen_range(1000..=5000),
                })
            }).collect::<Vec<_>>(),
        }),
        "system_performance" => serde_json::json!({
            "summary": {
                "avg_response_time": round3(rng.gen_range(0.1..2.0)),
                "uptime_percentage": round2(rng.gen_range(95.0..99.9)),
                "error_rate": round2(rng.gen_range(0.1..5.0)),
            },
            "hourly_stats": (0..24).map(|hour| serde_json::json!({
                "hour": hour,
                "cpu_usage": round2(rng.gen_range(20.0..80.0)),
                "memory_usage": round2(rng.gen_range(30.0..90.0)),
                "requests": rng.gen_range(100..=1000),
            })).collect::<Vec<_>>(),
        }),
        other => serde_json::json!({
            "message": format!("Report type '{}' not implemented yet", other),
            "available_types": ["user_activity", "system_performance"],
        }),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

pub async fn handle(
    req: Request<Incoming>,
    _state: (),
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let resp = match route(req, &method, &path, query.as_deref()).await {
        Ok(r) => r,
        Err(e) => error_json(e.status_code(), &e.to_string()),
    };
    Ok(resp)
}

async fn route(
    req: Request<Incoming>,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Result<Response<BoxBody>, GatewayError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", []) => Ok(json(&serde_json::json!({
            "message": "DQA Data Service",
            "version": env!("CARGO_PKG_VERSION"),
        }))),

        ("GET", ["health"]) => Ok(json(&serde_json::json!({
            "status": "healthy",
            "service": "data-service",
        }))),

        ("GET", ["analytics"]) => {
            let category = super::query_param(query, "category");
            let limit = super::query_param(query, "limit")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(50);

            let mut records = generate_analytics();
            if let Some(category) = category {
                records.retain(|r| r.category == category);
            }
            records.truncate(limit);

            info!("data: analytics served, records={}", records.len());
            Ok(json(&records))
        }

        ("GET", ["metrics"]) => Ok(json(&generate_dashboard_metrics())),

        ("GET", ["charts", chart_type]) => {
            if !["line", "bar", "pie"].contains(chart_type) {
                return Err(GatewayError::BadRequest(format!(
                    "Chart type '{}' not supported. Use: line, bar, pie",
                    chart_type
                )));
            }
            info!("data: chart generated, chart_type={}", chart_type);
            Ok(json(&generate_chart(chart_type)))
        }

        ("POST", ["reports"]) => {
            let body: ReportRequest = super::read_json(req).await?;
            let report_id = format!(
                "report_{}_{}",
                super::unix_now(),
                rand::thread_rng().gen_range(1000..10000)
            );
            let data = generate_report_data(&body.report_type);
            info!("data: report generated, report_id={}", report_id);
            Ok(json(&serde_json::json!({
                "report_id": report_id,
                "report_type": body.report_type,
                "generated_at": super::now_rfc3339(),
                "date_range": body.date_range,
                "filters": body.filters,
                "data": data,
            })))
        }

        ("GET", ["reports"]) => Ok(json(&serde_json::json!({
            "available_reports": [
                {
                    "type": "user_activity",
                    "description": "User engagement and activity metrics",
                    "parameters": ["date_range"],
                },
                {
                    "type": "system_performance",
                    "description": "System performance and uptime metrics",
                    "parameters": ["date_range"],
                },
                {
                    "type": "business_metrics",
                    "description": "Business KPIs and revenue metrics",
                    "parameters": ["date_range", "filters"],
                },
            ],
        }))),

        ("GET", ["export", format]) => {
            if !["json", "csv"].contains(format) {
                return Err(GatewayError::BadRequest(format!(
                    "Format '{}' not supported. Use: json, csv",
                    format
                )));
            }

            let payload = match super::query_param(query, "data_type") {
                Some("analytics") => serde_json::to_value(generate_analytics())
                    .map_err(|e| GatewayError::Internal(e.to_string()))?,
                Some("metrics") => generate_dashboard_metrics(),
                Some(other) => {
                    return Err(GatewayError::BadRequest(format!(
                        "Data type '{}' not supported",
                        other
                    )))
                }
                None => {
                    return Err(GatewayError::BadRequest(
                        "Missing required query parameter 'data_type'".to_string(),
                    ))
                }
            };

            if *format == "json" {
                Ok(json(&serde_json::json!({ "format": "json", "data": payload })))
            } else {
                Ok(json(&serde_json::json!({
                    "format": "csv",
                    "message": "CSV export would be implemented here",
                    "data": payload,
                })))
            }
        }

        ("GET", ["realtime", "metrics"]) => {
            let mut rng = rand::thread_rng();
            Ok(json(&serde_json::json!({
                "timestamp": super::now_rfc3339(),
                "metrics": {
                    "active_connections": rng.gen_range(10..=100),
                    "requests_per_second": rng.gen_range(50..=500),
                    "cpu_usage": round2(rng.gen_range(20.0..80.0)),
                    "memory_usage": round2(rng.gen_range(30.0..90.0)),
                    "disk_io": round2(rng.gen_range(10.0..100.0)),
                },
            })))
        }

        (_, segments) if data_path_is_known(segments) => {
            Err(GatewayError::MethodNotAllowed(method.to_string()))
        }
        _ => Err(GatewayError::RouteNotFound),
    }
}

fn data_path_is_known(segments: &[&str]) -> bool {
    matches!(
        segments,
        [] | ["health"]
            | ["analytics"]
            | ["metrics"]
            | ["charts", _]
            | ["reports"]
            | ["export", _]
            | ["realtime", "metrics"]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analytics_covers_all_categories_and_sorts_newest_first() {
        let records = generate_analytics();
        assert_eq!(records.len(), 12);

        for (category, _) in CATEGORIES {
            assert!(records.iter().any(|r| r.category == category));
        }

        for pair in records.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
    }

    #[test]
    fn analytics_values_stay_in_range() {
        for record in generate_analytics() {
            assert!(record.value >= 10.0 && record.value <= 100.0);
        }
    }

    #[test]
    fn chart_shapes_per_type() {
        let line = generate_chart("line");
        assert_eq!(line["labels"].as_array().unwrap().len(), 7);

        let bar = generate_chart("bar");
        assert_eq!(bar["labels"].as_array().unwrap().len(), 6);

        let pie = generate_chart("pie");
        assert_eq!(pie["datasets"][0]["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn report_data_shapes() {
        let ua = generate_report_data("user_activity");
        assert_eq!(ua["daily_breakdown"].as_array().unwrap().len(), 7);

        let sp = generate_report_data("system_performance");
        assert_eq!(sp["hourly_stats"].as_array().unwrap().len(), 24);

        let other = generate_report_data("unknown");
        assert!(other["message"]
            .as_str()
            .unwrap()
            .contains("not implemented"));
    }

    #[test]
    fn dashboard_metrics_fields_present() {
        let metrics = generate_dashboard_metrics();
        for key in [
            "total_users",
            "active_sessions",
            "daily_transactions",
            "system_uptime",
            "response_time_avg",
        ] {
            assert!(metrics.get(key).is_some(), "missing key {}", key);
        }
    }
}
