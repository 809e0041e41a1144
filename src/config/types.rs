use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level settings for all binaries in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logical service name → base URL. Read-only at runtime.
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, String>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub jwt: JwtConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            services: default_services(),
            circuit_breaker: CircuitBreakerConfig::default(),
            proxy: ProxyConfig::default(),
            jwt: JwtConfig::default(),
            cors: CorsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_services() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("user".to_string(), "http://localhost:8001".to_string()),
        ("auth".to_string(), "http://localhost:8002".to_string()),
        ("data".to_string(), "http://localhost:8003".to_string()),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker trips to Open.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long an Open breaker rejects calls before allowing a probe.
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Per-call timeout for proxied requests.
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,

    /// Per-probe timeout for the health aggregator.
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout(),
            health_timeout_secs: default_health_timeout(),
        }
    }
}

fn default_proxy_timeout() -> u64 {
    10
}

fn default_health_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,

    /// Only HS256 is supported; kept as a field so deployments can see it.
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,

    #[serde(default = "default_access_expire_minutes")]
    pub access_token_expire_minutes: u64,

    #[serde(default = "default_refresh_expire_days")]
    pub refresh_token_expire_days: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            algorithm: default_jwt_algorithm(),
            access_token_expire_minutes: default_access_expire_minutes(),
            refresh_token_expire_days: default_refresh_expire_days(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Demo default, overridable via DQA_JWT_SECRET.
    "your-secret-key-change-in-production".to_string()
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

fn default_access_expire_minutes() -> u64 {
    30
}

fn default_refresh_expire_days() -> u64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_cors_any")]
    pub allow_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub allow_credentials: bool,

    #[serde(default = "default_cors_any")]
    pub allow_methods: Vec<String>,

    #[serde(default = "default_cors_any")]
    pub allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_cors_any(),
            allow_credentials: true,
            allow_methods: default_cors_any(),
            allow_headers: default_cors_any(),
        }
    }
}

fn default_cors_any() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}
