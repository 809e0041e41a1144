pub mod types;


pub use types::*;

use anyhow::Result;
use std::path::Path;

impl Settings {
    /// Load settings from a file (if it exists) and apply environment
    /// variable overrides. When the file does not exist, built-in defaults
    /// are used — every binary can start with zero configuration for local
    /// development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: Settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            Settings::default()
        };

        settings.apply_env_overrides();

        settings.validate()?;
        tracing::info!(
            services = settings.services.len(),
            failure_threshold = settings.circuit_breaker.failure_threshold,
            recovery_timeout_secs = settings.circuit_breaker.recovery_timeout_secs,
            "loaded settings"
        );
        Ok(settings)
    }

    /// Apply environment variable overrides for deployment-specific values.
    fn apply_env_overrides(&mut self) {
        // Service base URLs
        if let Ok(v) = std::env::var("DQA_USER_SERVICE_URL") {
            self.services.insert("user".to_string(), v);
        }
        if let Ok(v) = std::env::var("DQA_AUTH_SERVICE_URL") {
            self.services.insert("auth".to_string(), v);
        }
        if let Ok(v) = std::env::var("DQA_DATA_SERVICE_URL") {
            self.services.insert("data".to_string(), v);
        }

        // Circuit breaker
        if let Ok(v) = std::env::var("DQA_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse::<u32>() {
                self.circuit_breaker.failure_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("DQA_RECOVERY_TIMEOUT_SECS") {
            if let Ok(n) = v.parse::<u64>() {
                self.circuit_breaker.recovery_timeout_secs = n;
            }
        }

        // JWT
        if let Ok(v) = std::env::var("DQA_JWT_SECRET") {
            self.jwt.secret = v;
        }

        // Logging
        if let Ok(v) = std::env::var("DQA_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("DQA_LOG_FORMAT") {
            self.log.format = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, url) in &self.services {
            if name.is_empty() {
                anyhow::bail!("service registry has an entry with an empty name");
            }
            if url.is_empty() {
                anyhow::bail!("service '{}' has an empty base URL", name);
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("service '{}' has a non-HTTP base URL: {}", name, url);
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            anyhow::bail!("circuit_breaker.failure_threshold must be positive");
        }
        if self.proxy.timeout_secs == 0 {
            anyhow::bail!("proxy.timeout_secs must be positive");
        }
        if self.proxy.health_timeout_secs == 0 {
            anyhow::bail!("proxy.health_timeout_secs must be positive");
        }

        if self.jwt.secret.is_empty() {
            anyhow::bail!("jwt.secret must not be empty");
        }
        if self.jwt.algorithm != "HS256" {
            anyhow::bail!("jwt.algorithm '{}' is not supported, use HS256", self.jwt.algorithm);
        }

        match self.log.format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("log.format '{}' is not supported, use json or text", other),
        }

        Ok(())
    }

    /// Base URL for a registered service, with the trailing slash trimmed.
    pub fn service_url(&self, name: &str) -> Option<&str> {
        self.services.get(name).map(|u| u.trim_end_matches('/'))
    }
}
