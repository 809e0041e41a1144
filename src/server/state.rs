use crate::breaker::CircuitBreakerRegistry;
use crate::config::Settings;
use crate::health;
use crate::metrics::Metrics;
use crate::proxy::ProxyClient;
use std::sync::Arc;

/// Shared gateway state, cheaply cloneable.
///
/// Settings are read-only after startup, so no swap machinery is needed:
/// a plain `Arc` is enough. The breaker registry is shared between the proxy
/// client (which drives it) and the admin surface (which reads it).
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    pub metrics: Metrics,
    pub proxy: ProxyClient,
    pub health_client: reqwest::Client,
}

impl GatewayState {
    pub fn new(settings: Settings, metrics: Metrics) -> Self {
        let settings = Arc::new(settings);
        let breakers = Arc::new(CircuitBreakerRegistry::new(settings.circuit_breaker.clone()));
        let proxy = ProxyClient::new(breakers, &settings.proxy);

        Self {
            settings,
            metrics,
            proxy,
            health_client: health::build_health_client(),
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        self.proxy.breakers()
    }
}
