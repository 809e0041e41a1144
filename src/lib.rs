pub mod breaker;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod response;
pub mod server;
pub mod services;
