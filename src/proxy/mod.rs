mod client;

pub use client::{ProxyClient, ProxyRequest};
