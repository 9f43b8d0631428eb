//! Envia VoIP Provisioning Service
//!
//! Provisioning of contracts and VoIP accounts at Envia TEL:
//! - XML request documents for every API job
//! - Order audit trail kept in sync with Envia order states
//! - Import of the orders and usage CSV exports

use nms_core::{DependencyStatus, HealthStatus, MicroserviceRuntime, NmsService, ReadinessStatus, Result};
use std::sync::Arc;
use tracing::info;

mod api;
mod client;
mod config;
mod entities;
mod error;
mod jobs;
mod request;
mod response;
mod service;
mod store;

#[cfg(test)]
mod tests;

pub use config::EnviaConfig;
pub use service::ProvVoipEnvia;

#[tokio::main]
async fn main() -> Result<()> {
    nms_telemetry::init("provvoip-envia")
        .map_err(|e| nms_core::NmsError::Config(e.to_string()))?;

    info!("Starting Envia Provisioning Service");

    let service = Arc::new(EnviaService::new()?);
    MicroserviceRuntime::run(service).await
}

pub struct EnviaService {
    config: Arc<EnviaConfig>,
    entities: store::MemoryProvisioningStore,
    envia: ProvVoipEnvia,
    start_time: std::time::Instant,
}

impl EnviaService {
    pub fn new() -> Result<Self> {
        let config = Arc::new(EnviaConfig::from_env()?);
        let entities = store::MemoryProvisioningStore::new();
        let envia = ProvVoipEnvia::new(
            config.clone(),
            Arc::new(entities.clone()),
            Arc::new(client::HttpTransport::new()),
        );

        Ok(Self {
            config,
            entities,
            envia,
            start_time: std::time::Instant::now(),
        })
    }
}

#[async_trait::async_trait]
impl NmsService for EnviaService {
    fn service_id(&self) -> &'static str {
        "provvoip-envia"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        // requests without reseller credentials are rejected by Envia
        let available = !self.config.reseller_username.is_empty();

        ReadinessStatus {
            ready: available,
            dependencies: vec![DependencyStatus {
                name: "envia-api".to_string(),
                available,
                latency_ms: None,
            }],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            requests_sent = self.envia.requests_sent(),
            requests_failed = self.envia.requests_failed(),
            open_orders = self.envia.open_orders(),
            "Shutting down Envia Provisioning Service"
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            http = %self.config.service.http_bind,
            api = %self.config.base_url,
            api_version = %self.config.api_version,
            "Starting Envia Provisioning server"
        );

        let router = api::rest::create_router(self.envia.clone(), self.entities.clone());

        let listener = tokio::net::TcpListener::bind(&self.config.service.http_bind).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
