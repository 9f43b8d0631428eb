//! Billing Base Service
//!
//! Back office billing for the ISP management platform:
//! - Contract number allocation from per cost center number ranges
//! - Accounting and booking record files of a billing run
//! - SEPA direct debit and credit transfer XML

use nms_core::{DependencyStatus, HealthStatus, MicroserviceRuntime, NmsService, ReadinessStatus, Result};
use nms_db::{DbPool, PoolConfig};
use std::sync::Arc;
use tracing::info;

mod api;
mod config;
mod error;
mod numberrange;
mod sepa;

#[cfg(test)]
mod tests;

pub use config::BillingConfig;
pub use numberrange::{NumberAllocator, PgNumberRangeStore};

#[tokio::main]
async fn main() -> Result<()> {
    nms_telemetry::init("billing-base")
        .map_err(|e| nms_core::NmsError::Config(e.to_string()))?;

    info!("Starting Billing Base Service");

    let service = Arc::new(BillingBaseService::new()?);
    MicroserviceRuntime::run(service).await
}

pub struct BillingBaseService {
    config: Arc<BillingConfig>,
    store: PgNumberRangeStore,
    allocator: NumberAllocator,
    start_time: std::time::Instant,
}

impl BillingBaseService {
    pub fn new() -> Result<Self> {
        let config = BillingConfig::from_env()?;

        let pool = DbPool::new(PoolConfig::new(
            config.service.database_url.clone(),
            config.service.db_pool_size,
        ))
        .map_err(|e| nms_core::NmsError::Database(e.to_string()))?;

        let store = PgNumberRangeStore::new(pool);
        let allocator = NumberAllocator::new(Arc::new(store.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            allocator,
            start_time: std::time::Instant::now(),
        })
    }
}

#[async_trait::async_trait]
impl NmsService for BillingBaseService {
    fn service_id(&self) -> &'static str {
        "billing-base"
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
        let started = std::time::Instant::now();
        let available = self.store.is_healthy().await;

        ReadinessStatus {
            ready: available,
            dependencies: vec![DependencyStatus {
                name: "postgres".to_string(),
                available,
                latency_ms: Some(started.elapsed().as_millis() as u64),
            }],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!(
            numbers_allocated = self.allocator.allocated_total(),
            ranges_exhausted = self.allocator.exhausted_total(),
            "Shutting down Billing Base Service"
        );
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(
            http = %self.config.service.http_bind,
            billing_dir = %self.config.billing_dir.display(),
            "Starting Billing Base server"
        );

        let router = api::rest::create_router(self.allocator.clone(), self.config.clone());

        let listener = tokio::net::TcpListener::bind(&self.config.service.http_bind).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
