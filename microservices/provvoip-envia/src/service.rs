//! Job execution: resolve entities, build the request, send it and
//! reconcile the answer

use chrono::Utc;
use nms_telemetry::{Counter, Gauge};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::client::EnviaTransport;
use crate::config::EnviaConfig;
use crate::error::{EnviaError, Result};
use crate::jobs::Job;
use crate::request::{prettify, ModelContext, RequestBuilder, RequestParams};
use crate::response::{error_messages, Outcome, Reconciler};
use crate::store::ProvisioningStore;

#[derive(Clone)]
pub struct ProvVoipEnvia {
    config: Arc<EnviaConfig>,
    store: Arc<dyn ProvisioningStore>,
    transport: Arc<dyn EnviaTransport>,
    sent: Counter,
    failed: Counter,
    open_orders: Gauge,
}

impl ProvVoipEnvia {
    pub fn new(
        config: Arc<EnviaConfig>,
        store: Arc<dyn ProvisioningStore>,
        transport: Arc<dyn EnviaTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            sent: Counter::new("envia_requests_sent"),
            failed: Counter::new("envia_requests_failed"),
            open_orders: Gauge::new("envia_open_orders"),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProvisioningStore> {
        &self.store
    }

    pub fn requests_sent(&self) -> u64 {
        self.sent.get()
    }

    pub fn requests_failed(&self) -> u64 {
        self.failed.get()
    }

    pub fn open_orders(&self) -> i64 {
        self.open_orders.get()
    }

    async fn request_xml(&self, job: Job, params: &RequestParams) -> Result<(ModelContext, String)> {
        let ctx = ModelContext::resolve(self.store.as_ref(), params, job, &self.config.document_dir).await?;
        let xml = RequestBuilder::new(&self.config, &ctx, params, Utc::now().date_naive()).build_xml(job)?;
        Ok((ctx, xml))
    }

    /// Request document as it would be sent, credentials masked
    pub async fn xml(&self, job: Job, params: &RequestParams) -> Result<String> {
        let (_, xml) = self.request_xml(job, params).await?;
        prettify(&xml, true)
    }

    /// Send a job to Envia and apply the answer
    #[instrument(skip_all, fields(job = %job))]
    pub async fn run(&self, job: Job, params: &RequestParams) -> Result<Outcome> {
        let (ctx, xml) = self.request_xml(job, params).await?;
        let url = self.config.url(&job.path());

        self.sent.inc();
        let response = match self.transport.post(&url, xml).await {
            Ok(response) => response,
            Err(e) => {
                self.failed.inc();
                error!(error = %e, "Sending request to Envia failed");
                return Err(e);
            }
        };

        // unknown orders are deleted locally
        let order_gone = job == Job::OrderGetStatus && response.status == 404;
        if response.status >= 400 && !order_gone {
            self.failed.inc();
            let messages = error_messages(&response.body).unwrap_or_default();
            return Err(EnviaError::Provider {
                status: response.status,
                messages,
            });
        }

        let outcome = Reconciler::new(self.store.as_ref(), &ctx, params, Utc::now())
            .process(job, response.status, &response.body)
            .await?;

        self.open_orders.set(self.store.orders(false).await?.len() as i64);
        info!(status = response.status, "Envia job done");
        Ok(outcome)
    }
}
