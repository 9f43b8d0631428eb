//! Envia provisioning REST API

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::EnviaOrder;
use crate::error::{EnviaError, Result};
use crate::jobs::Job;
use crate::request::RequestParams;
use crate::response::Outcome;
use crate::service::ProvVoipEnvia;
use crate::store::{MemoryProvisioningStore, Snapshot};

#[derive(Clone)]
pub struct AppState {
    pub envia: ProvVoipEnvia,
    pub entities: MemoryProvisioningStore,
}

pub fn create_router(envia: ProvVoipEnvia, entities: MemoryProvisioningStore) -> Router {
    let state = AppState { envia, entities };

    Router::new()
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Jobs
        .route("/v1/envia/jobs/{job}", post(run_job))
        .route("/v1/envia/jobs/{job}/xml", get(job_xml))
        // Local state
        .route("/v1/envia/orders", get(list_orders))
        .route("/v1/entities", post(import_entities))
        .with_state(state)
}

async fn health() -> &'static str { "OK" }
async fn ready() -> &'static str { "OK" }

fn parse_job(job: &str) -> Result<Job> {
    job.parse().map_err(EnviaError::InvalidArgument)
}

async fn run_job(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(params): Query<RequestParams>,
) -> Result<Json<Outcome>> {
    let job = parse_job(&job)?;
    let outcome = state.envia.run(job, &params).await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct XmlResponse {
    job: Job,
    xml: String,
}

async fn job_xml(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(params): Query<RequestParams>,
) -> Result<Json<XmlResponse>> {
    let job = parse_job(&job)?;
    let xml = state.envia.xml(job, &params).await?;
    Ok(Json(XmlResponse { job, xml }))
}

#[derive(Deserialize)]
struct OrdersQuery {
    #[serde(default)]
    trashed: bool,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<EnviaOrder>>> {
    let orders = state.envia.store().orders(query.trashed).await?;
    Ok(Json(orders))
}

#[derive(Serialize)]
struct ImportResponse {
    imported: usize,
    open_orders: usize,
}

async fn import_entities(
    State(state): State<AppState>,
    Json(snapshot): Json<Snapshot>,
) -> Json<ImportResponse> {
    let imported = state.entities.import(snapshot);
    let open_orders = state.entities.order_count(false);
    info!(imported, open_orders, "Provisioning entities imported");
    Json(ImportResponse { imported, open_orders })
}
