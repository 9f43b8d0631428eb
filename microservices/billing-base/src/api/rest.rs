//! Billing base REST API

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use nms_core::{CostCenterId, SepaAccountId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::config::BillingConfig;
use crate::error::{BillingError, Result};
use crate::numberrange::{NumberAllocator, NumberRangeType};
use crate::sepa::{bic_for_iban, AccountBilling, BillingRun, ContractBilling, SepaAccount};

#[derive(Clone)]
pub struct AppState {
    pub allocator: NumberAllocator,
    pub config: Arc<BillingConfig>,
}

pub fn create_router(allocator: NumberAllocator, config: Arc<BillingConfig>) -> Router {
    let state = AppState { allocator, config };

    Router::new()
        // Health
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Number ranges
        .route("/v1/costcenters/{id}/numbers/{kind}", post(new_number))
        // SEPA
        .route("/v1/sepa-accounts/{id}/billing-files", post(make_billing_files))
        .route("/v1/bic/{iban}", get(lookup_bic))
        .with_state(state)
}

async fn health() -> &'static str { "OK" }
async fn ready() -> &'static str { "OK" }

#[derive(Serialize)]
struct NumberResponse {
    number: Option<String>,
}

async fn new_number(
    State(state): State<AppState>,
    Path((id, kind)): Path<(i64, String)>,
) -> Result<Json<NumberResponse>> {
    let kind: NumberRangeType = kind.parse().map_err(BillingError::InvalidRequest)?;
    let number = state.allocator.new_number(kind, CostCenterId(id)).await?;
    Ok(Json(NumberResponse { number }))
}

#[derive(Deserialize)]
struct BillingFilesRequest {
    account: SepaAccount,
    /// Requested collection date
    rcd: NaiveDate,
    last_run: DateTime<Utc>,
    #[serde(default)]
    contracts: Vec<ContractBilling>,
}

#[derive(Serialize)]
struct BillingFilesResponse {
    account_id: SepaAccountId,
    files: Vec<String>,
    next_invoice_nr: String,
}

async fn make_billing_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<BillingFilesRequest>,
) -> Result<Json<BillingFilesResponse>> {
    if req.account.id != SepaAccountId(id) {
        return Err(BillingError::InvalidRequest(format!(
            "account id {} does not match path id {}",
            req.account.id, id
        )));
    }
    req.account.validate()?;

    let run = BillingRun {
        dir: state.config.billing_dir.clone(),
        rcd: req.rcd,
        locale: state.config.locale,
        currency: state.config.currency.clone(),
        split: state.config.split,
        last_run: req.last_run,
        now: Utc::now(),
        invoice_nr_start: state.config.invoice_nr_start,
    };

    let mut billing = AccountBilling::new(req.account, run);
    for entry in &req.contracts {
        billing.add_contract(entry);
    }

    let files = billing.make_billing_files().await?;
    info!(
        account_id = %billing.account().id,
        contracts = req.contracts.len(),
        files = files.len(),
        "Billing files created"
    );

    Ok(Json(BillingFilesResponse {
        account_id: billing.account().id,
        files: files.iter().map(|p| p.display().to_string()).collect(),
        next_invoice_nr: billing.invoice_nr(),
    }))
}

async fn lookup_bic(
    State(state): State<AppState>,
    Path(iban): Path<String>,
) -> Json<serde_json::Value> {
    let bic = bic_for_iban(&iban, &state.config.config_dir).await;
    Json(serde_json::json!({ "bic": bic }))
}
