//! Billing base configuration

use std::env;
use std::path::PathBuf;

use nms_core::ServiceConfig;

use crate::error::{BillingError, Result};
use crate::sepa::Locale;

/// Runtime settings of the billing base service
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub service: ServiceConfig,
    /// Root directory billing runs write their files into
    pub billing_dir: PathBuf,
    /// Directory holding `bic_{country}.csv` lookup tables
    pub config_dir: PathBuf,
    pub locale: Locale,
    pub currency: String,
    /// One direct debit document per sequence type
    pub split: bool,
    /// First invoice counter value of a run
    pub invoice_nr_start: u64,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self> {
        let service = ServiceConfig::from_env().map_err(|e| BillingError::Config(e.to_string()))?;

        Ok(Self {
            service,
            billing_dir: env::var("BILLING_DIR")
                .unwrap_or_else(|_| "storage/billing".to_string())
                .into(),
            config_dir: env::var("BILLING_CONFIG_DIR")
                .unwrap_or_else(|_| "config/billingbase".to_string())
                .into(),
            locale: env::var("BILLING_LOCALE")
                .unwrap_or_else(|_| "de".to_string())
                .parse()
                .map_err(BillingError::Config)?,
            currency: env::var("BILLING_CURRENCY").unwrap_or_else(|_| "EUR".to_string()),
            split: env::var("BILLING_SPLIT")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            invoice_nr_start: env::var("INVOICE_NR_START")
                .unwrap_or_else(|_| "100000".to_string())
                .parse()
                .map_err(|e| BillingError::Config(format!("Invalid INVOICE_NR_START: {}", e)))?,
        })
    }
}
