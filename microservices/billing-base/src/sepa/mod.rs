//! SEPA account billing
//!
//! A billing run hands each SEPA account the items, call charges and
//! totals of the contracts it collects from. The account turns them into:
//! - accounting records (tariffs and other items)
//! - booking records (with and without a direct debit mandate)
//! - direct debit and credit transfer batches
//!
//! and finally writes everything below `dir/<account name>/`.

mod account;
mod format;
mod iban;
mod pain;
mod records;

pub use account::{AccountBilling, BillingRun, ContractBilling};
pub use format::Locale;
pub use iban::bic_for_iban;

use iban::is_valid_iban;

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use nms_core::SepaAccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

/// Creditor account a billing run collects into
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SepaAccount {
    pub id: SepaAccountId,
    #[validate(length(min = 1), custom(function = "validate_account_name"))]
    pub name: String,
    #[validate(length(min = 1))]
    pub holder: String,
    #[validate(length(min = 1, max = 35))]
    pub creditorid: String,
    #[validate(custom(function = "validate_iban"))]
    pub iban: String,
    #[serde(default)]
    pub bic: String,
}

/// Names a directory below the billing dir, so it must stay a single component
fn validate_account_name(name: &str) -> Result<(), ValidationError> {
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        Err(ValidationError::new("account_name"))
    } else {
        Ok(())
    }
}

fn validate_iban(iban: &str) -> Result<(), ValidationError> {
    if is_valid_iban(iban) {
        Ok(())
    } else {
        Err(ValidationError::new("iban"))
    }
}

/// Contract fields that end up in records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractInfo {
    pub number: String,
    #[serde(default)]
    pub firstname: String,
    #[serde(default)]
    pub lastname: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub zip: String,
    #[serde(default)]
    pub city: String,
    /// Name of the contract's cost center, if it has one
    #[serde(default)]
    pub costcenter: Option<String>,
    /// Contract ends before the next run
    #[serde(default)]
    pub expires: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Internet,
    #[serde(rename = "TV")]
    Tv,
    Voip,
    Device,
    Credit,
    Other,
}

impl ProductType {
    /// Internet, TV and VoIP products are billed as tariffs
    pub fn is_tariff(&self) -> bool {
        matches!(self, Self::Internet | Self::Tv | Self::Voip)
    }
}

/// Billed item of a contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingItem {
    pub product_type: ProductType,
    pub count: u32,
    pub description: String,
    pub charge: Decimal,
}

/// Net total and tax of one contract
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Charge {
    pub net: Decimal,
    pub tax: Decimal,
}

impl Charge {
    pub fn gross(&self) -> Decimal {
        self.net + self.tax
    }
}

/// Direct debit mandate of a contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SepaMandate {
    pub reference: String,
    pub signature_date: NaiveDate,
    pub holder: String,
    pub iban: String,
    #[serde(default)]
    pub bic: String,
    pub valid_from: NaiveDate,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    #[serde(default)]
    pub recurring: bool,
}

/// SEPA direct debit sequence type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SequenceType {
    #[serde(rename = "FRST")]
    First,
    #[serde(rename = "RCUR")]
    Recurring,
    #[serde(rename = "FNAL")]
    Final,
}

impl SequenceType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::First => "FRST",
            Self::Recurring => "RCUR",
            Self::Final => "FNAL",
        }
    }

    /// First debit of a mandate signed after the last run, final debit of
    /// an expiring contract or a mandate ending within a month, recurring
    /// otherwise.
    pub fn for_mandate(
        mandate: &SepaMandate,
        contract_expires: bool,
        last_run: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        if mandate.valid_from > last_run.date_naive() && !mandate.recurring {
            return Self::First;
        }

        let horizon = now
            .naive_utc()
            .checked_add_months(Months::new(1))
            .unwrap_or_else(|| now.naive_utc());
        let ends_soon = mandate
            .valid_to
            .is_some_and(|to| to.and_time(NaiveTime::default()) < horizon);

        if contract_expires || ends_soon {
            Self::Final
        } else {
            Self::Recurring
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
