//! Number ranges and contract number allocation
//!
//! A cost center owns any number of ranges. Each range is a closed
//! interval `[start, end]` rendered as `prefix + n + suffix` without zero
//! padding. Numbers count as used while a contract carries them.

mod allocator;
#[cfg(test)]
mod memory;
mod pg;
mod store;

pub use allocator::NumberAllocator;
#[cfg(test)]
pub use memory::MemoryNumberRangeStore;
pub use pg::PgNumberRangeStore;
pub use store::NumberRangeStore;

use nms_core::CostCenterId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

/// What a range hands out numbers for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberRangeType {
    Contract,
    Invoice,
}

impl NumberRangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Invoice => "invoice",
        }
    }
}

impl fmt::Display for NumberRangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NumberRangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contract" => Ok(Self::Contract),
            "invoice" => Ok(Self::Invoice),
            other => Err(format!("unknown number range type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_bounds"))]
pub struct NumberRange {
    pub id: i64,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    pub start: u64,
    pub end: u64,
    #[serde(rename = "type")]
    pub kind: NumberRangeType,
    pub costcenter_id: CostCenterId,
}

fn validate_bounds(range: &NumberRange) -> Result<(), ValidationError> {
    if range.start > range.end {
        return Err(ValidationError::new("start_after_end"));
    }
    Ok(())
}

impl NumberRange {
    /// Render a sequence value with this range's prefix and suffix
    pub fn format(&self, value: u64) -> String {
        format!("{}{}{}", self.prefix, value, self.suffix)
    }

    /// Lowest number of the range, also the minimum length of its members
    pub fn first_number(&self) -> String {
        self.format(self.start)
    }

    pub fn contains(&self, value: u64) -> bool {
        (self.start..=self.end).contains(&value)
    }

    /// Decimal value between prefix and suffix, if the number has this shape
    pub fn sequence_value(&self, number: &str) -> Option<u64> {
        let middle = number
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if middle.is_empty() || !middle.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        middle.parse().ok()
    }
}

/// Contract number together with the cost center of its contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractNumber {
    pub number: String,
    pub costcenter_id: Option<CostCenterId>,
}

impl ContractNumber {
    #[cfg(test)]
    pub fn new(number: impl Into<String>, costcenter_id: CostCenterId) -> Self {
        Self {
            number: number.into(),
            costcenter_id: Some(costcenter_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCenter {
    pub id: CostCenterId,
    pub name: String,
}
