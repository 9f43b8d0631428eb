//! Storage seam for number ranges and the contract numbers in use

use async_trait::async_trait;
use nms_core::CostCenterId;

use super::{ContractNumber, CostCenter, NumberRange, NumberRangeType};
use crate::error::Result;

#[async_trait]
pub trait NumberRangeStore: Send + Sync {
    /// Ranges of a kind assigned to the cost center, ascending by id
    async fn number_ranges(
        &self,
        kind: NumberRangeType,
        costcenter_id: CostCenterId,
    ) -> Result<Vec<NumberRange>>;

    /// Every contract number starting with `prefix` and ending with
    /// `suffix`, regardless of cost center
    async fn contract_numbers(&self, prefix: &str, suffix: &str) -> Result<Vec<ContractNumber>>;

    async fn cost_center(&self, id: CostCenterId) -> Result<Option<CostCenter>>;
}
