//! In-memory number range store backing the allocator tests

use async_trait::async_trait;
use dashmap::DashMap;
use nms_core::CostCenterId;
use std::sync::Arc;
use tokio::sync::RwLock;
use validator::Validate;

use super::{ContractNumber, CostCenter, NumberRange, NumberRangeStore, NumberRangeType};
use crate::error::Result;

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryNumberRangeStore {
    ranges: Arc<DashMap<i64, NumberRange>>,
    contracts: Arc<RwLock<Vec<ContractNumber>>>,
    cost_centers: Arc<DashMap<CostCenterId, CostCenter>>,
}

impl MemoryNumberRangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_range(&self, range: NumberRange) -> Result<()> {
        range.validate()?;
        self.ranges.insert(range.id, range);
        Ok(())
    }

    pub fn add_cost_center(&self, cost_center: CostCenter) {
        self.cost_centers.insert(cost_center.id, cost_center);
    }

    /// Record a contract carrying `number`
    pub async fn add_contract(&self, number: impl Into<String>, costcenter_id: CostCenterId) {
        self.contracts
            .write()
            .await
            .push(ContractNumber::new(number, costcenter_id));
    }

    /// Drop the contract carrying `number`, freeing it
    pub async fn remove_contract(&self, number: &str) -> bool {
        let mut contracts = self.contracts.write().await;
        let before = contracts.len();
        contracts.retain(|c| c.number != number);
        contracts.len() != before
    }
}

#[async_trait]
impl NumberRangeStore for MemoryNumberRangeStore {
    async fn number_ranges(
        &self,
        kind: NumberRangeType,
        costcenter_id: CostCenterId,
    ) -> Result<Vec<NumberRange>> {
        let mut ranges: Vec<NumberRange> = self
            .ranges
            .iter()
            .filter(|r| r.kind == kind && r.costcenter_id == costcenter_id)
            .map(|r| r.value().clone())
            .collect();
        ranges.sort_by_key(|r| r.id);
        Ok(ranges)
    }

    async fn contract_numbers(&self, prefix: &str, suffix: &str) -> Result<Vec<ContractNumber>> {
        Ok(self
            .contracts
            .read()
            .await
            .iter()
            .filter(|c| c.number.starts_with(prefix) && c.number.ends_with(suffix))
            .cloned()
            .collect())
    }

    async fn cost_center(&self, id: CostCenterId) -> Result<Option<CostCenter>> {
        Ok(self.cost_centers.get(&id).map(|c| c.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(id: i64, costcenter: i64, kind: NumberRangeType) -> NumberRange {
        NumberRange {
            id,
            name: format!("range {}", id),
            prefix: String::new(),
            suffix: String::new(),
            start: 1,
            end: 10,
            kind,
            costcenter_id: CostCenterId(costcenter),
        }
    }

    #[tokio::test]
    async fn test_ranges_filtered_and_ordered() {
        let store = MemoryNumberRangeStore::new();
        store.add_range(range(5, 1, NumberRangeType::Contract)).unwrap();
        store.add_range(range(2, 1, NumberRangeType::Contract)).unwrap();
        store.add_range(range(3, 1, NumberRangeType::Invoice)).unwrap();
        store.add_range(range(4, 2, NumberRangeType::Contract)).unwrap();

        let ids: Vec<i64> = store
            .number_ranges(NumberRangeType::Contract, CostCenterId(1))
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn test_contract_numbers_match_affixes() {
        let store = MemoryNumberRangeStore::new();
        tokio_test::block_on(async {
            store.add_contract("A1Z", CostCenterId(1)).await;
            store.add_contract("A2", CostCenterId(2)).await;
            store.add_contract("B3Z", CostCenterId(1)).await;

            let found = store.contract_numbers("A", "Z").await.unwrap();
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].number, "A1Z");

            assert!(store.remove_contract("A1Z").await);
            assert!(!store.remove_contract("A1Z").await);
            assert!(store.contract_numbers("A", "Z").await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_invalid_range_rejected() {
        let store = MemoryNumberRangeStore::new();
        let mut bad = range(1, 1, NumberRangeType::Contract);
        bad.start = 20;
        assert!(store.add_range(bad).is_err());
    }
}
