//! Contract number allocator

use dashmap::DashMap;
use nms_core::CostCenterId;
use nms_telemetry::Counter;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{ContractNumber, NumberRange, NumberRangeStore, NumberRangeType};
use crate::error::Result;

/// Hands out the lowest free number of a cost center's ranges
#[derive(Clone)]
pub struct NumberAllocator {
    store: Arc<dyn NumberRangeStore>,
    /// Serializes allocations per cost center inside this process
    locks: Arc<DashMap<CostCenterId, Arc<Mutex<()>>>>,
    allocated: Counter,
    exhausted: Counter,
}

impl NumberAllocator {
    pub fn new(store: Arc<dyn NumberRangeStore>) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
            allocated: Counter::new("contract_numbers_allocated"),
            exhausted: Counter::new("number_ranges_exhausted"),
        }
    }

    /// Next number of the given kind for a cost center.
    ///
    /// Invoice numbers are not drawn from ranges; they come from the
    /// billing run counter, so this yields `None` for them.
    pub async fn new_number(
        &self,
        kind: NumberRangeType,
        costcenter_id: CostCenterId,
    ) -> Result<Option<String>> {
        match kind {
            NumberRangeType::Contract => self.allocate(costcenter_id).await,
            NumberRangeType::Invoice => Ok(None),
        }
    }

    /// Lowest available contract number over the cost center's contract
    /// ranges, tried in ascending id order. `None` when every range is
    /// exhausted.
    pub async fn allocate(&self, costcenter_id: CostCenterId) -> Result<Option<String>> {
        let lock = self
            .locks
            .entry(costcenter_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let ranges = self
            .store
            .number_ranges(NumberRangeType::Contract, costcenter_id)
            .await?;

        for range in &ranges {
            let numbers = self
                .store
                .contract_numbers(&range.prefix, &range.suffix)
                .await?;

            match next_in_range(range, &numbers) {
                Some(value) => {
                    let number = range.format(value);
                    self.allocated.inc();
                    info!(
                        costcenter_id = %costcenter_id,
                        range_id = range.id,
                        number = %number,
                        "Allocated contract number"
                    );
                    return Ok(Some(number));
                }
                None => {
                    self.exhausted.inc();
                    warn!(
                        "No free contract number in number range: {} [{}]",
                        range.name, range.id
                    );
                }
            }
        }

        let name = self
            .store
            .cost_center(costcenter_id)
            .await?
            .map(|c| c.name)
            .unwrap_or_default();
        error!(
            "No free contract numbers under all number ranges of cost center: {} [{}]",
            name, costcenter_id
        );

        Ok(None)
    }

    pub fn allocated_total(&self) -> u64 {
        self.allocated.get()
    }

    pub fn exhausted_total(&self) -> u64 {
        self.exhausted.get()
    }
}

/// Sequence value to hand out from `range`, given every contract number
/// sharing its prefix and suffix.
///
/// The first number wins when nobody uses it. Otherwise the smallest free
/// successor of a number this cost center already uses inside the range,
/// as long as it does not run past `end`. Numbers of other cost centers
/// block candidates but never seed them.
pub fn next_in_range(range: &NumberRange, numbers: &[ContractNumber]) -> Option<u64> {
    let in_use: HashSet<&str> = numbers.iter().map(|c| c.number.as_str()).collect();

    let first = range.first_number();
    if !in_use.contains(first.as_str()) {
        return Some(range.start);
    }

    let candidate = numbers
        .iter()
        .filter(|c| c.costcenter_id == Some(range.costcenter_id))
        .filter(|c| c.number.len() >= first.len())
        .filter_map(|c| range.sequence_value(&c.number))
        .filter(|v| range.contains(*v))
        .filter_map(|v| v.checked_add(1))
        .filter(|next| !in_use.contains(range.format(*next).as_str()))
        .min()?;

    if candidate > range.end {
        debug!(range_id = range.id, candidate, "Successor beyond range end");
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numberrange::{CostCenter, MemoryNumberRangeStore};

    fn range(id: i64, prefix: &str, suffix: &str, start: u64, end: u64) -> NumberRange {
        NumberRange {
            id,
            name: format!("range {}", id),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            start,
            end,
            kind: NumberRangeType::Contract,
            costcenter_id: CostCenterId(1),
        }
    }

    fn used(numbers: &[&str]) -> Vec<ContractNumber> {
        numbers
            .iter()
            .map(|n| ContractNumber::new(*n, CostCenterId(1)))
            .collect()
    }

    #[test]
    fn test_first_number_when_range_unused() {
        assert_eq!(next_in_range(&range(1, "", "", 100, 199), &[]), Some(100));
    }

    #[test]
    fn test_fills_gap_after_used_number() {
        let r = range(1, "", "", 1, 5);
        assert_eq!(next_in_range(&r, &used(&["1", "2", "4"])), Some(3));
    }

    #[test]
    fn test_exhausted_range() {
        let r = range(1, "", "", 1, 3);
        assert_eq!(next_in_range(&r, &used(&["1", "2", "3"])), None);
    }

    #[test]
    fn test_affixes_and_length_filter() {
        let r = range(1, "K-", "/A", 10, 20);
        let numbers = used(&["K-10/A", "K-11/A", "K-9/A", "K-5000/A"]);
        assert_eq!(next_in_range(&r, &numbers), Some(12));
    }

    #[test]
    fn test_other_cost_center_blocks_but_does_not_seed() {
        let r = range(1, "", "", 1, 10);
        let numbers = vec![
            ContractNumber::new("1", CostCenterId(1)),
            ContractNumber::new("2", CostCenterId(2)),
            ContractNumber::new("7", CostCenterId(2)),
        ];
        assert_eq!(next_in_range(&r, &numbers), None);
    }

    #[test]
    fn test_seeds_only_from_own_cost_center() {
        let r = range(1, "", "", 1, 10);
        let numbers = vec![
            ContractNumber::new("1", CostCenterId(1)),
            ContractNumber::new("2", CostCenterId(1)),
            ContractNumber::new("7", CostCenterId(2)),
        ];
        assert_eq!(next_in_range(&r, &numbers), Some(3));
    }

    #[test]
    fn test_first_number_used_elsewhere() {
        let r = range(1, "", "", 1, 10);
        let numbers = vec![ContractNumber::new("1", CostCenterId(9))];
        assert_eq!(next_in_range(&r, &numbers), None);
    }

    #[test]
    fn test_no_overflow_at_u64_max() {
        let r = range(1, "", "", u64::MAX - 1, u64::MAX);
        let numbers = used(&[&(u64::MAX - 1).to_string(), &u64::MAX.to_string()]);
        assert_eq!(next_in_range(&r, &numbers), None);
    }

    async fn allocator_with(ranges: Vec<NumberRange>) -> (NumberAllocator, MemoryNumberRangeStore) {
        let store = MemoryNumberRangeStore::new();
        store.add_cost_center(CostCenter {
            id: CostCenterId(1),
            name: "Main".to_string(),
        });
        for r in ranges {
            store.add_range(r).unwrap();
        }
        (NumberAllocator::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_falls_through_to_next_range() {
        let (allocator, store) =
            allocator_with(vec![range(1, "", "", 1, 2), range(2, "B", "", 1, 100)]).await;
        store.add_contract("1", CostCenterId(1)).await;
        store.add_contract("2", CostCenterId(1)).await;

        let number = allocator.allocate(CostCenterId(1)).await.unwrap();
        assert_eq!(number.as_deref(), Some("B1"));
        assert_eq!(allocator.exhausted_total(), 1);
    }

    #[tokio::test]
    async fn test_all_ranges_exhausted() {
        let (allocator, store) = allocator_with(vec![range(1, "", "", 1, 1)]).await;
        store.add_contract("1", CostCenterId(1)).await;

        assert_eq!(allocator.allocate(CostCenterId(1)).await.unwrap(), None);
        assert_eq!(allocator.allocated_total(), 0);
    }

    #[tokio::test]
    async fn test_freed_number_comes_back() {
        let (allocator, store) = allocator_with(vec![range(1, "", "", 1, 3)]).await;
        for n in ["1", "2", "3"] {
            store.add_contract(n, CostCenterId(1)).await;
        }
        assert_eq!(allocator.allocate(CostCenterId(1)).await.unwrap(), None);

        store.remove_contract("2").await;
        assert_eq!(
            allocator.allocate(CostCenterId(1)).await.unwrap().as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_invoice_numbers_not_allocated() {
        let (allocator, _) = allocator_with(vec![range(1, "", "", 1, 3)]).await;
        let number = allocator
            .new_number(NumberRangeType::Invoice, CostCenterId(1))
            .await
            .unwrap();
        assert_eq!(number, None);

        let number = allocator
            .new_number(NumberRangeType::Contract, CostCenterId(1))
            .await
            .unwrap();
        assert_eq!(number.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_allocation_is_never_in_use() {
        let (allocator, store) = allocator_with(vec![range(1, "C", "", 1, 50)]).await;
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let number = allocator.allocate(CostCenterId(1)).await.unwrap().unwrap();
            assert!(seen.insert(number.clone()), "duplicate {}", number);
            store.add_contract(number, CostCenterId(1)).await;
        }
        assert_eq!(allocator.allocate(CostCenterId(1)).await.unwrap(), None);
    }
}
