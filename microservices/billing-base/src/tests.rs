//! Service level tests across allocation and billing

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use nms_core::{CostCenterId, SepaAccountId, XmlNode};
    use rust_decimal_macros::dec;
    use std::collections::HashSet;
    use std::sync::Arc;

    use crate::numberrange::{
        CostCenter, MemoryNumberRangeStore, NumberAllocator, NumberRange, NumberRangeType,
    };
    use crate::sepa::{
        AccountBilling, BillingRun, Charge, ContractBilling, ContractInfo, Locale, SepaAccount,
        SepaMandate,
    };

    async fn store_with_ranges() -> MemoryNumberRangeStore {
        let store = MemoryNumberRangeStore::new();
        store.add_cost_center(CostCenter {
            id: CostCenterId(7),
            name: "Business".to_string(),
        });
        for (id, prefix, start, end) in [(1, "B", 1000, 1002), (2, "C", 1, 5)] {
            store
                .add_range(NumberRange {
                    id,
                    name: format!("{} numbers", prefix),
                    prefix: prefix.to_string(),
                    suffix: "-X".to_string(),
                    start,
                    end,
                    kind: NumberRangeType::Contract,
                    costcenter_id: CostCenterId(7),
                })
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_allocations_are_unique_across_ranges() {
        let store = store_with_ranges().await;
        let allocator = NumberAllocator::new(Arc::new(store.clone()));

        let mut numbers = Vec::new();
        while let Some(number) = allocator.allocate(CostCenterId(7)).await.unwrap() {
            store.add_contract(number.clone(), CostCenterId(7)).await;
            numbers.push(number);
        }

        assert_eq!(
            numbers,
            vec!["B1000-X", "B1001-X", "B1002-X", "C1-X", "C2-X", "C3-X", "C4-X", "C5-X"]
        );
        assert_eq!(numbers.iter().collect::<HashSet<_>>().len(), numbers.len());
    }

    #[tokio::test]
    async fn test_concurrent_allocations_succeed() {
        let store = store_with_ranges().await;
        let allocator = NumberAllocator::new(Arc::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let allocator = allocator.clone();
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let number = allocator.allocate(CostCenterId(7)).await.unwrap();
                if let Some(n) = &number {
                    store.add_contract(n.clone(), CostCenterId(7)).await;
                }
                number
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn test_unknown_cost_center_has_no_numbers() {
        let store = store_with_ranges().await;
        let allocator = NumberAllocator::new(Arc::new(store));
        assert_eq!(allocator.allocate(CostCenterId(99)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_billing_run_for_account() {
        let dir = tempfile::tempdir().unwrap();
        let account = SepaAccount {
            id: SepaAccountId(2),
            name: "Sparkasse Collect".to_string(),
            holder: "ISP GmbH".to_string(),
            creditorid: "DE98ZZZ09999999999".to_string(),
            iban: "DE89370400440532013000".to_string(),
            bic: "COBADEFFXXX".to_string(),
        };
        let run = BillingRun {
            dir: dir.path().to_path_buf(),
            rcd: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            locale: Locale::En,
            currency: "EUR".to_string(),
            split: false,
            last_run: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            now: Utc.with_ymd_and_hms(2024, 6, 1, 8, 15, 0).unwrap(),
            invoice_nr_start: 500,
        };
        let mandate = SepaMandate {
            reference: "M-77".to_string(),
            signature_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            holder: "Max Mustermann".to_string(),
            iban: "DE02120300000000202051".to_string(),
            bic: "BYLADEM1001".to_string(),
            valid_from: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            valid_to: None,
            recurring: false,
        };

        let mut billing = AccountBilling::new(account, run);
        billing.add_contract(&ContractBilling {
            contract: ContractInfo {
                number: "B1000-X".to_string(),
                ..Default::default()
            },
            mandate: Some(mandate),
            items: Vec::new(),
            cdr: None,
            charge: Charge { net: dec!(10), tax: dec!(1.9) },
        });
        billing.add_contract(&ContractBilling {
            contract: ContractInfo {
                number: "B1001-X".to_string(),
                ..Default::default()
            },
            mandate: None,
            items: Vec::new(),
            cdr: None,
            charge: Charge { net: dec!(5), tax: dec!(0.95) },
        });

        let files = billing.make_billing_files().await.unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.starts_with(dir.path().join("Sparkasse_Collect"))));

        let no_sepa = std::fs::read_to_string(dir.path().join("Sparkasse_Collect/booking_no_sepa_records.txt")).unwrap();
        assert!(no_sepa.contains("B1001-X\t2024/2/501\t2024-06-01\t2024-06-10"));

        let dd = XmlNode::parse(&std::fs::read_to_string(dir.path().join("Sparkasse_Collect/DD.xml")).unwrap()).unwrap();
        assert_eq!(dd.descendants("SeqTp")[0].text(), "FRST");
        assert_eq!(dd.descendants("EndToEndId")[0].text(), "RG 2024/2/500");
        assert_eq!(dd.descendants("InstdAmt")[0].text(), "11.90");
        assert_eq!(dd.descendants("Ustrd")[0].text(), "Month 05/2024");
    }
}
