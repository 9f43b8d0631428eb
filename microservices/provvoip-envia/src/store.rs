//! Storage seam for the entities Envia jobs read and update

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nms_core::{
    ContractId, EnviaOrderDocumentId, EnviaOrderId, ModemId, PhonebookEntryId, PhonenumberId,
    PhonenumberManagementId,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::{
    Contract, EnviaOrder, EnviaOrderDocument, Modem, PhonebookEntry, Phonenumber,
    PhonenumberManagement,
};
use crate::error::Result;

#[async_trait]
pub trait ProvisioningStore: Send + Sync {
    async fn contract(&self, id: ContractId) -> Result<Option<Contract>>;
    async fn save_contract(&self, contract: &Contract) -> Result<()>;

    async fn modem(&self, id: ModemId) -> Result<Option<Modem>>;
    async fn save_modem(&self, modem: &Modem) -> Result<()>;

    async fn phonenumber(&self, id: PhonenumberId) -> Result<Option<Phonenumber>>;
    /// Phone number by local area code and base number
    async fn phonenumber_by_number(&self, prefix: &str, number: &str) -> Result<Option<Phonenumber>>;
    async fn save_phonenumber(&self, phonenumber: &Phonenumber) -> Result<()>;

    async fn management(&self, id: PhonenumberManagementId) -> Result<Option<PhonenumberManagement>>;
    async fn management_for_phonenumber(&self, id: PhonenumberId) -> Result<Option<PhonenumberManagement>>;
    async fn save_management(&self, management: &PhonenumberManagement) -> Result<()>;

    async fn phonebook_entry(&self, id: PhonebookEntryId) -> Result<Option<PhonebookEntry>>;
    async fn phonebook_entry_for_management(
        &self,
        id: PhonenumberManagementId,
    ) -> Result<Option<PhonebookEntry>>;

    /// Order by its Envia id; soft deleted orders only when `with_trashed`
    async fn order_by_orderid(&self, orderid: &str, with_trashed: bool) -> Result<Option<EnviaOrder>>;
    async fn order(&self, id: EnviaOrderId) -> Result<Option<EnviaOrder>>;
    async fn orders(&self, with_trashed: bool) -> Result<Vec<EnviaOrder>>;
    /// Insert a new order and return it with its local id
    async fn create_order(&self, order: EnviaOrder) -> Result<EnviaOrder>;
    async fn save_order(&self, order: &EnviaOrder) -> Result<()>;
    /// Soft delete every order with the Envia id
    async fn delete_order(&self, orderid: &str, at: DateTime<Utc>) -> Result<usize>;
    async fn force_delete_order(&self, id: EnviaOrderId) -> Result<bool>;
    async fn restore_order(&self, id: EnviaOrderId) -> Result<bool>;

    async fn order_document(&self, id: EnviaOrderDocumentId) -> Result<Option<EnviaOrderDocument>>;
    async fn save_order_document(&self, document: &EnviaOrderDocument) -> Result<()>;
}

/// Entities handed over in bulk by the management frontend
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub contracts: Vec<Contract>,
    pub modems: Vec<Modem>,
    pub phonenumbers: Vec<Phonenumber>,
    pub managements: Vec<PhonenumberManagement>,
    pub phonebook_entries: Vec<PhonebookEntry>,
    pub orders: Vec<EnviaOrder>,
    pub documents: Vec<EnviaOrderDocument>,
}

#[derive(Default)]
struct Tables {
    contracts: HashMap<ContractId, Contract>,
    modems: HashMap<ModemId, Modem>,
    phonenumbers: HashMap<PhonenumberId, Phonenumber>,
    managements: HashMap<PhonenumberManagementId, PhonenumberManagement>,
    phonebook_entries: HashMap<PhonebookEntryId, PhonebookEntry>,
    orders: HashMap<EnviaOrderId, EnviaOrder>,
    documents: HashMap<EnviaOrderDocumentId, EnviaOrderDocument>,
    next_order_id: i64,
}

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryProvisioningStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryProvisioningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace everything in the snapshot
    pub fn import(&self, snapshot: Snapshot) -> usize {
        let mut t = self.tables.write();
        let mut count = 0;

        for c in snapshot.contracts {
            t.contracts.insert(c.id, c);
            count += 1;
        }
        for m in snapshot.modems {
            t.modems.insert(m.id, m);
            count += 1;
        }
        for p in snapshot.phonenumbers {
            t.phonenumbers.insert(p.id, p);
            count += 1;
        }
        for m in snapshot.managements {
            t.managements.insert(m.id, m);
            count += 1;
        }
        for e in snapshot.phonebook_entries {
            t.phonebook_entries.insert(e.id, e);
            count += 1;
        }
        for o in snapshot.orders {
            t.next_order_id = t.next_order_id.max(o.id.get());
            t.orders.insert(o.id, o);
            count += 1;
        }
        for d in snapshot.documents {
            t.documents.insert(d.id, d);
            count += 1;
        }

        count
    }

    pub fn order_count(&self, with_trashed: bool) -> usize {
        self.tables
            .read()
            .orders
            .values()
            .filter(|o| with_trashed || !o.is_trashed())
            .count()
    }
}

#[async_trait]
impl ProvisioningStore for MemoryProvisioningStore {
    async fn contract(&self, id: ContractId) -> Result<Option<Contract>> {
        Ok(self.tables.read().contracts.get(&id).cloned())
    }

    async fn save_contract(&self, contract: &Contract) -> Result<()> {
        self.tables.write().contracts.insert(contract.id, contract.clone());
        Ok(())
    }

    async fn modem(&self, id: ModemId) -> Result<Option<Modem>> {
        Ok(self.tables.read().modems.get(&id).cloned())
    }

    async fn save_modem(&self, modem: &Modem) -> Result<()> {
        self.tables.write().modems.insert(modem.id, modem.clone());
        Ok(())
    }

    async fn phonenumber(&self, id: PhonenumberId) -> Result<Option<Phonenumber>> {
        Ok(self.tables.read().phonenumbers.get(&id).cloned())
    }

    async fn phonenumber_by_number(&self, prefix: &str, number: &str) -> Result<Option<Phonenumber>> {
        Ok(self
            .tables
            .read()
            .phonenumbers
            .values()
            .find(|p| p.prefix_number == prefix && p.number == number)
            .cloned())
    }

    async fn save_phonenumber(&self, phonenumber: &Phonenumber) -> Result<()> {
        self.tables
            .write()
            .phonenumbers
            .insert(phonenumber.id, phonenumber.clone());
        Ok(())
    }

    async fn management(&self, id: PhonenumberManagementId) -> Result<Option<PhonenumberManagement>> {
        Ok(self.tables.read().managements.get(&id).cloned())
    }

    async fn management_for_phonenumber(&self, id: PhonenumberId) -> Result<Option<PhonenumberManagement>> {
        Ok(self
            .tables
            .read()
            .managements
            .values()
            .find(|m| m.phonenumber_id == id)
            .cloned())
    }

    async fn save_management(&self, management: &PhonenumberManagement) -> Result<()> {
        self.tables
            .write()
            .managements
            .insert(management.id, management.clone());
        Ok(())
    }

    async fn phonebook_entry(&self, id: PhonebookEntryId) -> Result<Option<PhonebookEntry>> {
        Ok(self.tables.read().phonebook_entries.get(&id).cloned())
    }

    async fn phonebook_entry_for_management(
        &self,
        id: PhonenumberManagementId,
    ) -> Result<Option<PhonebookEntry>> {
        Ok(self
            .tables
            .read()
            .phonebook_entries
            .values()
            .find(|e| e.phonenumbermanagement_id == id)
            .cloned())
    }

    async fn order_by_orderid(&self, orderid: &str, with_trashed: bool) -> Result<Option<EnviaOrder>> {
        Ok(self
            .tables
            .read()
            .orders
            .values()
            .filter(|o| o.orderid == orderid && (with_trashed || !o.is_trashed()))
            .min_by_key(|o| o.id)
            .cloned())
    }

    async fn order(&self, id: EnviaOrderId) -> Result<Option<EnviaOrder>> {
        Ok(self.tables.read().orders.get(&id).cloned())
    }

    async fn orders(&self, with_trashed: bool) -> Result<Vec<EnviaOrder>> {
        let mut orders: Vec<EnviaOrder> = self
            .tables
            .read()
            .orders
            .values()
            .filter(|o| with_trashed || !o.is_trashed())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    async fn create_order(&self, mut order: EnviaOrder) -> Result<EnviaOrder> {
        let mut t = self.tables.write();
        t.next_order_id += 1;
        order.id = EnviaOrderId(t.next_order_id);
        t.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn save_order(&self, order: &EnviaOrder) -> Result<()> {
        self.tables.write().orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_order(&self, orderid: &str, at: DateTime<Utc>) -> Result<usize> {
        let mut t = self.tables.write();
        let mut deleted = 0;
        for order in t.orders.values_mut() {
            if order.orderid == orderid && !order.is_trashed() {
                order.deleted_at = Some(at);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn force_delete_order(&self, id: EnviaOrderId) -> Result<bool> {
        Ok(self.tables.write().orders.remove(&id).is_some())
    }

    async fn restore_order(&self, id: EnviaOrderId) -> Result<bool> {
        let mut t = self.tables.write();
        match t.orders.get_mut(&id) {
            Some(order) if order.is_trashed() => {
                order.deleted_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn order_document(&self, id: EnviaOrderDocumentId) -> Result<Option<EnviaOrderDocument>> {
        Ok(self.tables.read().documents.get(&id).cloned())
    }

    async fn save_order_document(&self, document: &EnviaOrderDocument) -> Result<()> {
        self.tables
            .write()
            .documents
            .insert(document.id, document.clone());
        Ok(())
    }
}
