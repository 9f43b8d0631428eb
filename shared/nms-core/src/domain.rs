//! Entity identifiers shared by billing and provisioning

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Billing-organizational grouping owning number ranges
    CostCenterId
);
entity_id!(
    /// Customer contract
    ContractId
);
entity_id!(ModemId);
entity_id!(PhonenumberId);
entity_id!(PhonenumberManagementId);
entity_id!(PhonebookEntryId);
entity_id!(SepaAccountId);
entity_id!(
    /// Local audit row of a provider order
    EnviaOrderId
);
entity_id!(EnviaOrderDocumentId);
