//! Envia API jobs and the second level nodes each request carries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ApiVersion;

/// API version that introduced installation addresses and carrier/EKP rules
pub const API_1_4: ApiVersion = ApiVersion::new(1, 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    BlacklistGet,
    CalllogGetStatus,
    ConfigurationGet,
    ContractChangeTariff,
    ContractChangeVariation,
    ContractCreate,
    ContractGetVoiceData,
    ContractRelocate,
    CustomerUpdate,
    MiscGetFreeNumbers,
    MiscGetOrdersCsv,
    MiscGetUsageCsv,
    MiscPing,
    OrderCancel,
    OrderCreateAttachment,
    OrderGetStatus,
    PhonebookentryCreate,
    PhonebookentryDelete,
    PhonebookentryGet,
    VoipAccountCreate,
    VoipAccountTerminate,
    VoipAccountUpdate,
}

/// Second level element of a request document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    ResellerIdentifier,
    OrderIdentifier,
    FilterData,
    CustomerIdentifier,
    CustomerData,
    InstallationAddressData,
    ContractData,
    TariffData,
    VariationData,
    SubscriberData,
    AccountData,
    CallnumberData,
    CallnumberIdentifier,
    AccountterminationData,
    BlacklistData,
    ContractIdentifier,
    ContractRelocationData,
    AttachmentData,
    PhonebookentryData,
}

impl Job {
    pub const ALL: [Job; 22] = [
        Job::BlacklistGet,
        Job::CalllogGetStatus,
        Job::ConfigurationGet,
        Job::ContractChangeTariff,
        Job::ContractChangeVariation,
        Job::ContractCreate,
        Job::ContractGetVoiceData,
        Job::ContractRelocate,
        Job::CustomerUpdate,
        Job::MiscGetFreeNumbers,
        Job::MiscGetOrdersCsv,
        Job::MiscGetUsageCsv,
        Job::MiscPing,
        Job::OrderCancel,
        Job::OrderCreateAttachment,
        Job::OrderGetStatus,
        Job::PhonebookentryCreate,
        Job::PhonebookentryDelete,
        Job::PhonebookentryGet,
        Job::VoipAccountCreate,
        Job::VoipAccountTerminate,
        Job::VoipAccountUpdate,
    ];

    /// Name of the root element
    pub fn as_str(&self) -> &'static str {
        match self {
            Job::BlacklistGet => "blacklist_get",
            Job::CalllogGetStatus => "calllog_get_status",
            Job::ConfigurationGet => "configuration_get",
            Job::ContractChangeTariff => "contract_change_tariff",
            Job::ContractChangeVariation => "contract_change_variation",
            Job::ContractCreate => "contract_create",
            Job::ContractGetVoiceData => "contract_get_voice_data",
            Job::ContractRelocate => "contract_relocate",
            Job::CustomerUpdate => "customer_update",
            Job::MiscGetFreeNumbers => "misc_get_free_numbers",
            Job::MiscGetOrdersCsv => "misc_get_orders_csv",
            Job::MiscGetUsageCsv => "misc_get_usage_csv",
            Job::MiscPing => "misc_ping",
            Job::OrderCancel => "order_cancel",
            Job::OrderCreateAttachment => "order_create_attachment",
            Job::OrderGetStatus => "order_get_status",
            Job::PhonebookentryCreate => "phonebookentry_create",
            Job::PhonebookentryDelete => "phonebookentry_delete",
            Job::PhonebookentryGet => "phonebookentry_get",
            Job::VoipAccountCreate => "voip_account_create",
            Job::VoipAccountTerminate => "voip_account_terminate",
            Job::VoipAccountUpdate => "voip_account_update",
        }
    }

    /// REST path below the API base URL; also the method recorded on orders
    pub fn path(&self) -> String {
        let name = self.as_str();
        let split = if name.starts_with("voip_account_") {
            "voip_account".len()
        } else {
            name.find('_').unwrap_or(name.len())
        };
        if split >= name.len() {
            return name.to_string();
        }
        format!("{}/{}", &name[..split], &name[split + 1..])
    }

    /// Second level nodes in document order
    pub fn nodes(&self, version: ApiVersion) -> Vec<Node> {
        use Node::*;

        match self {
            Job::BlacklistGet => vec![ResellerIdentifier, CallnumberIdentifier, BlacklistData],
            Job::CalllogGetStatus => vec![ResellerIdentifier, CustomerIdentifier],
            Job::ConfigurationGet => {
                vec![ResellerIdentifier, CustomerIdentifier, CallnumberIdentifier]
            }
            Job::ContractChangeTariff => vec![ResellerIdentifier, ContractIdentifier, TariffData],
            Job::ContractChangeVariation => {
                vec![ResellerIdentifier, ContractIdentifier, VariationData]
            }
            Job::ContractCreate => {
                let mut nodes = vec![ResellerIdentifier, CustomerIdentifier, CustomerData, ContractData];
                if version >= API_1_4 {
                    nodes.push(InstallationAddressData);
                }
                nodes
            }
            Job::ContractGetVoiceData => vec![ResellerIdentifier, ContractIdentifier],
            Job::ContractRelocate => {
                vec![ResellerIdentifier, ContractIdentifier, ContractRelocationData]
            }
            Job::CustomerUpdate => vec![ResellerIdentifier, CustomerIdentifier, CustomerData],
            Job::MiscGetFreeNumbers => vec![ResellerIdentifier, FilterData],
            Job::MiscGetOrdersCsv | Job::MiscGetUsageCsv | Job::MiscPing => {
                vec![ResellerIdentifier]
            }
            Job::OrderCancel | Job::OrderGetStatus => vec![ResellerIdentifier, OrderIdentifier],
            Job::OrderCreateAttachment => {
                vec![ResellerIdentifier, OrderIdentifier, AttachmentData]
            }
            Job::PhonebookentryCreate => vec![
                ResellerIdentifier,
                ContractIdentifier,
                CallnumberIdentifier,
                PhonebookentryData,
            ],
            Job::PhonebookentryDelete | Job::PhonebookentryGet => {
                vec![ResellerIdentifier, ContractIdentifier, CallnumberIdentifier]
            }
            Job::VoipAccountCreate => {
                vec![ResellerIdentifier, ContractIdentifier, AccountData, SubscriberData]
            }
            Job::VoipAccountTerminate => vec![
                ResellerIdentifier,
                ContractIdentifier,
                CallnumberIdentifier,
                AccountterminationData,
            ],
            Job::VoipAccountUpdate => vec![
                ResellerIdentifier,
                ContractIdentifier,
                CallnumberIdentifier,
                CallnumberData,
            ],
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Job {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Job::ALL
            .iter()
            .copied()
            .find(|job| job.as_str() == s)
            .ok_or_else(|| format!("Unknown Envia job: {}", s))
    }
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::ResellerIdentifier => "reseller_identifier",
            Node::OrderIdentifier => "order_identifier",
            Node::FilterData => "filter_data",
            Node::CustomerIdentifier => "customer_identifier",
            Node::CustomerData => "customer_data",
            Node::InstallationAddressData => "installation_address_data",
            Node::ContractData => "contract_data",
            Node::TariffData => "tariff_data",
            Node::VariationData => "variation_data",
            Node::SubscriberData => "subscriber_data",
            Node::AccountData => "account_data",
            Node::CallnumberData => "callnumber_data",
            Node::CallnumberIdentifier => "callnumber_identifier",
            Node::AccountterminationData => "accounttermination_data",
            Node::BlacklistData => "blacklist_data",
            Node::ContractIdentifier => "contract_identifier",
            Node::ContractRelocationData => "contract_relocation_data",
            Node::AttachmentData => "attachment_data",
            Node::PhonebookentryData => "phonebookentry_data",
        }
    }
}
