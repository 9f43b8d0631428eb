//! Local entities read by the request builder and updated from responses
//!
//! Envia calls a phone connection a "contract"; locally that is the modem.
//! The Envia customer is our contract.

use chrono::{DateTime, NaiveDate, Utc};
use nms_core::{
    ContractId, EnviaOrderDocumentId, EnviaOrderId, ModemId, PhonebookEntryId, PhonenumberId,
    PhonenumberManagementId,
};
use serde::{Deserialize, Serialize};

/// Value lookup by local attribute name, used by the XML field tables
pub trait Fields {
    fn field(&self, name: &str) -> Option<String>;
}

fn date(value: Option<NaiveDate>) -> Option<String> {
    value.map(|d| d.format("%Y-%m-%d").to_string())
}

fn flag(value: bool) -> Option<String> {
    Some(if value { "1" } else { "0" }.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub number: String,
    #[serde(default)]
    pub salutation: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    /// Envia customer reference
    #[serde(default)]
    pub customer_external_id: Option<String>,
    /// External id of the purchase tariff (variation) starting next
    #[serde(default)]
    pub phonetariff_purchase_next: Option<String>,
    /// External id of the sale tariff starting next
    #[serde(default)]
    pub phonetariff_sale_next: Option<String>,
}

impl Fields for Contract {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "number" => Some(self.number.clone()),
            "salutation" => self.salutation.clone(),
            "company" => self.company.clone(),
            "department" => self.department.clone(),
            "firstname" => self.firstname.clone(),
            "lastname" => self.lastname.clone(),
            "street" => self.street.clone(),
            "house_number" => self.house_number.clone(),
            "zip" => self.zip.clone(),
            "city" => self.city.clone(),
            "district" => self.district.clone(),
            "birthday" => date(self.birthday),
            "customer_external_id" => self.customer_external_id.clone(),
            _ => None,
        }
    }
}

/// Modem with its installation address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modem {
    pub id: ModemId,
    pub contract_id: ContractId,
    #[serde(default)]
    pub salutation: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub house_number: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub birthday: Option<NaiveDate>,
    /// Envia contract reference
    #[serde(default)]
    pub contract_external_id: Option<String>,
    #[serde(default)]
    pub contract_ext_creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub installation_address_change_date: Option<NaiveDate>,
}

impl Fields for Modem {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "salutation" => self.salutation.clone(),
            "company" => self.company.clone(),
            "department" => self.department.clone(),
            "firstname" => self.firstname.clone(),
            "lastname" => self.lastname.clone(),
            "street" => self.street.clone(),
            "house_number" => self.house_number.clone(),
            "zip" => self.zip.clone(),
            "city" => self.city.clone(),
            "district" => self.district.clone(),
            "birthday" => date(self.birthday),
            "contract_external_id" => self.contract_external_id.clone(),
            "installation_address_change_date" => date(self.installation_address_change_date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phonenumber {
    pub id: PhonenumberId,
    pub modem_id: ModemId,
    pub prefix_number: String,
    pub number: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sipdomain: Option<String>,
}

impl Fields for Phonenumber {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "prefix_number" => Some(self.prefix_number.clone()),
            "number" => Some(self.number.clone()),
            "username" => self.username.clone(),
            "password" => self.password.clone(),
            "sipdomain" => self.sipdomain.clone(),
            _ => None,
        }
    }
}

/// Provisioning state of a phone number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhonenumberManagement {
    pub id: PhonenumberManagementId,
    pub phonenumber_id: PhonenumberId,
    pub activation_date: Option<NaiveDate>,
    pub deactivation_date: Option<NaiveDate>,
    pub external_activation_date: Option<NaiveDate>,
    pub external_deactivation_date: Option<NaiveDate>,
    pub porting_in: bool,
    pub porting_out: bool,
    /// Envia TRC class id
    pub trc_class: Option<String>,
    pub carrier_in: Option<String>,
    pub carrier_out: Option<String>,
    pub ekp_in: Option<String>,
    pub subscriber_company: Option<String>,
    pub subscriber_department: Option<String>,
    pub subscriber_salutation: Option<String>,
    pub subscriber_firstname: Option<String>,
    pub subscriber_lastname: Option<String>,
    pub subscriber_street: Option<String>,
    pub subscriber_zip: Option<String>,
    pub subscriber_city: Option<String>,
    pub subscriber_district: Option<String>,
    pub voipaccount_ext_creation_date: Option<DateTime<Utc>>,
    pub voipaccount_ext_termination_date: Option<DateTime<Utc>>,
}

impl Fields for PhonenumberManagement {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "activation_date" => date(self.activation_date),
            "deactivation_date" => date(self.deactivation_date),
            "porting_in" => flag(self.porting_in),
            "porting_out" => flag(self.porting_out),
            "trc_class" => self.trc_class.clone(),
            "subscriber_company" => self.subscriber_company.clone(),
            "subscriber_department" => self.subscriber_department.clone(),
            "subscriber_salutation" => self.subscriber_salutation.clone(),
            "subscriber_firstname" => self.subscriber_firstname.clone(),
            "subscriber_lastname" => self.subscriber_lastname.clone(),
            "subscriber_street" => self.subscriber_street.clone(),
            "subscriber_zip" => self.subscriber_zip.clone(),
            "subscriber_city" => self.subscriber_city.clone(),
            "subscriber_district" => self.subscriber_district.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhonebookEntry {
    pub id: PhonebookEntryId,
    pub phonenumbermanagement_id: PhonenumberManagementId,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub noble_rank: Option<String>,
    #[serde(default)]
    pub nobiliary_particle: Option<String>,
    #[serde(default)]
    pub academic_degree: Option<String>,
    #[serde(default)]
    pub other_name_suffix: Option<String>,
    #[serde(default)]
    pub business: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub houseno: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub urban_district: Option<String>,
    #[serde(default)]
    pub number_usage: Option<String>,
    #[serde(default)]
    pub publish_in_print_media: Option<String>,
    #[serde(default)]
    pub publish_in_electronic_media: Option<String>,
    #[serde(default)]
    pub directory_assistance: Option<String>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub reverse_search: Option<String>,
    #[serde(default)]
    pub publish_address: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl Fields for PhonebookEntry {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "lastname" => self.lastname.clone(),
            "firstname" => self.firstname.clone(),
            "company" => self.company.clone(),
            "noble_rank" => self.noble_rank.clone(),
            "nobiliary_particle" => self.nobiliary_particle.clone(),
            "academic_degree" => self.academic_degree.clone(),
            "other_name_suffix" => self.other_name_suffix.clone(),
            "business" => self.business.clone(),
            "street" => self.street.clone(),
            "houseno" => self.houseno.clone(),
            "zipcode" => self.zipcode.clone(),
            "city" => self.city.clone(),
            "urban_district" => self.urban_district.clone(),
            "number_usage" => self.number_usage.clone(),
            "publish_in_print_media" => self.publish_in_print_media.clone(),
            "publish_in_electronic_media" => self.publish_in_electronic_media.clone(),
            "directory_assistance" => self.directory_assistance.clone(),
            "entry_type" => self.entry_type.clone(),
            "reverse_search" => self.reverse_search.clone(),
            "publish_address" => self.publish_address.clone(),
            "tag" => self.tag.clone(),
            _ => None,
        }
    }
}

/// Order states Envia reports for finished orders
const SUCCESSFUL_STATES: &[&str] = &["erfolgreich verarbeitet", "successful"];
const FAILED_STATES: &[&str] = &["fehlgeschlagen", "abgelehnt", "storniert", "failed"];

/// Audit row of an order placed at Envia
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnviaOrder {
    pub id: EnviaOrderId,
    /// Envia order id
    pub orderid: String,
    pub method: Option<String>,
    pub ordertype_id: Option<String>,
    pub ordertype: Option<String>,
    pub orderstatus_id: Option<String>,
    pub orderstatus: Option<String>,
    pub ordercomment: Option<String>,
    pub orderdate: Option<NaiveDate>,
    pub customerreference: Option<String>,
    pub contractreference: Option<String>,
    pub contract_id: Option<ContractId>,
    pub modem_id: Option<ModemId>,
    pub phonenumber_id: Option<PhonenumberId>,
    /// Envia id of the order this one refers to (cancelation, attachment)
    pub related_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EnviaOrder {
    /// Freshly placed order; method doubles as order type until Envia
    /// reports the real one
    pub fn new(orderid: impl Into<String>, method: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: EnviaOrderId(0),
            orderid: orderid.into(),
            method: Some(method.to_string()),
            ordertype_id: None,
            ordertype: Some(method.to_string()),
            orderstatus_id: None,
            orderstatus: Some("initializing".to_string()),
            ordercomment: None,
            orderdate: None,
            customerreference: None,
            contractreference: None,
            contract_id: None,
            modem_id: None,
            phonenumber_id: None,
            related_order_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn is(&self, kind: &str) -> bool {
        self.method.as_deref() == Some(kind) || self.ordertype.as_deref() == Some(kind)
    }

    pub fn creates_voip_account(&self) -> bool {
        self.is("voip_account/create")
    }

    pub fn terminates_voip_account(&self) -> bool {
        self.is("voip_account/terminate")
    }

    pub fn cancels_other_order(&self) -> bool {
        self.method.as_deref() == Some("order/cancel")
    }

    fn status_in(&self, states: &[&str]) -> bool {
        self.orderstatus
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .is_some_and(|s| states.contains(&s.as_str()))
    }

    pub fn successful(&self) -> bool {
        self.status_in(SUCCESSFUL_STATES)
    }

    pub fn failed(&self) -> bool {
        self.status_in(FAILED_STATES)
    }
}

/// Document attached to an order, stored below `<document_dir>/<contract_id>/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnviaOrderDocument {
    pub id: EnviaOrderDocumentId,
    pub enviaorder_id: EnviaOrderId,
    pub document_type: String,
    pub mime_type: String,
    pub filename: String,
    /// Envia id of the upload order once sent
    #[serde(default)]
    pub upload_order_id: Option<String>,
}

/// German carrier codes look like `D057`
pub fn is_valid_carrier_code(code: &str) -> bool {
    code.len() == 4
        && code.starts_with('D')
        && code[1..].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_new_order_defaults() {
        let order = EnviaOrder::new("4711", "voip_account/create", now());
        assert_eq!(order.ordertype.as_deref(), Some("voip_account/create"));
        assert_eq!(order.orderstatus.as_deref(), Some("initializing"));
        assert!(order.creates_voip_account());
        assert!(!order.terminates_voip_account());
        assert!(!order.successful());
        assert!(!order.is_trashed());
    }

    #[test]
    fn test_order_states() {
        let mut order = EnviaOrder::new("1", "order/cancel", now());
        assert!(order.cancels_other_order());

        order.orderstatus = Some("Erfolgreich verarbeitet".to_string());
        assert!(order.successful());
        assert!(!order.failed());

        order.orderstatus = Some("fehlgeschlagen".to_string());
        assert!(order.failed());
    }

    #[test]
    fn test_field_lookup() {
        let management = PhonenumberManagement {
            porting_in: true,
            activation_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            ..Default::default()
        };
        assert_eq!(management.field("porting_in").as_deref(), Some("1"));
        assert_eq!(management.field("porting_out").as_deref(), Some("0"));
        assert_eq!(management.field("activation_date").as_deref(), Some("2024-06-01"));
        assert_eq!(management.field("unknown"), None);
    }

    #[test]
    fn test_carrier_codes() {
        assert!(is_valid_carrier_code("D057"));
        assert!(is_valid_carrier_code("D001"));
        assert!(!is_valid_carrier_code("057"));
        assert!(!is_valid_carrier_code("DABC"));
        assert!(!is_valid_carrier_code(""));
    }
}
