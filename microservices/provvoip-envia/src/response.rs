//! Processing of Envia API responses
//!
//! Successful responses are applied to the local entities; order creating
//! jobs add an `EnviaOrder` row. Status polls only write back what changed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, Utc};
use nms_core::{PhonenumberId, XmlNode};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::entities::EnviaOrder;
use crate::error::{EnviaError, Result};
use crate::jobs::Job;
use crate::request::{ModelContext, RequestParams};
use crate::store::ProvisioningStore;

/// Error reported by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorMessage {
    pub status: String,
    pub message: String,
}

/// Collect `response_error` entries including nested errors. Some error
/// documents come as `<hash><status/><error/></hash>` instead.
pub fn error_messages(raw: &str) -> Result<Vec<ErrorMessage>> {
    let root = XmlNode::parse(raw)?;
    let mut messages = Vec::new();

    let errors: Vec<&XmlNode> = if root.name == "response_error" {
        vec![&root]
    } else {
        root.children.iter().filter(|c| c.name == "response_error").collect()
    };

    for response_error in errors {
        messages.push(ErrorMessage {
            status: response_error.child_text("status").unwrap_or("").to_string(),
            message: response_error.child_text("message").unwrap_or("").to_string(),
        });
        for nested in response_error.children.iter().filter(|c| c.name == "nested_errors") {
            messages.push(ErrorMessage {
                status: nested.child_text("status").unwrap_or("").to_string(),
                message: nested.child_text("message").unwrap_or("").to_string(),
            });
        }
    }

    if raw.contains("<hash") {
        messages.push(ErrorMessage {
            status: root.child_text("status").unwrap_or("").to_string(),
            message: root.child_text("error").unwrap_or("").to_string(),
        });
    }

    Ok(messages)
}

/// What a processed response did
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Pong {
        ok: bool,
    },
    FreeNumbers {
        numbers: Vec<String>,
    },
    OrderCreated {
        order: EnviaOrder,
    },
    OrderCanceled {
        order: EnviaOrder,
        canceled: String,
    },
    AttachmentUploaded {
        order: EnviaOrder,
    },
    OrderDeleted {
        orderid: String,
        /// Removed for good rather than soft deleted
        hard: bool,
    },
    OrderStatus {
        order: EnviaOrder,
        changed: bool,
    },
    OrdersImported {
        created: Vec<String>,
        updated: Vec<String>,
        skipped: Vec<String>,
    },
    VoiceData {
        updated: Vec<PhonenumberId>,
    },
    Usage {
        rows: Vec<BTreeMap<String, String>>,
    },
    Document {
        xml: String,
    },
}

/// Compare strings with embedded numbers by their numeric value
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    fn chunks(s: &str) -> Vec<(bool, &str)> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut digits = None;
        for (i, c) in s.char_indices() {
            let is_digit = c.is_ascii_digit();
            match digits {
                Some(d) if d != is_digit => {
                    out.push((d, &s[start..i]));
                    start = i;
                }
                _ => {}
            }
            digits = Some(is_digit);
        }
        if let Some(d) = digits {
            out.push((d, &s[start..]));
        }
        out
    }

    let (left, right) = (chunks(a), chunks(b));
    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            ((true, x), (true, y)) => {
                let (x, y) = (x.trim_start_matches('0'), y.trim_start_matches('0'));
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            ((_, x), (_, y)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

fn text(node: &XmlNode, name: &str) -> Option<String> {
    node.child_text(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn csv_rows(data: &[u8]) -> Result<Vec<BTreeMap<String, String>>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Applies responses of one job to the store
pub struct Reconciler<'a> {
    store: &'a dyn ProvisioningStore,
    ctx: &'a ModelContext,
    params: &'a RequestParams,
    now: DateTime<Utc>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn ProvisioningStore,
        ctx: &'a ModelContext,
        params: &'a RequestParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self { store, ctx, params, now }
    }

    /// Apply a response; `status` is the HTTP status of the answer
    pub async fn process(&self, job: Job, status: u16, body: &str) -> Result<Outcome> {
        if job == Job::OrderGetStatus && status == 404 {
            return self.order_not_found().await;
        }

        let xml = XmlNode::parse(body)?;
        match job {
            Job::MiscPing => {
                let ok = xml.child_text("pong") == Some("pong");
                if !ok {
                    warn!("Envia ping answered without pong");
                }
                Ok(Outcome::Pong { ok })
            }
            Job::MiscGetFreeNumbers => Ok(self.free_numbers(&xml)),
            Job::ContractCreate => self.contract_created(&xml).await,
            Job::ContractChangeTariff
            | Job::ContractChangeVariation
            | Job::ContractRelocate
            | Job::CustomerUpdate
            | Job::VoipAccountUpdate => self.order_placed(job, &xml).await,
            Job::VoipAccountCreate | Job::VoipAccountTerminate => self.voip_account_changed(job, &xml).await,
            Job::ContractGetVoiceData => self.voice_data(&xml).await,
            Job::MiscGetOrdersCsv => self.orders_csv(&xml).await,
            Job::MiscGetUsageCsv => {
                let data = BASE64.decode(xml.child_text("data").unwrap_or("").trim())?;
                Ok(Outcome::Usage { rows: csv_rows(&data)? })
            }
            Job::OrderGetStatus => self.order_status(&xml).await,
            Job::OrderCancel => self.order_canceled(&xml).await,
            Job::OrderCreateAttachment => self.attachment_uploaded(&xml).await,
            Job::BlacklistGet
            | Job::CalllogGetStatus
            | Job::ConfigurationGet
            | Job::PhonebookentryCreate
            | Job::PhonebookentryDelete
            | Job::PhonebookentryGet => Ok(Outcome::Document {
                xml: xml.to_xml(true)?,
            }),
        }
    }

    fn order_id(&self) -> Result<&'a str> {
        self.params
            .order_id
            .as_deref()
            .ok_or_else(|| EnviaError::InvalidArgument("order_id has to be given".to_string()))
    }

    fn orderid(xml: &XmlNode) -> Result<String> {
        text(xml, "orderid")
            .ok_or_else(|| EnviaError::UnexpectedValue("Response contains no orderid".to_string()))
    }

    fn free_numbers(&self, xml: &XmlNode) -> Outcome {
        let mut numbers: Vec<String> = xml
            .find("numbers")
            .map(|n| n.children.iter().filter(|c| c.name == "number").collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .map(|n| {
                format!(
                    "{}/{}",
                    n.child_text("localareacode").unwrap_or(""),
                    n.child_text("baseno").unwrap_or("")
                )
            })
            .collect();
        numbers.sort_by(|a, b| natural_cmp(a, b));
        Outcome::FreeNumbers { numbers }
    }

    fn new_order(&self, orderid: String, job: Job) -> EnviaOrder {
        let mut order = EnviaOrder::new(orderid, &job.path(), self.now);
        order.contract_id = self.ctx.contract.as_ref().map(|c| c.id);
        order.modem_id = self.ctx.modem.as_ref().map(|m| m.id);
        order
    }

    async fn contract_created(&self, xml: &XmlNode) -> Result<Outcome> {
        let (Some(contract), Some(modem)) = (&self.ctx.contract, &self.ctx.modem) else {
            return Err(EnviaError::XmlCreation("contract_create needs contract and modem".to_string()));
        };
        let customerreference = text(xml, "customerreference");
        let contractreference = text(xml, "contractreference");

        let mut contract = contract.clone();
        contract.customer_external_id = customerreference.clone();
        self.store.save_contract(&contract).await?;

        let mut modem = modem.clone();
        modem.contract_external_id = contractreference.clone();
        modem.contract_ext_creation_date = Some(self.now);
        self.store.save_modem(&modem).await?;

        let mut order = self.new_order(Self::orderid(xml)?, Job::ContractCreate);
        order.customerreference = customerreference;
        order.contractreference = contractreference;
        let order = self.store.create_order(order).await?;

        info!(orderid = %order.orderid, contract_id = %contract.id, "Contract created at Envia");
        Ok(Outcome::OrderCreated { order })
    }

    async fn order_placed(&self, job: Job, xml: &XmlNode) -> Result<Outcome> {
        let mut order = self.new_order(Self::orderid(xml)?, job);
        if job == Job::CustomerUpdate {
            order.modem_id = None;
        }
        if job == Job::VoipAccountUpdate {
            order.phonenumber_id = self.ctx.phonenumber.as_ref().map(|p| p.id);
        }
        let order = self.store.create_order(order).await?;

        info!(orderid = %order.orderid, method = %job.path(), "Envia order placed");
        Ok(Outcome::OrderCreated { order })
    }

    async fn voip_account_changed(&self, job: Job, xml: &XmlNode) -> Result<Outcome> {
        let management = self.ctx.management.as_ref().ok_or_else(|| {
            EnviaError::XmlCreation(format!("{} needs a phonenumbermanagement", job))
        })?;

        let mut management = management.clone();
        if job == Job::VoipAccountCreate {
            management.voipaccount_ext_creation_date = Some(self.now);
        } else {
            management.voipaccount_ext_termination_date = Some(self.now);
        }
        self.store.save_management(&management).await?;

        let mut order = self.new_order(Self::orderid(xml)?, job);
        order.phonenumber_id = self.ctx.phonenumber.as_ref().map(|p| p.id);
        let order = self.store.create_order(order).await?;

        info!(orderid = %order.orderid, method = %job.path(), "VoIP account order placed");
        Ok(Outcome::OrderCreated { order })
    }

    async fn voice_data(&self, xml: &XmlNode) -> Result<Outcome> {
        let mut updated = Vec::new();
        let entries = xml
            .find("callnumbers")
            .map(|n| n.children.iter().collect::<Vec<_>>())
            .unwrap_or_default();

        for entry in entries {
            if entry.name != "callnumber_single_data" {
                debug!(kind = %entry.name, "Skipping unsupported callnumber entry");
                continue;
            }

            let lac = entry.child_text("localareacode").unwrap_or("");
            let baseno = entry.child_text("baseno").unwrap_or("");
            let Some(mut phonenumber) = self.store.phonenumber_by_number(lac, baseno).await? else {
                warn!("Phonenumber {}/{} does not exist. Skipping voice data", lac, baseno);
                continue;
            };

            if let Some(trc_class) = text(entry, "trc_class") {
                if let Some(mut management) = self.store.management_for_phonenumber(phonenumber.id).await? {
                    if management.trc_class.as_deref() != Some(trc_class.as_str()) {
                        management.trc_class = Some(trc_class);
                        self.store.save_management(&management).await?;
                    }
                }
            }

            if let Some(sip) = entry.path("method/sip_data") {
                phonenumber.username = text(sip, "username");
                phonenumber.password = text(sip, "password");
                phonenumber.sipdomain = text(sip, "sipdomain");
                self.store.save_phonenumber(&phonenumber).await?;
                updated.push(phonenumber.id);
            } else if entry.path("method/mgcp_data").is_some() {
                warn!(phonenumber_id = %phonenumber.id, "MGCP voice data is not supported");
            }
        }

        Ok(Outcome::VoiceData { updated })
    }

    async fn orders_csv(&self, xml: &XmlNode) -> Result<Outcome> {
        let data = BASE64.decode(xml.child_text("data").unwrap_or("").trim())?;
        let (mut created, mut updated, mut skipped) = (Vec::new(), Vec::new(), Vec::new());

        for row in csv_rows(&data)? {
            let field = |name: &str| row.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());
            let Some(orderid) = field("orderid") else {
                continue;
            };

            if let Some(mut order) = self.store.order_by_orderid(orderid, false).await? {
                // order_get_status does not report the type id
                let ordertype_id = field("ordertype_id").map(str::to_string);
                if order.ordertype_id != ordertype_id {
                    order.ordertype_id = ordertype_id;
                    order.updated_at = self.now;
                    self.store.save_order(&order).await?;
                    info!("Updated ordertype_id in table enviaorder for order {}", orderid);
                    updated.push(orderid.to_string());
                }
                continue;
            }

            let lac = field("localareacode").unwrap_or("");
            let baseno = field("baseno").unwrap_or("");
            let Some(phonenumber) = self.store.phonenumber_by_number(lac, baseno).await? else {
                warn!(
                    "Phonenumber {}/{} does not exist. Skipping order {}",
                    lac, baseno, orderid
                );
                skipped.push(orderid.to_string());
                continue;
            };

            let mut order = EnviaOrder::new(orderid, "", self.now);
            order.method = field("method").map(str::to_string);
            order.ordertype_id = field("ordertype_id").map(str::to_string);
            order.ordertype = field("ordertype").map(str::to_string);
            order.orderstatus_id = field("orderstatus_id").map(str::to_string);
            order.orderstatus = field("orderstatus").map(str::to_string);
            order.ordercomment = field("ordercomment").map(str::to_string);
            order.orderdate = field("orderdate").and_then(parse_orderdate);
            order.customerreference = field("customerreference").map(str::to_string);
            order.contractreference = field("contractreference").map(str::to_string);
            order.phonenumber_id = Some(phonenumber.id);
            order.modem_id = Some(phonenumber.modem_id);
            order.contract_id = self.store.modem(phonenumber.modem_id).await?.map(|m| m.contract_id);

            self.store.create_order(order).await?;
            created.push(orderid.to_string());
        }

        info!(
            created = created.len(),
            updated = updated.len(),
            skipped = skipped.len(),
            "Envia orders CSV processed"
        );
        Ok(Outcome::OrdersImported { created, updated, skipped })
    }

    async fn order_not_found(&self) -> Result<Outcome> {
        let orderid = self.order_id()?;
        let order = self
            .store
            .order_by_orderid(orderid, true)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("There is no order with order_id {}", orderid)))?;

        // an order without type was entered by hand and never existed at Envia
        let hard = order.ordertype.as_deref().map_or(true, str::is_empty);
        if hard {
            self.store.force_delete_order(order.id).await?;
        } else {
            self.store.delete_order(orderid, self.now).await?;
        }

        info!(orderid, hard, "Order unknown at Envia, deleted locally");
        Ok(Outcome::OrderDeleted {
            orderid: orderid.to_string(),
            hard,
        })
    }

    async fn order_status(&self, xml: &XmlNode) -> Result<Outcome> {
        let orderid = self.order_id()?;
        let mut order = self
            .store
            .order_by_orderid(orderid, true)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("There is no order with order_id {}", orderid)))?;

        let mut changed = false;
        let mut update = |slot: &mut Option<String>, name: &str| {
            if let Some(value) = text(xml, name) {
                if slot.as_deref() != Some(value.as_str()) {
                    *slot = Some(value);
                    changed = true;
                }
            }
        };
        update(&mut order.ordertype_id, "ordertype_id");
        update(&mut order.ordertype, "ordertype");
        update(&mut order.orderstatus_id, "orderstatus_id");
        update(&mut order.orderstatus, "orderstatus");
        update(&mut order.ordercomment, "ordercomment");
        update(&mut order.customerreference, "customerreference");
        update(&mut order.contractreference, "contractreference");

        if let Some(date) = text(xml, "orderdate").as_deref().and_then(parse_orderdate) {
            if order.orderdate != Some(date) {
                order.orderdate = Some(date);
                changed = true;
            }
        }

        if changed {
            order.updated_at = self.now;
            self.store.save_order(&order).await?;
            info!("Database table enviaorder updated for order with id {}", orderid);

            if order.cancels_other_order() && order.failed() {
                self.restore_canceled(&order).await?;
            }
            self.update_contract(&order).await?;
            self.update_modem(&order).await?;
            self.update_management(&order).await?;
        }

        Ok(Outcome::OrderStatus { order, changed })
    }

    async fn restore_canceled(&self, order: &EnviaOrder) -> Result<()> {
        let Some(related) = order.related_order_id.as_deref() else {
            return Ok(());
        };
        if let Some(canceled) = self.store.order_by_orderid(related, true).await? {
            if canceled.is_trashed() && self.store.restore_order(canceled.id).await? {
                info!(
                    "Cancel of order {} failed. Restored soft deleted order",
                    canceled.id
                );
            }
        }
        Ok(())
    }

    async fn update_contract(&self, order: &EnviaOrder) -> Result<()> {
        let Some(id) = order.contract_id else {
            debug!("Order {} has no related contract", order.id);
            return Ok(());
        };
        let mut contract = self
            .store
            .contract(id)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("Contract {}", id)))?;

        if contract.customer_external_id.as_deref().map_or(true, str::is_empty) {
            contract.customer_external_id = order.customerreference.clone();
            self.store.save_contract(&contract).await?;
            info!("Database table contract updated for contract with id {}", id);
        }
        if order.customerreference != contract.customer_external_id {
            error!(
                "Customer reference in order {:?} and contract {:?} are different",
                order.customerreference, contract.customer_external_id
            );
        }
        Ok(())
    }

    async fn update_modem(&self, order: &EnviaOrder) -> Result<()> {
        let Some(id) = order.modem_id else {
            debug!("Order {} has no related modem", order.id);
            return Ok(());
        };
        let mut modem = self
            .store
            .modem(id)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("Modem {}", id)))?;

        if modem.contract_external_id.as_deref().map_or(true, str::is_empty) {
            modem.contract_external_id = order.contractreference.clone();
            self.store.save_modem(&modem).await?;
            info!("Database table modem updated for modem with id {}", id);
        }
        if order.contractreference != modem.contract_external_id {
            error!(
                "Contract reference in order {:?} and modem {:?} are different",
                order.contractreference, modem.contract_external_id
            );
        }
        Ok(())
    }

    async fn update_management(&self, order: &EnviaOrder) -> Result<()> {
        // filled in later by the orders CSV for hand made orders
        let Some(id) = order.phonenumber_id else {
            debug!("Order {} has no related phonenumber", order.id);
            return Ok(());
        };
        let (Some(orderdate), true) = (order.orderdate, order.successful()) else {
            return Ok(());
        };
        let Some(mut management) = self.store.management_for_phonenumber(id).await? else {
            return Err(EnviaError::NotFound(format!("PhonenumberManagement for phonenumber {}", id)));
        };

        let mut changed = false;
        if order.creates_voip_account() && management.external_activation_date != Some(orderdate) {
            management.external_activation_date = Some(orderdate);
            info!("Creation of voip account successful (phonenumbermanagement with id {})", management.id);
            changed = true;
        }
        if order.terminates_voip_account() && management.external_deactivation_date != Some(orderdate) {
            management.external_deactivation_date = Some(orderdate);
            info!("Termination of voip account successful (phonenumbermanagement with id {})", management.id);
            changed = true;
        }

        if changed {
            self.store.save_management(&management).await?;
        }
        Ok(())
    }

    async fn order_canceled(&self, xml: &XmlNode) -> Result<Outcome> {
        let canceled_id = self.order_id()?;
        let canceled = self
            .store
            .order_by_orderid(canceled_id, false)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("There is no order with order_id {}", canceled_id)))?;

        let mut order = EnviaOrder::new(Self::orderid(xml)?, "order/cancel", self.now);
        order.ordertype = Some("Stornierung eines Auftrags".to_string());
        order.orderstatus = Some("in Bearbeitung".to_string());
        order.related_order_id = Some(canceled_id.to_string());
        order.contract_id = canceled.contract_id;
        order.phonenumber_id = canceled.phonenumber_id;
        order.customerreference = canceled.customerreference.clone();
        order.contractreference = canceled.contractreference.clone();
        let order = self.store.create_order(order).await?;

        self.store.delete_order(canceled_id, self.now).await?;
        info!(orderid = %order.orderid, canceled = canceled_id, "Envia order canceled");

        Ok(Outcome::OrderCanceled {
            order,
            canceled: canceled_id.to_string(),
        })
    }

    async fn attachment_uploaded(&self, xml: &XmlNode) -> Result<Outcome> {
        let related_id = self.order_id()?;
        let related = self
            .store
            .order_by_orderid(related_id, false)
            .await?
            .ok_or_else(|| EnviaError::NotFound(format!("There is no order with order_id {}", related_id)))?;
        let attachment = self.ctx.attachment.as_ref().ok_or_else(|| {
            EnviaError::InvalidArgument("enviaorderdocument_id has to be given".to_string())
        })?;

        let orderid = Self::orderid(xml)?;
        let mut order = EnviaOrder::new(orderid.clone(), "order/create_attachment", self.now);
        order.orderstatus = Some("successful".to_string());
        order.related_order_id = Some(related.orderid.clone());
        order.contract_id = related.contract_id;
        order.phonenumber_id = related.phonenumber_id;
        order.customerreference = related.customerreference.clone();
        order.contractreference = related.contractreference.clone();
        let mut order = self.store.create_order(order).await?;

        // status polls of upload orders always answer 404
        self.store.delete_order(&orderid, self.now).await?;
        order.deleted_at = Some(self.now);

        let mut document = attachment.document.clone();
        document.upload_order_id = Some(orderid);
        self.store.save_order_document(&document).await?;

        info!(document_id = %document.id, related = related_id, "File uploaded to Envia");
        Ok(Outcome::AttachmentUploaded { order })
    }
}

/// Envia dates may carry a time; only the day counts
fn parse_orderdate(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let raw = r#"<?xml version="1.0" encoding="UTF-8"?>
            <response>
              <response_error>
                <status>400</status>
                <message>Validation failed</message>
                <nested_errors><status>1010</status><message>zipcode missing</message></nested_errors>
              </response_error>
            </response>"#;
        let messages = error_messages(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, "Validation failed");
        assert_eq!(messages[1].status, "1010");
    }

    #[test]
    fn test_malformed_hash_error() {
        let raw = "<hash><status>500</status><error>Internal Server Error</error></hash>";
        let messages = error_messages(raw).unwrap();
        assert_eq!(
            messages,
            vec![ErrorMessage {
                status: "500".to_string(),
                message: "Internal Server Error".to_string()
            }]
        );
    }

    #[test]
    fn test_natural_sort() {
        let mut numbers = vec!["0371/1000", "0371/200", "030/99", "0371/20"];
        numbers.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(numbers, vec!["030/99", "0371/20", "0371/200", "0371/1000"]);
    }

    #[test]
    fn test_parse_orderdate() {
        assert_eq!(parse_orderdate("2024-06-01T10:00:00"), NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(parse_orderdate("2024-06-01"), NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(parse_orderdate("soon"), None);
    }

    #[test]
    fn test_csv_rows() {
        let rows = csv_rows(b"orderid,baseno\n1,123\n\n2,456\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["baseno"], "456");
    }
}
