//! Request documents for the Envia API
//!
//! Every job is a document whose root element is named after the job and
//! whose second level nodes are filled from local entities. Most nodes
//! are described by field tables mapping XML tags to entity attributes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Datelike, Months, NaiveDate};
use nms_core::{
    ContractId, EnviaOrderDocumentId, ModemId, PhonebookEntryId, PhonenumberId,
    PhonenumberManagementId, XmlNode,
};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::config::EnviaConfig;
use crate::entities::{
    is_valid_carrier_code, Contract, EnviaOrder, EnviaOrderDocument, Fields, Modem, PhonebookEntry,
    Phonenumber, PhonenumberManagement,
};
use crate::error::{EnviaError, Result};
use crate::jobs::{Job, Node, API_1_4};
use crate::store::ProvisioningStore;

/// Shown instead of reseller credentials
const HIDDEN: &str = "################";

/// Carrier code of Envia TEL itself
const ENVIA_CARRIER_CODE: &str = "D057";

/// Query parameters selecting the entities and options of a job
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestParams {
    pub contract_id: Option<ContractId>,
    pub modem_id: Option<ModemId>,
    pub phonenumber_id: Option<PhonenumberId>,
    pub phonenumbermanagement_id: Option<PhonenumberManagementId>,
    pub phonebookentry_id: Option<PhonebookEntryId>,
    /// Envia order id
    pub order_id: Option<String>,
    pub localareacode: Option<String>,
    pub baseno: Option<String>,
    /// Blacklist direction, `in` or `out`
    pub direction: Option<String>,
    pub enviaorderdocument_id: Option<EnviaOrderDocumentId>,
}

/// Document to upload with the order it belongs to
#[derive(Debug, Clone)]
pub struct Attachment {
    pub document: EnviaOrderDocument,
    pub order: EnviaOrder,
    pub content: Vec<u8>,
}

/// Entities a job works on, resolved from the request parameters
#[derive(Debug, Clone, Default)]
pub struct ModelContext {
    pub contract: Option<Contract>,
    pub modem: Option<Modem>,
    pub phonenumber: Option<Phonenumber>,
    pub management: Option<PhonenumberManagement>,
    pub phonebook_entry: Option<PhonebookEntry>,
    pub attachment: Option<Attachment>,
}

fn found<T>(value: Option<T>, what: &str, id: impl std::fmt::Display) -> Result<T> {
    value.ok_or_else(|| EnviaError::NotFound(format!("{} {}", what, id)))
}

impl ModelContext {
    /// Load the given entities and everything they clearly belong to.
    /// Later entry points win: a phone number overrides the modem and
    /// contract given directly.
    pub async fn resolve(
        store: &dyn ProvisioningStore,
        params: &RequestParams,
        job: Job,
        document_dir: &Path,
    ) -> Result<Self> {
        let mut ctx = ModelContext::default();

        if let Some(id) = params.contract_id {
            ctx.contract = Some(found(store.contract(id).await?, "Contract", id)?);
        }

        if let Some(id) = params.modem_id {
            ctx.modem = Some(found(store.modem(id).await?, "Modem", id)?);
        }
        if let Some(modem) = &ctx.modem {
            ctx.contract = Some(found(store.contract(modem.contract_id).await?, "Contract", modem.contract_id)?);
        }

        if let Some(id) = params.phonenumber_id {
            let phonenumber = found(store.phonenumber(id).await?, "Phonenumber", id)?;
            ctx.management = store.management_for_phonenumber(id).await?;
            ctx.phonebook_entry = match &ctx.management {
                Some(m) => store.phonebook_entry_for_management(m.id).await?,
                None => None,
            };
            ctx.set_phonenumber(store, phonenumber).await?;
        }

        if let Some(id) = params.phonenumbermanagement_id {
            let management = found(store.management(id).await?, "PhonenumberManagement", id)?;
            ctx.management_chain(store, management).await?;
        }

        if let Some(id) = params.phonebookentry_id {
            let entry = found(store.phonebook_entry(id).await?, "PhonebookEntry", id)?;
            let management = found(
                store.management(entry.phonenumbermanagement_id).await?,
                "PhonenumberManagement",
                entry.phonenumbermanagement_id,
            )?;
            ctx.management_chain(store, management).await?;
            ctx.phonebook_entry = Some(entry);
        }

        if job == Job::OrderCreateAttachment {
            if let Some(id) = params.enviaorderdocument_id {
                ctx.attachment = Some(load_attachment(store, id, document_dir).await?);
            }
        }

        Ok(ctx)
    }

    async fn set_phonenumber(&mut self, store: &dyn ProvisioningStore, phonenumber: Phonenumber) -> Result<()> {
        let modem = found(store.modem(phonenumber.modem_id).await?, "Modem", phonenumber.modem_id)?;
        self.contract = Some(found(store.contract(modem.contract_id).await?, "Contract", modem.contract_id)?);
        self.modem = Some(modem);
        self.phonenumber = Some(phonenumber);
        Ok(())
    }

    async fn management_chain(
        &mut self,
        store: &dyn ProvisioningStore,
        management: PhonenumberManagement,
    ) -> Result<()> {
        let phonenumber = found(
            store.phonenumber(management.phonenumber_id).await?,
            "Phonenumber",
            management.phonenumber_id,
        )?;
        self.phonebook_entry = store.phonebook_entry_for_management(management.id).await?;
        self.management = Some(management);
        self.set_phonenumber(store, phonenumber).await
    }
}

async fn load_attachment(
    store: &dyn ProvisioningStore,
    id: EnviaOrderDocumentId,
    document_dir: &Path,
) -> Result<Attachment> {
    let document = found(store.order_document(id).await?, "EnviaOrderDocument", id)?;
    let order = found(store.order(document.enviaorder_id).await?, "EnviaOrder", document.enviaorder_id)?;

    let contract_dir = order
        .contract_id
        .map(|c| c.to_string())
        .unwrap_or_default();
    let path = document_dir.join(contract_dir).join(&document.filename);
    debug!(path = %path.display(), "Reading order document");
    let content = tokio::fs::read(&path).await?;

    Ok(Attachment { document, order, content })
}

/// Where a tag's value comes from
#[derive(Debug, Clone, Copy)]
pub enum Source {
    Attr(&'static str),
    /// Attributes joined by the separator
    #[allow(dead_code)]
    Concat(&'static [&'static str], &'static str),
}

type FieldTable = &'static [(&'static str, Source)];

use Source::Attr;

const PERSON_FIELDS: FieldTable = &[
    ("salutation", Attr("salutation")),
    ("firstname", Attr("firstname")),
    ("lastname", Attr("lastname")),
    ("street", Attr("street")),
    ("houseno", Attr("house_number")),
    ("zipcode", Attr("zip")),
    ("city", Attr("city")),
    ("district", Attr("district")),
    ("birthday", Attr("birthday")),
    ("company", Attr("company")),
    ("department", Attr("department")),
];

const SUBSCRIBER_FIELDS: FieldTable = &[
    ("company", Attr("subscriber_company")),
    ("department", Attr("subscriber_department")),
    ("salutation", Attr("subscriber_salutation")),
    ("firstname", Attr("subscriber_firstname")),
    ("lastname", Attr("subscriber_lastname")),
    ("street", Attr("subscriber_street")),
    ("zipcode", Attr("subscriber_zip")),
    ("city", Attr("subscriber_city")),
    ("district", Attr("subscriber_district")),
];

const ACCOUNT_FIELDS: FieldTable = &[
    ("porting", Attr("porting_in")),
    ("orderdate", Attr("activation_date")),
];

const CALLNUMBER_FIELDS: FieldTable = &[
    ("localareacode", Attr("prefix_number")),
    ("baseno", Attr("number")),
];

const PHONEBOOKENTRY_FIELDS: FieldTable = &[
    ("lastname", Attr("lastname")),
    ("firstname", Attr("firstname")),
    ("company", Attr("company")),
    ("noble_rank", Attr("noble_rank")),
    ("nobiliary_particle", Attr("nobiliary_particle")),
    ("academic_degree", Attr("academic_degree")),
    ("other_name_suffix", Attr("other_name_suffix")),
    ("business", Attr("business")),
    ("street", Attr("street")),
    ("houseno", Attr("houseno")),
    ("zipcode", Attr("zipcode")),
    ("city", Attr("city")),
    ("urban_district", Attr("urban_district")),
    ("usage", Attr("number_usage")),
    ("publish_in_print_media", Attr("publish_in_print_media")),
    ("publish_in_electronic_media", Attr("publish_in_electronic_media")),
    ("directory_assistance", Attr("directory_assistance")),
    ("entry_type", Attr("entry_type")),
    ("reverse_search", Attr("reverse_search")),
    ("publish_address", Attr("publish_address")),
    ("tag", Attr("tag")),
];

/// Fixed values a node always carries
fn defaults(topic: &str) -> &'static [(&'static str, &'static str)] {
    match topic {
        // phonebook entries are created explicitly later on
        "contract_data" => &[
            ("phonebookentry_phone", "0"),
            ("phonebookentry_fax", "0"),
            ("phonebookentry_reverse_search", "0"),
        ],
        _ => &[],
    }
}

/// Empty values are sent as `<tag nil="true"/>`
fn add_value(node: &mut XmlNode, tag: &str, value: Option<String>) {
    match value {
        Some(v) if !v.is_empty() => {
            node.leaf(tag, v);
        }
        _ => node.push(XmlNode::new(tag).attr("nil", "true")),
    }
}

/// Fill `node` from `model` following the field table, then add the
/// node's defaults not covered by the table
pub fn add_fields(node: &mut XmlNode, fields: FieldTable, model: &dyn Fields) {
    for (tag, source) in fields {
        let value = match source {
            Source::Attr(attr) => {
                let value = model.field(attr);
                // Envia expects the accusative
                if *tag == "salutation" && value.as_deref() == Some("Herr") {
                    Some("Herrn".to_string())
                } else {
                    value
                }
            }
            Source::Concat(attrs, separator) => Some(
                attrs
                    .iter()
                    .map(|a| model.field(a).unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(*separator),
            ),
        };
        add_value(node, tag, value);
    }

    for (tag, value) in defaults(&node.name) {
        if !fields.iter().any(|(t, _)| t == tag) {
            add_value(node, tag, Some(value.to_string()));
        }
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Builds the request document of a job
pub struct RequestBuilder<'a> {
    config: &'a EnviaConfig,
    ctx: &'a ModelContext,
    params: &'a RequestParams,
    today: NaiveDate,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        config: &'a EnviaConfig,
        ctx: &'a ModelContext,
        params: &'a RequestParams,
        today: NaiveDate,
    ) -> Self {
        Self { config, ctx, params, today }
    }

    pub fn build(&self, job: Job) -> Result<XmlNode> {
        let mut root = XmlNode::new(job.as_str());
        for node in job.nodes(self.config.api_version) {
            self.add_node(&mut root, job, node)?;
        }
        Ok(root)
    }

    pub fn build_xml(&self, job: Job) -> Result<String> {
        Ok(self.build(job)?.to_xml(false)?)
    }

    fn contract(&self) -> Result<&'a Contract> {
        self.ctx
            .contract
            .as_ref()
            .ok_or_else(|| EnviaError::XmlCreation("No contract given".to_string()))
    }

    fn modem(&self) -> Result<&'a Modem> {
        self.ctx
            .modem
            .as_ref()
            .ok_or_else(|| EnviaError::XmlCreation("No modem given".to_string()))
    }

    fn phonenumber(&self) -> Result<&'a Phonenumber> {
        self.ctx
            .phonenumber
            .as_ref()
            .ok_or_else(|| EnviaError::XmlCreation("No phonenumber given".to_string()))
    }

    fn management(&self) -> Result<&'a PhonenumberManagement> {
        self.ctx
            .management
            .as_ref()
            .ok_or_else(|| EnviaError::XmlCreation("No phonenumbermanagement given".to_string()))
    }

    fn add_node(&self, root: &mut XmlNode, job: Job, node: Node) -> Result<()> {
        match node {
            Node::ResellerIdentifier => {
                let reseller = root.child(node.as_str());
                reseller.leaf("username", self.config.reseller_username.as_str());
                reseller.leaf("password", self.config.reseller_password.as_str());
            }
            Node::OrderIdentifier => {
                let order_id = self.params.order_id.as_deref().unwrap_or("");
                if !is_numeric(order_id) {
                    return Err(EnviaError::InvalidArgument("order_id has to be numeric".to_string()));
                }
                root.child(node.as_str()).leaf("orderid", order_id);
            }
            Node::FilterData => self.filter_data(root.child(node.as_str()))?,
            Node::CustomerIdentifier => {
                let contract = self.contract()?;
                let identifier = root.child(node.as_str());
                identifier.leaf("customerno", contract.number.as_str());
                if let Some(reference) = contract.customer_external_id.as_deref().filter(|r| !r.is_empty()) {
                    identifier.leaf("customerreference", reference);
                }
            }
            Node::CustomerData => {
                add_fields(root.child(node.as_str()), PERSON_FIELDS, self.contract()?);
            }
            Node::InstallationAddressData => {
                let parent = match job {
                    Job::ContractRelocate => Node::ContractRelocationData,
                    _ => Node::ContractData,
                };
                let modem = self.modem()?;
                let parent = root.find_mut(parent.as_str()).ok_or_else(|| {
                    EnviaError::XmlCreation(format!("{} needs {}", node.as_str(), parent.as_str()))
                })?;
                add_fields(parent.child(node.as_str()), PERSON_FIELDS, modem);
            }
            Node::ContractData => self.contract_data(root.child(node.as_str()))?,
            Node::TariffData => {
                let contract = self.contract()?;
                let tariff = required_tariff(contract.phonetariff_sale_next.as_deref(), "next_voip_id", contract.id)?;
                let first_of_next_month = self
                    .today
                    .with_day(1)
                    .and_then(|d| d.checked_add_months(Months::new(1)))
                    .unwrap_or(self.today);

                let data = root.child(node.as_str());
                data.leaf("orderdate", first_of_next_month.format("%Y-%m-%d").to_string());
                data.leaf("tariff", tariff);
            }
            Node::VariationData => {
                let contract = self.contract()?;
                let variation = required_tariff(
                    contract.phonetariff_purchase_next.as_deref(),
                    "next_purchase_tariff",
                    contract.id,
                )?;
                root.child(node.as_str()).leaf("variation_id", variation);
            }
            Node::SubscriberData => {
                // only needed to port a number away from its current owner
                let management = self.management()?;
                if management.porting_in {
                    add_fields(root.child(node.as_str()), SUBSCRIBER_FIELDS, management);
                }
            }
            Node::AccountData => {
                let management = self.management()?;
                let data = root.child(node.as_str());
                add_fields(data, ACCOUNT_FIELDS, management);
                self.callnumber_single_data(data.child("callnumbers").child("callnumber_single_data"))?;
            }
            Node::CallnumberData => {
                let management = self.management()?;
                let data = root.child(node.as_str());
                data.leaf("orderdate", self.today.format("%Y-%m-%d").to_string());
                data.leaf("trc_class", management.trc_class.clone().unwrap_or_default());
                self.sip_data(data.child("method"))?;
            }
            Node::CallnumberIdentifier => {
                add_fields(root.child(node.as_str()), CALLNUMBER_FIELDS, self.phonenumber()?);
            }
            Node::AccountterminationData => self.accounttermination_data(root.child(node.as_str()))?,
            Node::BlacklistData => {
                let direction = self.params.direction.as_deref().unwrap_or("").to_lowercase();
                if direction != "in" && direction != "out" {
                    return Err(EnviaError::UnexpectedValue(
                        "direction has to be in [in|out]".to_string(),
                    ));
                }
                root.child(node.as_str()).leaf("direction", direction);
            }
            Node::ContractIdentifier => {
                let modem = self.modem()?;
                add_value(root.child(node.as_str()), "contractreference", modem.contract_external_id.clone());
            }
            Node::ContractRelocationData => {
                let modem = self.modem()?;
                let date = modem.installation_address_change_date.ok_or_else(|| {
                    EnviaError::InvalidArgument("Date of installation address change has to be set.".to_string())
                })?;

                let data = root.child(node.as_str());
                data.leaf("orderdate", date.format("%Y-%m-%d").to_string());
                add_fields(data.child(Node::InstallationAddressData.as_str()), PERSON_FIELDS, modem);
                // 1.4 only, dropped again in 1.5
                if self.config.api_version == API_1_4 {
                    data.leaf("apply_to_customer", "0");
                }
            }
            Node::AttachmentData => self.attachment_data(root.child(node.as_str()))?,
            Node::PhonebookentryData => {
                let entry = self.ctx.phonebook_entry.as_ref().ok_or_else(|| {
                    EnviaError::XmlCreation("No phonebookentry given".to_string())
                })?;
                add_fields(root.child(node.as_str()), PHONEBOOKENTRY_FIELDS, entry);
            }
        }
        Ok(())
    }

    fn filter_data(&self, data: &mut XmlNode) -> Result<()> {
        // the API rejects a filter without any localareacode element
        let Some(localareacode) = self.params.localareacode.as_deref() else {
            data.push(XmlNode::new("localareacode"));
            return Ok(());
        };
        if !is_numeric(localareacode) {
            return Err(EnviaError::InvalidArgument("localareacode has to be numeric".to_string()));
        }
        data.leaf("localareacode", localareacode);

        if let Some(baseno) = self.params.baseno.as_deref() {
            if !is_numeric(baseno) {
                return Err(EnviaError::InvalidArgument("baseno has to be numeric".to_string()));
            }
            data.leaf("baseno", baseno);
        }
        Ok(())
    }

    fn contract_data(&self, data: &mut XmlNode) -> Result<()> {
        let contract = self.contract()?;

        let tariff = required_tariff(contract.phonetariff_sale_next.as_deref(), "next_voip_id", contract.id)?;
        let variation = required_tariff(
            contract.phonetariff_purchase_next.as_deref(),
            "next_purchase_tariff",
            contract.id,
        )?;

        // no costs arise before phone numbers are added
        data.leaf("orderdate", self.today.format("%Y-%m-%d").to_string());
        data.leaf("variation_id", variation);
        data.leaf("tariff", tariff);
        for (tag, value) in defaults(&data.name) {
            data.leaf(*tag, *value);
        }
        Ok(())
    }

    fn callnumber_single_data(&self, data: &mut XmlNode) -> Result<()> {
        let management = self.management()?;
        add_fields(data, CALLNUMBER_FIELDS, self.phonenumber()?);
        data.leaf("trc_class", management.trc_class.clone().unwrap_or_default());

        let carrier_in = management.carrier_in.as_deref().unwrap_or("");
        let version = self.config.api_version;
        if management.porting_in {
            if !is_valid_carrier_code(carrier_in) {
                return Err(EnviaError::InvalidArgument(format!(
                    "{} is not a valid carrier_code",
                    carrier_in
                )));
            }
            data.leaf("carriercode", carrier_in);
        } else if version >= API_1_4 {
            if carrier_in != ENVIA_CARRIER_CODE {
                return Err(EnviaError::InvalidArgument(format!(
                    "If no incoming porting: Carriercode has to be {} (EnviaTEL)",
                    ENVIA_CARRIER_CODE
                )));
            }
            data.leaf("carriercode", ENVIA_CARRIER_CODE);
        }

        if version >= API_1_4 && management.porting_in {
            data.leaf("ekp_code", management.ekp_in.clone().unwrap_or_default());
        }

        self.sip_data(data.child("method"))
    }

    fn sip_data(&self, method: &mut XmlNode) -> Result<()> {
        let phonenumber = self.phonenumber()?;
        let sip = method.child("sip_data");
        add_value(sip, "username", phonenumber.username.clone());
        add_value(sip, "password", phonenumber.password.clone());
        // a nil sipdomain is rejected by the API
        if let Some(domain) = phonenumber.sipdomain.as_deref().filter(|d| !d.is_empty()) {
            sip.leaf("sipdomain", domain);
        }
        Ok(())
    }

    fn accounttermination_data(&self, data: &mut XmlNode) -> Result<()> {
        let management = self.management()?;
        add_value(data, "orderdate", management.field("deactivation_date"));

        if management.porting_out {
            let carrier_out = management.carrier_out.as_deref().unwrap_or("");
            if !is_valid_carrier_code(carrier_out) {
                return Err(EnviaError::InvalidArgument(format!(
                    "{} is not a valid carrier_code",
                    carrier_out
                )));
            }
            data.leaf("carriercode", carrier_out);
        } else {
            data.push(XmlNode::new("carriercode"));
        }
        Ok(())
    }

    fn attachment_data(&self, data: &mut XmlNode) -> Result<()> {
        let attachment = self.ctx.attachment.as_ref().ok_or_else(|| {
            EnviaError::InvalidArgument("enviaorderdocument_id has to be given".to_string())
        })?;
        let order_id = self.params.order_id.as_deref().unwrap_or("");

        if attachment.order.orderid != order_id {
            return Err(EnviaError::InvalidArgument(format!(
                "Given order_id ({}) not correct for given enviaorderdocument",
                order_id
            )));
        }
        if attachment.document.upload_order_id.is_some() {
            return Err(EnviaError::InvalidArgument(
                "Given document has already been uploaded".to_string(),
            ));
        }

        data.leaf("contenttype", attachment.document.mime_type.as_str());
        data.leaf("documenttype", attachment.document.document_type.as_str());
        data.leaf("content", BASE64.encode(&attachment.content));
        Ok(())
    }
}

fn required_tariff<'v>(value: Option<&'v str>, name: &str, contract_id: ContractId) -> Result<&'v str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EnviaError::XmlCreation(format!("{} not set in contract {}", name, contract_id)))
}

/// Indented copy of a document, reseller credentials masked when asked
pub fn prettify(xml: &str, hide_credentials: bool) -> Result<String> {
    let mut root = XmlNode::parse(xml)?;
    if hide_credentials {
        mask_credentials(&mut root);
    }
    Ok(root.to_xml(true)?)
}

fn mask_credentials(node: &mut XmlNode) {
    if node.name == "reseller_identifier" {
        for child in node.children.iter_mut() {
            if child.name == "username" || child.name == "password" {
                child.text = Some(HIDDEN.to_string());
            }
        }
    }
    for child in node.children.iter_mut() {
        mask_credentials(child);
    }
}
