//! Per-account record collection and billing file output

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::format::{sanitize_path, Locale};
use super::pain::{self, CreditTransfer, DebitBatch, DirectDebit, Party};
use super::records::{self, Record};
use super::{BillingItem, Charge, ContractInfo, SepaAccount, SepaMandate, SequenceType};
use crate::error::Result;

/// Settings shared by all accounts of one billing run
#[derive(Debug, Clone)]
pub struct BillingRun {
    /// Root directory of the run's output
    pub dir: PathBuf,
    /// Requested collection date
    pub rcd: NaiveDate,
    pub locale: Locale,
    pub currency: String,
    /// One direct debit document per sequence type
    pub split: bool,
    pub last_run: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub invoice_nr_start: u64,
}

impl BillingRun {
    /// Remittance line naming the month before the run
    fn remittance_information(&self) -> String {
        let first_of_month = self.now.date_naive().with_day(1).unwrap_or(self.now.date_naive());
        let last_month = first_of_month
            .checked_sub_months(Months::new(1))
            .unwrap_or(first_of_month);
        format!("{} {}", self.locale.month_label(), last_month.format("%m/%Y"))
    }

    fn today(&self) -> String {
        self.locale.date(self.now.date_naive())
    }

    /// `YmdHis` of the run, prefix of every SEPA message id
    fn timestamp(&self) -> String {
        self.now.format("%Y%m%d%H%M%S").to_string()
    }
}

/// Call charges of a contract
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CdrCharge {
    pub charge: Decimal,
    pub count: u32,
}

/// Everything a billing run bills for one contract on this account
#[derive(Debug, Clone, Deserialize)]
pub struct ContractBilling {
    pub contract: ContractInfo,
    #[serde(default)]
    pub mandate: Option<SepaMandate>,
    #[serde(default)]
    pub items: Vec<BillingItem>,
    #[serde(default)]
    pub cdr: Option<CdrCharge>,
    pub charge: Charge,
}

/// Which accounting file a record lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum AccountingKind {
    Tariff,
    Item,
}

impl AccountingKind {
    fn key(&self) -> &'static str {
        match self {
            Self::Tariff => "tariff",
            Self::Item => "item",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BookingKind {
    Sepa,
    NoSepa,
}

impl BookingKind {
    fn key(&self) -> &'static str {
        match self {
            Self::Sepa => "sepa",
            Self::NoSepa => "no_sepa",
        }
    }
}

/// Records and transfers one SEPA account collects during a billing run
#[derive(Debug)]
pub struct AccountBilling {
    account: SepaAccount,
    run: BillingRun,
    invoice_nr: u64,
    invoice_nr_prefix: String,
    accounting: BTreeMap<AccountingKind, Vec<Record>>,
    booking: BTreeMap<BookingKind, Vec<Record>>,
    debits: BTreeMap<SequenceType, Vec<DirectDebit>>,
    credits: Vec<CreditTransfer>,
}

impl AccountBilling {
    pub fn new(account: SepaAccount, run: BillingRun) -> Self {
        Self {
            invoice_nr: run.invoice_nr_start,
            invoice_nr_prefix: format!("{}/", run.now.year()),
            account,
            run,
            accounting: BTreeMap::new(),
            booking: BTreeMap::new(),
            debits: BTreeMap::new(),
            credits: Vec::new(),
        }
    }

    pub fn account(&self) -> &SepaAccount {
        &self.account
    }

    /// `YYYY/{account id}/{counter}`
    pub fn invoice_nr(&self) -> String {
        format!("{}{}/{}", self.invoice_nr_prefix, self.account.id, self.invoice_nr)
    }

    /// Move on to the next contract's invoice
    pub fn next_invoice(&mut self) {
        self.invoice_nr += 1;
    }

    fn accounting_record(&self, contract: &ContractInfo, count: u32, description: &str, price: Decimal) -> Record {
        Record::new()
            .field("Contractnr", contract.number.as_str())
            .field("Invoicenr", self.invoice_nr())
            .field("Target Month", self.run.now.format("%m").to_string())
            .field("Date", self.run.today())
            .field("Cost Center", contract.costcenter.clone().unwrap_or_default())
            .field("Count", count.to_string())
            .field("Description", description)
            .field("Price", self.run.locale.amount(price))
            .field("Firstname", contract.firstname.as_str())
            .field("Lastname", contract.lastname.as_str())
            .field("Street", contract.street.as_str())
            .field("Zip", contract.zip.as_str())
            .field("City", contract.city.as_str())
    }

    /// Internet, TV and VoIP products go to the tariff file, the rest to
    /// the item file
    pub fn add_accounting_record(&mut self, contract: &ContractInfo, item: &BillingItem) {
        let record = self.accounting_record(contract, item.count, &item.description, item.charge);
        let kind = if item.product_type.is_tariff() {
            AccountingKind::Tariff
        } else {
            AccountingKind::Item
        };
        self.accounting.entry(kind).or_default().push(record);
    }

    /// Call charges of a contract, billed as a tariff
    pub fn add_cdr_accounting_record(&mut self, contract: &ContractInfo, charge: Decimal, count: u32) {
        let record = self.accounting_record(contract, count, "Telephone Calls", charge);
        self.accounting
            .entry(AccountingKind::Tariff)
            .or_default()
            .push(record);
    }

    /// Totals of a contract; mandate columns are appended when it has one
    pub fn add_booking_record(&mut self, contract: &ContractInfo, mandate: Option<&SepaMandate>, charge: &Charge) {
        let locale = self.run.locale;
        let mut record = Record::new()
            .field("Contractnr", contract.number.as_str())
            .field("Invoicenr", self.invoice_nr())
            .field("Date", self.run.today())
            .field("RCD", locale.date(self.run.rcd))
            .field("Cost Center", contract.costcenter.clone().unwrap_or_default())
            .field("Description", "")
            .field("Net", locale.amount(charge.net))
            .field("Tax", format!("{} %", locale.amount(charge.tax)))
            .field("Gross", locale.amount(charge.gross()))
            .field("Currency", self.run.currency.as_str())
            .field("Firstname", contract.firstname.as_str())
            .field("Lastname", contract.lastname.as_str())
            .field("Street", contract.street.as_str())
            .field("Zip", contract.zip.as_str())
            .field("City", contract.city.as_str());

        let kind = match mandate {
            Some(mandate) => {
                record = record
                    .field("Account Holder", mandate.holder.as_str())
                    .field("IBAN", mandate.iban.as_str())
                    .field("BIC", mandate.bic.as_str())
                    .field("MandateID", mandate.reference.as_str())
                    .field("MandateDate", locale.date(mandate.signature_date));
                BookingKind::Sepa
            }
            None => BookingKind::NoSepa,
        };
        self.booking.entry(kind).or_default().push(record);
    }

    /// Negative charges are paid out as credits, positive ones collected
    /// as debits of the mandate's sequence type. Zero is skipped.
    pub fn add_sepa_transfer(&mut self, mandate: &SepaMandate, charge: Decimal, contract_expires: bool) {
        let info = self.run.remittance_information();

        if charge.is_zero() {
            return;
        }

        if charge.is_sign_negative() {
            self.credits.push(CreditTransfer {
                amount: -charge,
                creditor_iban: mandate.iban.clone(),
                creditor_bic: mandate.bic.clone(),
                creditor_name: mandate.holder.clone(),
                remittance_information: info,
            });
            return;
        }

        let sequence = SequenceType::for_mandate(mandate, contract_expires, self.run.last_run, self.run.now);
        debug!(mandate = %mandate.reference, sequence = %sequence, "Queued direct debit");

        let end_to_end_id = format!("RG {}", self.invoice_nr());
        self.debits.entry(sequence).or_default().push(DirectDebit {
            end_to_end_id,
            amount: charge,
            debtor_iban: mandate.iban.clone(),
            debtor_bic: mandate.bic.clone(),
            debtor_name: mandate.holder.clone(),
            mandate_id: mandate.reference.clone(),
            mandate_sign_date: mandate.signature_date,
            remittance_information: info,
        });
    }

    /// Records and transfer of one contract under its own invoice number
    pub fn add_contract(&mut self, entry: &ContractBilling) {
        for item in &entry.items {
            self.add_accounting_record(&entry.contract, item);
        }
        if let Some(cdr) = entry.cdr {
            self.add_cdr_accounting_record(&entry.contract, cdr.charge, cdr.count);
        }
        self.add_booking_record(&entry.contract, entry.mandate.as_ref(), &entry.charge);
        if let Some(mandate) = &entry.mandate {
            self.add_sepa_transfer(mandate, entry.charge.gross(), entry.contract.expires);
        }
        self.next_invoice();
    }

    #[cfg(test)]
    pub fn accounting_records(&self) -> impl Iterator<Item = &Record> {
        self.accounting.values().flatten()
    }

    #[cfg(test)]
    pub fn booking_records(&self) -> impl Iterator<Item = &Record> {
        self.booking.values().flatten()
    }

    #[cfg(test)]
    pub fn debits(&self, sequence: SequenceType) -> &[DirectDebit] {
        self.debits.get(&sequence).map(Vec::as_slice).unwrap_or(&[])
    }

    #[cfg(test)]
    pub fn credits(&self) -> &[CreditTransfer] {
        &self.credits
    }

    fn msg_id(&self) -> String {
        format!("{}{}", self.run.timestamp(), self.account.id)
    }

    fn party(&self) -> Party<'_> {
        Party {
            name: &self.account.name,
            iban: &self.account.iban,
            bic: &self.account.bic,
        }
    }

    /// Path of a file of this account below the run directory
    fn output_path(&self, file: &str) -> PathBuf {
        let relative = sanitize_path(&format!("{}/{}", self.account.name, file));
        self.run.dir.join(relative)
    }

    async fn store(&self, what: &str, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        info!("Successfully stored {} in {}", what, path.display());
        Ok(())
    }

    /// Write every non-empty bucket and return the written paths
    pub async fn make_billing_files(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        for (kind, records) in &self.accounting {
            if records.is_empty() {
                continue;
            }
            let path = self.output_path(&format!("accounting_{}_records.txt", kind.key()));
            self.store(&format!("accounting {} records", kind.key()), &path, records::render(records)?)
                .await?;
            written.push(path);
        }

        for (kind, records) in &self.booking {
            if records.is_empty() {
                continue;
            }
            let path = self.output_path(&format!("booking_{}_records.txt", kind.key()));
            self.store(&format!("booking {} records", kind.key()), &path, records::render(records)?)
                .await?;
            written.push(path);
        }

        if !self.debits.is_empty() {
            written.extend(self.make_debit_files().await?);
        }

        if !self.credits.is_empty() {
            written.push(self.make_credit_file().await?);
        }

        Ok(written)
    }

    async fn make_debit_files(&self) -> Result<Vec<PathBuf>> {
        let msg_id = self.msg_id();
        let party = self.party();
        let mut written = Vec::new();

        if self.run.split {
            for (sequence, debits) in &self.debits {
                let id = format!("{}{}", msg_id, sequence.code());
                let batch = DebitBatch {
                    payment_id: id.clone(),
                    sequence: *sequence,
                    collection_date: self.run.rcd,
                    debits,
                };
                let document = pain::direct_debit_document(
                    &id,
                    self.run.now,
                    &party,
                    &self.account.creditorid,
                    &self.run.currency,
                    std::slice::from_ref(&batch),
                );

                let path = self.output_path(&format!("DD_{}.xml", sequence.code()));
                self.store(&format!("sepa direct debit {} xml", sequence.code()), &path, document.to_xml(true)?)
                    .await?;
                written.push(path);
            }
            return Ok(written);
        }

        let batches: Vec<DebitBatch<'_>> = self
            .debits
            .iter()
            .map(|(sequence, debits)| DebitBatch {
                payment_id: format!("{}{}", msg_id, sequence.code()),
                sequence: *sequence,
                collection_date: self.run.now.date_naive(),
                debits,
            })
            .collect();
        let document = pain::direct_debit_document(
            &msg_id,
            self.run.now,
            &party,
            &self.account.creditorid,
            &self.run.currency,
            &batches,
        );

        let path = self.output_path("DD.xml");
        self.store("sepa direct debit xml", &path, document.to_xml(true)?).await?;
        written.push(path);
        Ok(written)
    }

    async fn make_credit_file(&self) -> Result<PathBuf> {
        let msg_id = format!("{}C", self.msg_id());
        let document = pain::credit_transfer_document(
            &msg_id,
            self.run.now,
            self.run.now.date_naive(),
            &self.party(),
            &self.run.currency,
            &self.credits,
        );

        let path = self.output_path("DC.xml");
        self.store("sepa direct credit xml", &path, document.to_xml(true)?).await?;
        Ok(path)
    }
}
