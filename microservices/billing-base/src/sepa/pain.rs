//! SEPA pain XML documents
//!
//! Direct debits are written as `pain.008.003.02`, credit transfers as
//! `pain.001.002.03`.

use chrono::{DateTime, NaiveDate, Utc};
use nms_core::XmlNode;
use rust_decimal::Decimal;
use serde::Serialize;

use super::SequenceType;

const DIRECT_DEBIT_NS: &str = "urn:iso:std:iso:20022:tech:xsd:pain.008.003.02";
const CREDIT_TRANSFER_NS: &str = "urn:iso:std:iso:20022:tech:xsd:pain.001.002.03";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// One collection from a debtor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectDebit {
    pub end_to_end_id: String,
    pub amount: Decimal,
    pub debtor_iban: String,
    pub debtor_bic: String,
    pub debtor_name: String,
    pub mandate_id: String,
    pub mandate_sign_date: NaiveDate,
    pub remittance_information: String,
}

/// One payout to a creditor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditTransfer {
    pub amount: Decimal,
    pub creditor_iban: String,
    pub creditor_bic: String,
    pub creditor_name: String,
    pub remittance_information: String,
}

/// Our side of the transfers
#[derive(Debug, Clone)]
pub struct Party<'a> {
    pub name: &'a str,
    pub iban: &'a str,
    pub bic: &'a str,
}

/// Payment information block of a direct debit document
#[derive(Debug, Clone)]
pub struct DebitBatch<'a> {
    pub payment_id: String,
    pub sequence: SequenceType,
    pub collection_date: NaiveDate,
    pub debits: &'a [DirectDebit],
}

fn amount(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

fn control_sum<'a>(amounts: impl Iterator<Item = &'a Decimal>) -> Decimal {
    amounts.copied().sum()
}

fn group_header(root: &mut XmlNode, msg_id: &str, created: DateTime<Utc>, count: usize, sum: Decimal, initiator: &str) {
    let header = root.child("GrpHdr");
    header.leaf("MsgId", msg_id);
    header.leaf("CreDtTm", created.format("%Y-%m-%dT%H:%M:%S").to_string());
    header.leaf("NbOfTxs", count.to_string());
    header.leaf("CtrlSum", amount(sum));
    header.child("InitgPty").leaf("Nm", initiator);
}

fn account(node: &mut XmlNode, tag: &str, iban: &str) {
    node.child(tag).child("Id").leaf("IBAN", iban);
}

fn agent(node: &mut XmlNode, tag: &str, bic: &str) {
    let institution = node.child(tag).child("FinInstnId");
    if bic.is_empty() {
        institution.child("Othr").leaf("Id", "NOTPROVIDED");
    } else {
        institution.leaf("BIC", bic);
    }
}

/// Direct debit initiation with one payment information block per batch
pub fn direct_debit_document(
    msg_id: &str,
    created: DateTime<Utc>,
    creditor: &Party<'_>,
    creditor_id: &str,
    currency: &str,
    batches: &[DebitBatch<'_>],
) -> XmlNode {
    let mut document = XmlNode::new("Document")
        .attr("xmlns", DIRECT_DEBIT_NS)
        .attr("xmlns:xsi", XSI_NS);
    let root = document.child("CstmrDrctDbtInitn");

    let count = batches.iter().map(|b| b.debits.len()).sum();
    let sum = control_sum(batches.iter().flat_map(|b| b.debits.iter().map(|d| &d.amount)));
    group_header(root, msg_id, created, count, sum, creditor.name);

    for batch in batches {
        let info = root.child("PmtInf");
        info.leaf("PmtInfId", batch.payment_id.as_str());
        info.leaf("PmtMtd", "DD");
        info.leaf("NbOfTxs", batch.debits.len().to_string());
        info.leaf("CtrlSum", amount(control_sum(batch.debits.iter().map(|d| &d.amount))));

        let type_info = info.child("PmtTpInf");
        type_info.child("SvcLvl").leaf("Cd", "SEPA");
        type_info.child("LclInstrm").leaf("Cd", "CORE");
        type_info.leaf("SeqTp", batch.sequence.code());

        info.leaf("ReqdColltnDt", batch.collection_date.format("%Y-%m-%d").to_string());
        info.child("Cdtr").leaf("Nm", creditor.name);
        account(info, "CdtrAcct", creditor.iban);
        agent(info, "CdtrAgt", creditor.bic);
        info.leaf("ChrgBr", "SLEV");

        let scheme = info.child("CdtrSchmeId").child("Id").child("PrvtId").child("Othr");
        scheme.leaf("Id", creditor_id);
        scheme.child("SchmeNm").leaf("Prtry", "SEPA");

        for debit in batch.debits {
            let tx = info.child("DrctDbtTxInf");
            tx.child("PmtId").leaf("EndToEndId", debit.end_to_end_id.as_str());
            tx.leaf("InstdAmt", amount(debit.amount)).set_attribute("Ccy", currency);

            let mandate = tx.child("DrctDbtTx").child("MndtRltdInf");
            mandate.leaf("MndtId", debit.mandate_id.as_str());
            mandate.leaf("DtOfSgntr", debit.mandate_sign_date.format("%Y-%m-%d").to_string());

            agent(tx, "DbtrAgt", &debit.debtor_bic);
            tx.child("Dbtr").leaf("Nm", debit.debtor_name.as_str());
            account(tx, "DbtrAcct", &debit.debtor_iban);
            tx.child("RmtInf").leaf("Ustrd", debit.remittance_information.as_str());
        }
    }

    document
}

/// Credit transfer initiation with a single payment information block
pub fn credit_transfer_document(
    msg_id: &str,
    created: DateTime<Utc>,
    execution_date: NaiveDate,
    debtor: &Party<'_>,
    currency: &str,
    credits: &[CreditTransfer],
) -> XmlNode {
    let mut document = XmlNode::new("Document")
        .attr("xmlns", CREDIT_TRANSFER_NS)
        .attr("xmlns:xsi", XSI_NS);
    let root = document.child("CstmrCdtTrfInitn");

    let sum = control_sum(credits.iter().map(|c| &c.amount));
    group_header(root, msg_id, created, credits.len(), sum, debtor.name);

    let info = root.child("PmtInf");
    info.leaf("PmtInfId", msg_id);
    info.leaf("PmtMtd", "TRF");
    info.leaf("BtchBookg", "true");
    info.leaf("NbOfTxs", credits.len().to_string());
    info.leaf("CtrlSum", amount(sum));
    info.child("PmtTpInf").child("SvcLvl").leaf("Cd", "SEPA");
    info.leaf("ReqdExctnDt", execution_date.format("%Y-%m-%d").to_string());
    info.child("Dbtr").leaf("Nm", debtor.name);
    account(info, "DbtrAcct", debtor.iban);
    agent(info, "DbtrAgt", debtor.bic);
    info.leaf("ChrgBr", "SLEV");

    for credit in credits {
        let tx = info.child("CdtTrfTxInf");
        tx.child("PmtId").leaf("EndToEndId", "NOTPROVIDED");
        tx.child("Amt")
            .leaf("InstdAmt", amount(credit.amount))
            .set_attribute("Ccy", currency);
        agent(tx, "CdtrAgt", &credit.creditor_bic);
        tx.child("Cdtr").leaf("Nm", credit.creditor_name.as_str());
        account(tx, "CdtrAcct", &credit.creditor_iban);
        tx.child("RmtInf").leaf("Ustrd", credit.remittance_information.as_str());
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn creditor() -> Party<'static> {
        Party {
            name: "ISP GmbH",
            iban: "DE89370400440532013000",
            bic: "COBADEFFXXX",
        }
    }

    fn debit(amount: Decimal) -> DirectDebit {
        DirectDebit {
            end_to_end_id: "RG 2024/1/100000".to_string(),
            amount,
            debtor_iban: "DE02120300000000202051".to_string(),
            debtor_bic: String::new(),
            debtor_name: "Erika Mustermann".to_string(),
            mandate_id: "M-1".to_string(),
            mandate_sign_date: NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            remittance_information: "Monat 03/2024".to_string(),
        }
    }

    #[test]
    fn test_direct_debit_totals() {
        let created = Utc.with_ymd_and_hms(2024, 4, 2, 10, 30, 0).unwrap();
        let first = [debit(dec!(10.5))];
        let recurring = [debit(dec!(20)), debit(dec!(1.25))];
        let date = NaiveDate::from_ymd_opt(2024, 4, 15).unwrap();
        let batches = [
            DebitBatch { payment_id: "X1FRST".into(), sequence: SequenceType::First, collection_date: date, debits: &first },
            DebitBatch { payment_id: "X1RCUR".into(), sequence: SequenceType::Recurring, collection_date: date, debits: &recurring },
        ];

        let doc = direct_debit_document("X1", created, &creditor(), "DE98ZZZ09999999999", "EUR", &batches);
        let root = doc.find("CstmrDrctDbtInitn").unwrap();
        assert_eq!(root.path("GrpHdr/NbOfTxs").unwrap().text(), "3");
        assert_eq!(root.path("GrpHdr/CtrlSum").unwrap().text(), "31.75");
        assert_eq!(root.descendants("PmtInf").len(), 2);
        assert_eq!(root.descendants("SeqTp")[1].text(), "RCUR");

        let amount = root.descendants("InstdAmt")[0];
        assert_eq!(amount.text(), "10.50");
        assert_eq!(amount.attribute("Ccy"), Some("EUR"));

        let xml = doc.to_xml(true).unwrap();
        assert!(xml.contains("pain.008.003.02"));
        assert!(xml.contains("<Id>NOTPROVIDED</Id>"));
    }

    #[test]
    fn test_credit_transfer() {
        let created = Utc.with_ymd_and_hms(2024, 4, 2, 10, 30, 0).unwrap();
        let credits = [CreditTransfer {
            amount: dec!(5),
            creditor_iban: "DE02120300000000202051".to_string(),
            creditor_bic: "BYLADEM1001".to_string(),
            creditor_name: "Max Mustermann".to_string(),
            remittance_information: "Month 03/2024".to_string(),
        }];

        let doc = credit_transfer_document(
            "20240402103000C",
            created,
            created.date_naive(),
            &creditor(),
            "EUR",
            &credits,
        );
        assert!(doc.to_xml(false).unwrap().contains("pain.001.002.03"));
        assert_eq!(doc.path("CstmrCdtTrfInitn/PmtInf/CtrlSum").unwrap().text(), "5.00");
        assert_eq!(doc.descendants("Ustrd")[0].text(), "Month 03/2024");
    }
}
