//! IBAN checks and BIC lookup

use std::path::Path;
use tracing::{debug, warn};

/// Length of the national bank code inside the BBAN, per country
fn bank_code_len(country: &str) -> Option<usize> {
    match country {
        "DE" => Some(8),
        "AT" => Some(5),
        "CH" | "LI" => Some(5),
        "NL" => Some(4),
        "BE" => Some(3),
        "LU" => Some(3),
        "FR" | "MC" => Some(10),
        "IT" | "SM" => Some(11),
        "ES" => Some(8),
        "PL" => Some(8),
        "CZ" | "SK" => Some(4),
        "DK" | "FI" => Some(4),
        "GB" | "IE" => Some(10),
        _ => None,
    }
}

/// Parsed IBAN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iban {
    normalized: String,
}

impl Iban {
    /// Uppercases and strips spaces; `None` unless the checksum holds
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        is_valid_iban(&normalized).then_some(Self { normalized })
    }

    pub fn country(&self) -> &str {
        &self.normalized[..2]
    }

    /// National bank code, when the country layout is known
    pub fn bank(&self) -> Option<&str> {
        let len = bank_code_len(self.country())?;
        self.normalized.get(4..4 + len)
    }
}

/// ISO 13616 mod-97 check
pub fn is_valid_iban(raw: &str) -> bool {
    let iban: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if iban.len() < 15 || iban.len() > 34 || !iban.is_ascii() {
        return false;
    }
    let bytes = iban.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_alphabetic) || !bytes[2..4].iter().all(u8::is_ascii_digit) {
        return false;
    }

    let rearranged = iban[4..].chars().chain(iban[..4].chars());
    let mut remainder: u32 = 0;
    for c in rearranged {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            'A'..='Z' => c as u32 - 'A' as u32 + 10,
            _ => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder == 1
}

/// BIC of the bank behind `iban`, read from `config_dir/bic_{country}.csv`.
///
/// Column four of the first line containing the bank code. Empty when the
/// table is missing or has no matching line.
pub async fn bic_for_iban(iban: &str, config_dir: &Path) -> String {
    let Some(iban) = Iban::parse(iban) else {
        warn!("Cannot derive BIC from invalid IBAN");
        return String::new();
    };
    let Some(bank) = iban.bank() else {
        debug!(country = iban.country(), "No bank code layout for country");
        return String::new();
    };

    let file = config_dir.join(format!("bic_{}.csv", iban.country().to_lowercase()));
    let data = match tokio::fs::read_to_string(&file).await {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %file.display(), error = %e, "BIC table not available");
            return String::new();
        }
    };

    data.lines()
        .find(|line| line.contains(bank))
        .and_then(|line| line.split(',').nth(3))
        .map(|bic| bic.trim().to_string())
        .unwrap_or_default()
}
