//! Locale dependent formatting and file name sanitizing

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Only affects date and number formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    De,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "de" => Ok(Self::De),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported locale: {}", other)),
        }
    }
}

impl Locale {
    /// `d-m-Y` for German, `Y-m-d` otherwise
    pub fn date(&self, date: NaiveDate) -> String {
        match self {
            Self::De => date.format("%d-%m-%Y").to_string(),
            Self::En => date.format("%Y-%m-%d").to_string(),
        }
    }

    /// Two decimals with thousands grouping, `1.234,56` or `1,234.56`
    pub fn amount(&self, value: Decimal) -> String {
        let (decimal_sep, thousands_sep) = match self {
            Self::De => (',', '.'),
            Self::En => ('.', ','),
        };

        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let plain = format!("{:.2}", rounded.abs());
        let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

        let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
        for (i, digit) in int_part.chars().enumerate() {
            if i > 0 && (int_part.len() - i) % 3 == 0 {
                grouped.push(thousands_sep);
            }
            grouped.push(digit);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
        format!("{}{}{}{}", sign, grouped, decimal_sep, frac_part)
    }

    /// Label of the remittance information line
    pub fn month_label(&self) -> &'static str {
        match self {
            Self::De => "Monat",
            Self::En => "Month",
        }
    }
}

/// Spaces become underscores, then everything outside `[a-zA-Z0-9./_-]`
/// is dropped
pub fn sanitize_path(path: &str) -> String {
    path.replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '_' | '-'))
        .collect()
}
