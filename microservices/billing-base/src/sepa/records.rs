//! Tab separated accounting and booking records

use serde::Serialize;

use crate::error::Result;

/// Ordered label/value pairs of one record line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Record {
    fields: Vec<(&'static str, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, label: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((label, value.into()));
        self
    }

    #[cfg(test)]
    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, v)| v.as_str())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(l, _)| *l)
    }
}

/// Header line from the labels of the first record, then one line per
/// record. Values holding tabs, quotes or line breaks are quoted.
pub fn render(records: &[Record]) -> Result<Vec<u8>> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(first.labels())?;
    for record in records {
        writer.write_record(record.fields.iter().map(|(_, v)| v.as_str()))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}
