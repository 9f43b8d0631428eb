//! PostgreSQL backed number range store

use async_trait::async_trait;
use nms_core::CostCenterId;
use nms_db::{DbError, DbPool, FromSql, Row};
use tracing::warn;

use super::{ContractNumber, CostCenter, NumberRange, NumberRangeStore, NumberRangeType};
use crate::error::Result;

/// Typed column read; a schema mismatch surfaces as a database error
fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name).map_err(|e| DbError::from(e).into())
}

/// Reads `numberrange`, `contract` and `costcenter`
#[derive(Clone)]
pub struct PgNumberRangeStore {
    db: DbPool,
}

impl PgNumberRangeStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn is_healthy(&self) -> bool {
        self.db.is_healthy().await
    }

    fn row_to_range(&self, row: &Row, kind: NumberRangeType) -> Result<Option<NumberRange>> {
        let id: i64 = column(row, "id")?;
        let start: i64 = column(row, "start")?;
        let end: i64 = column(row, "end")?;
        let (Ok(start), Ok(end)) = (u64::try_from(start), u64::try_from(end)) else {
            warn!(range_id = id, start, end, "Skipping number range with negative bounds");
            return Ok(None);
        };

        Ok(Some(NumberRange {
            id,
            name: column(row, "name")?,
            prefix: column::<Option<String>>(row, "prefix")?.unwrap_or_default(),
            suffix: column::<Option<String>>(row, "suffix")?.unwrap_or_default(),
            start,
            end,
            kind,
            costcenter_id: CostCenterId(column(row, "costcenter_id")?),
        }))
    }
}

#[async_trait]
impl NumberRangeStore for PgNumberRangeStore {
    async fn number_ranges(
        &self,
        kind: NumberRangeType,
        costcenter_id: CostCenterId,
    ) -> Result<Vec<NumberRange>> {
        let rows = self
            .db
            .query(
                r#"SELECT id, name, prefix, suffix, start, "end", costcenter_id
                   FROM numberrange
                   WHERE type = $1 AND costcenter_id = $2 AND deleted_at IS NULL
                   ORDER BY id ASC"#,
                &[&kind.as_str(), &costcenter_id.get()],
            )
            .await?;

        let mut ranges = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(range) = self.row_to_range(row, kind)? {
                ranges.push(range);
            }
        }
        Ok(ranges)
    }

    async fn contract_numbers(&self, prefix: &str, suffix: &str) -> Result<Vec<ContractNumber>> {
        let rows = self
            .db
            .query(
                "SELECT number, costcenter_id
                 FROM contract
                 WHERE left(number, char_length($1)) = $1
                   AND right(number, char_length($2)) = $2",
                &[&prefix, &suffix],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<ContractNumber> {
                Ok(ContractNumber {
                    number: column(row, "number")?,
                    costcenter_id: column::<Option<i64>>(row, "costcenter_id")?.map(CostCenterId),
                })
            })
            .collect()
    }

    async fn cost_center(&self, id: CostCenterId) -> Result<Option<CostCenter>> {
        let row = self
            .db
            .query_opt("SELECT id, name FROM costcenter WHERE id = $1", &[&id.get()])
            .await?;

        row.map(|r| -> Result<CostCenter> {
            Ok(CostCenter {
                id: CostCenterId(column(&r, "id")?),
                name: column(&r, "name")?,
            })
        })
        .transpose()
    }
}
