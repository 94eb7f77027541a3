//! Projection-filtered loading
//!
//! A projection is a denormalized table with one row per aggregate. Filtering
//! on projection columns and joining back to the event log selects which
//! aggregates to replay without decoding every stream.

use crate::sql::{columns, version_bound};
use std::sync::Arc;
use strata_sql::{ColumnId, Condition, Dialect, Join, OrderBy, QueryBuilder, SqlResult, TableId};

/// Conditions over a projection table, keyed back to the event log by aggregate id
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionFilter {
    table: TableId,
    key: ColumnId,
    conditions: Vec<Condition>,
}

impl ProjectionFilter {
    /// `key_column` is the projection column holding the aggregate id
    pub fn new(table: TableId, key_column: impl Into<String>) -> SqlResult<Self> {
        Ok(Self {
            key: table.column(key_column)?,
            table,
            conditions: Vec::new(),
        })
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    /// A column of the projection table
    pub fn column(&self, name: impl Into<String>) -> SqlResult<ColumnId> {
        self.table.column(name)
    }

    pub fn and_where(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Event rows of `aggregate_type` whose projection row matches, ordered
    /// by aggregate id then version.
    pub fn query(
        &self,
        dialect: Arc<dyn Dialect>,
        events: &TableId,
        aggregate_type: &str,
        max_version: Option<u64>,
    ) -> SqlResult<QueryBuilder> {
        let mut builder = QueryBuilder::new(dialect)
            .from(events.clone())
            .select([events.all_columns()])
            .join(Join::inner(
                events.column(columns::AGGREGATE_ID)?,
                self.key.clone(),
            )?)
            .and_where(Condition::eq(
                events.column(columns::AGGREGATE_TYPE)?,
                aggregate_type,
            ));

        for condition in &self.conditions {
            builder = builder.and_where(condition.clone());
        }

        if let Some(max_version) = max_version {
            builder = builder.and_where(Condition::le(
                events.column(columns::VERSION)?,
                version_bound(max_version),
            ));
        }

        Ok(builder
            .order_by(OrderBy::asc(events.column(columns::AGGREGATE_ID)?)?)
            .order_by(OrderBy::asc(events.column(columns::VERSION)?)?))
    }
}
