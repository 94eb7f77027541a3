//! SQL-backed event storage
//!
//! Statements are compiled with `strata-sql`; running them is left to a
//! [`SqlExecutor`], so any driver can sit underneath.

use crate::config::StoreConfig;
use crate::projection::ProjectionFilter;
use crate::store::{EventFilter, EventRow, EventStorage, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use strata_sql::{
    ColumnId, Condition, Dialect, InsertBuilder, OrderBy, QueryBuilder, SqlResult, SqlStatement,
    SqlValue, TableId,
};
use tracing::debug;

/// Column names of the event log table
pub mod columns {
    pub const AGGREGATE_TYPE: &str = "AggregateType";
    pub const AGGREGATE_ID: &str = "AggregateId";
    pub const EVENT_TYPE: &str = "EventType";
    pub const BODY: &str = "Body";
    pub const EVENT_ID: &str = "EventId";
    pub const ACTOR_ID: &str = "ActorId";
    pub const OCCURRED_ON: &str = "OccurredOn";
    pub const VERSION: &str = "Version";
    pub const DELETE_ACTION: &str = "DeleteAction";

    /// Insert order
    pub const ALL: [&str; 9] = [
        AGGREGATE_TYPE,
        AGGREGATE_ID,
        EVENT_TYPE,
        BODY,
        EVENT_ID,
        ACTOR_ID,
        OCCURRED_ON,
        VERSION,
        DELETE_ACTION,
    ];
}

/// Runs compiled statements against a database.
///
/// Implementations bind [`SqlStatement::parameters`] by name or position and
/// map result rows of the event log table to [`EventRow`]s.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement that returns no rows; yields the affected row count.
    ///
    /// A unique key violation on `(AggregateType, AggregateId, Version)` must
    /// be reported as [`StorageError::Conflict`], one on `EventId` as
    /// [`StorageError::DuplicateEvent`]. [`SqlEventStorage`] then checks
    /// whether the clashing rows are its own rows from an earlier attempt and
    /// skips them.
    async fn execute(&self, statement: &SqlStatement) -> Result<u64, StorageError>;

    /// Run several statements as one unit; yields the total affected rows.
    ///
    /// Large appends are split into several INSERTs. Drivers should override
    /// this to run them in one transaction; the default runs them in order.
    async fn execute_batch(&self, statements: &[SqlStatement]) -> Result<u64, StorageError> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute(statement).await?;
        }
        Ok(affected)
    }

    /// Run a query over the event log table
    async fn query_events(&self, statement: &SqlStatement) -> Result<Vec<EventRow>, StorageError>;
}

/// Parameters one statement may bind; SQL Server stops at 2100.
pub const MAX_PARAMETERS: usize = 2100;

/// Rows per INSERT so that no statement exceeds [`MAX_PARAMETERS`]
pub const MAX_ROWS_PER_INSERT: usize = MAX_PARAMETERS / columns::ALL.len();

/// Upper bound on stored versions as an SQL value.
///
/// Versions past `i64::MAX` can never be stored, so saturating keeps the bound exact.
pub(crate) fn version_bound(max_version: u64) -> SqlValue {
    SqlValue::Integer(i64::try_from(max_version).unwrap_or(i64::MAX))
}

/// Event storage over an SQL table
pub struct SqlEventStorage<X: SqlExecutor> {
    executor: Arc<X>,
    dialect: Arc<dyn Dialect>,
    table: TableId,
}

impl<X: SqlExecutor> SqlEventStorage<X> {
    /// Create storage from a store configuration
    pub fn new(executor: Arc<X>, config: &StoreConfig) -> SqlResult<Self> {
        Ok(Self {
            executor,
            dialect: config.sql_dialect(),
            table: config.events_table_id()?,
        })
    }

    /// Create storage with an explicit dialect and table
    pub fn with_dialect(executor: Arc<X>, dialect: Arc<dyn Dialect>, table: TableId) -> Self {
        Self {
            executor,
            dialect,
            table,
        }
    }

    pub fn executor(&self) -> &Arc<X> {
        &self.executor
    }

    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    /// INSERTs for the rows, at most [`MAX_ROWS_PER_INSERT`] rows each
    pub fn insert_statements(&self, rows: &[EventRow]) -> Result<Vec<SqlStatement>, StorageError> {
        rows.chunks(MAX_ROWS_PER_INSERT)
            .map(|chunk| self.insert_statement(chunk))
            .collect()
    }

    /// One INSERT for all rows, cells in [`columns::ALL`] order
    pub fn insert_statement(&self, rows: &[EventRow]) -> Result<SqlStatement, StorageError> {
        let mut builder = InsertBuilder::new(self.dialect.clone()).columns(
            columns::ALL
                .iter()
                .map(|name| self.table.column(*name))
                .collect::<SqlResult<Vec<_>>>()?,
        );

        for row in rows {
            let version = i64::try_from(row.version).map_err(|_| {
                StorageError::InvalidRow(format!(
                    "version {} of {} {} does not fit a BIGINT",
                    row.version, row.aggregate_type, row.aggregate_id
                ))
            })?;

            builder = builder.values([
                SqlValue::from(row.aggregate_type.as_str()),
                SqlValue::from(row.aggregate_id.as_str()),
                SqlValue::from(row.event_type.as_str()),
                SqlValue::from(row.body.as_str()),
                SqlValue::from(row.event_id),
                SqlValue::from(row.actor_id.clone()),
                SqlValue::from(row.occurred_on),
                SqlValue::Integer(version),
                SqlValue::from(row.delete_action.as_str()),
            ]);
        }

        Ok(builder.build()?)
    }

    /// SELECT for a filter, ordered by aggregate then version
    pub fn select_statement(&self, filter: &EventFilter) -> SqlResult<SqlStatement> {
        let mut builder = QueryBuilder::new(self.dialect.clone())
            .from(self.table.clone())
            .and_where(Condition::eq(
                ColumnId::new(columns::AGGREGATE_TYPE)?,
                filter.aggregate_type.as_str(),
            ));

        let single = match filter.aggregate_ids.as_deref() {
            Some([id]) => {
                builder = builder.and_where(Condition::eq(
                    ColumnId::new(columns::AGGREGATE_ID)?,
                    id.as_str(),
                ));
                true
            }
            Some(ids) => {
                builder = builder.and_where(Condition::in_list(
                    ColumnId::new(columns::AGGREGATE_ID)?,
                    ids.iter().map(String::as_str),
                ));
                false
            }
            None => false,
        };

        if let Some(max_version) = filter.max_version {
            builder = builder.and_where(Condition::le(
                ColumnId::new(columns::VERSION)?,
                version_bound(max_version),
            ));
        }

        if !single {
            builder = builder.order_by(OrderBy::asc(ColumnId::new(columns::AGGREGATE_ID)?)?);
        }

        builder
            .order_by(OrderBy::asc(ColumnId::new(columns::VERSION)?)?)
            .build()
    }

    /// Rows not yet in the table, after an append clashed with stored rows.
    ///
    /// Stored rows with the same event id, aggregate and version are from an
    /// earlier attempt. Any other clash, or none at all, returns `clash`.
    async fn unstored(
        &self,
        rows: &[EventRow],
        clash: StorageError,
    ) -> Result<Vec<EventRow>, StorageError> {
        let mut ids_by_type: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for row in rows {
            ids_by_type
                .entry(row.aggregate_type.as_str())
                .or_default()
                .insert(row.aggregate_id.as_str());
        }

        let mut stored = HashMap::new();
        for (aggregate_type, ids) in ids_by_type {
            let filter = EventFilter::for_type(aggregate_type).with_ids(ids);
            for existing in self.read(&filter).await? {
                stored.insert(existing.event_id, existing);
            }
        }

        let mut pending = Vec::new();
        for row in rows {
            match stored.get(&row.event_id) {
                Some(existing)
                    if existing.aggregate_type == row.aggregate_type
                        && existing.aggregate_id == row.aggregate_id
                        && existing.version == row.version => {}
                Some(_) => return Err(clash),
                None => pending.push(row.clone()),
            }
        }

        if pending.len() == rows.len() {
            return Err(clash);
        }
        Ok(pending)
    }

    /// Read the events of every aggregate whose projection row matches the filter
    pub async fn read_projected(
        &self,
        aggregate_type: &str,
        projection: &ProjectionFilter,
        max_version: Option<u64>,
    ) -> Result<Vec<EventRow>, StorageError> {
        let statement = projection
            .query(self.dialect.clone(), &self.table, aggregate_type, max_version)?
            .build()?;

        let rows = self.executor.query_events(&statement).await?;
        debug!(
            aggregate_type,
            projection = ?projection.table().name(),
            rows = rows.len(),
            "Read projected events"
        );
        Ok(rows)
    }
}

impl<X: SqlExecutor> Clone for SqlEventStorage<X> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            dialect: self.dialect.clone(),
            table: self.table.clone(),
        }
    }
}

#[async_trait]
impl<X: SqlExecutor> EventStorage for SqlEventStorage<X> {
    async fn append(&self, rows: &[EventRow]) -> Result<(), StorageError> {
        if rows.is_empty() {
            return Ok(());
        }

        let statements = self.insert_statements(rows)?;
        let err = match self.executor.execute_batch(&statements).await {
            Ok(affected) => {
                debug!(rows = rows.len(), statements = statements.len(), affected, "Appended events");
                return Ok(());
            }
            Err(err @ (StorageError::Conflict { .. } | StorageError::DuplicateEvent { .. })) => err,
            Err(err) => return Err(err),
        };

        let pending = self.unstored(rows, err).await?;
        if pending.is_empty() {
            debug!(rows = rows.len(), "Events already stored by an earlier append");
            return Ok(());
        }

        let statements = self.insert_statements(&pending)?;
        let affected = self.executor.execute_batch(&statements).await?;
        debug!(
            rows = pending.len(),
            already_stored = rows.len() - pending.len(),
            affected,
            "Appended remaining events"
        );
        Ok(())
    }

    async fn read(&self, filter: &EventFilter) -> Result<Vec<EventRow>, StorageError> {
        if filter.is_empty_selection() {
            return Ok(Vec::new());
        }

        let statement = self.select_statement(filter)?;
        self.executor.query_events(&statement).await
    }
}
