//! SQL statement compilation for Strata
//!
//! Filters over the event log and its projections are expressed as a
//! structural expression tree and compiled to parameterized SQL text for a
//! pluggable [`Dialect`].
//!
//! ## Features
//!
//! - **Expression model** - Tables, columns, conditions, joins, ordering, updates
//! - **Dialects** - Generic, SQL Server and PostgreSQL token sets
//! - **Builders** - SELECT, INSERT, UPDATE and DELETE
//! - **Ordinal parameters** - `p0`, `p1`, ... in encounter order
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_sql::*;
//! use std::sync::Arc;
//!
//! let events = TableId::new("Events")?;
//! let statement = QueryBuilder::new(Arc::new(GenericDialect))
//!     .from(events.clone())
//!     .and_where(Condition::eq(ColumnId::new("AggregateId")?, "user-1"))
//!     .order_by(OrderBy::asc(ColumnId::new("Version")?)?)
//!     .build()?;
//!
//! assert_eq!(
//!     statement.text,
//!     "SELECT *\nFROM Events\nWHERE AggregateId = @p0\nORDER BY Version ASC"
//! );
//! ```

mod compiler;
pub mod delete;
pub mod dialect;
pub mod error;
pub mod insert;
pub mod model;
pub mod query;
pub mod update;
pub mod value;

pub use delete::{DeleteBuilder, DeleteExpression};
pub use dialect::{
    Dialect, DialectKind, GenericDialect, GroupOperatorTable, JoinTable, OperatorTable,
    PostgresDialect, SqlServerDialect, UnknownDialect,
};
pub use error::{SqlError, SqlResult};
pub use insert::{InsertBuilder, InsertExpression};
pub use model::{
    ColumnId, ComparisonOperator, Condition, ConditionalOperator, GroupOperator, Join, JoinKind,
    OperatorKind, OrderBy, TableId, Update,
};
pub use query::{QueryBuilder, SelectExpression};
pub use update::{UpdateBuilder, UpdateExpression};
pub use value::{SqlParameter, SqlStatement, SqlValue};
