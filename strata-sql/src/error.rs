//! Error types for SQL compilation.

use crate::model::OperatorKind;
use thiserror::Error;

/// Errors raised while building expressions or compiling statements.
///
/// All of them are caller construction mistakes: deterministic, never retryable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    /// An identifier was empty or blank.
    #[error("Invalid identifier: {what} must not be empty")]
    InvalidIdentifier { what: &'static str },

    /// A join column was unnamed or not table-qualified.
    #[error("Invalid join on {column}: {reason}")]
    InvalidJoin { column: String, reason: &'static str },

    /// An order-by column had no name.
    #[error("Invalid order by: column must be named")]
    InvalidOrderBy,

    /// The compiler cannot render this condition.
    #[error("Unsupported condition {condition}: {reason}")]
    UnsupportedCondition {
        condition: String,
        reason: &'static str,
    },

    /// The dialect has no spelling for this operator.
    #[error("Unsupported operator {operator} on {column} for dialect {dialect}")]
    UnsupportedOperator {
        operator: OperatorKind,
        column: String,
        dialect: &'static str,
    },

    /// An IN / NOT IN list had no values.
    #[error("Empty value list for IN on {column}")]
    EmptyInList { column: String },

    /// A query was built without a FROM table.
    #[error("Invalid query: no table to select from")]
    InvalidQueryNoTable,

    #[error("Invalid insert: no columns")]
    InvalidInsertNoColumns,

    #[error("Invalid insert: column without a name")]
    InvalidInsertUnnamedColumn,

    #[error("Invalid insert: column {column} has no table")]
    InvalidInsertColumnWithoutTable { column: String },

    #[error("Invalid insert: columns span tables {tables:?}")]
    InvalidInsertMultipleTables { tables: Vec<String> },

    #[error("Invalid insert: no rows")]
    InvalidInsertNoRows,

    #[error("Invalid insert: row {row} has {actual} values, expected {expected}")]
    InvalidInsertRowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid update: no column updates")]
    InvalidUpdateNoColumns,

    #[error("Invalid update: column without a name")]
    InvalidUpdateUnnamedColumn,

    #[error("Invalid update: columns span tables {tables:?}")]
    InvalidUpdateMultipleTables { tables: Vec<String> },

    #[error("Invalid update: no column names a table")]
    InvalidUpdateNoTable,
}

/// Result type alias for SQL compilation.
pub type SqlResult<T> = Result<T, SqlError>;
