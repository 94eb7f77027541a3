//! SQL dialects.
//!
//! A dialect is a set of formatting tokens. Every token has a generic default;
//! a concrete dialect overrides only what differs for its database. Operator,
//! group-operator and join spellings live in lookup tables so the compiler can
//! substitute them without knowing which dialect it was given.

use crate::model::{GroupOperator, JoinKind, OperatorKind};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

/// Operator spellings keyed by operator kind
pub type OperatorTable = HashMap<OperatorKind, &'static str>;

/// Group connective spellings
pub type GroupOperatorTable = HashMap<GroupOperator, &'static str>;

/// Join clause spellings
pub type JoinTable = HashMap<JoinKind, &'static str>;

static GENERIC_OPERATORS: Lazy<OperatorTable> = Lazy::new(|| {
    HashMap::from([
        (OperatorKind::Equal, "="),
        (OperatorKind::NotEqual, "<>"),
        (OperatorKind::LessThan, "<"),
        (OperatorKind::LessThanOrEqual, "<="),
        (OperatorKind::GreaterThan, ">"),
        (OperatorKind::GreaterThanOrEqual, ">="),
        (OperatorKind::Between, "BETWEEN"),
        (OperatorKind::NotBetween, "NOT BETWEEN"),
        (OperatorKind::In, "IN"),
        (OperatorKind::NotIn, "NOT IN"),
        (OperatorKind::Like, "LIKE"),
        (OperatorKind::NotLike, "NOT LIKE"),
        (OperatorKind::IsNull, "IS NULL"),
        (OperatorKind::IsNotNull, "IS NOT NULL"),
    ])
});

static POSTGRES_OPERATORS: Lazy<OperatorTable> = Lazy::new(|| {
    let mut table = GENERIC_OPERATORS.clone();
    table.insert(OperatorKind::ILike, "ILIKE");
    table.insert(OperatorKind::NotILike, "NOT ILIKE");
    table
});

static GENERIC_GROUP_OPERATORS: Lazy<GroupOperatorTable> =
    Lazy::new(|| HashMap::from([(GroupOperator::And, "AND"), (GroupOperator::Or, "OR")]));

static GENERIC_JOINS: Lazy<JoinTable> = Lazy::new(|| {
    HashMap::from([
        (JoinKind::Inner, "INNER JOIN"),
        (JoinKind::Left, "LEFT JOIN"),
        (JoinKind::Right, "RIGHT JOIN"),
        (JoinKind::Full, "FULL OUTER JOIN"),
    ])
});

/// Formatting tokens for one target database.
pub trait Dialect: Send + Sync + Debug {
    /// Dialect name used in diagnostics
    fn name(&self) -> &'static str;

    fn select(&self) -> &'static str {
        "SELECT"
    }

    fn distinct(&self) -> &'static str {
        "DISTINCT"
    }

    fn from(&self) -> &'static str {
        "FROM"
    }

    fn where_(&self) -> &'static str {
        "WHERE"
    }

    fn order_by(&self) -> &'static str {
        "ORDER BY"
    }

    fn ascending(&self) -> &'static str {
        "ASC"
    }

    fn descending(&self) -> &'static str {
        "DESC"
    }

    fn insert_into(&self) -> &'static str {
        "INSERT INTO"
    }

    fn values(&self) -> &'static str {
        "VALUES"
    }

    fn update(&self) -> &'static str {
        "UPDATE"
    }

    fn set(&self) -> &'static str {
        "SET"
    }

    fn delete_from(&self) -> &'static str {
        "DELETE FROM"
    }

    fn on(&self) -> &'static str {
        "ON"
    }

    fn alias(&self) -> &'static str {
        "AS"
    }

    /// Separator between the bounds of BETWEEN
    fn between_and(&self) -> &'static str {
        "AND"
    }

    fn null(&self) -> &'static str {
        "NULL"
    }

    fn wildcard(&self) -> &'static str {
        "*"
    }

    /// Opening and closing identifier quote; unquoted by default
    fn identifier_quotes(&self) -> (&'static str, &'static str) {
        ("", "")
    }

    /// Separator between schema, table and column parts
    fn identifier_separator(&self) -> &'static str {
        "."
    }

    fn list_separator(&self) -> &'static str {
        ", "
    }

    /// Separator between statement clauses
    fn clause_separator(&self) -> &'static str {
        "\n"
    }

    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    /// Ordinal parameter name; callers zip parameters positionally by it
    fn parameter_name(&self, index: usize) -> String {
        format!("p{index}")
    }

    /// Placeholder emitted into statement text
    fn parameter_marker(&self, index: usize) -> String {
        format!("{}{}", self.parameter_prefix(), self.parameter_name(index))
    }

    /// Quote an identifier; a closing quote inside it is doubled
    fn quote_identifier(&self, identifier: &str) -> String {
        let (open, close) = self.identifier_quotes();
        if close.is_empty() {
            return format!("{open}{identifier}");
        }
        let escaped = identifier.replace(close, &close.repeat(2));
        format!("{open}{escaped}{close}")
    }

    /// Spellings of column operators. Kinds missing here cannot be compiled.
    fn comparison_operators(&self) -> &OperatorTable {
        &GENERIC_OPERATORS
    }

    /// Spellings of group connectives. Missing entries fall back to the literal tag.
    fn group_operators(&self) -> &GroupOperatorTable {
        &GENERIC_GROUP_OPERATORS
    }

    fn join_clauses(&self) -> &JoinTable {
        &GENERIC_JOINS
    }

    /// Row-limiting clause, if any
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, None) => None,
            (Some(limit), None) => Some(format!("LIMIT {limit}")),
            (None, Some(offset)) => Some(format!("OFFSET {offset}")),
            (Some(limit), Some(offset)) => Some(format!("LIMIT {limit} OFFSET {offset}")),
        }
    }
}

/// Dialect using every default token.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}

/// Microsoft SQL Server.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn identifier_quotes(&self) -> (&'static str, &'static str) {
        ("[", "]")
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        if limit.is_none() && offset.is_none() {
            return None;
        }

        let mut clause = format!("OFFSET {} ROWS", offset.unwrap_or(0));
        if let Some(limit) = limit {
            clause.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
        }
        Some(clause)
    }
}

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn identifier_quotes(&self) -> (&'static str, &'static str) {
        ("\"", "\"")
    }

    fn parameter_prefix(&self) -> &'static str {
        "$"
    }

    fn parameter_marker(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn comparison_operators(&self) -> &OperatorTable {
        &POSTGRES_OPERATORS
    }
}

/// Built-in dialect selector, as used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Generic,
    SqlServer,
    Postgres,
}

impl DialectKind {
    pub fn dialect(&self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::Generic => Arc::new(GenericDialect),
            DialectKind::SqlServer => Arc::new(SqlServerDialect),
            DialectKind::Postgres => Arc::new(PostgresDialect),
        }
    }
}

/// Unrecognised dialect name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown SQL dialect: {0}")]
pub struct UnknownDialect(pub String);

impl FromStr for DialectKind {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "generic" | "ansi" => Ok(DialectKind::Generic),
            "sqlserver" | "mssql" => Ok(DialectKind::SqlServer),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}
