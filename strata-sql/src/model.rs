//! Structural SQL expression model.
//!
//! Nothing here formats text; the builders hand these values to the compiler
//! together with a [`Dialect`](crate::Dialect).

use crate::error::{SqlError, SqlResult};
use crate::value::SqlValue;
use std::fmt;

fn identifier(what: &'static str, value: impl Into<String>) -> SqlResult<String> {
    let value = value.into();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SqlError::InvalidIdentifier { what });
    }
    Ok(trimmed.to_string())
}

/// Reference to a table, optionally schema-qualified and aliased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableId {
    schema: Option<String>,
    name: Option<String>,
    alias: Option<String>,
}

impl TableId {
    pub fn new(name: impl Into<String>) -> SqlResult<Self> {
        Ok(Self {
            schema: None,
            name: Some(identifier("table name", name)?),
            alias: None,
        })
    }

    /// A table known only by its alias, e.g. a derived table.
    pub fn alias_only(alias: impl Into<String>) -> SqlResult<Self> {
        Ok(Self {
            schema: None,
            name: None,
            alias: Some(identifier("table alias", alias)?),
        })
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> SqlResult<Self> {
        self.schema = Some(identifier("schema", schema)?);
        Ok(self)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> SqlResult<Self> {
        self.alias = Some(identifier("table alias", alias)?);
        Ok(self)
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// A named column owned by this table
    pub fn column(&self, name: impl Into<String>) -> SqlResult<ColumnId> {
        Ok(ColumnId::new(name)?.of(self.clone()))
    }

    /// Every column of this table
    pub fn all_columns(&self) -> ColumnId {
        ColumnId::all().of(self.clone())
    }

    /// Whether both references point at the same physical table, ignoring aliases.
    pub fn same_table(&self, other: &TableId) -> bool {
        match (&self.name, &other.name) {
            (Some(a), Some(b)) => a == b && self.schema == other.schema,
            _ => self.alias == other.alias,
        }
    }

    pub(crate) fn describe(&self) -> String {
        let name = self
            .name
            .as_deref()
            .or(self.alias.as_deref())
            .unwrap_or_default();
        match &self.schema {
            Some(schema) => format!("{schema}.{name}"),
            None => name.to_string(),
        }
    }
}

/// Reference to a column. A column without a name means "all columns".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnId {
    name: Option<String>,
    table: Option<TableId>,
    alias: Option<String>,
}

impl ColumnId {
    pub fn new(name: impl Into<String>) -> SqlResult<Self> {
        Ok(Self {
            name: Some(identifier("column name", name)?),
            table: None,
            alias: None,
        })
    }

    /// The wildcard column
    pub fn all() -> Self {
        Self {
            name: None,
            table: None,
            alias: None,
        }
    }

    /// Attach the owning table
    pub fn of(mut self, table: TableId) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> SqlResult<Self> {
        self.alias = Some(identifier("column alias", alias)?);
        Ok(self)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn table(&self) -> Option<&TableId> {
        self.table.as_ref()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn is_all(&self) -> bool {
        self.name.is_none()
    }

    pub(crate) fn describe(&self) -> String {
        let name = self.name.as_deref().unwrap_or("*");
        match &self.table {
            Some(table) => format!("{}.{name}", table.describe()),
            None => name.to_string(),
        }
    }
}

/// Binary comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperator {
    /// The comparison that holds exactly when this one does not
    pub fn negate(self) -> Self {
        match self {
            ComparisonOperator::Equal => ComparisonOperator::NotEqual,
            ComparisonOperator::NotEqual => ComparisonOperator::Equal,
            ComparisonOperator::LessThan => ComparisonOperator::GreaterThanOrEqual,
            ComparisonOperator::LessThanOrEqual => ComparisonOperator::GreaterThan,
            ComparisonOperator::GreaterThan => ComparisonOperator::LessThanOrEqual,
            ComparisonOperator::GreaterThanOrEqual => ComparisonOperator::LessThan,
        }
    }
}

/// Key into a dialect's operator table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Between,
    NotBetween,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    NotILike,
    IsNull,
    IsNotNull,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Predicate applied to a single column
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalOperator {
    Comparison {
        operator: ComparisonOperator,
        value: SqlValue,
    },
    Between {
        low: SqlValue,
        high: SqlValue,
        negate: bool,
    },
    In {
        values: Vec<SqlValue>,
        negate: bool,
    },
    Like {
        pattern: String,
        case_insensitive: bool,
        negate: bool,
    },
    IsNull {
        negate: bool,
    },
}

impl ConditionalOperator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            ConditionalOperator::Comparison { operator, .. } => match operator {
                ComparisonOperator::Equal => OperatorKind::Equal,
                ComparisonOperator::NotEqual => OperatorKind::NotEqual,
                ComparisonOperator::LessThan => OperatorKind::LessThan,
                ComparisonOperator::LessThanOrEqual => OperatorKind::LessThanOrEqual,
                ComparisonOperator::GreaterThan => OperatorKind::GreaterThan,
                ComparisonOperator::GreaterThanOrEqual => OperatorKind::GreaterThanOrEqual,
            },
            ConditionalOperator::Between { negate: false, .. } => OperatorKind::Between,
            ConditionalOperator::Between { negate: true, .. } => OperatorKind::NotBetween,
            ConditionalOperator::In { negate: false, .. } => OperatorKind::In,
            ConditionalOperator::In { negate: true, .. } => OperatorKind::NotIn,
            ConditionalOperator::Like {
                case_insensitive,
                negate,
                ..
            } => match (case_insensitive, negate) {
                (false, false) => OperatorKind::Like,
                (false, true) => OperatorKind::NotLike,
                (true, false) => OperatorKind::ILike,
                (true, true) => OperatorKind::NotILike,
            },
            ConditionalOperator::IsNull { negate: false } => OperatorKind::IsNull,
            ConditionalOperator::IsNull { negate: true } => OperatorKind::IsNotNull,
        }
    }

    pub fn negated(self) -> Self {
        match self {
            ConditionalOperator::Comparison { operator, value } => {
                ConditionalOperator::Comparison {
                    operator: operator.negate(),
                    value,
                }
            }
            ConditionalOperator::Between { low, high, negate } => ConditionalOperator::Between {
                low,
                high,
                negate: !negate,
            },
            ConditionalOperator::In { values, negate } => ConditionalOperator::In {
                values,
                negate: !negate,
            },
            ConditionalOperator::Like {
                pattern,
                case_insensitive,
                negate,
            } => ConditionalOperator::Like {
                pattern,
                case_insensitive,
                negate: !negate,
            },
            ConditionalOperator::IsNull { negate } => ConditionalOperator::IsNull { negate: !negate },
        }
    }
}

/// Logical connective of a condition group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupOperator {
    And,
    Or,
}

impl GroupOperator {
    /// Literal tag used when a dialect has no spelling for the operator
    pub fn tag(&self) -> &'static str {
        match self {
            GroupOperator::And => "AND",
            GroupOperator::Or => "OR",
        }
    }

    fn flip(self) -> Self {
        match self {
            GroupOperator::And => GroupOperator::Or,
            GroupOperator::Or => GroupOperator::And,
        }
    }
}

/// Filter expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Operator {
        column: ColumnId,
        operator: ConditionalOperator,
    },
    Group {
        operator: GroupOperator,
        conditions: Vec<Condition>,
    },
}

impl Condition {
    pub fn new(column: ColumnId, operator: ConditionalOperator) -> Self {
        Condition::Operator { column, operator }
    }

    fn compare(column: ColumnId, operator: ComparisonOperator, value: impl Into<SqlValue>) -> Self {
        Self::new(
            column,
            ConditionalOperator::Comparison {
                operator,
                value: value.into(),
            },
        )
    }

    pub fn eq(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::Equal, value)
    }

    pub fn ne(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::NotEqual, value)
    }

    pub fn lt(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::LessThan, value)
    }

    pub fn le(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::LessThanOrEqual, value)
    }

    pub fn gt(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::GreaterThan, value)
    }

    pub fn ge(column: ColumnId, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, ComparisonOperator::GreaterThanOrEqual, value)
    }

    pub fn between(column: ColumnId, low: impl Into<SqlValue>, high: impl Into<SqlValue>) -> Self {
        Self::new(
            column,
            ConditionalOperator::Between {
                low: low.into(),
                high: high.into(),
                negate: false,
            },
        )
    }

    pub fn in_list<I, V>(column: ColumnId, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self::new(
            column,
            ConditionalOperator::In {
                values: values.into_iter().map(Into::into).collect(),
                negate: false,
            },
        )
    }

    pub fn like(column: ColumnId, pattern: impl Into<String>) -> Self {
        Self::new(
            column,
            ConditionalOperator::Like {
                pattern: pattern.into(),
                case_insensitive: false,
                negate: false,
            },
        )
    }

    pub fn ilike(column: ColumnId, pattern: impl Into<String>) -> Self {
        Self::new(
            column,
            ConditionalOperator::Like {
                pattern: pattern.into(),
                case_insensitive: true,
                negate: false,
            },
        )
    }

    pub fn is_null(column: ColumnId) -> Self {
        Self::new(column, ConditionalOperator::IsNull { negate: false })
    }

    pub fn is_not_null(column: ColumnId) -> Self {
        Self::new(column, ConditionalOperator::IsNull { negate: true })
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            operator: GroupOperator::And,
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Group {
            operator: GroupOperator::Or,
            conditions: conditions.into_iter().collect(),
        }
    }

    /// Logical negation; groups are rewritten with De Morgan's laws.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Condition::Operator { column, operator } => Condition::Operator {
                column,
                operator: operator.negated(),
            },
            Condition::Group {
                operator,
                conditions,
            } => Condition::Group {
                operator: operator.flip(),
                conditions: conditions.into_iter().map(Condition::not).collect(),
            },
        }
    }
}

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// Equi-join between two table-qualified columns.
///
/// The right column's table is the one being joined in.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    kind: JoinKind,
    left: ColumnId,
    right: ColumnId,
    condition: Option<Condition>,
}

impl Join {
    pub fn new(kind: JoinKind, left: ColumnId, right: ColumnId) -> SqlResult<Self> {
        for column in [&left, &right] {
            if column.name().is_none() {
                return Err(SqlError::InvalidJoin {
                    column: column.describe(),
                    reason: "join columns must be named",
                });
            }
            if column.table().is_none() {
                return Err(SqlError::InvalidJoin {
                    column: column.describe(),
                    reason: "join columns must be table-qualified",
                });
            }
        }

        Ok(Self {
            kind,
            left,
            right,
            condition: None,
        })
    }

    pub fn inner(left: ColumnId, right: ColumnId) -> SqlResult<Self> {
        Self::new(JoinKind::Inner, left, right)
    }

    pub fn left(left: ColumnId, right: ColumnId) -> SqlResult<Self> {
        Self::new(JoinKind::Left, left, right)
    }

    /// Extra predicate ANDed onto the ON clause
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn left_column(&self) -> &ColumnId {
        &self.left
    }

    pub fn right_column(&self) -> &ColumnId {
        &self.right
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }
}

/// Sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    column: ColumnId,
    descending: bool,
}

impl OrderBy {
    pub fn new(column: ColumnId, descending: bool) -> SqlResult<Self> {
        if column.name().is_none() {
            return Err(SqlError::InvalidOrderBy);
        }
        Ok(Self { column, descending })
    }

    pub fn asc(column: ColumnId) -> SqlResult<Self> {
        Self::new(column, false)
    }

    pub fn desc(column: ColumnId) -> SqlResult<Self> {
        Self::new(column, true)
    }

    pub fn column(&self) -> &ColumnId {
        &self.column
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }
}

/// Assignment of a new value to a column; `None` sets NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    column: ColumnId,
    value: Option<SqlValue>,
}

impl Update {
    pub fn new(column: ColumnId, value: Option<SqlValue>) -> SqlResult<Self> {
        if column.name().is_none() {
            return Err(SqlError::InvalidUpdateUnnamedColumn);
        }
        Ok(Self { column, value })
    }

    pub fn set(column: ColumnId, value: impl Into<SqlValue>) -> SqlResult<Self> {
        Self::new(column, Some(value.into()))
    }

    pub fn set_null(column: ColumnId) -> SqlResult<Self> {
        Self::new(column, None)
    }

    pub fn column(&self) -> &ColumnId {
        &self.column
    }

    pub fn value(&self) -> Option<&SqlValue> {
        self.value.as_ref()
    }
}
