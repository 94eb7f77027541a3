//! SELECT builder.

use crate::compiler::{ColumnFormat, Compiler, TableFormat};
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::model::{ColumnId, Condition, Join, OrderBy, TableId};
use crate::value::SqlStatement;
use std::sync::Arc;

/// Accumulated state of a SELECT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectExpression {
    pub table: Option<TableId>,
    pub columns: Vec<ColumnId>,
    pub distinct: bool,
    pub joins: Vec<Join>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Fluent SELECT builder.
///
/// ```rust,ignore
/// let events = TableId::new("Events")?;
/// let statement = QueryBuilder::new(Arc::new(GenericDialect))
///     .from(events.clone())
///     .and_where(Condition::eq(ColumnId::new("AggregateId")?, "user-1"))
///     .order_by(OrderBy::asc(ColumnId::new("Version")?)?)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Arc<dyn Dialect>,
    expression: SelectExpression,
}

impl QueryBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            expression: SelectExpression::default(),
        }
    }

    /// Table to select from
    pub fn from(mut self, table: TableId) -> Self {
        self.expression.table = Some(table);
        self
    }

    /// Add columns to the select list; an empty list selects everything
    pub fn select(mut self, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.expression.columns.extend(columns);
        self
    }

    pub fn column(mut self, column: ColumnId) -> Self {
        self.expression.columns.push(column);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.expression.distinct = true;
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.expression.joins.push(join);
        self
    }

    /// Add a predicate; multiple predicates are ANDed
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.expression.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.expression.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.expression.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.expression.offset = Some(offset);
        self
    }

    pub fn expression(&self) -> &SelectExpression {
        &self.expression
    }

    pub fn into_expression(self) -> SelectExpression {
        self.expression
    }

    pub fn build(&self) -> SqlResult<SqlStatement> {
        let expr = &self.expression;
        let table = expr.table.as_ref().ok_or(SqlError::InvalidQueryNoTable)?;

        let mut compiler = Compiler::new(self.dialect.as_ref());
        let d = compiler.dialect();
        let mut clauses = Vec::new();

        let columns = if expr.columns.is_empty() {
            d.wildcard().to_string()
        } else {
            expr.columns
                .iter()
                .map(|c| compiler.column(c, ColumnFormat::Projection))
                .collect::<Vec<_>>()
                .join(d.list_separator())
        };
        if expr.distinct {
            clauses.push(format!("{} {} {columns}", d.select(), d.distinct()));
        } else {
            clauses.push(format!("{} {columns}", d.select()));
        }

        clauses.push(format!(
            "{} {}",
            d.from(),
            compiler.table(table, TableFormat::Declaration)
        ));

        for join in &expr.joins {
            clauses.push(compiler.join(join)?);
        }

        if let Some(clause) = compiler.where_clause(&expr.conditions)? {
            clauses.push(clause);
        }

        if let Some(clause) = compiler.order_by(&expr.order_by) {
            clauses.push(clause);
        }

        if let Some(clause) = d.limit_clause(expr.limit, expr.offset) {
            clauses.push(clause);
        }

        Ok(compiler.finish(clauses))
    }
}
