//! DELETE builder.

use crate::compiler::{Compiler, TableFormat};
use crate::dialect::Dialect;
use crate::error::SqlResult;
use crate::model::{Condition, TableId};
use crate::value::SqlStatement;
use std::sync::Arc;

/// Accumulated state of a DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteExpression {
    pub table: TableId,
    pub conditions: Vec<Condition>,
}

/// Fluent DELETE builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: Arc<dyn Dialect>,
    expression: DeleteExpression,
}

impl DeleteBuilder {
    pub fn new(dialect: Arc<dyn Dialect>, table: TableId) -> Self {
        Self {
            dialect,
            expression: DeleteExpression {
                table,
                conditions: Vec::new(),
            },
        }
    }

    pub fn and_where(mut self, condition: Condition) -> Self {
        self.expression.conditions.push(condition);
        self
    }

    pub fn expression(&self) -> &DeleteExpression {
        &self.expression
    }

    pub fn build(&self) -> SqlResult<SqlStatement> {
        let mut compiler = Compiler::new(self.dialect.as_ref());
        let d = compiler.dialect();

        let mut clauses = vec![format!(
            "{} {}",
            d.delete_from(),
            compiler.table(&self.expression.table, TableFormat::Qualified)
        )];

        if let Some(clause) = compiler.where_clause(&self.expression.conditions)? {
            clauses.push(clause);
        }

        Ok(compiler.finish(clauses))
    }
}
