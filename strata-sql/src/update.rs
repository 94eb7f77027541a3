//! UPDATE builder.

use crate::compiler::{ColumnFormat, Compiler, TableFormat};
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::model::{Condition, TableId, Update};
use crate::value::{SqlStatement, SqlValue};
use std::sync::Arc;

/// Accumulated state of an UPDATE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    pub updates: Vec<Update>,
    pub conditions: Vec<Condition>,
}

impl UpdateExpression {
    fn target_table(&self) -> SqlResult<&TableId> {
        if self.updates.is_empty() {
            return Err(SqlError::InvalidUpdateNoColumns);
        }

        let mut target: Option<&TableId> = None;
        for table in self.updates.iter().filter_map(|u| u.column().table()) {
            match target {
                None => target = Some(table),
                Some(existing) if existing.same_table(table) => {}
                Some(existing) => {
                    return Err(SqlError::InvalidUpdateMultipleTables {
                        tables: vec![existing.describe(), table.describe()],
                    });
                }
            }
        }

        target.ok_or(SqlError::InvalidUpdateNoTable)
    }
}

/// Fluent UPDATE builder. The target table is the one owning the updated columns.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: Arc<dyn Dialect>,
    expression: UpdateExpression,
}

impl UpdateBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            expression: UpdateExpression::default(),
        }
    }

    pub fn set(mut self, update: Update) -> Self {
        self.expression.updates.push(update);
        self
    }

    pub fn and_where(mut self, condition: Condition) -> Self {
        self.expression.conditions.push(condition);
        self
    }

    pub fn expression(&self) -> &UpdateExpression {
        &self.expression
    }

    pub fn build(&self) -> SqlResult<SqlStatement> {
        let expr = &self.expression;
        let table = expr.target_table()?;

        let mut compiler = Compiler::new(self.dialect.as_ref());
        let d = compiler.dialect();

        let mut assignments = Vec::with_capacity(expr.updates.len());
        for update in &expr.updates {
            let column = compiler.column(update.column(), ColumnFormat::Bare);
            let value = match update.value() {
                None | Some(SqlValue::Null) => d.null().to_string(),
                Some(value) => compiler.bind(value.clone()),
            };
            let equal = d
                .comparison_operators()
                .get(&crate::model::OperatorKind::Equal)
                .copied()
                .unwrap_or("=");
            assignments.push(format!("{column} {equal} {value}"));
        }

        let mut clauses = vec![
            format!(
                "{} {}",
                d.update(),
                compiler.table(table, TableFormat::Qualified)
            ),
            format!("{} {}", d.set(), assignments.join(d.list_separator())),
        ];

        if let Some(clause) = compiler.where_clause(&expr.conditions)? {
            clauses.push(clause);
        }

        Ok(compiler.finish(clauses))
    }
}
