//! INSERT builder.

use crate::compiler::{ColumnFormat, Compiler, TableFormat};
use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::model::{ColumnId, TableId};
use crate::value::{SqlStatement, SqlValue};
use std::sync::Arc;

/// Accumulated state of an INSERT statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertExpression {
    pub columns: Vec<ColumnId>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl InsertExpression {
    /// The single table every column belongs to
    fn target_table(&self) -> SqlResult<&TableId> {
        if self.columns.is_empty() {
            return Err(SqlError::InvalidInsertNoColumns);
        }

        let mut target: Option<&TableId> = None;
        for column in &self.columns {
            if column.name().is_none() {
                return Err(SqlError::InvalidInsertUnnamedColumn);
            }

            let table = column
                .table()
                .ok_or_else(|| SqlError::InvalidInsertColumnWithoutTable {
                    column: column.describe(),
                })?;

            match target {
                None => target = Some(table),
                Some(existing) if existing.same_table(table) => {}
                Some(existing) => {
                    return Err(SqlError::InvalidInsertMultipleTables {
                        tables: vec![existing.describe(), table.describe()],
                    });
                }
            }
        }

        target.ok_or(SqlError::InvalidInsertNoColumns)
    }
}

/// Fluent INSERT builder. The target table is the one owning the columns.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    dialect: Arc<dyn Dialect>,
    expression: InsertExpression,
}

impl InsertBuilder {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            dialect,
            expression: InsertExpression::default(),
        }
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnId>) -> Self {
        self.expression.columns.extend(columns);
        self
    }

    /// Add one row of values, positionally matching the columns
    pub fn values<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.expression
            .rows
            .push(row.into_iter().map(Into::into).collect());
        self
    }

    pub fn expression(&self) -> &InsertExpression {
        &self.expression
    }

    pub fn build(&self) -> SqlResult<SqlStatement> {
        let expr = &self.expression;
        let table = expr.target_table()?;

        if expr.rows.is_empty() {
            return Err(SqlError::InvalidInsertNoRows);
        }
        let width = expr.columns.len();
        if let Some((row, values)) = expr
            .rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != width)
        {
            return Err(SqlError::InvalidInsertRowWidth {
                row,
                expected: width,
                actual: values.len(),
            });
        }

        let mut compiler = Compiler::new(self.dialect.as_ref());
        let d = compiler.dialect();

        let columns = expr
            .columns
            .iter()
            .map(|c| compiler.column(c, ColumnFormat::Bare))
            .collect::<Vec<_>>()
            .join(d.list_separator());

        let header = format!(
            "{} {} ({columns})",
            d.insert_into(),
            compiler.table(table, TableFormat::Qualified)
        );

        let rows = expr
            .rows
            .iter()
            .map(|row| {
                let markers: Vec<String> = row.iter().map(|v| compiler.bind(v.clone())).collect();
                format!("({})", markers.join(d.list_separator()))
            })
            .collect::<Vec<_>>()
            .join(d.list_separator());

        Ok(compiler.finish(vec![header, format!("{} {rows}", d.values())]))
    }
}
