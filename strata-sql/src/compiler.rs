//! Formatting shared by every statement builder.
//!
//! Values are bound as ordinal parameters in the order the compiler meets them,
//! which is also their textual order in the emitted statement.

use crate::dialect::Dialect;
use crate::error::{SqlError, SqlResult};
use crate::model::{ColumnId, Condition, ConditionalOperator, Join, OrderBy, TableId};
use crate::value::{SqlParameter, SqlStatement, SqlValue};

/// How a table reference is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TableFormat {
    /// `[schema.]table[ alias]`, for FROM and JOIN
    Declaration,
    /// The alias if there is one, otherwise `[schema.]table`
    Reference,
    /// `[schema.]table`, never aliased
    Qualified,
}

/// How a column reference is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnFormat {
    /// `table.column[ AS alias]`, for select lists
    Projection,
    /// `table.column`, for predicates and joins
    Reference,
    /// The alias if there is one, otherwise `table.column`
    Short,
    /// Bare column name, for INSERT and SET lists
    Bare,
}

pub(crate) struct Compiler<'d> {
    dialect: &'d dyn Dialect,
    parameters: Vec<SqlParameter>,
}

impl<'d> Compiler<'d> {
    pub(crate) fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            parameters: Vec::new(),
        }
    }

    pub(crate) fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Bind a value and return its placeholder
    pub(crate) fn bind(&mut self, value: SqlValue) -> String {
        let index = self.parameters.len();
        self.parameters.push(SqlParameter {
            name: self.dialect.parameter_name(index),
            value,
        });
        self.dialect.parameter_marker(index)
    }

    pub(crate) fn table(&self, table: &TableId, format: TableFormat) -> String {
        let d = self.dialect;

        if format == TableFormat::Reference
            && let Some(alias) = table.alias()
        {
            return d.quote_identifier(alias);
        }

        let Some(name) = table.name() else {
            // alias-only table
            return table
                .alias()
                .map(|alias| d.quote_identifier(alias))
                .unwrap_or_default();
        };

        let mut out = String::new();
        if let Some(schema) = table.schema() {
            out.push_str(&d.quote_identifier(schema));
            out.push_str(d.identifier_separator());
        }
        out.push_str(&d.quote_identifier(name));

        if format == TableFormat::Declaration
            && let Some(alias) = table.alias()
        {
            out.push(' ');
            out.push_str(&d.quote_identifier(alias));
        }
        out
    }

    pub(crate) fn column(&self, column: &ColumnId, format: ColumnFormat) -> String {
        let d = self.dialect;

        if format == ColumnFormat::Short
            && let Some(alias) = column.alias()
        {
            return d.quote_identifier(alias);
        }

        let name = match column.name() {
            Some(name) => d.quote_identifier(name),
            None => d.wildcard().to_string(),
        };

        let mut out = String::new();
        if format != ColumnFormat::Bare
            && let Some(table) = column.table()
        {
            out.push_str(&self.table(table, TableFormat::Reference));
            out.push_str(d.identifier_separator());
        }
        out.push_str(&name);

        if format == ColumnFormat::Projection
            && let Some(alias) = column.alias()
        {
            out.push(' ');
            out.push_str(d.alias());
            out.push(' ');
            out.push_str(&d.quote_identifier(alias));
        }
        out
    }

    pub(crate) fn condition(&mut self, condition: &Condition) -> SqlResult<String> {
        match condition {
            Condition::Operator { column, operator } => self.operator(column, operator),
            Condition::Group {
                operator,
                conditions,
            } => {
                if conditions.is_empty() {
                    return Err(SqlError::UnsupportedCondition {
                        condition: format!("{} group", operator.tag()),
                        reason: "a group needs at least one condition",
                    });
                }

                let token = self
                    .dialect
                    .group_operators()
                    .get(operator)
                    .copied()
                    .unwrap_or(operator.tag());

                let parts = conditions
                    .iter()
                    .map(|c| self.condition(c))
                    .collect::<SqlResult<Vec<_>>>()?;

                let separator = format!(" {token} ");
                Ok(format!("({})", parts.join(separator.as_str())))
            }
        }
    }

    fn operator(&mut self, column: &ColumnId, operator: &ConditionalOperator) -> SqlResult<String> {
        if column.is_all() {
            return Err(SqlError::UnsupportedCondition {
                condition: column.describe(),
                reason: "a predicate needs a named column",
            });
        }

        let kind = operator.kind();
        let token = *self
            .dialect
            .comparison_operators()
            .get(&kind)
            .ok_or_else(|| SqlError::UnsupportedOperator {
                operator: kind,
                column: column.describe(),
                dialect: self.dialect.name(),
            })?;

        let lhs = self.column(column, ColumnFormat::Reference);

        let rendered = match operator {
            ConditionalOperator::Comparison { value, .. } => {
                let marker = self.bind(value.clone());
                format!("{lhs} {token} {marker}")
            }
            ConditionalOperator::Between { low, high, .. } => {
                let low = self.bind(low.clone());
                let high = self.bind(high.clone());
                format!("{lhs} {token} {low} {} {high}", self.dialect.between_and())
            }
            ConditionalOperator::In { values, .. } => {
                if values.is_empty() {
                    return Err(SqlError::EmptyInList {
                        column: column.describe(),
                    });
                }
                let markers: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
                format!(
                    "{lhs} {token} ({})",
                    markers.join(self.dialect.list_separator())
                )
            }
            ConditionalOperator::Like { pattern, .. } => {
                let marker = self.bind(SqlValue::Text(pattern.clone()));
                format!("{lhs} {token} {marker}")
            }
            ConditionalOperator::IsNull { .. } => format!("{lhs} {token}"),
        };

        Ok(rendered)
    }

    /// Top-level predicates, ANDed together without enclosing parentheses
    pub(crate) fn where_clause(&mut self, conditions: &[Condition]) -> SqlResult<Option<String>> {
        if conditions.is_empty() {
            return Ok(None);
        }

        let parts = conditions
            .iter()
            .map(|c| self.condition(c))
            .collect::<SqlResult<Vec<_>>>()?;

        let and = self
            .dialect
            .group_operators()
            .get(&crate::model::GroupOperator::And)
            .copied()
            .unwrap_or("AND");

        let separator = format!(" {and} ");
        Ok(Some(format!(
            "{} {}",
            self.dialect.where_(),
            parts.join(separator.as_str())
        )))
    }

    pub(crate) fn join(&mut self, join: &Join) -> SqlResult<String> {
        let d = self.dialect;
        let clause = d
            .join_clauses()
            .get(&join.kind())
            .copied()
            .unwrap_or("JOIN");

        let joined = join
            .right_column()
            .table()
            .map(|t| self.table(t, TableFormat::Declaration))
            .unwrap_or_default();

        let equal = d
            .comparison_operators()
            .get(&crate::model::OperatorKind::Equal)
            .copied()
            .unwrap_or("=");

        let mut out = format!(
            "{clause} {joined} {} {} {equal} {}",
            d.on(),
            self.column(join.left_column(), ColumnFormat::Reference),
            self.column(join.right_column(), ColumnFormat::Reference),
        );

        if let Some(condition) = join.condition() {
            let and = d
                .group_operators()
                .get(&crate::model::GroupOperator::And)
                .copied()
                .unwrap_or("AND");
            let extra = self.condition(condition)?;
            out.push_str(&format!(" {and} {extra}"));
        }

        Ok(out)
    }

    pub(crate) fn order_by(&self, order: &[OrderBy]) -> Option<String> {
        if order.is_empty() {
            return None;
        }

        let d = self.dialect;
        let keys: Vec<String> = order
            .iter()
            .map(|o| {
                let direction = if o.is_descending() {
                    d.descending()
                } else {
                    d.ascending()
                };
                format!("{} {direction}", self.column(o.column(), ColumnFormat::Short))
            })
            .collect();

        Some(format!("{} {}", d.order_by(), keys.join(d.list_separator())))
    }

    pub(crate) fn finish(self, clauses: Vec<String>) -> SqlStatement {
        let text = clauses.join(self.dialect.clause_separator());
        tracing::trace!(
            dialect = self.dialect.name(),
            sql = %text,
            parameters = self.parameters.len(),
            "Compiled SQL statement"
        );
        SqlStatement {
            text,
            parameters: self.parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, SqlServerDialect};

    #[test]
    fn test_table_formats() {
        let dialect = SqlServerDialect;
        let compiler = Compiler::new(&dialect);
        let table = TableId::new("Events")
            .unwrap()
            .with_schema("dbo")
            .unwrap()
            .with_alias("e")
            .unwrap();

        assert_eq!(
            compiler.table(&table, TableFormat::Declaration),
            "[dbo].[Events] [e]"
        );
        assert_eq!(compiler.table(&table, TableFormat::Reference), "[e]");
        assert_eq!(compiler.table(&table, TableFormat::Qualified), "[dbo].[Events]");
    }

    #[test]
    fn test_column_formats() {
        let dialect = GenericDialect;
        let compiler = Compiler::new(&dialect);
        let users = TableId::new("Users").unwrap();
        let email = users.column("Email").unwrap().with_alias("Mail").unwrap();

        assert_eq!(
            compiler.column(&email, ColumnFormat::Projection),
            "Users.Email AS Mail"
        );
        assert_eq!(compiler.column(&email, ColumnFormat::Reference), "Users.Email");
        assert_eq!(compiler.column(&email, ColumnFormat::Short), "Mail");
        assert_eq!(compiler.column(&email, ColumnFormat::Bare), "Email");
        assert_eq!(
            compiler.column(&ColumnId::all(), ColumnFormat::Projection),
            "*"
        );
        assert_eq!(
            compiler.column(&users.all_columns(), ColumnFormat::Projection),
            "Users.*"
        );
    }

    #[test]
    fn test_parameters_follow_encounter_order() {
        let dialect = GenericDialect;
        let mut compiler = Compiler::new(&dialect);
        let age = ColumnId::new("Age").unwrap();
        let name = ColumnId::new("Name").unwrap();

        let text = compiler
            .condition(&Condition::or([
                Condition::between(age.clone(), 18, 65),
                Condition::in_list(name.clone(), ["a", "b"]),
                Condition::is_null(name),
            ]))
            .unwrap();

        assert_eq!(
            text,
            "(Age BETWEEN @p0 AND @p1 OR Name IN (@p2, @p3) OR Name IS NULL)"
        );

        let statement = compiler.finish(vec![text]);
        assert_eq!(statement.parameter_names(), vec!["p0", "p1", "p2", "p3"]);
        assert_eq!(
            statement.values(),
            vec![
                &SqlValue::Integer(18),
                &SqlValue::Integer(65),
                &SqlValue::Text("a".to_string()),
                &SqlValue::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let dialect = GenericDialect;
        let mut compiler = Compiler::new(&dialect);

        let err = compiler.condition(&Condition::and([])).unwrap_err();
        assert!(matches!(err, SqlError::UnsupportedCondition { .. }));
    }

    #[test]
    fn test_unspelled_operator_is_rejected() {
        let dialect = GenericDialect;
        let mut compiler = Compiler::new(&dialect);

        let err = compiler
            .condition(&Condition::ilike(ColumnId::new("Name").unwrap(), "a%"))
            .unwrap_err();

        assert_eq!(
            err,
            SqlError::UnsupportedOperator {
                operator: crate::model::OperatorKind::ILike,
                column: "Name".to_string(),
                dialect: "generic",
            }
        );
    }

    #[test]
    fn test_empty_in_list_is_rejected() {
        let dialect = GenericDialect;
        let mut compiler = Compiler::new(&dialect);

        let err = compiler
            .condition(&Condition::in_list(
                ColumnId::new("Id").unwrap(),
                Vec::<SqlValue>::new(),
            ))
            .unwrap_err();
        assert!(matches!(err, SqlError::EmptyInList { .. }));
    }
}
