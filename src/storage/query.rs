//! Parameterized SQL construction from caller-supplied filters.
//!
//! Only identifiers declared in the [`Catalog`] ever reach the SQL text;
//! every caller-supplied value, including the row limit, is a bound `$n`
//! parameter.

use thiserror::Error;

use crate::storage::schema::{Catalog, ColumnDef, SURROGATE_KEY, TableSchema};
use crate::storage::types::{FilterSpec, FilterValue, Value};

/// Request rejected before any SQL was built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Table is not on the allow-list.
    #[error("unknown table: '{0}'")]
    UnknownTable(String),

    /// Filter references a column the table does not declare.
    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Membership filter without any value.
    #[error("filter on '{0}' has an empty value list")]
    EmptyList(String),

    /// Row limit is zero or negative.
    #[error("limit must be a positive integer, got {0}")]
    InvalidLimit(i64),
}

/// A built `SELECT` with its ordered bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// SQL text with `$n` placeholders.
    pub sql: String,
    /// Bind parameters, `params[i]` binds `$(i + 1)`.
    pub params: Vec<Value>,
    /// Projected columns, in output order.
    pub columns: Vec<ColumnDef>,
}

/// Builds parameterized statements against a [`Catalog`].
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    catalog: &'a Catalog,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Build a filtered `SELECT` over all declared columns of `table`.
    ///
    /// Filters become `col = $n` (scalar) or `col IN ($n,...,$m)` (list), in
    /// insertion order, joined with `AND`; no filters yields `1=1`. A limit is
    /// bound as the last parameter.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if the table or a filter column is not
    /// declared, a list filter is empty, or the limit is not positive.
    pub fn build_select(
        &self,
        table: &str,
        filters: Option<&FilterSpec>,
        limit: Option<i64>,
    ) -> Result<SelectQuery, ValidationError> {
        let schema = self.catalog.resolve(table)?;

        if let Some(n) = limit
            && n <= 0
        {
            return Err(ValidationError::InvalidLimit(n));
        }

        let mut params: Vec<Value> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();

        for (column, filter) in filters.into_iter().flatten() {
            let column = resolve_column(schema, column)?;
            match filter {
                FilterValue::Eq(value) => {
                    params.push(value.clone());
                    conditions.push(format!("{column} = ${}", params.len()));
                }
                FilterValue::In(values) => {
                    if values.is_empty() {
                        return Err(ValidationError::EmptyList(column.to_string()));
                    }
                    let placeholders: Vec<String> = values
                        .iter()
                        .map(|value| {
                            params.push(value.clone());
                            format!("${}", params.len())
                        })
                        .collect();
                    conditions.push(format!("{column} IN ({})", placeholders.join(",")));
                }
            }
        }

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };

        let projection: Vec<&str> = schema.column_names().collect();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            projection.join(", "),
            schema.name(),
            where_clause,
            SURROGATE_KEY
        );

        if let Some(n) = limit {
            params.push(Value::Integer(n));
            sql.push_str(&format!(" LIMIT ${}", params.len()));
        }

        Ok(SelectQuery {
            sql,
            params,
            columns: schema.columns().to_vec(),
        })
    }

    /// Build an `INSERT` binding every declared column of `table` in order.
    pub fn build_insert(&self, table: &str) -> Result<String, ValidationError> {
        let schema = self.catalog.resolve(table)?;
        let names: Vec<&str> = schema.column_names().collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("${i}")).collect();

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.name(),
            names.join(", "),
            placeholders.join(", ")
        ))
    }
}

fn resolve_column<'s>(schema: &'s TableSchema, column: &str) -> Result<&'s str, ValidationError> {
    schema
        .column(column)
        .map(|c| c.name.as_str())
        .ok_or_else(|| ValidationError::UnknownColumn {
            table: schema.name().to_string(),
            column: column.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::SERVER_METRICS_TABLE;

    fn statuses(values: &[&str]) -> FilterValue {
        FilterValue::In(values.iter().map(|v| Value::from(*v)).collect())
    }

    #[test]
    fn test_membership_filter_with_bound_limit() {
        let catalog = Catalog::standard();
        let mut filters = FilterSpec::new();
        filters.insert("status".to_string(), statuses(&["healthy", "warning"]));

        let query = QueryBuilder::new(&catalog)
            .build_select(SERVER_METRICS_TABLE, Some(&filters), Some(10))
            .unwrap();

        assert!(query.sql.contains("WHERE status IN ($1,$2)"));
        assert!(query.sql.ends_with("LIMIT $3"));
        assert!(!query.sql.contains("10"));
        assert_eq!(
            query.params,
            vec![
                Value::from("healthy"),
                Value::from("warning"),
                Value::Integer(10)
            ]
        );
    }

    #[test]
    fn test_placeholders_follow_insertion_order() {
        let catalog = Catalog::standard();
        let mut filters = FilterSpec::new();
        filters.insert("environment".to_string(), Value::from("production").into());
        filters.insert("server_zone".to_string(), statuses(&["us-east", "eu-west"]));
        filters.insert("uptime_days".to_string(), Value::from(30_i64).into());

        let query = QueryBuilder::new(&catalog)
            .build_select(SERVER_METRICS_TABLE, Some(&filters), None)
            .unwrap();

        assert!(query.sql.contains(
            "WHERE environment = $1 AND server_zone IN ($2,$3) AND uptime_days = $4 ORDER BY id"
        ));
        assert!(!query.sql.contains("LIMIT"));
        assert_eq!(query.params.len(), 4);
        assert_eq!(query.params[3], Value::Integer(30));
    }

    #[test]
    fn test_no_filters_matches_all_rows() {
        let catalog = Catalog::standard();
        let query = QueryBuilder::new(&catalog)
            .build_select(SERVER_METRICS_TABLE, None, None)
            .unwrap();

        assert!(query.sql.starts_with("SELECT timestamp, server_name, "));
        assert!(query.sql.contains("FROM server_metrics WHERE 1=1 ORDER BY id"));
        assert!(query.params.is_empty());
        assert_eq!(query.columns.len(), 32);

        let empty = FilterSpec::new();
        let query = QueryBuilder::new(&catalog)
            .build_select(SERVER_METRICS_TABLE, Some(&empty), Some(5))
            .unwrap();
        assert!(query.sql.contains("WHERE 1=1 ORDER BY id LIMIT $1"));
        assert_eq!(query.params, vec![Value::Integer(5)]);
    }

    #[test]
    fn test_unknown_table_rejected() {
        let catalog = Catalog::standard();
        let result = QueryBuilder::new(&catalog).build_select("pg_shadow", None, Some(1));
        assert_eq!(
            result,
            Err(ValidationError::UnknownTable("pg_shadow".to_string()))
        );

        let result = QueryBuilder::new(&catalog)
            .build_select("server_metrics; DROP TABLE server_metrics", None, None);
        assert!(matches!(result, Err(ValidationError::UnknownTable(_))));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let catalog = Catalog::standard();
        let mut filters = FilterSpec::new();
        filters.insert("1=1 OR status".to_string(), Value::from("x").into());

        let result =
            QueryBuilder::new(&catalog).build_select(SERVER_METRICS_TABLE, Some(&filters), None);
        assert!(matches!(result, Err(ValidationError::UnknownColumn { .. })));
    }

    #[test]
    fn test_empty_list_and_bad_limit_rejected() {
        let catalog = Catalog::standard();
        let mut filters = FilterSpec::new();
        filters.insert("status".to_string(), FilterValue::In(vec![]));

        let builder = QueryBuilder::new(&catalog);
        assert_eq!(
            builder.build_select(SERVER_METRICS_TABLE, Some(&filters), None),
            Err(ValidationError::EmptyList("status".to_string()))
        );
        assert_eq!(
            builder.build_select(SERVER_METRICS_TABLE, None, Some(0)),
            Err(ValidationError::InvalidLimit(0))
        );
        assert_eq!(
            builder.build_select(SERVER_METRICS_TABLE, None, Some(-3)),
            Err(ValidationError::InvalidLimit(-3))
        );
    }

    #[test]
    fn test_build_insert() {
        let catalog = Catalog::standard();
        let sql = QueryBuilder::new(&catalog)
            .build_insert(SERVER_METRICS_TABLE)
            .unwrap();
        assert!(sql.starts_with("INSERT INTO server_metrics (timestamp, server_name,"));
        assert!(sql.ends_with("$31, $32)"));
    }
}
