//! Postgres-backed table store.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use tokio_postgres::types::ToSql;

use super::{row_columns, Direction, Filter, Query, TableStore};
use crate::db_connect::PgPool;

/// [`TableStore`] over a Postgres pool. Rows travel as `jsonb` and are
/// expanded with `jsonb_populate_record(set)` on the way in and folded with
/// `to_jsonb` on the way out, so the table schema stays the database's concern.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Renders the WHERE clause for `filters`, pushing bound values into `params`.
/// Values are compared as `jsonb` so one parameter type covers every column.
fn where_clause(filters: &[Filter], alias: &str, params: &mut Vec<Value>) -> String {
    if filters.is_empty() {
        return "TRUE".to_string();
    }
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        match filter {
            Filter::Eq(column, value @ Value::String(_)) => {
                // ids arrive as text whatever the column type
                params.push(value.clone());
                parts.push(format!(
                    "{}.{}::text = ${}::jsonb #>> '{{}}'",
                    alias,
                    quote_ident(column),
                    params.len()
                ));
            }
            Filter::Eq(column, value) => {
                params.push(value.clone());
                parts.push(format!(
                    "to_jsonb({}.{}) = ${}",
                    alias,
                    quote_ident(column),
                    params.len()
                ));
            }
            Filter::Gt(column, value) => {
                params.push(value.clone());
                parts.push(format!(
                    "to_jsonb({}.{}) > ${}",
                    alias,
                    quote_ident(column),
                    params.len()
                ));
            }
            Filter::NotNull(column) => {
                parts.push(format!("{}.{} IS NOT NULL", alias, quote_ident(column)));
            }
        }
    }
    parts.join(" AND ")
}

pub(crate) fn build_select_sql(table: &str, query: &Query, params: &mut Vec<Value>) -> String {
    let projection = if query.columns.is_empty() {
        "to_jsonb(t)".to_string()
    } else {
        let pairs: Vec<String> = query
            .columns
            .iter()
            .map(|c| format!("{}, t.{}", quote_literal(c), quote_ident(c)))
            .collect();
        format!("jsonb_build_object({})", pairs.join(", "))
    };

    let mut sql = format!(
        "SELECT {} AS row FROM {} AS t WHERE {}",
        projection,
        quote_ident(table),
        where_clause(&query.filters, "t", params)
    );
    if let Some((column, direction)) = &query.order {
        let dir = match direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY t.{} {}", quote_ident(column), dir));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

pub(crate) fn build_upsert_sql(table: &str, columns: &[String], conflict_key: &str) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != conflict_key)
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();
    let on_conflict = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };
    format!(
        "INSERT INTO {0} ({1}) SELECT {1} FROM jsonb_populate_recordset(NULL::{0}, $1) \
         ON CONFLICT ({2}) {3}",
        quote_ident(table),
        column_list,
        quote_ident(conflict_key),
        on_conflict
    )
}

fn as_params(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl TableStore for PgStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for select")?;
        let mut values = Vec::new();
        let sql = build_select_sql(table, query, &mut values);
        debug!("select: {}", sql);
        let rows = client
            .query(&sql, &as_params(&values))
            .await
            .with_context(|| format!("Failed to select from {}", table))?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, Value>("row")
                    .with_context(|| format!("Failed to decode row from {}", table))
            })
            .collect()
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let columns = row_columns(rows);
        if columns.is_empty() {
            bail!("Insert into {} with no columns", table);
        }
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {0} AS t ({1}) SELECT {1} FROM jsonb_populate_recordset(NULL::{0}, $1) \
             RETURNING to_jsonb(t) AS row",
            quote_ident(table),
            column_list
        );
        debug!("insert: {}", sql);
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for insert")?;
        let payload = Value::Array(rows.to_vec());
        let inserted = client
            .query(&sql, &[&payload])
            .await
            .with_context(|| format!("Failed to insert into {}", table))?;
        inserted
            .iter()
            .map(|row| {
                row.try_get::<_, Value>("row")
                    .with_context(|| format!("Failed to decode inserted row from {}", table))
            })
            .collect()
    }

    async fn update(&self, table: &str, patch: &Value, filters: &[Filter]) -> Result<u64> {
        let columns = row_columns(std::slice::from_ref(patch));
        if columns.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = columns
            .iter()
            .map(|c| format!("{0} = r.{0}", quote_ident(c)))
            .collect();
        let mut values = vec![patch.clone()];
        let condition = where_clause(filters, "t", &mut values);
        let sql = format!(
            "UPDATE {0} AS t SET {1} FROM jsonb_populate_record(NULL::{0}, $1) AS r WHERE {2}",
            quote_ident(table),
            assignments.join(", "),
            condition
        );
        debug!("update: {}", sql);
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for update")?;
        client
            .execute(&sql, &as_params(&values))
            .await
            .with_context(|| format!("Failed to update {}", table))
    }

    async fn upsert(&self, table: &str, rows: &[Value], conflict_key: &str) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = row_columns(rows);
        if !columns.iter().any(|c| c == conflict_key) {
            bail!(
                "Upsert into {} is missing conflict column {}",
                table,
                conflict_key
            );
        }
        let sql = build_upsert_sql(table, &columns, conflict_key);
        debug!("upsert: {}", sql);
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get DB client for upsert")?;
        let payload = Value::Array(rows.to_vec());
        client
            .execute(&sql, &[&payload])
            .await
            .with_context(|| format!("Failed to upsert into {}", table))
    }
}
