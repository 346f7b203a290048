//! Table-store abstraction over the hosted database.
//!
//! Every command talks to the backend through [`TableStore`]: filtered
//! selects, inserts, updates and upserts over JSON rows. The Postgres
//! implementation is built once in `main` and passed down by reference.

pub mod memory;
pub mod postgres;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Row predicate understood by every store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gt(String, Value),
    NotNull(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// Select request: projection, predicates (all must hold), ordering, limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(column.to_string(), value.into()));
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::NotNull(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Rows matching the query, as JSON objects.
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    /// Inserts the rows and returns them as stored (ids filled in).
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>>;

    /// Applies the object `patch` to every row matching `filters`.
    async fn update(&self, table: &str, patch: &Value, filters: &[Filter]) -> Result<u64>;

    /// Insert-or-update keyed by the unique column `conflict_key`.
    async fn upsert(&self, table: &str, rows: &[Value], conflict_key: &str) -> Result<u64>;
}

/// Runs a select and deserializes each row into `T`.
pub async fn select_as<T: DeserializeOwned>(
    store: &dyn TableStore,
    table: &str,
    query: &Query,
) -> Result<Vec<T>> {
    let rows = store.select(table, query).await?;
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .with_context(|| format!("Failed to decode row from table {}", table))
        })
        .collect()
}

/// Union of the keys of every row object, in first-seen order.
pub(crate) fn row_columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_builder_collects_filters_in_order() {
        let query = Query::new()
            .columns(&["original_name", "rights_count"])
            .eq("is_refunded", true)
            .gt("rights_count", 0)
            .order_by("rights_count", Direction::Desc)
            .limit(5);

        assert_eq!(query.columns, vec!["original_name", "rights_count"]);
        assert_eq!(
            query.filters,
            vec![
                Filter::Eq("is_refunded".into(), json!(true)),
                Filter::Gt("rights_count".into(), json!(0)),
            ]
        );
        assert_eq!(query.order, Some(("rights_count".into(), Direction::Desc)));
        assert_eq!(query.limit, Some(5));
    }

    #[test]
    fn test_row_columns_union_first_seen() {
        let rows = vec![json!({"a": 1, "b": 2}), json!({"b": 3, "c": 4})];
        let columns = row_columns(&rows);
        assert_eq!(columns.len(), 3);
        assert!(columns.contains(&"a".to_string()));
        assert!(columns.contains(&"c".to_string()));
    }
}
