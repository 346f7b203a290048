//! In-process table store for tests.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{Direction, Filter, Query, TableStore};

#[derive(Default)]
struct Tables {
    rows: BTreeMap<String, Vec<Value>>,
    next_id: i64,
    upsert_calls: usize,
}

/// In-process [`TableStore`] with the same filter/upsert semantics as the
/// Postgres store. Inserted rows without an `id` get a sequential one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_upserts: HashSet<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `table` with `rows` (builder style). Later inserts get ids above
    /// any numeric seeded id.
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        if let Ok(mut tables) = self.tables.lock() {
            let max_id = rows
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            tables.next_id = tables.next_id.max(max_id);
            tables.rows.insert(table.to_string(), rows);
        }
        self
    }

    /// Makes the n-th upsert call (0-based) fail.
    pub fn fail_upsert_call(mut self, call: usize) -> Self {
        self.failing_upserts.insert(call);
        self
    }

    /// Snapshot of the rows currently stored in `table`.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|t| t.rows.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

fn compare_json(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_json(a, b) == Some(Ordering::Equal),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => a == b,
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => row.get(column).is_some_and(|v| json_equal(v, value)),
        Filter::Gt(column, value) => row
            .get(column)
            .and_then(|v| compare_json(v, value))
            .is_some_and(|o| o == Ordering::Greater),
        Filter::NotNull(column) => row.get(column).is_some_and(|v| !v.is_null()),
    })
}

fn project(row: &Value, columns: &[String]) -> Value {
    if columns.is_empty() {
        return row.clone();
    }
    let mut out = Map::new();
    for column in columns {
        out.insert(
            column.clone(),
            row.get(column).cloned().unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

fn merge_into(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        let tables = self.lock()?;
        let mut rows: Vec<&Value> = tables
            .rows
            .get(table)
            .map(|rows| rows.iter().filter(|r| row_matches(r, &query.filters)).collect())
            .unwrap_or_default();
        if let Some((column, direction)) = &query.order {
            rows.sort_by(|a, b| {
                let a = a.get(column).unwrap_or(&Value::Null);
                let b = b.get(column).unwrap_or(&Value::Null);
                let ord = compare_json(a, b).unwrap_or(Ordering::Equal);
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|r| project(r, &query.columns))
            .collect())
    }

    async fn insert(&self, table: &str, rows: &[Value]) -> Result<Vec<Value>> {
        let mut tables = self.lock()?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            if !row.is_object() {
                bail!("Insert into {} expects JSON objects", table);
            }
            let mut row = row.clone();
            if row.get("id").map_or(true, Value::is_null) {
                tables.next_id += 1;
                let id = tables.next_id;
                merge_into(&mut row, &serde_json::json!({ "id": id }));
            }
            inserted.push(row);
        }
        tables
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update(&self, table: &str, patch: &Value, filters: &[Filter]) -> Result<u64> {
        let mut tables = self.lock()?;
        let mut updated = 0;
        if let Some(rows) = tables.rows.get_mut(table) {
            for row in rows.iter_mut().filter(|r| row_matches(r, filters)) {
                merge_into(row, patch);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn upsert(&self, table: &str, rows: &[Value], conflict_key: &str) -> Result<u64> {
        let mut tables = self.lock()?;
        let call = tables.upsert_calls;
        tables.upsert_calls += 1;
        if self.failing_upserts.contains(&call) {
            bail!("simulated upsert failure on call {}", call);
        }

        let mut affected = 0;
        for row in rows {
            let key = row
                .get(conflict_key)
                .cloned()
                .ok_or_else(|| anyhow!("Upsert row is missing conflict column {}", conflict_key))?;
            let stored = tables.rows.entry(table.to_string()).or_default();
            match stored
                .iter_mut()
                .find(|r| r.get(conflict_key).is_some_and(|v| json_equal(v, &key)))
            {
                Some(existing) => merge_into(existing, row),
                None => stored.push(row.clone()),
            }
            affected += 1;
        }
        Ok(affected)
    }
}
