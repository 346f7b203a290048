//! Read-only reports over `legacy_records`: the refunded rights holder
//! export and the rights distribution summary.

use anyhow::Result;
use log::info;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::excel_writer::write_refunded_rights;
use crate::models::{LegacyExportSource, LegacyRightsRow, RefundedExportRow};
use crate::store::{select_as, Direction, Query, TableStore};
use crate::uploader::LEGACY_TABLE;

fn join_list(value: Option<&Value>, separator: &str) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(separator),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn field_text(cert: &Value, key: &str) -> String {
    match cert.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn certificate_details(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(certs)) => certs
            .iter()
            .map(|c| format!("[{}] {}", field_text(c, "no"), field_text(c, "price")))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

impl From<LegacyExportSource> for RefundedExportRow {
    fn from(source: LegacyExportSource) -> Self {
        RefundedExportRow {
            name: source.original_name,
            rights_count: source.rights_count,
            birth_date: source.birth_date.as_ref().and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }),
            contacts: join_list(source.contacts.as_ref(), ", "),
            addresses: join_list(source.addresses.as_ref(), " | "),
            certificate_details: certificate_details(source.certificates.as_ref()),
            memo: source.memo,
        }
    }
}

/// Refunded records still holding rights, most rights first.
pub async fn fetch_refunded_holders(store: &dyn TableStore) -> Result<Vec<RefundedExportRow>> {
    let query = Query::new()
        .eq("is_refunded", true)
        .gt("rights_count", 0)
        .order_by("rights_count", Direction::Desc);
    let sources: Vec<LegacyExportSource> = select_as(store, LEGACY_TABLE, &query).await?;
    info!("Fetched {} refunded rights holders", sources.len());
    Ok(sources.into_iter().map(RefundedExportRow::from).collect())
}

pub async fn export_refunded_rights(store: &dyn TableStore, output: &Path) -> Result<usize> {
    let rows = fetch_refunded_holders(store).await?;
    println!("{} refunded rights holders found", rows.len());
    write_refunded_rights(output, &rows)?;
    println!("File written: {}", output.display());
    Ok(rows.len())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RightsStats {
    pub total_refunded: usize,
    pub holders: usize,
    pub total_certificates: i64,
    /// rights count -> number of holders
    pub distribution: BTreeMap<i64, usize>,
    /// Top holders by rights count.
    pub top_holders: Vec<(String, i64)>,
}

impl RightsStats {
    pub fn from_rows(rows: &[LegacyRightsRow], top: usize) -> Self {
        let mut stats = RightsStats {
            total_refunded: rows.len(),
            ..RightsStats::default()
        };
        let mut holders: Vec<(String, i64)> = rows
            .iter()
            .filter_map(|r| {
                let count = r.rights_count.unwrap_or(0);
                (count > 0).then(|| (r.original_name.clone(), count))
            })
            .collect();
        for (_, count) in &holders {
            stats.total_certificates += count;
            *stats.distribution.entry(*count).or_insert(0) += 1;
        }
        stats.holders = holders.len();
        holders.sort_by(|a, b| b.1.cmp(&a.1));
        holders.truncate(top);
        stats.top_holders = holders;
        stats
    }

    pub fn holder_percentage(&self) -> f64 {
        if self.total_refunded == 0 {
            0.0
        } else {
            self.holders as f64 / self.total_refunded as f64 * 100.0
        }
    }

    pub fn print(&self) {
        println!("\n[Summary]");
        println!("Refunded / legacy records: {}", self.total_refunded);
        println!(
            "Rights holders: {} ({:.1}%)",
            self.holders,
            self.holder_percentage()
        );
        println!("Certificates held: {}", self.total_certificates);
        println!("\n[Distribution by count]");
        for (count, people) in &self.distribution {
            println!(" - {} held: {} people", count, people);
        }
        println!("\n[Top holders]");
        for (name, count) in &self.top_holders {
            println!(" - {}: {}", name, count);
        }
    }
}

pub async fn analyze_rights(store: &dyn TableStore) -> Result<RightsStats> {
    let query = Query::new()
        .columns(&["original_name", "rights_count"])
        .eq("is_refunded", true);
    let rows: Vec<LegacyRightsRow> = select_as(store, LEGACY_TABLE, &query).await?;
    let stats = RightsStats::from_rows(&rows, 5);
    stats.print();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_export_row_formatting() {
        let source: LegacyExportSource = serde_json::from_value(json!({
            "original_name": "홍길동",
            "rights_count": 2,
            "birth_date": null,
            "contacts": ["010-1", "010-2"],
            "addresses": ["서울", "부산"],
            "certificates": [
                {"no": "A-1", "name": "홍길동", "date": "", "price": "3000"},
                {"no": "A-2", "name": "홍길동", "date": "", "price": "4000"}
            ],
            "memo": "확인"
        }))
        .unwrap();
        let row = RefundedExportRow::from(source);
        assert_eq!(row.contacts, "010-1, 010-2");
        assert_eq!(row.addresses, "서울 | 부산");
        assert_eq!(row.certificate_details, "[A-1] 3000\n[A-2] 4000");
        assert_eq!(row.birth_date, None);
    }

    #[test]
    fn test_non_list_values_render_as_text() {
        assert_eq!(join_list(Some(&json!("서울시")), " | "), "서울시");
        assert_eq!(join_list(None, ", "), "");
        assert_eq!(certificate_details(Some(&json!({"no": "x"}))), "");
    }

    #[test]
    fn test_rights_stats() {
        let rows: Vec<LegacyRightsRow> = [("a", 0), ("b", 2), ("c", 1), ("d", 2), ("e", 5)]
            .iter()
            .map(|(n, c)| LegacyRightsRow {
                original_name: n.to_string(),
                rights_count: Some(*c),
            })
            .collect();
        let stats = RightsStats::from_rows(&rows, 2);
        assert_eq!(stats.total_refunded, 5);
        assert_eq!(stats.holders, 4);
        assert_eq!(stats.total_certificates, 10);
        assert_eq!(stats.distribution.get(&2), Some(&2));
        assert_eq!(stats.top_holders[0], ("e".to_string(), 5));
        assert_eq!(stats.top_holders.len(), 2);
        assert!((stats.holder_percentage() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats_do_not_divide_by_zero() {
        let stats = RightsStats::from_rows(&[], 5);
        assert_eq!(stats.holder_percentage(), 0.0);
    }

    #[tokio::test]
    async fn test_fetch_refunded_holders_filters_and_orders() {
        let store = MemoryStore::new().with_table(
            LEGACY_TABLE,
            vec![
                json!({"original_name": "a", "rights_count": 1, "is_refunded": true}),
                json!({"original_name": "b", "rights_count": 4, "is_refunded": true}),
                json!({"original_name": "c", "rights_count": 0, "is_refunded": true}),
                json!({"original_name": "d", "rights_count": 9, "is_refunded": false}),
            ],
        );
        let rows = fetch_refunded_holders(&store).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
