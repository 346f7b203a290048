//! Row types shared by the migration and reporting commands.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Flat key/value snapshot of one spreadsheet row (all values are strings).
pub type RowSnapshot = Map<String, Value>;

/// Raw rows contributed by one sheet for one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Single(RowSnapshot),
    Many(Vec<RowSnapshot>),
}

impl RawPayload {
    /// Adds another row from the same sheet. A single snapshot becomes a
    /// two-element list; a list grows in contribution order.
    pub fn absorb(&mut self, snapshot: RowSnapshot) {
        match self {
            RawPayload::Many(list) => list.push(snapshot),
            RawPayload::Single(existing) => {
                let first = std::mem::take(existing);
                *self = RawPayload::Many(vec![first, snapshot]);
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawPayload::Single(_) => 1,
            RawPayload::Many(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub no: String,
    pub name: String,
    pub date: String,
    pub price: String,
}

/// Opaque registry id. The `members.id` column may be numeric or textual,
/// so both JSON forms are accepted and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl<'de> Deserialize<'de> for MemberId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(MemberId(s)),
            Value::Number(n) => Ok(MemberId(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "unsupported member id: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        MemberId(id.to_string())
    }
}

/// One row of the `legacy_records` table, keyed by the normalized name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub original_name: String,
    #[serde(default)]
    pub rights_count: u32,
    #[serde(default)]
    pub contacts: Vec<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
    #[serde(default)]
    pub status_flags: BTreeMap<String, String>,
    #[serde(default)]
    pub raw_data: BTreeMap<String, RawPayload>,
    #[serde(default)]
    pub source_file: Option<String>,
    pub is_refunded: bool,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub extra_info: Map<String, Value>,
}

impl PersonRecord {
    /// A record known only from historical data: no rights, not linked.
    pub fn legacy(original_name: impl Into<String>) -> Self {
        PersonRecord {
            original_name: original_name.into(),
            rights_count: 0,
            contacts: Vec::new(),
            addresses: Vec::new(),
            certificates: Vec::new(),
            status_flags: BTreeMap::new(),
            raw_data: BTreeMap::new(),
            source_file: None,
            is_refunded: true,
            member_id: None,
            needs_review: false,
            extra_info: Map::new(),
        }
    }

    /// Files a row snapshot under `source`, converting to a list on repeat.
    pub fn add_raw(&mut self, source: &str, snapshot: RowSnapshot) {
        match self.raw_data.get_mut(source) {
            Some(existing) => existing.absorb(snapshot),
            None => {
                self.raw_data
                    .insert(source.to_string(), RawPayload::Single(snapshot));
            }
        }
    }
}

/// A row of the `members` table as far as matching is concerned.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegistryMember {
    pub id: MemberId,
    #[serde(default)]
    pub name: Option<String>,
}

/// Aggregate outcome of matching local records against the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub matched: usize,
    pub ambiguous: usize,
    pub unmatched: usize,
}

impl MatchStats {
    pub fn total(&self) -> usize {
        self.matched + self.ambiguous + self.unmatched
    }
}

// Rows read back from `legacy_records` by the reporting commands.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRightsRow {
    pub original_name: String,
    #[serde(default)]
    pub rights_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LegacyExportSource {
    pub original_name: Option<String>,
    #[serde(default)]
    pub rights_count: Option<i64>,
    #[serde(default)]
    pub birth_date: Option<Value>,
    #[serde(default)]
    pub contacts: Option<Value>,
    #[serde(default)]
    pub addresses: Option<Value>,
    #[serde(default)]
    pub certificates: Option<Value>,
    #[serde(default)]
    pub memo: Option<String>,
}

// Final export row for the refunded rights holder sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundedExportRow {
    pub name: Option<String>,
    pub rights_count: Option<i64>,
    pub birth_date: Option<String>,
    pub contacts: String,
    pub addresses: String,
    pub certificate_details: String,
    pub memo: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(note: &str) -> RowSnapshot {
        let mut map = Map::new();
        map.insert("비고".into(), Value::String(note.into()));
        map
    }

    #[test]
    fn test_add_raw_converts_to_list_in_order() {
        let mut record = PersonRecord::legacy("홍길동");
        record.add_raw("2022명단", snapshot("first"));
        record.add_raw("2022명단", snapshot("second"));
        record.add_raw("2022명단", snapshot("third"));

        match &record.raw_data["2022명단"] {
            RawPayload::Many(list) => {
                let notes: Vec<_> = list.iter().map(|s| s["비고"].clone()).collect();
                assert_eq!(notes, vec![json!("first"), json!("second"), json!("third")]);
            }
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_distinct_sheets_keep_separate_namespaces() {
        let mut record = PersonRecord::legacy("홍길동");
        record.add_raw("A", snapshot("a"));
        record.add_raw("B", snapshot("b"));
        assert_eq!(record.raw_data["A"], RawPayload::Single(snapshot("a")));
        assert_eq!(record.raw_data["B"], RawPayload::Single(snapshot("b")));
    }

    #[test]
    fn test_member_id_accepts_numbers_and_strings() {
        let numeric: RegistryMember = serde_json::from_value(json!({"id": 10, "name": "이영희"})).unwrap();
        let textual: RegistryMember =
            serde_json::from_value(json!({"id": "7f1c", "name": null})).unwrap();
        assert_eq!(numeric.id, MemberId::from("10"));
        assert_eq!(textual.id.to_string(), "7f1c");
        assert!(textual.name.is_none());
    }

    #[test]
    fn test_person_record_serializes_raw_payload_shapes() {
        let mut record = PersonRecord::legacy("홍길동");
        record.add_raw("S", snapshot("x"));
        record.add_raw("S", snapshot("y"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["raw_data"]["S"], json!([{"비고": "x"}, {"비고": "y"}]));
        assert_eq!(value["is_refunded"], json!(true));
        assert_eq!(value["member_id"], Value::Null);

        let back: PersonRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
