//! Copies address and memo hints from matched legacy records onto their
//! registry members.

use anyhow::Result;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::matcher::MEMBERS_TABLE;
use crate::models::MemberId;
use crate::store::{select_as, Direction, Filter, Query, TableStore};
use crate::uploader::LEGACY_TABLE;

pub const ADDRESS_KEYS: [&str; 5] = ["주소", "거주지", "집", "Address", "ADDR"];
pub const MEMO_KEYS: [&str; 7] = ["비고", "메모", "특이사항", "참고", "Note", "MEMO", "REMARK"];

const SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Deserialize)]
struct LinkedRecord {
    member_id: MemberId,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    raw_data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncAction {
    pub member_id: MemberId,
    pub name: Option<String>,
    pub address: Option<String>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub live: bool,
    pub matched_members: usize,
    pub actions_queued: usize,
    pub success_count: usize,
    pub sample: Vec<SyncAction>,
}

fn key_matches(key: &str, search_keys: &[&str]) -> bool {
    let key = key.to_lowercase();
    search_keys.iter().any(|k| key.contains(&k.to_lowercase()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn find_in_object(map: &Map<String, Value>, search_keys: &[&str]) -> Option<String> {
    let direct = map
        .iter()
        .filter(|(key, _)| key_matches(key, search_keys))
        .find_map(|(_, value)| scalar_text(value));
    if direct.is_some() {
        return direct;
    }
    map.values().find_map(|value| find_value(value, search_keys))
}

/// First non-empty value under a key containing one of `search_keys`
/// (case-insensitive). Direct keys are tried before nested objects/arrays.
pub fn find_value(value: &Value, search_keys: &[&str]) -> Option<String> {
    match value {
        Value::Object(map) => find_in_object(map, search_keys),
        Value::Array(items) => items.iter().find_map(|item| find_value(item, search_keys)),
        _ => None,
    }
}

/// Builds the update actions. Later records of the same member win.
pub fn plan_actions(records: Vec<(MemberId, Option<String>, Value)>) -> (usize, Vec<SyncAction>) {
    let mut latest: BTreeMap<MemberId, (Option<String>, Value)> = BTreeMap::new();
    for (member_id, name, raw_data) in records {
        latest.insert(member_id, (name, raw_data));
    }
    let matched = latest.len();
    let actions = latest
        .into_iter()
        .filter_map(|(member_id, (name, raw_data))| {
            let address = find_value(&raw_data, &ADDRESS_KEYS);
            let memo = find_value(&raw_data, &MEMO_KEYS);
            (address.is_some() || memo.is_some()).then(|| SyncAction {
                member_id,
                name,
                address,
                memo,
            })
        })
        .collect();
    (matched, actions)
}

fn patch_for(action: &SyncAction) -> Value {
    let mut patch = Map::new();
    if let Some(address) = &action.address {
        patch.insert("address_legal".into(), json!(address));
    }
    if let Some(memo) = &action.memo {
        patch.insert("memo".into(), json!(memo));
    }
    Value::Object(patch)
}

pub async fn sync_legacy(store: &dyn TableStore, live: bool) -> Result<SyncReport> {
    let query = Query::new()
        .not_null("member_id")
        .order_by("created_at", Direction::Asc);
    let records: Vec<LinkedRecord> = select_as(store, LEGACY_TABLE, &query).await?;
    info!("Found {} linked legacy records", records.len());

    let (matched_members, actions) = plan_actions(
        records
            .into_iter()
            .map(|r| (r.member_id, r.original_name, r.raw_data))
            .collect(),
    );

    let mut success_count = 0;
    if live {
        for action in &actions {
            let filter = Filter::Eq("id".into(), json!(action.member_id.0));
            match store.update(MEMBERS_TABLE, &patch_for(action), &[filter]).await {
                Ok(_) => success_count += 1,
                Err(e) => warn!("Member {} update failed: {:#}", action.member_id, e),
            }
        }
    }

    let report = SyncReport {
        live,
        matched_members,
        actions_queued: actions.len(),
        success_count,
        sample: actions.into_iter().take(SAMPLE_SIZE).collect(),
    };
    println!(
        "Mode: {} | members: {} | actions: {} | succeeded: {}",
        if live { "LIVE" } else { "DRY_RUN" },
        report.matched_members,
        report.actions_queued,
        report.success_count
    );
    for action in &report.sample {
        println!(
            "  {} ({}): address={:?} memo={:?}",
            action.name.as_deref().unwrap_or("-"),
            action.member_id,
            action.address,
            action.memo
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_find_value_prefers_direct_keys() {
        let raw = json!({
            "2022명단": {"주소": "nested"},
            "현주소": "  서울시 강남구 "
        });
        assert_eq!(find_value(&raw, &ADDRESS_KEYS).as_deref(), Some("서울시 강남구"));
    }

    #[test]
    fn test_find_value_recurses_into_lists_and_is_case_insensitive() {
        let raw = json!({
            "MainSource": {"성명": "홍길동"},
            "S": [{"remark": ""}, {"Remarks": "call back"}]
        });
        assert_eq!(find_value(&raw, &MEMO_KEYS).as_deref(), Some("call back"));
        assert_eq!(find_value(&raw, &ADDRESS_KEYS), None);
    }

    #[test]
    fn test_find_value_accepts_numbers() {
        assert_eq!(find_value(&json!({"비고": 12}), &MEMO_KEYS).as_deref(), Some("12"));
    }

    #[test]
    fn test_plan_actions_later_record_wins() {
        let (matched, actions) = plan_actions(vec![
            (MemberId::from("1"), Some("a".into()), json!({"비고": "old"})),
            (MemberId::from("1"), Some("a".into()), json!({"비고": "new"})),
            (MemberId::from("2"), Some("b".into()), json!({"성명": "b"})),
        ]);
        assert_eq!(matched, 2);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].memo.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_sync_updates_members_only_when_live() {
        let store = MemoryStore::new()
            .with_table(
                LEGACY_TABLE,
                vec![
                    json!({"original_name": "홍길동", "member_id": "1", "created_at": 1,
                           "raw_data": {"S": {"주소": "서울"}}}),
                    json!({"original_name": "무명", "member_id": null, "created_at": 2,
                           "raw_data": {"S": {"주소": "부산"}}}),
                ],
            )
            .with_table(MEMBERS_TABLE, vec![json!({"id": "1", "name": "홍길동"})]);

        let dry = sync_legacy(&store, false).await.unwrap();
        assert_eq!(dry.actions_queued, 1);
        assert_eq!(dry.success_count, 0);
        assert!(store.rows(MEMBERS_TABLE)[0].get("address_legal").is_none());

        let live = sync_legacy(&store, true).await.unwrap();
        assert_eq!(live.success_count, 1);
        assert_eq!(store.rows(MEMBERS_TABLE)[0]["address_legal"], json!("서울"));
    }
}
