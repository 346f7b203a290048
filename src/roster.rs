//! Registered-member roster import into `members` / `relationships`.

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde_json::{json, Value};
use std::path::Path;

use crate::matcher::MEMBERS_TABLE;
use crate::normalize::{clean_display_name, clean_phone, MISSING_PHONE};
use crate::sheet_reader::{read_table, SheetRow};
use crate::store::{Filter, Query, TableStore};

pub const RELATIONSHIPS_TABLE: &str = "relationships";
/// The roster's column labels sit on the second row.
pub const ROSTER_HEADER_ROW: usize = 1;

const NAME_COLUMN: &str = "조합원";

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyDraft {
    pub name: String,
    pub phone: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDraft {
    pub name: String,
    pub phone: String,
    pub payload: Value,
    pub proxy: Option<ProxyDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterSummary {
    pub processed: usize,
    pub updated: usize,
    pub inserted: usize,
    pub proxies_added: usize,
    pub failed: usize,
}

/// `탈퇴` in the memo wins over `소송`; a deceased marker in the name comes last.
pub fn derive_status(memo: &str, name: &str) -> &'static str {
    if memo.contains("탈퇴") {
        "탈퇴예정"
    } else if memo.contains("소송") {
        "소송중"
    } else if name.contains("별세") {
        "사망"
    } else {
        "정상"
    }
}

fn text_or_empty(row: &SheetRow<'_>, column: &str) -> String {
    row.text(column).unwrap_or_default()
}

fn memo_parts(row: &SheetRow<'_>) -> String {
    let mut parts = Vec::new();
    if let Some(v) = row.text("비고") {
        parts.push(v);
    }
    if let Some(v) = row.text("기타") {
        parts.push(v);
    }
    if let Some(v) = row.text("탈퇴") {
        parts.push(format!("탈퇴관련: {}", v));
    }
    if let Some(v) = row.text("소송") {
        parts.push(format!("소송관련: {}", v));
    }
    parts.join(" / ")
}

/// Builds the member payload for one roster row; `None` for rows without a
/// name and for repeated header rows.
pub fn member_draft(row: &SheetRow<'_>) -> Option<MemberDraft> {
    let raw_name = row.text(NAME_COLUMN)?;
    if raw_name == NAME_COLUMN {
        return None;
    }
    let name = clean_display_name(Some(&raw_name));
    let phone = clean_phone(row.text("핸드폰번호").as_deref());
    let memo = memo_parts(row);
    let status = derive_status(&memo, &name);

    let payload = json!({
        "name": name,
        "phone": phone,
        "member_number": text_or_empty(row, "조합번호"),
        "tier": "1차",
        "is_registered": true,
        "status": status,
        "memo": memo,
        "address_legal": text_or_empty(row, "주소"),
        "unit_group": text_or_empty(row, "입주평형"),
    });

    let proxy = row
        .text("대리인")
        .filter(|p| p.trim() != name)
        .map(|p| {
            let mut phone = clean_phone(row.text("대리인 연락처").as_deref());
            if phone == MISSING_PHONE {
                phone = clean_phone(row.text("대리인연락처").as_deref());
            }
            ProxyDraft {
                name: clean_display_name(Some(&p)),
                phone,
                relation: text_or_empty(row, "대리관계"),
            }
        });

    Some(MemberDraft {
        name,
        phone,
        payload,
        proxy,
    })
}

/// Imports the roster. Members are looked up by name and updated or
/// inserted; a proxy is added only when no relationship with the same
/// (member, name) pair exists yet. Without `live`, nothing is written.
pub async fn import_roster(store: &dyn TableStore, path: &Path, live: bool) -> Result<RosterSummary> {
    let table = read_table(path, None, ROSTER_HEADER_ROW)?;
    println!("Roster loaded: {} rows", table.rows.len());
    let mut summary = RosterSummary::default();

    for row in table.iter() {
        let Some(draft) = member_draft(&row) else {
            continue;
        };
        match import_member(store, &draft, live, &mut summary).await {
            Ok(()) => summary.processed += 1,
            Err(e) => {
                warn!("Roster row for '{}' failed: {:#}", draft.name, e);
                summary.failed += 1;
            }
        }
    }

    info!(
        "Roster import finished: {} processed, {} updated, {} inserted, {} proxies added, {} failed",
        summary.processed, summary.updated, summary.inserted, summary.proxies_added, summary.failed
    );
    Ok(summary)
}

async fn import_member(
    store: &dyn TableStore,
    draft: &MemberDraft,
    live: bool,
    summary: &mut RosterSummary,
) -> Result<()> {
    let existing = store
        .select(
            MEMBERS_TABLE,
            &Query::new().columns(&["id"]).eq("name", draft.name.as_str()).limit(1),
        )
        .await?;

    let member_id = match existing.first().and_then(|row| row.get("id")).cloned() {
        Some(id) => {
            if live {
                store
                    .update(MEMBERS_TABLE, &draft.payload, &[Filter::Eq("id".into(), id.clone())])
                    .await?;
            }
            summary.updated += 1;
            Some(id)
        }
        None => {
            summary.inserted += 1;
            if live {
                let inserted = store.insert(MEMBERS_TABLE, std::slice::from_ref(&draft.payload)).await?;
                let id = inserted
                    .first()
                    .and_then(|row| row.get("id"))
                    .cloned()
                    .ok_or_else(|| anyhow!("insert returned no id for '{}'", draft.name))?;
                Some(id)
            } else {
                None
            }
        }
    };

    match (&draft.proxy, member_id) {
        (Some(proxy), Some(member_id)) => {
            if add_proxy(store, &member_id, proxy, live).await? {
                summary.proxies_added += 1;
                println!("  Member: {} -> proxy added: {}", draft.name, proxy.name);
            } else {
                println!("  Member: {} (proxy {} already linked)", draft.name, proxy.name);
            }
        }
        (Some(proxy), None) => {
            println!("  Member: {} -> proxy pending: {}", draft.name, proxy.name);
        }
        (None, _) => println!("  Member: {} ({})", draft.name, draft.phone),
    }
    Ok(())
}

/// Inserts the proxy unless the (member_id, name) pair is already present.
/// Returns whether a new relationship was (or in dry-run would be) added.
async fn add_proxy(store: &dyn TableStore, member_id: &Value, proxy: &ProxyDraft, live: bool) -> Result<bool> {
    let existing = store
        .select(
            RELATIONSHIPS_TABLE,
            &Query::new()
                .columns(&["id"])
                .eq("member_id", member_id.clone())
                .eq("name", proxy.name.as_str())
                .limit(1),
        )
        .await?;
    if !existing.is_empty() {
        return Ok(false);
    }
    if live {
        let relationship = json!({
            "member_id": member_id,
            "name": proxy.name,
            "phone": proxy.phone,
            "relation": proxy.relation,
            "note": "자동등록",
        });
        store.insert(RELATIONSHIPS_TABLE, &[relationship]).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_reader::SheetTable;
    use calamine::Data;

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    fn roster(values: Vec<Data>) -> SheetTable {
        let header = ["조합원", "핸드폰번호", "비고", "탈퇴", "대리인", "대리인연락처", "대리관계"];
        SheetTable::from_rows(
            "roster",
            vec![header.iter().map(|h| s(h)).collect(), values],
            0,
        )
    }

    #[test]
    fn test_derive_status_precedence() {
        assert_eq!(derive_status("탈퇴 및 소송", "홍길동"), "탈퇴예정");
        assert_eq!(derive_status("소송 진행", "홍길동"), "소송중");
        assert_eq!(derive_status("", "홍길동(별세)"), "사망");
        assert_eq!(derive_status("", "홍길동"), "정상");
    }

    #[test]
    fn test_member_draft_collects_memo_and_proxy() {
        let t = roster(vec![
            s(" 홍길동 "),
            s("010-1111-2222"),
            s("확인"),
            s("신청"),
            s("김대리"),
            s("010 3333 4444"),
            s("배우자"),
        ]);
        let draft = member_draft(&t.iter().next().unwrap()).unwrap();
        assert_eq!(draft.name, "홍길동");
        assert_eq!(draft.phone, "01011112222");
        assert_eq!(draft.payload["memo"], "확인 / 탈퇴관련: 신청");
        assert_eq!(draft.payload["status"], "탈퇴예정");
        assert_eq!(draft.payload["member_number"], "");
        let proxy = draft.proxy.unwrap();
        assert_eq!(proxy.phone, "01033334444");
        assert_eq!(proxy.relation, "배우자");
    }

    #[test]
    fn test_member_draft_skips_header_repeats_and_self_proxy() {
        let header_repeat = roster(vec![s("조합원"), Data::Empty, Data::Empty, Data::Empty, Data::Empty, Data::Empty, Data::Empty]);
        assert!(member_draft(&header_repeat.iter().next().unwrap()).is_none());

        let self_proxy = roster(vec![s("홍길동"), Data::Empty, Data::Empty, Data::Empty, s("홍길동"), Data::Empty, Data::Empty]);
        let draft = member_draft(&self_proxy.iter().next().unwrap()).unwrap();
        assert!(draft.proxy.is_none());
        assert_eq!(draft.phone, MISSING_PHONE);
    }
}
