use serde_json::json;

use rights_ledger::excel_writer::{REFUNDED_HEADERS, REFUNDED_SHEET_NAME};
use rights_ledger::reports::{analyze_rights, export_refunded_rights};
use rights_ledger::sheet_reader::read_table;
use rights_ledger::store::MemoryStore;
use rights_ledger::uploader::LEGACY_TABLE;

fn legacy_store() -> MemoryStore {
    MemoryStore::new().with_table(
        LEGACY_TABLE,
        vec![
            json!({
                "original_name": "홍길동", "rights_count": 2, "is_refunded": true,
                "contacts": ["010-1111-2222"], "addresses": ["서울", "경기"],
                "certificates": [{"no": "A-1", "name": "홍길동", "date": "", "price": "3000"}],
                "memo": null
            }),
            json!({
                "original_name": "박민수", "rights_count": 5, "is_refunded": true,
                "contacts": [], "addresses": "부산 해운대구", "certificates": [],
                "memo": "재확인"
            }),
            json!({"original_name": "최민지", "rights_count": 0, "is_refunded": true}),
            json!({"original_name": "김철수", "rights_count": 3, "is_refunded": false}),
        ],
    )
}

#[tokio::test]
async fn export_writes_holders_by_rights_count() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    let output = temp.path().join("reports").join("refunded.xlsx");
    let store = legacy_store();

    let written = export_refunded_rights(&store, &output).await.unwrap();
    assert_eq!(written, 2);

    let table = read_table(&output, Some(REFUNDED_SHEET_NAME), 0).unwrap();
    assert_eq!(table.columns, REFUNDED_HEADERS.map(String::from).to_vec());
    let rows: Vec<_> = table.iter().collect();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].text("성명").as_deref(), Some("박민수"));
    assert_eq!(rows[0].text("권리증수").as_deref(), Some("5"));
    assert_eq!(rows[0].text("주소").as_deref(), Some("부산 해운대구"));
    assert_eq!(rows[0].text("비고").as_deref(), Some("재확인"));

    assert_eq!(rows[1].text("성명").as_deref(), Some("홍길동"));
    assert_eq!(rows[1].text("주소").as_deref(), Some("서울 | 경기"));
    assert_eq!(rows[1].text("필증상세").as_deref(), Some("[A-1] 3000"));
}

#[tokio::test]
async fn stats_cover_refunded_records_only() {
    let stats = analyze_rights(&legacy_store()).await.unwrap();
    assert_eq!(stats.total_refunded, 3);
    assert_eq!(stats.holders, 2);
    assert_eq!(stats.total_certificates, 7);
    assert_eq!(stats.top_holders[0], ("박민수".to_string(), 5));
}
