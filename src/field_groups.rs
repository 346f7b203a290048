//! Numbered column families of the primary workbook (`연락처_1..4`,
//! `필증NO_1..4`, ...) described as data and read by one routine.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::models::Certificate;
use crate::sheet_reader::SheetRow;

/// A family of numbered columns. Each member of the family is the set of
/// `fields`, whose column names come from the template with `{i}` replaced
/// by the index. A member exists only if its `anchor` field has a value.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub family: &'static str,
    pub indices: RangeInclusive<u32>,
    pub fields: &'static [(&'static str, &'static str)],
    pub anchor: &'static str,
}

pub const CONTACTS: FieldGroup = FieldGroup {
    family: "contacts",
    indices: 1..=4,
    fields: &[("value", "연락처_{i}")],
    anchor: "value",
};

pub const ADDRESSES: FieldGroup = FieldGroup {
    family: "addresses",
    indices: 1..=3,
    fields: &[("value", "주소_{i}")],
    anchor: "value",
};

pub const CERTIFICATES: FieldGroup = FieldGroup {
    family: "certificates",
    indices: 1..=4,
    fields: &[
        ("no", "필증NO_{i}"),
        ("name", "필증성명_{i}"),
        ("date", "필증일자_{i}"),
        ("price", "가격_{i}"),
    ],
    anchor: "no",
};

pub const STATUS_FLAG_COLUMNS: [&str; 3] = ["권리위임", "서류제출", "모임참석"];

impl FieldGroup {
    pub fn column_name(template: &str, index: u32) -> String {
        template.replace("{i}", &index.to_string())
    }

    /// Members present in `row`, in index order. Values are trimmed; absent
    /// companion fields are empty strings.
    pub fn extract(&self, row: &SheetRow<'_>) -> Vec<BTreeMap<&'static str, String>> {
        let mut members = Vec::new();
        for index in self.indices.clone() {
            let mut member = BTreeMap::new();
            for (field, template) in self.fields {
                let value = row
                    .text(&Self::column_name(template, index))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                member.insert(*field, value);
            }
            if member.get(self.anchor).is_some_and(Option::is_some) {
                members.push(
                    member
                        .into_iter()
                        .map(|(field, value)| (field, value.unwrap_or_default()))
                        .collect(),
                );
            }
        }
        members
    }

    /// Single-field families as a plain list of values.
    pub fn extract_values(&self, row: &SheetRow<'_>) -> Vec<String> {
        self.extract(row)
            .into_iter()
            .filter_map(|mut member| member.remove(self.anchor))
            .collect()
    }
}

pub fn extract_contacts(row: &SheetRow<'_>) -> Vec<String> {
    CONTACTS.extract_values(row)
}

pub fn extract_addresses(row: &SheetRow<'_>) -> Vec<String> {
    ADDRESSES.extract_values(row)
}

pub fn extract_certificates(row: &SheetRow<'_>) -> Vec<Certificate> {
    CERTIFICATES
        .extract(row)
        .into_iter()
        .map(|mut member| Certificate {
            no: member.remove("no").unwrap_or_default(),
            name: member.remove("name").unwrap_or_default(),
            date: member.remove("date").unwrap_or_default(),
            price: member.remove("price").unwrap_or_default(),
        })
        .collect()
}

pub fn extract_status_flags(row: &SheetRow<'_>) -> BTreeMap<String, String> {
    STATUS_FLAG_COLUMNS
        .iter()
        .filter_map(|column| row.text(column).map(|v| (column.to_string(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_reader::SheetTable;
    use calamine::Data;

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    fn table(headers: &[&str], values: Vec<Data>) -> SheetTable {
        SheetTable::from_rows("main", vec![headers.iter().map(|h| s(h)).collect(), values], 0)
    }

    #[test]
    fn test_contacts_skip_gaps_and_trim() {
        let t = table(
            &["연락처_1", "연락처_2", "연락처_3", "연락처_4"],
            vec![s(" 010-1 "), Data::Empty, s("010-3"), s("")],
        );
        let row = t.iter().next().unwrap();
        assert_eq!(extract_contacts(&row), vec!["010-1", "010-3"]);
    }

    #[test]
    fn test_certificates_need_number_and_fill_missing_companions() {
        let t = table(
            &["필증NO_1", "필증성명_1", "가격_1", "필증NO_2", "필증성명_2"],
            vec![s("A-17"), s("홍길동"), Data::Float(3000000.0), Data::Empty, s("orphan")],
        );
        let row = t.iter().next().unwrap();
        let certs = extract_certificates(&row);
        assert_eq!(
            certs,
            vec![Certificate {
                no: "A-17".into(),
                name: "홍길동".into(),
                date: String::new(),
                price: "3000000".into(),
            }]
        );
    }

    #[test]
    fn test_status_flags_only_present_columns() {
        let t = table(&["권리위임", "모임참석"], vec![s("O"), Data::Empty]);
        let row = t.iter().next().unwrap();
        let flags = extract_status_flags(&row);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags["권리위임"], "O");
    }

    #[test]
    fn test_column_name_template() {
        assert_eq!(FieldGroup::column_name("필증NO_{i}", 3), "필증NO_3");
    }
}
