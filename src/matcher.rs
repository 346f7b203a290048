//! Tri-state classification of merged records against the member registry
//! by normalized name.

use anyhow::Result;
use log::info;
use std::collections::{BTreeMap, HashMap};

use crate::models::{MatchStats, MemberId, PersonRecord, RegistryMember};
use crate::normalize::normalize_name;
use crate::store::{select_as, Query, TableStore};

pub const MEMBERS_TABLE: &str = "members";

/// Result of looking a normalized name up in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(MemberId),
    Ambiguous(Vec<MemberId>),
    Unmatched,
}

/// Normalized registry name -> every id carrying that name.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    by_name: HashMap<String, Vec<MemberId>>,
}

impl RegistryIndex {
    pub fn build(members: &[RegistryMember]) -> Self {
        let mut by_name: HashMap<String, Vec<MemberId>> = HashMap::new();
        for member in members {
            if let Some(name) = normalize_name(member.name.as_deref()) {
                by_name.entry(name).or_default().push(member.id.clone());
            }
        }
        RegistryIndex { by_name }
    }

    pub fn classify(&self, normalized_name: &str) -> MatchOutcome {
        match self.by_name.get(normalized_name).map(Vec::as_slice) {
            None | Some([]) => MatchOutcome::Unmatched,
            Some([id]) => MatchOutcome::Matched(id.clone()),
            Some(ids) => MatchOutcome::Ambiguous(ids.to_vec()),
        }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl PersonRecord {
    /// Sets the refunded flag, registry link and review flag from `outcome`.
    /// An ambiguous match is found-but-unclear, so it is not refunded.
    pub fn apply_match(&mut self, outcome: &MatchOutcome) {
        match outcome {
            MatchOutcome::Matched(id) => {
                self.member_id = Some(id.clone());
                self.is_refunded = false;
                self.needs_review = false;
            }
            MatchOutcome::Ambiguous(_) => {
                self.member_id = None;
                self.is_refunded = false;
                self.needs_review = true;
            }
            MatchOutcome::Unmatched => {
                self.member_id = None;
                self.is_refunded = true;
                self.needs_review = false;
            }
        }
    }
}

/// Classifies every record against the registry and tallies the outcomes.
pub fn match_records(
    records: &mut BTreeMap<String, PersonRecord>,
    members: &[RegistryMember],
) -> MatchStats {
    let index = RegistryIndex::build(members);
    let mut stats = MatchStats::default();
    for (name, record) in records.iter_mut() {
        let outcome = index.classify(name);
        match &outcome {
            MatchOutcome::Matched(_) => stats.matched += 1,
            MatchOutcome::Ambiguous(ids) => {
                info!("'{}' matches {} registry members, flagged for review", name, ids.len());
                stats.ambiguous += 1;
            }
            MatchOutcome::Unmatched => stats.unmatched += 1,
        }
        record.apply_match(&outcome);
    }
    stats
}

/// Current `(id, name)` list of the member registry.
pub async fn fetch_registry(store: &dyn TableStore) -> Result<Vec<RegistryMember>> {
    let members: Vec<RegistryMember> =
        select_as(store, MEMBERS_TABLE, &Query::new().columns(&["id", "name"])).await?;
    info!("Fetched {} registry members", members.len());
    Ok(members)
}
