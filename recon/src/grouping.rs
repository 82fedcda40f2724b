//! Partitioning matched receipts by their shared coding key.

use crate::{CodingKey, Receipt};
use std::collections::HashMap;
use tracing::debug;

/// Receipts sharing one department/account key, applied in one bulk edit.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationGroup {
    pub coding: CodingKey,
    pub members: Vec<Receipt>,
}

impl AllocationGroup {
    pub fn key(&self) -> String {
        self.coding.key()
    }
}

/// Groups in order of first appearance, plus the receipts that have no key.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    groups: Vec<AllocationGroup>,
    pub unallocated: Vec<Receipt>,
}

impl Grouping {
    pub fn get(&self, key: &str) -> Option<&AllocationGroup> {
        self.groups.iter().find(|g| g.key() == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AllocationGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_groups(self) -> Vec<AllocationGroup> {
        self.groups
    }
}

pub struct AllocationGrouper;

impl AllocationGrouper {
    /// Key each receipt by its first two keywords. Receipts with fewer than
    /// two keywords join no group and are listed in `unallocated`.
    pub fn group(receipts: &[Receipt]) -> Grouping {
        let mut grouping = Grouping::default();
        let mut positions: HashMap<CodingKey, usize> = HashMap::new();

        for receipt in receipts {
            let Some(coding) = receipt.coding_key() else {
                grouping.unallocated.push(receipt.clone());
                continue;
            };
            let slot = *positions.entry(coding.clone()).or_insert_with(|| {
                grouping.groups.push(AllocationGroup {
                    coding,
                    members: Vec::new(),
                });
                grouping.groups.len() - 1
            });
            grouping.groups[slot].members.push(receipt.clone());
        }

        debug!(
            groups = grouping.groups.len(),
            unallocated = grouping.unallocated.len(),
            "Grouped receipts"
        );
        grouping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceDocument;

    fn receipt(name: &str, value: f64, keywords: &[&str]) -> Receipt {
        Receipt {
            source: SourceDocument::named(name),
            value,
            currency: "USD".into(),
            line_item: name.into(),
            account_keywords: Some(keywords.iter().map(|s| s.to_string()).collect()),
        }
    }

    #[test]
    fn shared_key_forms_one_group() {
        let receipts = vec![
            receipt("a", 100.0, &["400", "5170"]),
            receipt("b", 50.0, &["400", "5170", "extra"]),
        ];
        let grouping = AllocationGrouper::group(&receipts);
        assert_eq!(grouping.len(), 1);
        let group = grouping.get("400-5170").unwrap();
        assert_eq!(group.members.len(), 2);
        assert!(grouping.unallocated.is_empty());
    }

    #[test]
    fn short_keyword_lists_join_no_group() {
        let receipts = vec![
            receipt("a", 1.0, &["300"]),
            receipt("b", 2.0, &[]),
            Receipt {
                account_keywords: None,
                ..receipt("c", 3.0, &[])
            },
        ];
        let grouping = AllocationGrouper::group(&receipts);
        assert!(grouping.is_empty());
        assert_eq!(grouping.unallocated.len(), 3);
    }

    #[test]
    fn groups_keep_first_appearance_order_and_partition_input() {
        let receipts = vec![
            receipt("a", 1.0, &["2", "B"]),
            receipt("b", 2.0, &["1", "A"]),
            receipt("c", 3.0, &["2", "B"]),
            receipt("d", 4.0, &["9"]),
        ];
        let grouping = AllocationGrouper::group(&receipts);
        let keys: Vec<String> = grouping.iter().map(|g| g.key()).collect();
        assert_eq!(keys, vec!["2-B", "1-A"]);

        let mut seen: Vec<&str> = grouping
            .iter()
            .flat_map(|g| g.members.iter().map(|r| r.line_item.as_str()))
            .chain(grouping.unallocated.iter().map(|r| r.line_item.as_str()))
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["a", "b", "c", "d"]);
    }
}
