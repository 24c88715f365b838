//! Snapshot diffing.

use std::collections::HashSet;

use super::types::PresenceMember;

/// Members that appeared and disappeared between two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberDiff {
    pub joined: Vec<PresenceMember>,
    pub left: Vec<PresenceMember>,
}

impl MemberDiff {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Compare two snapshots by member id.
///
/// Each id is reported at most once per side even if a snapshot repeats
/// it. Members present in both are ignored whatever their info says.
pub fn diff_members(old: &[PresenceMember], new: &[PresenceMember]) -> MemberDiff {
    let old_ids: HashSet<&str> = old.iter().map(|m| m.id.as_str()).collect();
    let new_ids: HashSet<&str> = new.iter().map(|m| m.id.as_str()).collect();

    let mut seen = HashSet::new();
    let joined = new
        .iter()
        .filter(|m| !old_ids.contains(m.id.as_str()) && seen.insert(m.id.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let left = old
        .iter()
        .filter(|m| !new_ids.contains(m.id.as_str()) && seen.insert(m.id.as_str()))
        .cloned()
        .collect();

    MemberDiff { joined, left }
}

/// Count of members whose status is `online`.
pub fn online_count(members: &[PresenceMember]) -> usize {
    members.iter().filter(|m| m.is_online()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::types::{MemberInfo, MemberStatus};

    fn member(id: &str, status: &str) -> PresenceMember {
        PresenceMember::new(id, MemberInfo::new(id.to_uppercase(), status))
    }

    fn ids(members: &[PresenceMember]) -> Vec<&str> {
        members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn removal_is_reported_once() {
        let old = vec![member("a", "online"), member("b", "online"), member("c", "online")];
        let new = vec![member("a", "online"), member("c", "online")];

        let diff = diff_members(&old, &new);
        assert!(diff.joined.is_empty());
        assert_eq!(ids(&diff.left), vec!["b"]);
    }

    #[test]
    fn addition_and_removal_together() {
        let old = vec![member("a", "online"), member("b", "away")];
        let new = vec![member("b", "online"), member("d", "online")];

        let diff = diff_members(&old, &new);
        assert_eq!(ids(&diff.joined), vec!["d"]);
        assert_eq!(ids(&diff.left), vec!["a"]);
    }

    #[test]
    fn duplicate_ids_reported_once() {
        let old = vec![];
        let new = vec![member("a", "online"), member("a", "away")];
        let diff = diff_members(&old, &new);
        assert_eq!(ids(&diff.joined), vec!["a"]);
    }

    #[test]
    fn identical_snapshots_have_empty_diff() {
        let snapshot = vec![member("a", "online")];
        assert!(diff_members(&snapshot, &snapshot).is_empty());
    }

    #[test]
    fn online_count_ignores_other_statuses() {
        let mut members = vec![member("u1", "online"), member("u2", "away")];
        members.push(PresenceMember::new(
            "u3",
            MemberInfo {
                status: None,
                ..MemberInfo::default()
            },
        ));
        members.push(PresenceMember::new(
            "u4",
            MemberInfo::new("U4", MemberStatus::Online),
        ));
        assert_eq!(online_count(&members), 2);
    }
}
