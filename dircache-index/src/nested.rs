//! Nested-group resolution for group entries.
//!
//! A group lists every member DN in `uniqueMember` and the short account
//! names of its user (and machine) members in `memberUid`. Comparing the
//! leading RDN value of each member DN against `memberUid` splits the members:
//!
//! - `rdn` in `memberUid`: direct user member
//! - `rdn$` in `memberUid`: machine account, neither user nor group
//! - otherwise: nested group
//!
//! Both derivations are pure functions of the same entry, so the two shards
//! built on them can run independently against one source object.

use std::collections::HashSet;

use dircache_core::{dn, Entry};

use crate::shard::Shard;

/// Attribute carrying the short names of account members.
pub const MEMBER_UID_ATTRIBUTE: &str = "memberUid";

/// How one member DN relates to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    User,
    Machine,
    Group,
}

/// Classify a member DN against the group's lower-cased `memberUid` set.
///
/// Returns `None` when the DN has no readable leading RDN value.
pub fn classify(member_dn: &str, member_uids: &HashSet<String>) -> Option<MemberKind> {
    let rdn = dn::leading_rdn_value(member_dn)?.to_lowercase();
    if member_uids.contains(&rdn) {
        Some(MemberKind::User)
    } else if member_uids.contains(&format!("{rdn}$")) {
        Some(MemberKind::Machine)
    } else {
        Some(MemberKind::Group)
    }
}

/// Lower-cased member DNs of `kind`, in the order the group lists them.
pub fn members_of_kind(entry: &Entry, member_attribute: &str, kind: MemberKind) -> Vec<String> {
    let member_uids: HashSet<String> = entry
        .values(MEMBER_UID_ATTRIBUTE)
        .into_iter()
        .map(str::to_lowercase)
        .collect();

    entry
        .values(member_attribute)
        .into_iter()
        .filter(|member| classify(member, &member_uids) == Some(kind))
        .map(dn::normalize)
        .collect()
}

/// Derivation: members whose RDN value appears in `memberUid`.
pub fn direct_user_members(shard: &Shard, entry: &Entry) -> Vec<String> {
    members_of_kind(entry, shard.value_attribute(), MemberKind::User)
}

/// Derivation: members that are neither users nor machine accounts.
pub fn nested_group_members(shard: &Shard, entry: &Entry) -> Vec<String> {
    members_of_kind(entry, shard.value_attribute(), MemberKind::Group)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(members: &[&str], member_uids: &[&str]) -> Entry {
        Entry::new("cn=staff,cn=groups,dc=x")
            .with_attribute("uniqueMember", members.iter().copied())
            .with_attribute("memberUid", member_uids.iter().copied())
    }

    fn member_shard(derive: crate::shard::DeriveFn) -> Shard {
        Shard::new("members", "(objectClass=posixGroup)", "uniqueMember")
            .with_key("dn")
            .with_extra([MEMBER_UID_ATTRIBUTE])
            .with_derive(derive)
    }

    #[test]
    fn test_split_users_and_groups() {
        let entry = group(&["uid=alice,dc=x", "uid=grp1,dc=x"], &["alice"]);

        assert_eq!(
            member_shard(direct_user_members).extract_values(&entry),
            vec!["uid=alice,dc=x"]
        );
        assert_eq!(
            member_shard(nested_group_members).extract_values(&entry),
            vec!["uid=grp1,dc=x"]
        );
    }

    #[test]
    fn test_machine_account_is_neither() {
        let entry = group(
            &["uid=alice,dc=x", "cn=host1,cn=computers,dc=x", "cn=admins,dc=x"],
            &["alice", "host1$"],
        );

        assert_eq!(
            member_shard(direct_user_members).extract_values(&entry),
            vec!["uid=alice,dc=x"]
        );
        assert_eq!(
            member_shard(nested_group_members).extract_values(&entry),
            vec!["cn=admins,dc=x"]
        );
    }

    #[test]
    fn test_comparison_is_case_insensitive_and_output_lowercased() {
        let entry = group(&["uid=Alice,CN=Users,DC=X"], &["ALICE"]);
        assert_eq!(
            member_shard(direct_user_members).extract_values(&entry),
            vec!["uid=alice,cn=users,dc=x"]
        );
        assert!(member_shard(nested_group_members)
            .extract_values(&entry)
            .is_empty());
    }

    #[test]
    fn test_group_without_members() {
        let entry = Entry::new("cn=empty,dc=x");
        assert!(member_shard(direct_user_members).extract_values(&entry).is_empty());
        assert!(member_shard(nested_group_members).extract_values(&entry).is_empty());
    }

    #[test]
    fn test_unparseable_member_is_dropped() {
        let members: HashSet<String> = HashSet::new();
        assert_eq!(classify("garbage", &members), None);
        assert_eq!(classify("cn=g,dc=x", &members), Some(MemberKind::Group));
    }
}
