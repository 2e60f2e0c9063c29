//! The stock cache set: identifier to DN, and group membership split into
//! direct users and nested groups.

use dircache_core::{Entry, DEFAULT_KEY_ATTRIBUTE, DN_ATTRIBUTE};

use crate::cache::CacheDefinition;
use crate::nested::{direct_user_members, nested_group_members, MEMBER_UID_ATTRIBUTE};
use crate::shard::Shard;

pub const ENTRY_UUID_CACHE: &str = "entryUUID";
pub const USERS_IN_GROUP_CACHE: &str = "usersInGroup";
pub const GROUPS_IN_GROUP_CACHE: &str = "groupsInGroup";

pub const OBJECT_TYPE_ATTRIBUTE: &str = "univentionObjectType";
pub const USER_OBJECT_TYPE: &str = "users/user";
pub const GROUP_OBJECT_TYPE: &str = "groups/group";

pub const USER_FILTER: &str = "(univentionObjectType=users/user)";
pub const GROUP_FILTER: &str = "(univentionObjectType=groups/group)";

const UNIQUE_MEMBER_ATTRIBUTE: &str = "uniqueMember";

pub fn is_user(entry: &Entry) -> bool {
    entry.has_value(OBJECT_TYPE_ATTRIBUTE, USER_OBJECT_TYPE)
}

pub fn is_group(entry: &Entry) -> bool {
    entry.has_value(OBJECT_TYPE_ATTRIBUTE, GROUP_OBJECT_TYPE)
}

fn member_shard(cache_name: &str, derive: crate::shard::DeriveFn) -> Shard {
    Shard::new(cache_name, GROUP_FILTER, UNIQUE_MEMBER_ATTRIBUTE)
        .with_key(DN_ATTRIBUTE)
        .with_extra([MEMBER_UID_ATTRIBUTE, OBJECT_TYPE_ATTRIBUTE])
        .with_derive(derive)
        .with_matcher(is_group)
}

/// Definitions for the stock caches, in registration order.
pub fn definitions() -> Vec<CacheDefinition> {
    let entry_uuid = CacheDefinition::single(ENTRY_UUID_CACHE)
        .with_shard(
            Shard::new(ENTRY_UUID_CACHE, USER_FILTER, DN_ATTRIBUTE)
                .with_key(DEFAULT_KEY_ATTRIBUTE)
                .with_extra([OBJECT_TYPE_ATTRIBUTE])
                .with_matcher(is_user),
        )
        .with_shard(
            Shard::new(ENTRY_UUID_CACHE, GROUP_FILTER, DN_ATTRIBUTE)
                .with_key(DEFAULT_KEY_ATTRIBUTE)
                .with_extra([OBJECT_TYPE_ATTRIBUTE])
                .with_matcher(is_group),
        );

    let users_in_group = CacheDefinition::multi(USERS_IN_GROUP_CACHE)
        .with_shard(member_shard(USERS_IN_GROUP_CACHE, direct_user_members));

    let groups_in_group = CacheDefinition::multi(GROUPS_IN_GROUP_CACHE)
        .with_shard(member_shard(GROUPS_IN_GROUP_CACHE, nested_group_members));

    vec![entry_uuid, users_in_group, groups_in_group]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use dircache_storage::MemoryStore;

    fn registry() -> Registry<MemoryStore> {
        let mut registry = Registry::open(MemoryStore::new());
        registry.register_all(definitions()).expect("register");
        registry
    }

    #[test]
    fn test_stock_caches_registered() {
        let registry = registry();
        assert_eq!(
            registry.cache_names(),
            vec![ENTRY_UUID_CACHE, USERS_IN_GROUP_CACHE, GROUPS_IN_GROUP_CACHE]
        );
        assert!(registry.get_cache(ENTRY_UUID_CACHE).expect("cache").is_single_value());
    }

    #[test]
    fn test_plan_has_one_query_per_object_type() {
        let registry = registry();
        let plan = registry.plan_queries();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].filter, USER_FILTER);
        assert_eq!(plan[1].filter, GROUP_FILTER);
        assert_eq!(plan[1].shards.len(), 3);
        let attrs: Vec<_> = plan[1].attributes.iter().map(String::as_str).collect();
        assert_eq!(
            attrs,
            vec!["entryUUID", "memberUid", "uniqueMember", "univentionObjectType"]
        );
    }

    #[test]
    fn test_group_change_feeds_all_caches() {
        let registry = registry();
        let group = Entry::new("cn=Staff,cn=groups,dc=x")
            .with_attribute(OBJECT_TYPE_ATTRIBUTE, [GROUP_OBJECT_TYPE])
            .with_attribute("entryUUID", ["G-1"])
            .with_attribute(
                "uniqueMember",
                ["uid=alice,cn=users,dc=x", "cn=admins,cn=groups,dc=x"],
            )
            .with_attribute("memberUid", ["alice"]);

        let stats = registry.on_change(&group).expect("change");
        assert_eq!(stats.stored, 3);

        let dump = registry.dump().expect("dump");
        assert_eq!(
            dump[ENTRY_UUID_CACHE]["g-1"],
            vec!["cn=Staff,cn=groups,dc=x".to_string()]
        );
        assert_eq!(
            dump[USERS_IN_GROUP_CACHE]["cn=staff,cn=groups,dc=x"],
            vec!["uid=alice,cn=users,dc=x".to_string()]
        );
        assert_eq!(
            dump[GROUPS_IN_GROUP_CACHE]["cn=staff,cn=groups,dc=x"],
            vec!["cn=admins,cn=groups,dc=x".to_string()]
        );
    }

    #[test]
    fn test_user_change_only_touches_uuid_cache() {
        let registry = registry();
        let user = Entry::new("uid=alice,cn=users,dc=x")
            .with_attribute(OBJECT_TYPE_ATTRIBUTE, [USER_OBJECT_TYPE])
            .with_attribute("entryUUID", ["U-1"]);

        let stats = registry.on_change(&user).expect("change");
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.skipped, 0);
    }
}
