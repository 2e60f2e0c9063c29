//! Read-side helpers over the stock caches.
//!
//! `dn_to_uuid` and `groups_for_user` scan whole caches because the stores
//! are keyed the other way round. Fine for admin tooling; not for hot paths.

use std::collections::{BTreeSet, HashMap, VecDeque};

use dircache_core::{dn, DirCacheResult};
use dircache_storage::KvStore;

use crate::registry::Registry;
use crate::standard::{ENTRY_UUID_CACHE, GROUPS_IN_GROUP_CACHE, USERS_IN_GROUP_CACHE};

/// DN stored for an `entryUUID`.
pub fn uuid_to_dn<S: KvStore>(registry: &Registry<S>, uuid: &str) -> DirCacheResult<Option<String>> {
    let cache = registry.get_cache(ENTRY_UUID_CACHE)?;
    Ok(cache.get(uuid)?.and_then(|value| value.into_values().into_iter().next()))
}

/// `entryUUID` whose stored DN equals `dn`, compared case-insensitively.
pub fn dn_to_uuid<S: KvStore>(registry: &Registry<S>, dn: &str) -> DirCacheResult<Option<String>> {
    let wanted = dn::normalize(dn);
    for pair in registry.get_cache(ENTRY_UUID_CACHE)?.iter()? {
        let (uuid, stored_dn) = pair?;
        if dn::normalize(&stored_dn) == wanted {
            return Ok(Some(uuid));
        }
    }
    Ok(None)
}

/// User DNs in a group, optionally following nested groups.
pub fn users_in_group<S: KvStore>(
    registry: &Registry<S>,
    group_dn: &str,
    consider_nested: bool,
) -> DirCacheResult<Vec<String>> {
    let users = registry.get_cache(USERS_IN_GROUP_CACHE)?;
    let groups: Vec<String> = if consider_nested {
        let nested = registry.get_cache(GROUPS_IN_GROUP_CACHE)?;
        walk(dn::normalize(group_dn), |group| nested.get_values(group))?
    } else {
        vec![dn::normalize(group_dn)]
    };

    let mut members = BTreeSet::new();
    for group in &groups {
        members.extend(users.get_values(group)?);
    }
    Ok(members.into_iter().collect())
}

/// Group DNs a user belongs to, optionally including every group that
/// transitively contains one of them.
pub fn groups_for_user<S: KvStore>(
    registry: &Registry<S>,
    user_dn: &str,
    consider_nested: bool,
) -> DirCacheResult<Vec<String>> {
    let user_dn = dn::normalize(user_dn);

    let mut direct = BTreeSet::new();
    for pair in registry.get_cache(USERS_IN_GROUP_CACHE)?.iter()? {
        let (group, member) = pair?;
        if member == user_dn {
            direct.insert(group);
        }
    }

    if !consider_nested {
        return Ok(direct.into_iter().collect());
    }

    let mut parents: HashMap<String, Vec<String>> = HashMap::new();
    for pair in registry.get_cache(GROUPS_IN_GROUP_CACHE)?.iter()? {
        let (parent, child) = pair?;
        parents.entry(child).or_default().push(parent);
    }

    let mut groups = BTreeSet::new();
    for group in direct {
        groups.extend(walk(group, |g| Ok(parents.get(g).cloned().unwrap_or_default()))?);
    }
    Ok(groups.into_iter().collect())
}

/// Breadth-first closure from `start`, including it. Cycle-safe.
fn walk<F>(start: String, mut next: F) -> DirCacheResult<Vec<String>>
where
    F: FnMut(&str) -> DirCacheResult<Vec<String>>,
{
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(group) = queue.pop_front() {
        if !seen.insert(group.clone()) {
            continue;
        }
        for child in next(&group)? {
            let child = dn::normalize(&child);
            if !seen.contains(&child) {
                queue.push_back(child);
            }
        }
    }
    Ok(seen.into_iter().collect())
}
