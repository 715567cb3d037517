//! Group membership index.

use std::collections::{BTreeSet, HashMap};

use crate::ids::ConnectionId;

/// Maps group names to member ids, with a reverse index from id to groups.
///
/// Not synchronized on its own; the [`Hub`](crate::Hub) guards it. Groups are
/// dropped as soon as their last member leaves.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: HashMap<String, BTreeSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, BTreeSet<String>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to `group`. Returns `false` if it was already a member.
    pub fn add(&mut self, group: &str, id: ConnectionId) -> bool {
        let inserted = self
            .groups
            .entry(group.to_owned())
            .or_default()
            .insert(id.clone());
        if inserted {
            let _ = self.memberships.entry(id).or_default().insert(group.to_owned());
        }
        inserted
    }

    /// Remove `id` from `group`. Returns `false` if it was not a member.
    pub fn remove(&mut self, group: &str, id: &ConnectionId) -> bool {
        let Some(members) = self.groups.get_mut(group) else {
            return false;
        };
        if !members.remove(id) {
            return false;
        }
        if members.is_empty() {
            let _ = self.groups.remove(group);
        }
        if let Some(groups) = self.memberships.get_mut(id) {
            let _ = groups.remove(group);
            if groups.is_empty() {
                let _ = self.memberships.remove(id);
            }
        }
        true
    }

    /// Owned snapshot of a group's members; empty for unknown groups.
    pub fn members_of(&self, group: &str) -> BTreeSet<ConnectionId> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    /// Owned snapshot of the groups `id` belongs to.
    pub fn groups_of(&self, id: &ConnectionId) -> BTreeSet<String> {
        self.memberships.get(id).cloned().unwrap_or_default()
    }

    /// Whether `id` is a member of `group`.
    pub fn contains(&self, group: &str, id: &ConnectionId) -> bool {
        self.groups.get(group).is_some_and(|m| m.contains(id))
    }

    /// Remove `id` from every group. Returns the groups it was removed from.
    pub fn remove_everywhere(&mut self, id: &ConnectionId) -> Vec<String> {
        let Some(groups) = self.memberships.remove(id) else {
            return Vec::new();
        };
        for group in &groups {
            if let Some(members) = self.groups.get_mut(group) {
                let _ = members.remove(id);
                if members.is_empty() {
                    let _ = self.groups.remove(group);
                }
            }
        }
        groups.into_iter().collect()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Drop every membership.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.memberships.clear();
    }
}
