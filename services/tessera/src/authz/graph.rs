//! Role graph and permission-set math, store-free.

use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Grants every permission when present in a role's grant set.
pub const WILDCARD: &str = "*";

/// The resolved permissions for one (principal, tenant) — also the
/// per-request memo: callers hold it for the life of a request instead of
/// re-walking the graph per check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSet {
    superuser: bool,
    permissions: HashSet<String>,
}

impl PermissionSet {
    #[must_use]
    pub fn superuser() -> Self {
        Self {
            superuser: true,
            permissions: HashSet::new(),
        }
    }

    #[must_use]
    pub fn from_permissions(permissions: HashSet<String>) -> Self {
        Self {
            superuser: false,
            permissions,
        }
    }

    #[must_use]
    pub fn allows(&self, permission: &str) -> bool {
        self.superuser
            || self.permissions.contains(WILDCARD)
            || self.permissions.contains(permission)
    }

    #[must_use]
    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    /// Sorted permission codes, for listing endpoints.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.permissions.iter().cloned().collect();
        codes.sort_unstable();
        codes
    }
}

/// Roles, their direct grants, and inheritance edges. An edge
/// `role -> child` means the role additively grants everything the child
/// grants.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    grants: HashMap<Uuid, HashSet<String>>,
    includes: HashMap<Uuid, Vec<Uuid>>,
}

impl RoleGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role_id: Uuid, permission: impl Into<String>) {
        self.grants.entry(role_id).or_default().insert(permission.into());
    }

    /// Would `role -> child` close a cycle? True when the role is already
    /// reachable from the child (or the edge is a self-loop).
    #[must_use]
    pub fn would_create_cycle(&self, role_id: Uuid, child_role_id: Uuid) -> bool {
        if role_id == child_role_id {
            return true;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([child_role_id]);
        while let Some(current) = queue.pop_front() {
            if current == role_id {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(children) = self.includes.get(&current) {
                queue.extend(children.iter().copied());
            }
        }
        false
    }

    /// Add an inheritance edge, rejecting cycles at write time. Returns
    /// `false` when the edge was refused.
    pub fn add_inheritance(&mut self, role_id: Uuid, child_role_id: Uuid) -> bool {
        if self.would_create_cycle(role_id, child_role_id) {
            return false;
        }
        self.includes.entry(role_id).or_default().push(child_role_id);
        true
    }

    /// Load an edge read back from the store without cycle checking (the
    /// store's write path already enforced it).
    pub fn add_edge_unchecked(&mut self, role_id: Uuid, child_role_id: Uuid) {
        self.includes.entry(role_id).or_default().push(child_role_id);
    }

    /// Union of permissions over the assigned roles and every role
    /// reachable through inheritance. The visited set makes this total
    /// even on a corrupted (cyclic) edge set.
    #[must_use]
    pub fn resolve(&self, assigned: &[Uuid]) -> PermissionSet {
        let mut permissions = HashSet::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<Uuid> = assigned.iter().copied().collect();

        while let Some(role_id) = queue.pop_front() {
            if !visited.insert(role_id) {
                continue;
            }
            if let Some(grants) = self.grants.get(&role_id) {
                permissions.extend(grants.iter().cloned());
            }
            if let Some(children) = self.includes.get(&role_id) {
                queue.extend(children.iter().copied());
            }
        }

        PermissionSet::from_permissions(permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn direct_grants_resolve() {
        let reader = role();
        let mut graph = RoleGraph::new();
        graph.grant(reader, "invoices.read");

        let set = graph.resolve(&[reader]);
        assert!(set.allows("invoices.read"));
        assert!(!set.allows("invoices.write"));
    }

    #[test]
    fn parent_grants_everything_a_child_grants() {
        let admin = role();
        let editor = role();
        let reader = role();
        let mut graph = RoleGraph::new();
        graph.grant(reader, "invoices.read");
        graph.grant(editor, "invoices.write");
        assert!(graph.add_inheritance(editor, reader));
        assert!(graph.add_inheritance(admin, editor));

        let set = graph.resolve(&[admin]);
        assert!(set.allows("invoices.read"));
        assert!(set.allows("invoices.write"));

        // Holding only the child gives none of the parent's extras.
        let set = graph.resolve(&[reader]);
        assert!(set.allows("invoices.read"));
        assert!(!set.allows("invoices.write"));
    }

    #[test]
    fn cycle_edges_are_rejected_at_write_time() {
        let a = role();
        let b = role();
        let c = role();
        let mut graph = RoleGraph::new();
        assert!(graph.add_inheritance(a, b));
        assert!(graph.add_inheritance(b, c));

        // c -> a would close the loop; a -> a is degenerate.
        assert!(graph.would_create_cycle(c, a));
        assert!(!graph.add_inheritance(c, a));
        assert!(!graph.add_inheritance(a, a));

        // Diamond shapes are fine: a -> c alongside a -> b -> c.
        assert!(graph.add_inheritance(a, c));
    }

    #[test]
    fn resolution_terminates_on_corrupted_edges() {
        let a = role();
        let b = role();
        let mut graph = RoleGraph::new();
        graph.grant(a, "x");
        graph.grant(b, "y");
        // Bypass the write-time check to simulate a corrupted store.
        graph.add_edge_unchecked(a, b);
        graph.add_edge_unchecked(b, a);

        let set = graph.resolve(&[a]);
        assert!(set.allows("x"));
        assert!(set.allows("y"));
    }

    #[test]
    fn wildcard_and_superuser_short_circuit() {
        let admin = role();
        let mut graph = RoleGraph::new();
        graph.grant(admin, WILDCARD);

        let set = graph.resolve(&[admin]);
        assert!(set.allows("anything.at.all"));

        let set = PermissionSet::superuser();
        assert!(set.allows("anything.at.all"));
        assert!(set.is_superuser());
    }

    #[test]
    fn codes_are_sorted_for_stable_listings() {
        let r = role();
        let mut graph = RoleGraph::new();
        graph.grant(r, "b");
        graph.grant(r, "a");
        let set = graph.resolve(&[r]);
        assert_eq!(set.codes(), vec!["a".to_string(), "b".to_string()]);
    }
}
