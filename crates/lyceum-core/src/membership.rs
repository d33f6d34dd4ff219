use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::ids::{ContextId, UserId};

/// Roster lookup consumed from the surrounding application. Course and
/// membership records are owned elsewhere; this service only ever asks
/// two questions of them.
pub trait MembershipProvider: Send + Sync {
    /// Is `user` a member of `context`?
    fn is_member(&self, user: &UserId, context: &ContextId) -> bool;

    /// Every context the user belongs to. The unread aggregator sums
    /// over this set.
    fn contexts_for(&self, user: &UserId) -> Vec<ContextId>;
}

/// In-memory roster, loaded once at startup (or built up in tests).
/// Production deployments substitute their own `MembershipProvider`.
pub struct StaticRoster {
    members: RwLock<HashMap<ContextId, HashSet<UserId>>>,
}

impl StaticRoster {
    pub fn new() -> Self {
        Self {
            members: RwLock::new(HashMap::new()),
        }
    }

    /// Build a roster from a context-id → member-ids mapping, e.g. a
    /// deserialized roster file.
    pub fn from_map(map: HashMap<String, Vec<String>>) -> Self {
        let roster = Self::new();
        for (context, users) in map {
            let context = ContextId::from_raw(context);
            for user in users {
                roster.add_member(&context, &UserId::from_raw(user));
            }
        }
        roster
    }

    pub fn add_member(&self, context: &ContextId, user: &UserId) {
        self.members
            .write()
            .entry(context.clone())
            .or_default()
            .insert(user.clone());
    }

    pub fn context_count(&self) -> usize {
        self.members.read().len()
    }
}

impl Default for StaticRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipProvider for StaticRoster {
    fn is_member(&self, user: &UserId, context: &ContextId) -> bool {
        self.members
            .read()
            .get(context)
            .is_some_and(|users| users.contains(user))
    }

    fn contexts_for(&self, user: &UserId) -> Vec<ContextId> {
        self.members
            .read()
            .iter()
            .filter(|(_, users)| users.contains(user))
            .map(|(context, _)| context.clone())
            .collect()
    }
}
