use lyceum_core::ids::UserId;
use lyceum_store::threads::ThreadRow;

/// Authorization hook for thread deletion. Installed on the service at
/// construction time, so deployments can admit privileged roles without
/// touching the engine.
pub trait DeletePolicy: Send + Sync {
    fn may_delete(&self, requester: &UserId, thread: &ThreadRow) -> bool;
}

/// Default policy: only the thread's creator may delete it.
pub struct CreatorOnly;

impl DeletePolicy for CreatorOnly {
    fn may_delete(&self, requester: &UserId, thread: &ThreadRow) -> bool {
        requester == &thread.created_by
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyceum_core::ids::{ContextId, ThreadId};

    fn thread_by(creator: &str) -> ThreadRow {
        ThreadRow {
            id: ThreadId::from_raw("thr_1"),
            context_id: ContextId::from_raw("ctx_1"),
            title: "topic".into(),
            created_by: UserId::from_raw(creator),
            created_at: "2026-03-01T10:00:00.000000Z".into(),
            last_activity_at: "2026-03-01T10:00:00.000000Z".into(),
        }
    }

    #[test]
    fn creator_may_delete() {
        let thread = thread_by("usr_alice");
        assert!(CreatorOnly.may_delete(&UserId::from_raw("usr_alice"), &thread));
    }

    #[test]
    fn others_may_not_delete() {
        let thread = thread_by("usr_alice");
        assert!(!CreatorOnly.may_delete(&UserId::from_raw("usr_bob"), &thread));
    }

    #[test]
    fn custom_policy_can_widen_access() {
        struct Moderators(Vec<UserId>);
        impl DeletePolicy for Moderators {
            fn may_delete(&self, requester: &UserId, thread: &ThreadRow) -> bool {
                requester == &thread.created_by || self.0.contains(requester)
            }
        }

        let policy = Moderators(vec![UserId::from_raw("usr_mod")]);
        let thread = thread_by("usr_alice");
        assert!(policy.may_delete(&UserId::from_raw("usr_mod"), &thread));
        assert!(!policy.may_delete(&UserId::from_raw("usr_bob"), &thread));
    }
}
