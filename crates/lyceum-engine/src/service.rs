use std::sync::Arc;

use tracing::instrument;

use lyceum_core::ids::{ContextId, PostId, ThreadId, UserId};
use lyceum_core::time::{canonicalize, now_rfc3339};
use lyceum_core::{DomainError, MembershipProvider};
use lyceum_store::markers::ReadMarkerRepo;
use lyceum_store::posts::{PostRepo, PostRow};
use lyceum_store::threads::{ThreadRepo, ThreadRow};
use lyceum_store::{Database, StoreError};

use crate::policy::{CreatorOnly, DeletePolicy};
use crate::unread::UnreadIndex;

pub const DEFAULT_THREAD_PAGE: u32 = 50;

/// The discussion engine: every operation authorizes against the roster
/// (and the delete policy) before the store mutates anything, then keeps
/// the unread cache in step with the write.
pub struct DiscussionService {
    threads: ThreadRepo,
    posts: PostRepo,
    markers: ReadMarkerRepo,
    membership: Arc<dyn MembershipProvider>,
    delete_policy: Arc<dyn DeletePolicy>,
    unread: UnreadIndex,
}

impl DiscussionService {
    pub fn new(db: Database, membership: Arc<dyn MembershipProvider>) -> Self {
        Self {
            threads: ThreadRepo::new(db.clone()),
            posts: PostRepo::new(db.clone()),
            markers: ReadMarkerRepo::new(db),
            membership,
            delete_policy: Arc::new(CreatorOnly),
            unread: UnreadIndex::new(),
        }
    }

    /// Replace the delete-authorization policy.
    pub fn with_delete_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.delete_policy = policy;
        self
    }

    #[instrument(skip(self, title), fields(context_id = %context_id, author_id = %author_id))]
    pub fn create_thread(
        &self,
        context_id: &ContextId,
        title: &str,
        author_id: &UserId,
    ) -> Result<ThreadRow, DomainError> {
        if !self.membership.is_member(author_id, context_id) {
            return Err(DomainError::Permission(format!(
                "{author_id} is not a member of {context_id}"
            )));
        }
        self.threads
            .create(context_id, title, author_id)
            .map_err(map_store)
    }

    #[instrument(skip(self), fields(context_id = %context_id))]
    pub fn list_threads(
        &self,
        context_id: &ContextId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ThreadRow>, DomainError> {
        self.threads.list(context_id, limit, offset).map_err(map_store)
    }

    #[instrument(skip(self, content), fields(thread_id = %thread_id, author_id = %author_id))]
    pub fn create_post(
        &self,
        thread_id: &ThreadId,
        author_id: &UserId,
        content: &str,
        reply_to: Option<&PostId>,
    ) -> Result<PostRow, DomainError> {
        let thread = self.threads.get(thread_id).map_err(map_store)?;
        if !self.membership.is_member(author_id, &thread.context_id) {
            return Err(DomainError::Permission(format!(
                "{author_id} is not a member of {}",
                thread.context_id
            )));
        }

        // The insert transaction can lose a lock race with a concurrent
        // writer; one re-attempt is allowed, anything further propagates.
        let created = match self.posts.create(thread_id, author_id, content, reply_to) {
            Err(StoreError::Conflict(_)) => {
                self.posts.create(thread_id, author_id, content, reply_to)
            }
            other => other,
        }
        .map_err(map_store)?;

        self.unread.on_post(&thread.context_id, author_id);
        Ok(created)
    }

    #[instrument(skip(self), fields(thread_id = %thread_id))]
    pub fn list_posts(&self, thread_id: &ThreadId) -> Result<Vec<PostRow>, DomainError> {
        self.posts.list(thread_id).map_err(map_store)
    }

    /// Delete a thread and all of its posts. Returns the number of posts
    /// removed with it.
    #[instrument(skip(self), fields(thread_id = %thread_id, requester_id = %requester_id))]
    pub fn delete_thread(
        &self,
        thread_id: &ThreadId,
        requester_id: &UserId,
    ) -> Result<u64, DomainError> {
        let thread = self.threads.get(thread_id).map_err(map_store)?;
        if !self.delete_policy.may_delete(requester_id, &thread) {
            return Err(DomainError::Permission(format!(
                "{requester_id} may not delete thread {thread_id}"
            )));
        }

        let posts_removed = self.threads.delete_cascade(thread_id).map_err(map_store)?;
        self.unread.invalidate(&thread.context_id);
        Ok(posts_removed)
    }

    /// Record that the viewer has seen a context's activity up to `at`
    /// (now, if omitted). Monotonic and idempotent.
    #[instrument(skip(self), fields(viewer_id = %viewer_id, context_id = %context_id))]
    pub fn mark_seen(
        &self,
        viewer_id: &UserId,
        context_id: &ContextId,
        at: Option<&str>,
    ) -> Result<(), DomainError> {
        if !self.membership.is_member(viewer_id, context_id) {
            return Err(DomainError::Permission(format!(
                "{viewer_id} is not a member of {context_id}"
            )));
        }

        let at = match at {
            Some(raw) => canonicalize(raw).ok_or_else(|| {
                DomainError::Validation(format!("not an RFC 3339 timestamp: {raw}"))
            })?,
            None => now_rfc3339(),
        };

        self.markers
            .mark_seen(viewer_id, context_id, &at)
            .map_err(map_store)?;
        self.unread.on_seen(context_id, viewer_id);
        Ok(())
    }

    /// Total unseen posts for the viewer across every context they belong
    /// to, excluding their own posts. Served from the cache where resident;
    /// misses recount from the store. Cheap enough to poll every few seconds.
    #[instrument(skip(self), fields(viewer_id = %viewer_id))]
    pub fn unread_count(&self, viewer_id: &UserId) -> Result<i64, DomainError> {
        let mut total = 0;
        for context in self.membership.contexts_for(viewer_id) {
            let count = match self.unread.get(&context, viewer_id) {
                Some(cached) => cached,
                None => {
                    let marker = self.markers.get(viewer_id, &context).map_err(map_store)?;
                    let fresh = self
                        .posts
                        .count_unread(&context, viewer_id, marker.as_deref())
                        .map_err(map_store)?;
                    self.unread.insert(&context, viewer_id, fresh);
                    fresh
                }
            };
            total += count;
        }
        Ok(total)
    }
}

fn map_store(e: StoreError) -> DomainError {
    match e {
        StoreError::Invalid(msg) => DomainError::Validation(msg),
        StoreError::NotFound(msg) => DomainError::NotFound(msg),
        StoreError::Conflict(msg) => DomainError::Conflict(msg),
        other => DomainError::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyceum_core::StaticRoster;

    fn setup() -> (DiscussionService, ContextId, UserId, UserId, UserId) {
        let db = Database::in_memory().unwrap();
        let ctx = ContextId::from_raw("ctx_rust101");
        let alice = UserId::from_raw("usr_alice");
        let bob = UserId::from_raw("usr_bob");
        let carol = UserId::from_raw("usr_carol");

        let roster = StaticRoster::new();
        roster.add_member(&ctx, &alice);
        roster.add_member(&ctx, &bob);
        roster.add_member(&ctx, &carol);

        let service = DiscussionService::new(db, Arc::new(roster));
        (service, ctx, alice, bob, carol)
    }

    #[test]
    fn thread_then_post_then_reply() {
        let (service, ctx, alice, bob, carol) = setup();

        let thread = service.create_thread(&ctx, "Week 3: ownership", &alice).unwrap();
        let p1 = service.create_post(&thread.id, &bob, "borrow checker?", None).unwrap();

        let listed = service.list_posts(&thread.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, p1.id);

        let refreshed = service.list_threads(&ctx, 50, 0).unwrap();
        assert_eq!(refreshed[0].last_activity_at, p1.created_at);

        let p2 = service
            .create_post(&thread.id, &carol, "see chapter 4", Some(&p1.id))
            .unwrap();
        let listed = service.list_posts(&thread.id).unwrap();
        let ids: Vec<&str> = listed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec![p1.id.as_str(), p2.id.as_str()]);
    }

    #[test]
    fn non_member_cannot_create_thread() {
        let (service, ctx, _, _, _) = setup();
        let outsider = UserId::from_raw("usr_outsider");
        let result = service.create_thread(&ctx, "x", &outsider);
        assert!(matches!(result, Err(DomainError::Permission(_))));
    }

    #[test]
    fn non_member_cannot_post() {
        let (service, ctx, alice, _, _) = setup();
        let thread = service.create_thread(&ctx, "topic", &alice).unwrap();
        let outsider = UserId::from_raw("usr_outsider");
        let result = service.create_post(&thread.id, &outsider, "hi", None);
        assert!(matches!(result, Err(DomainError::Permission(_))));
    }

    #[test]
    fn empty_title_is_validation_error() {
        let (service, ctx, alice, _, _) = setup();
        let result = service.create_thread(&ctx, "  ", &alice);
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn delete_cascades_and_listing_forgets_thread() {
        let (service, ctx, alice, bob, _) = setup();
        let thread = service.create_thread(&ctx, "doomed", &alice).unwrap();
        service.create_post(&thread.id, &bob, "one", None).unwrap();
        service.create_post(&thread.id, &bob, "two", None).unwrap();

        let listed = service.list_threads(&ctx, 50, 0).unwrap();
        assert!(listed.iter().any(|t| t.id == thread.id));

        let removed = service.delete_thread(&thread.id, &alice).unwrap();
        assert_eq!(removed, 2);

        assert!(matches!(
            service.list_posts(&thread.id),
            Err(DomainError::NotFound(_))
        ));
        let listed = service.list_threads(&ctx, 50, 0).unwrap();
        assert!(!listed.iter().any(|t| t.id == thread.id));
    }

    #[test]
    fn only_creator_deletes_under_default_policy() {
        let (service, ctx, alice, bob, _) = setup();
        let thread = service.create_thread(&ctx, "mine", &alice).unwrap();

        let result = service.delete_thread(&thread.id, &bob);
        assert!(matches!(result, Err(DomainError::Permission(_))));

        service.delete_thread(&thread.id, &alice).unwrap();
    }

    #[test]
    fn repeat_delete_is_not_found() {
        let (service, ctx, alice, _, _) = setup();
        let thread = service.create_thread(&ctx, "once", &alice).unwrap();
        service.delete_thread(&thread.id, &alice).unwrap();
        assert!(matches!(
            service.delete_thread(&thread.id, &alice),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn pluggable_policy_admits_moderators() {
        let db = Database::in_memory().unwrap();
        let ctx = ContextId::from_raw("ctx_rust101");
        let alice = UserId::from_raw("usr_alice");
        let moderator = UserId::from_raw("usr_mod");

        let roster = StaticRoster::new();
        roster.add_member(&ctx, &alice);
        roster.add_member(&ctx, &moderator);

        struct AllowList(UserId);
        impl DeletePolicy for AllowList {
            fn may_delete(&self, requester: &UserId, thread: &ThreadRow) -> bool {
                requester == &thread.created_by || requester == &self.0
            }
        }

        let service = DiscussionService::new(db, Arc::new(roster))
            .with_delete_policy(Arc::new(AllowList(moderator.clone())));

        let thread = service.create_thread(&ctx, "topic", &alice).unwrap();
        service.delete_thread(&thread.id, &moderator).unwrap();
    }

    #[test]
    fn cross_thread_reply_is_validation_error() {
        let (service, ctx, alice, bob, _) = setup();
        let t1 = service.create_thread(&ctx, "one", &alice).unwrap();
        let t2 = service.create_thread(&ctx, "two", &alice).unwrap();
        let p1 = service.create_post(&t1.id, &bob, "in one", None).unwrap();

        let result = service.create_post(&t2.id, &bob, "cross", Some(&p1.id));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn unread_counts_exclude_own_posts() {
        let (service, ctx, alice, bob, carol) = setup();
        let thread = service.create_thread(&ctx, "topic", &alice).unwrap();
        service.create_post(&thread.id, &bob, "p1", None).unwrap();
        service.create_post(&thread.id, &carol, "p2", None).unwrap();

        // Bob never marked seen: carol's post counts, his own does not.
        assert_eq!(service.unread_count(&bob).unwrap(), 1);
        // Alice authored neither post.
        assert!(service.unread_count(&alice).unwrap() >= 2);
    }

    #[test]
    fn mark_seen_resets_then_new_post_reverts_to_unseen() {
        let (service, ctx, alice, bob, _) = setup();
        let thread = service.create_thread(&ctx, "topic", &alice).unwrap();
        service.create_post(&thread.id, &bob, "p1", None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 1);

        service.mark_seen(&alice, &ctx, None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 0);

        service.create_post(&thread.id, &bob, "p2", None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 1);
    }

    #[test]
    fn mark_seen_with_stale_timestamp_never_regresses() {
        let (service, ctx, alice, bob, _) = setup();
        let thread = service.create_thread(&ctx, "topic", &alice).unwrap();
        service.create_post(&thread.id, &bob, "p1", None).unwrap();

        service.mark_seen(&alice, &ctx, None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 0);

        // An out-of-order client call with an ancient timestamp changes nothing.
        service
            .mark_seen(&alice, &ctx, Some("2000-01-01T00:00:00Z"))
            .unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 0);
    }

    #[test]
    fn mark_seen_rejects_garbage_timestamp() {
        let (service, ctx, alice, _, _) = setup();
        let result = service.mark_seen(&alice, &ctx, Some("yesterday"));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn mark_seen_requires_membership() {
        let (service, ctx, _, _, _) = setup();
        let outsider = UserId::from_raw("usr_outsider");
        let result = service.mark_seen(&outsider, &ctx, None);
        assert!(matches!(result, Err(DomainError::Permission(_))));
    }

    #[test]
    fn unread_sums_across_contexts() {
        let db = Database::in_memory().unwrap();
        let rust = ContextId::from_raw("ctx_rust101");
        let algo = ContextId::from_raw("ctx_algo");
        let alice = UserId::from_raw("usr_alice");
        let bob = UserId::from_raw("usr_bob");

        let roster = StaticRoster::new();
        roster.add_member(&rust, &alice);
        roster.add_member(&rust, &bob);
        roster.add_member(&algo, &alice);
        roster.add_member(&algo, &bob);

        let service = DiscussionService::new(db, Arc::new(roster));
        let t1 = service.create_thread(&rust, "in rust", &bob).unwrap();
        let t2 = service.create_thread(&algo, "in algo", &bob).unwrap();
        service.create_post(&t1.id, &bob, "a", None).unwrap();
        service.create_post(&t2.id, &bob, "b", None).unwrap();
        service.create_post(&t2.id, &bob, "c", None).unwrap();

        assert_eq!(service.unread_count(&alice).unwrap(), 3);

        service.mark_seen(&alice, &algo, None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 1);
    }

    #[test]
    fn deleting_thread_removes_its_posts_from_unread() {
        let (service, ctx, alice, bob, _) = setup();
        let keep = service.create_thread(&ctx, "keep", &bob).unwrap();
        let drop = service.create_thread(&ctx, "drop", &bob).unwrap();
        service.create_post(&keep.id, &bob, "stays", None).unwrap();
        service.create_post(&drop.id, &bob, "goes", None).unwrap();

        assert_eq!(service.unread_count(&alice).unwrap(), 2);

        service.delete_thread(&drop.id, &bob).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 1);
    }

    #[test]
    fn cached_count_tracks_new_posts_incrementally() {
        let (service, ctx, alice, bob, _) = setup();
        let thread = service.create_thread(&ctx, "topic", &bob).unwrap();
        service.create_post(&thread.id, &bob, "p1", None).unwrap();

        // First poll populates the cache; the next post bumps it in place.
        assert_eq!(service.unread_count(&alice).unwrap(), 1);
        service.create_post(&thread.id, &bob, "p2", None).unwrap();
        assert_eq!(service.unread_count(&alice).unwrap(), 2);
        // Polling again is stable.
        assert_eq!(service.unread_count(&alice).unwrap(), 2);
    }

    #[test]
    fn unread_is_zero_for_user_with_no_contexts() {
        let (service, _, _, _, _) = setup();
        let loner = UserId::from_raw("usr_loner");
        assert_eq!(service.unread_count(&loner).unwrap(), 0);
    }
}
