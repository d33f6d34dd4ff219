//! RPC method handlers organized by domain.

use std::sync::Arc;

use lyceum_core::ids::{ContextId, PostId, ThreadId, UserId};
use lyceum_engine::DiscussionService;

use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub service: Arc<DiscussionService>,
}

impl HandlerState {
    pub fn new(service: Arc<DiscussionService>) -> Self {
        Self { service }
    }
}

/// Dispatch an RPC method to the appropriate handler.
pub fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        // Threads
        "thread.create" => thread_create(state, params, id),
        "thread.list" => thread_list(state, params, id),
        "thread.delete" => thread_delete(state, params, id),

        // Posts
        "post.create" => post_create(state, params, id),
        "post.list" => post_list(state, params, id),

        // Activity / unread
        "activity.markSeen" | "activity.mark_seen" => activity_mark_seen(state, params, id),
        "activity.unreadCount" | "activity.unread_count" => activity_unread(state, params, id),

        // System
        "system.ping" | "health" => health(id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

// ── Thread handlers ──

fn thread_create(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let context_id = match rpc::require_str(params, "context_id") {
        Ok(s) => ContextId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let title = match rpc::require_str(params, "title") {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let author_id = match rpc::require_str(params, "author_id") {
        Ok(s) => UserId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match state.service.create_thread(&context_id, title, &author_id) {
        Ok(thread) => RpcResponse::success(id, serde_json::json!(thread)),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

fn thread_list(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let context_id = match rpc::require_str(params, "context_id") {
        Ok(s) => ContextId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let limit = rpc::optional_i64(params, "limit")
        .unwrap_or(lyceum_engine::service::DEFAULT_THREAD_PAGE as i64) as u32;
    let offset = rpc::optional_i64(params, "offset").unwrap_or(0) as u32;

    match state.service.list_threads(&context_id, limit, offset) {
        Ok(threads) => RpcResponse::success(id, serde_json::json!({ "threads": threads })),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

fn thread_delete(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let thread_id = match rpc::require_str(params, "thread_id") {
        Ok(s) => ThreadId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let requester_id = match rpc::require_str(params, "requester_id") {
        Ok(s) => UserId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match state.service.delete_thread(&thread_id, &requester_id) {
        Ok(posts_removed) => RpcResponse::success(
            id,
            serde_json::json!({ "deleted": true, "posts_removed": posts_removed }),
        ),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

// ── Post handlers ──

fn post_create(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let thread_id = match rpc::require_str(params, "thread_id") {
        Ok(s) => ThreadId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let author_id = match rpc::require_str(params, "author_id") {
        Ok(s) => UserId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let content = match rpc::require_str(params, "content") {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let reply_to = rpc::optional_str(params, "reply_to_post_id").map(PostId::from_raw);

    match state
        .service
        .create_post(&thread_id, &author_id, content, reply_to.as_ref())
    {
        Ok(post) => RpcResponse::success(id, serde_json::json!(post)),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

fn post_list(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let thread_id = match rpc::require_str(params, "thread_id") {
        Ok(s) => ThreadId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match state.service.list_posts(&thread_id) {
        Ok(posts) => RpcResponse::success(id, serde_json::json!({ "posts": posts })),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

// ── Activity handlers ──

fn activity_mark_seen(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let viewer_id = match rpc::require_str(params, "viewer_id") {
        Ok(s) => UserId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let context_id = match rpc::require_str(params, "context_id") {
        Ok(s) => ContextId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let at = rpc::optional_str(params, "at");

    match state.service.mark_seen(&viewer_id, &context_id, at) {
        Ok(()) => RpcResponse::success(id, serde_json::json!({ "marked": true })),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

fn activity_unread(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let viewer_id = match rpc::require_str(params, "viewer_id") {
        Ok(s) => UserId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match state.service.unread_count(&viewer_id) {
        Ok(unread) => RpcResponse::success(id, serde_json::json!({ "unread": unread })),
        Err(e) => RpcResponse::domain_error(id, &e),
    }
}

// ── System handlers ──

fn health(id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, serde_json::json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyceum_core::StaticRoster;
    use lyceum_store::Database;

    fn setup() -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        let roster = StaticRoster::new();
        roster.add_member(
            &ContextId::from_raw("ctx_rust101"),
            &UserId::from_raw("usr_alice"),
        );
        roster.add_member(
            &ContextId::from_raw("ctx_rust101"),
            &UserId::from_raw("usr_bob"),
        );
        let service = Arc::new(DiscussionService::new(db, Arc::new(roster)));
        Arc::new(HandlerState::new(service))
    }

    fn call(state: &Arc<HandlerState>, method: &str, params: serde_json::Value) -> serde_json::Value {
        let resp = dispatch(state, method, &params, Some(serde_json::json!(1)));
        serde_json::to_value(&resp).unwrap()
    }

    #[test]
    fn thread_create_and_list_roundtrip() {
        let state = setup();
        let created = call(
            &state,
            "thread.create",
            serde_json::json!({
                "context_id": "ctx_rust101",
                "title": "Week 3",
                "author_id": "usr_alice",
            }),
        );
        assert_eq!(created["success"], true);
        let thread_id = created["result"]["id"].as_str().unwrap().to_string();

        let listed = call(
            &state,
            "thread.list",
            serde_json::json!({"context_id": "ctx_rust101"}),
        );
        assert_eq!(listed["result"]["threads"][0]["id"], thread_id);
    }

    #[test]
    fn post_create_requires_params() {
        let state = setup();
        let resp = call(&state, "post.create", serde_json::json!({}));
        assert_eq!(resp["success"], false);
        assert_eq!(resp["error"]["code"], "INVALID_PARAMS");
    }

    #[test]
    fn permission_failure_maps_to_wire_code() {
        let state = setup();
        let resp = call(
            &state,
            "thread.create",
            serde_json::json!({
                "context_id": "ctx_rust101",
                "title": "x",
                "author_id": "usr_outsider",
            }),
        );
        assert_eq!(resp["success"], false);
        assert_eq!(resp["error"]["code"], "PERMISSION_DENIED");
    }

    #[test]
    fn missing_thread_maps_to_not_found() {
        let state = setup();
        let resp = call(
            &state,
            "post.list",
            serde_json::json!({"thread_id": "thr_gone"}),
        );
        assert_eq!(resp["error"]["code"], "NOT_FOUND");
    }

    #[test]
    fn unknown_method_rejected() {
        let state = setup();
        let resp = call(&state, "nope.nothing", serde_json::json!({}));
        assert_eq!(resp["error"]["code"], "METHOD_NOT_FOUND");
    }

    #[test]
    fn mark_seen_and_unread_flow() {
        let state = setup();
        let created = call(
            &state,
            "thread.create",
            serde_json::json!({
                "context_id": "ctx_rust101",
                "title": "topic",
                "author_id": "usr_bob",
            }),
        );
        let thread_id = created["result"]["id"].as_str().unwrap().to_string();

        call(
            &state,
            "post.create",
            serde_json::json!({
                "thread_id": thread_id,
                "author_id": "usr_bob",
                "content": "fresh post",
            }),
        );

        let unread = call(
            &state,
            "activity.unreadCount",
            serde_json::json!({"viewer_id": "usr_alice"}),
        );
        assert_eq!(unread["result"]["unread"], 1);

        let marked = call(
            &state,
            "activity.markSeen",
            serde_json::json!({"viewer_id": "usr_alice", "context_id": "ctx_rust101"}),
        );
        assert_eq!(marked["result"]["marked"], true);

        let unread = call(
            &state,
            "activity.unreadCount",
            serde_json::json!({"viewer_id": "usr_alice"}),
        );
        assert_eq!(unread["result"]["unread"], 0);
    }

    #[test]
    fn health_reports_healthy() {
        let state = setup();
        let resp = call(&state, "health", serde_json::json!({}));
        assert_eq!(resp["result"]["status"], "healthy");
    }
}
