//! Request id propagation for the worker's dynamic extent.
//!
//! An execution runs the audit sink (and anything else) deep inside the
//! worker. Code there recovers the originating request id through
//! [`current_request_id`] instead of taking it as a parameter. The id lives in
//! a task-local slot that is only populated inside [`scope_sync`] or
//! [`scope`], and is cleared when that call returns, so pooled worker threads
//! never carry an id over to the next execution.

use std::future::Future;

tokio::task_local! {
    static REQUEST_ID: String;
}

/// The request id of the execution running on this thread or task, if any.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Run `f` with `request_id` as the current request id.
pub fn scope_sync<R>(request_id: impl Into<String>, f: impl FnOnce() -> R) -> R {
    REQUEST_ID.sync_scope(request_id.into(), f)
}

/// Run `future` with `request_id` as the current request id across awaits.
pub async fn scope<F: Future>(request_id: impl Into<String>, future: F) -> F::Output {
    REQUEST_ID.scope(request_id.into(), future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_outside_scope() {
        assert_eq!(current_request_id(), None);
    }

    #[test]
    fn test_scope_sync_sets_and_clears() {
        let seen = scope_sync("req-1", current_request_id);
        assert_eq!(seen.as_deref(), Some("req-1"));
        assert_eq!(current_request_id(), None);
    }

    #[test]
    fn test_nested_scopes_restore_outer() {
        scope_sync("outer", || {
            let inner = scope_sync("inner", current_request_id);
            assert_eq!(inner.as_deref(), Some("inner"));
            assert_eq!(current_request_id().as_deref(), Some("outer"));
        });
    }

    #[test]
    fn test_cleared_after_panic() {
        let result = std::panic::catch_unwind(|| {
            scope_sync("doomed", || -> () { panic!("boom") });
        });
        assert!(result.is_err());
        assert_eq!(current_request_id(), None);
    }

    #[test]
    fn test_not_visible_on_other_threads() {
        scope_sync("local", || {
            let other = std::thread::spawn(current_request_id).join().unwrap();
            assert_eq!(other, None);
        });
    }

    #[tokio::test]
    async fn test_async_scope_survives_await() {
        let seen = scope("req-async", async {
            tokio::task::yield_now().await;
            current_request_id()
        })
        .await;
        assert_eq!(seen.as_deref(), Some("req-async"));
    }
}
