//! Policy-gated cancellation for execution futures.
//!
//! A [`CancelableFuture`] wraps an ordinary future together with the native
//! cancellation primitive of whatever runs it. Cancellation first asks a
//! [`CancelPolicy`] whether it may proceed; once a worker has committed to an
//! execution, interrupting it could leave partially staged output behind, so
//! the request is refused. Everything else passes through to the wrapped
//! future untouched.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::error::ExecutionError;

/// Native cancellation of the thing that runs the work.
pub trait NativeCancel: Send + Sync {
    /// Attempt to cancel. Returns `false` if the work already completed or was
    /// already cancelled.
    fn cancel(&self, may_interrupt: bool) -> bool;
    fn is_cancelled(&self) -> bool;
    fn is_done(&self) -> bool;
}

/// Decides whether a cancel request may go through.
pub trait CancelPolicy: Send + Sync {
    /// `false` refuses the request with no side effects.
    fn may_cancel(&self) -> bool;

    /// Hook run before the native cancel when interruption is requested.
    /// Errors are logged and discarded.
    fn on_cancel(&self) -> Result<(), ExecutionError>;

    /// Check, hook and native cancel as one step. Returns `None` when refused,
    /// otherwise the native cancel's result.
    ///
    /// The default runs them in sequence. Policies whose answer can change
    /// concurrently override this to hold their gate across all three.
    fn gate(&self, may_interrupt: bool, native: &dyn NativeCancel) -> Option<bool> {
        if !self.may_cancel() {
            return None;
        }
        if may_interrupt {
            run_cancel_hook(|| self.on_cancel());
        }
        Some(native.cancel(may_interrupt))
    }
}

/// Run a cancel hook, discarding any error or panic.
fn run_cancel_hook(hook: impl FnOnce() -> Result<(), ExecutionError>) {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Cancel hook failed; ignoring"),
        Err(_) => warn!("Cancel hook panicked; ignoring"),
    }
}

/// [`NativeCancel`] over a tokio task.
///
/// Aborting a task that has not started prevents it from running. A blocking
/// task that is already running keeps running; only its join handle resolves
/// as cancelled.
#[derive(Debug)]
pub struct TaskAbort {
    handle: AbortHandle,
    cancelled: AtomicBool,
}

impl TaskAbort {
    pub fn new(handle: AbortHandle) -> Self {
        Self {
            handle,
            cancelled: AtomicBool::new(false),
        }
    }
}

impl NativeCancel for TaskAbort {
    fn cancel(&self, _may_interrupt: bool) -> bool {
        if self.handle.is_finished() {
            return false;
        }
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.handle.abort();
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn is_done(&self) -> bool {
        self.handle.is_finished() || self.is_cancelled()
    }
}

/// Cloneable, policy-gated cancel entry point.
///
/// The executor keeps one per execution id while the caller owns the
/// [`CancelableFuture`]; both go through the same gate.
#[derive(Clone)]
pub struct CancelHandle {
    policy: Arc<dyn CancelPolicy>,
    native: Arc<dyn NativeCancel>,
}

impl CancelHandle {
    pub fn new(policy: Arc<dyn CancelPolicy>, native: Arc<dyn NativeCancel>) -> Self {
        Self { policy, native }
    }

    /// Cancel unless the policy refuses.
    ///
    /// With `may_interrupt`, the policy's hook runs first; any error or panic
    /// from it is swallowed. Returns the native cancel's result.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        match self.policy.gate(may_interrupt, self.native.as_ref()) {
            Some(cancelled) => cancelled,
            None => {
                debug!("Cancel refused: execution already scheduled");
                false
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.native.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.native.is_done()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish()
    }
}

/// A future whose cancellation is gated by a [`CancelPolicy`].
///
/// Awaiting it yields the wrapped future's output unchanged.
#[pin_project]
pub struct CancelableFuture<F> {
    #[pin]
    inner: F,
    handle: CancelHandle,
}

impl<F> CancelableFuture<F> {
    pub fn new(inner: F, handle: CancelHandle) -> Self {
        Self { inner, handle }
    }

    /// See [`CancelHandle::cancel`].
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        self.handle.cancel(may_interrupt)
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub fn is_done(&self) -> bool {
        self.handle.is_done()
    }

    /// A detached handle sharing this future's cancellation gate.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Future> Future for CancelableFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct FakeNative {
        calls: AtomicUsize,
        cancelled: AtomicBool,
    }

    impl NativeCancel for FakeNative {
        fn cancel(&self, _may_interrupt: bool) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            !self.cancelled.swap(true, Ordering::SeqCst)
        }
        fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }
        fn is_done(&self) -> bool {
            self.is_cancelled()
        }
    }

    enum HookBehaviour {
        Ok,
        Fail,
        Panic,
    }

    struct FakePolicy {
        allow: bool,
        hook: HookBehaviour,
        hook_calls: AtomicUsize,
    }

    impl FakePolicy {
        fn new(allow: bool, hook: HookBehaviour) -> Self {
            Self {
                allow,
                hook,
                hook_calls: AtomicUsize::new(0),
            }
        }
    }

    impl CancelPolicy for FakePolicy {
        fn may_cancel(&self) -> bool {
            self.allow
        }
        fn on_cancel(&self) -> Result<(), ExecutionError> {
            self.hook_calls.fetch_add(1, Ordering::SeqCst);
            match self.hook {
                HookBehaviour::Ok => Ok(()),
                HookBehaviour::Fail => Err(ExecutionError::NotQueued),
                HookBehaviour::Panic => panic!("hook exploded"),
            }
        }
    }

    fn handle(policy: &Arc<FakePolicy>, native: &Arc<FakeNative>) -> CancelHandle {
        CancelHandle::new(policy.clone(), native.clone())
    }

    #[test]
    fn test_refused_without_side_effects() {
        let policy = Arc::new(FakePolicy::new(false, HookBehaviour::Ok));
        let native = Arc::new(FakeNative::default());
        let handle = handle(&policy, &native);

        assert!(!handle.cancel(true));
        assert_eq!(policy.hook_calls.load(Ordering::SeqCst), 0);
        assert_eq!(native.calls.load(Ordering::SeqCst), 0);
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_interrupt_runs_hook_then_native() {
        let policy = Arc::new(FakePolicy::new(true, HookBehaviour::Ok));
        let native = Arc::new(FakeNative::default());
        let handle = handle(&policy, &native);

        assert!(handle.cancel(true));
        assert_eq!(policy.hook_calls.load(Ordering::SeqCst), 1);
        assert_eq!(native.calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_cancelled());

        // native decides the second answer
        assert!(!handle.cancel(true));
    }

    #[test]
    fn test_no_interrupt_skips_hook() {
        let policy = Arc::new(FakePolicy::new(true, HookBehaviour::Ok));
        let native = Arc::new(FakeNative::default());
        let handle = handle(&policy, &native);

        assert!(handle.cancel(false));
        assert_eq!(policy.hook_calls.load(Ordering::SeqCst), 0);
        assert_eq!(native.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_errors_are_swallowed() {
        for behaviour in [HookBehaviour::Fail, HookBehaviour::Panic] {
            let policy = Arc::new(FakePolicy::new(true, behaviour));
            let native = Arc::new(FakeNative::default());
            let handle = handle(&policy, &native);

            assert!(handle.cancel(true));
            assert_eq!(native.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    #[traced_test]
    fn test_hook_failure_logged_as_warning() {
        let policy = Arc::new(FakePolicy::new(true, HookBehaviour::Fail));
        let native = Arc::new(FakeNative::default());
        assert!(handle(&policy, &native).cancel(true));

        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("WARN") && line.contains("Cancel hook failed"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("Expected one hook warning, got {}", n)),
            }
        });
    }

    #[tokio::test]
    async fn test_future_output_passes_through() {
        let policy = Arc::new(FakePolicy::new(true, HookBehaviour::Ok));
        let native = Arc::new(FakeNative::default());
        let future = CancelableFuture::new(async { 7 }, handle(&policy, &native));
        assert!(!future.is_done());
        assert_eq!(future.await, 7);
    }

    #[tokio::test]
    async fn test_task_abort_before_start() {
        let join = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            1
        });
        let abort = TaskAbort::new(join.abort_handle());

        assert!(abort.cancel(true));
        assert!(abort.is_cancelled());
        assert!(!abort.cancel(true));
        assert!(join.await.unwrap_err().is_cancelled());
        assert!(abort.is_done());
    }

    #[tokio::test]
    async fn test_task_abort_after_completion() {
        let join = tokio::spawn(async { 1 });
        let abort = TaskAbort::new(join.abort_handle());
        assert_eq!(join.await.unwrap(), 1);

        assert!(!abort.cancel(true));
        assert!(!abort.is_cancelled());
        assert!(abort.is_done());
    }
}
