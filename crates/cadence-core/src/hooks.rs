//! Capability hooks: reply gating and stage lifecycle callbacks.
//!
//! A stage is customized through two small capabilities. The `Validator`
//! decides whether an inbound reply satisfies the waiting stage. The
//! `StageCallback` is notified when the stage succeeds and, in its extended
//! shape, also when a dependent stage starts -- at which point it may rewrite
//! the pending step texts using the previous stage's accepted reply.

use std::sync::Arc;

use cadence_types::reply::Reply;

use crate::stage::StepQueue;

/// Decides whether an inbound reply satisfies the waiting stage.
///
/// Rejection is not an error: the stage keeps waiting for the remainder of
/// the step's window. A stage configured without a validator rejects every
/// reply and can only advance by timeout.
pub trait Validator: Send + Sync {
    fn accept(&self, reply: &Reply) -> bool;
}

impl<F> Validator for F
where
    F: Fn(&Reply) -> bool + Send + Sync,
{
    fn accept(&self, reply: &Reply) -> bool {
        self(reply)
    }
}

/// Invoked exactly once with the accepted reply when a stage succeeds.
///
/// Never invoked when the stage exhausts its queue.
pub trait OnSuccess: Send + Sync {
    fn on_success(&self, reply: &Reply);
}

impl<F> OnSuccess for F
where
    F: Fn(&Reply) + Send + Sync,
{
    fn on_success(&self, reply: &Reply) {
        self(reply)
    }
}

/// Success hook that also observes the start of a dependent stage.
///
/// `on_start` runs before the stage's first dispatch and receives the
/// previous stage's accepted reply plus mutable access to the pending queue,
/// so it can splice reply data into step text before anything is sent.
pub trait OnStart: OnSuccess {
    fn on_start(&self, previous: &Reply, pending: &mut StepQueue);
}

/// The callback capability attached to a stage.
///
/// Exactly two shapes exist: success-only, and success plus start.
#[derive(Clone)]
pub enum StageCallback {
    Success(Arc<dyn OnSuccess>),
    WithStart(Arc<dyn OnStart>),
}

impl StageCallback {
    /// Wraps a success closure.
    pub fn on_success<F>(hook: F) -> Self
    where
        F: Fn(&Reply) + Send + Sync + 'static,
    {
        Self::Success(Arc::new(hook))
    }

    /// Wraps a start closure and a success closure.
    pub fn with_start<S, F>(start: S, success: F) -> Self
    where
        S: Fn(&Reply, &mut StepQueue) + Send + Sync + 'static,
        F: Fn(&Reply) + Send + Sync + 'static,
    {
        Self::WithStart(Arc::new(ClosureHooks { start, success }))
    }

    /// The start hook, if this callback carries one.
    pub fn start_hook(&self) -> Option<&dyn OnStart> {
        match self {
            Self::Success(_) => None,
            Self::WithStart(hook) => Some(hook.as_ref()),
        }
    }

    pub fn notify_success(&self, reply: &Reply) {
        match self {
            Self::Success(hook) => hook.on_success(reply),
            Self::WithStart(hook) => hook.on_success(reply),
        }
    }
}

impl std::fmt::Debug for StageCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success(_) => f.write_str("StageCallback::Success"),
            Self::WithStart(_) => f.write_str("StageCallback::WithStart"),
        }
    }
}

/// Closure pair backing `StageCallback::with_start`.
struct ClosureHooks<S, F> {
    start: S,
    success: F,
}

impl<S, F> OnSuccess for ClosureHooks<S, F>
where
    S: Send + Sync,
    F: Fn(&Reply) + Send + Sync,
{
    fn on_success(&self, reply: &Reply) {
        (self.success)(reply)
    }
}

impl<S, F> OnStart for ClosureHooks<S, F>
where
    S: Fn(&Reply, &mut StepQueue) + Send + Sync,
    F: Fn(&Reply) + Send + Sync,
{
    fn on_start(&self, previous: &Reply, pending: &mut StepQueue) {
        (self.start)(previous, pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::endpoint::EndpointId;
    use cadence_types::step::Step;
    use std::sync::Mutex;

    #[test]
    fn closure_validator_gates_replies() {
        let validator = |reply: &Reply| reply.text().contains('@');
        assert!(validator.accept(&Reply::new(EndpointId::new(1), "ann@example.com")));
        assert!(!validator.accept(&Reply::new(EndpointId::new(1), "no thanks")));
    }

    #[test]
    fn success_callback_receives_reply() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback = StageCallback::on_success(move |reply: &Reply| {
            seen_clone.lock().unwrap().push(reply.text().to_string());
        });

        assert!(callback.start_hook().is_none());
        callback.notify_success(&Reply::new(EndpointId::new(2), "done"));
        assert_eq!(seen.lock().unwrap().as_slice(), ["done"]);
    }

    #[test]
    fn with_start_exposes_both_hooks() {
        let callback = StageCallback::with_start(
            |previous: &Reply, pending: &mut StepQueue| {
                for entry in pending.iter_mut() {
                    let rewritten = entry.step().text.replace("{date}", previous.text());
                    entry.step_mut().text = rewritten;
                }
            },
            |_reply: &Reply| {},
        );

        let mut queue = StepQueue::new();
        queue.push(Step::new(1, "Scheduled on {date}"));

        let hook = callback.start_hook().unwrap();
        hook.on_start(&Reply::new(EndpointId::new(1), "2026-09-01"), &mut queue);

        let texts: Vec<_> = queue.iter().map(|e| e.step().text.clone()).collect();
        assert_eq!(texts, ["Scheduled on 2026-09-01"]);
    }
}
