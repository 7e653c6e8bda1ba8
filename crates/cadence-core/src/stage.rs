//! Workflow stage: an ordered step queue with gated, time-bounded advance.
//!
//! A stage owns a queue of steps bound to one endpoint. Steps dispatch one
//! at a time: the stage installs a reply sink, sends the step text, then
//! awaits a validated reply until the step's window elapses. An accepted
//! reply ends the whole stage; a timeout advances to the next queued step.
//!
//! # Dispatch loop
//!
//! 1. Pop the head step and stamp its dispatch time.
//! 2. Bind a fresh reply sink for the stage's endpoint.
//! 3. Send the step text (and deliver the mock reply, if any).
//! 4. Await a reply under `timeout_at`; rejected replies keep waiting.
//! 5. Release the binding, then either finish (accepted) or advance (window
//!    elapsed).

use std::collections::VecDeque;
use std::sync::Arc;

use cadence_types::endpoint::EndpointId;
use cadence_types::reply::Reply;
use cadence_types::step::Step;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::hooks::{StageCallback, Validator};
use crate::transport::{BindOutcome, ReplySink, Transport};

// ---------------------------------------------------------------------------
// Step queue
// ---------------------------------------------------------------------------

/// A step held in a stage's queue, tagged with its per-stage id.
#[derive(Debug, Clone)]
pub struct Queued {
    id: u32,
    step: Step,
    dispatched_at: Option<DateTime<Utc>>,
}

impl Queued {
    /// Per-stage step id, assigned at insertion starting from 1.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    /// Mutable access to the step, for pre-dispatch text rewriting.
    ///
    /// The id and dispatch time stay under the queue's control.
    pub fn step_mut(&mut self) -> &mut Step {
        &mut self.step
    }

    /// When the step was sent, if it has been dispatched yet.
    pub fn dispatched_at(&self) -> Option<DateTime<Utc>> {
        self.dispatched_at
    }
}

/// Ordered queue of pending steps, owner of per-stage step ids.
#[derive(Debug, Clone)]
pub struct StepQueue {
    entries: VecDeque<Queued>,
    next_id: u32,
}

impl StepQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Appends a step and returns its assigned id.
    pub fn push(&mut self, step: Step) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Queued {
            id,
            step,
            dispatched_at: None,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pending entries in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Queued> {
        self.entries.iter()
    }

    /// Pending entries in dispatch order, mutable for text rewriting.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Queued> {
        self.entries.iter_mut()
    }

    fn pop(&mut self) -> Option<Queued> {
        self.entries.pop_front()
    }
}

impl Default for StepQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Built but not yet run.
    Created,
    /// The dispatch loop is executing; the payload is the in-flight step id.
    Running(u32),
    /// A reply was accepted; the success hook is being notified.
    Succeeded,
    /// Terminal. The stage never dispatches again.
    Shutdown,
}

/// How a stage's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// A qualifying reply arrived; it is recorded as the stage's last reply.
    Succeeded,
    /// Every queued step ran out its window without a qualifying reply.
    Exhausted,
}

/// One stage of a workflow chain.
///
/// Runs to completion exactly once, dispatching at most one step at a time.
/// The optional `next` arena index is managed by `chain::Chain`.
pub struct Stage {
    name: String,
    endpoint: EndpointId,
    queue: StepQueue,
    validator: Option<Arc<dyn Validator>>,
    callback: Option<StageCallback>,
    depends_on_previous: bool,
    next: Option<usize>,
    state: StageState,
    last_reply: Option<Reply>,
}

impl Stage {
    pub fn new(name: impl Into<String>, endpoint: EndpointId) -> Self {
        Self {
            name: name.into(),
            endpoint,
            queue: StepQueue::new(),
            validator: None,
            callback: None,
            depends_on_previous: false,
            next: None,
            state: StageState::Created,
            last_reply: None,
        }
    }

    /// Installs the reply gate. Without one, every reply is rejected.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn with_callback(mut self, callback: StageCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Marks this stage as consuming the previous stage's accepted reply.
    pub fn depends_on_previous(mut self) -> Self {
        self.depends_on_previous = true;
        self
    }

    /// Appends a step and returns its per-stage id.
    ///
    /// Steps are queued before the stage runs; the queue is not shared with
    /// concurrent producers.
    pub fn push_step(&mut self, step: Step) -> u32 {
        self.queue.push(step)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    /// The accepted reply, if the stage succeeded.
    pub fn last_reply(&self) -> Option<&Reply> {
        self.last_reply.as_ref()
    }

    /// Steps still waiting for dispatch.
    pub fn pending_steps(&self) -> usize {
        self.queue.len()
    }

    /// Queued entries in dispatch order.
    pub fn queued(&self) -> impl Iterator<Item = &Queued> {
        self.queue.iter()
    }

    /// Arena index of the successor stage, if linked.
    pub fn next(&self) -> Option<usize> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: usize) {
        self.next = Some(next);
    }

    /// Runs the stage to completion.
    ///
    /// `previous` is the final accepted reply of the predecessor stage, if
    /// any. It feeds the start hook of a dependent stage and is otherwise
    /// ignored.
    pub async fn run<T: Transport>(
        &mut self,
        transport: &T,
        previous: Option<&Reply>,
    ) -> StageOutcome {
        self.apply_start_hook(previous);

        while let Some(mut entry) = self.queue.pop() {
            entry.dispatched_at = Some(Utc::now());
            let deadline = Instant::now() + entry.step.window;
            self.state = StageState::Running(entry.id);

            let (sink, mut replies) = ReplySink::channel();
            if transport.bind(self.endpoint, sink.clone()) == BindOutcome::Replaced {
                warn!(
                    stage = self.name.as_str(),
                    endpoint = %self.endpoint,
                    "replaced an existing reply listener"
                );
            }

            info!(
                stage = self.name.as_str(),
                endpoint = %self.endpoint,
                step_id = entry.id,
                window_ms = entry.step.window.as_millis() as u64,
                "dispatching step"
            );
            transport.send_line(self.endpoint, &entry.step.text).await;

            if let Some(mock) = entry.step.mock_reply.clone() {
                if !sink.deliver(mock.with_endpoint(self.endpoint)) {
                    debug!(stage = self.name.as_str(), "mock reply dropped");
                }
            }

            let accepted = self.await_reply(&mut replies, deadline, entry.id).await;
            transport.release(self.endpoint, &sink);

            if let Some(reply) = accepted {
                self.state = StageState::Succeeded;
                info!(
                    stage = self.name.as_str(),
                    endpoint = %self.endpoint,
                    step_id = entry.id,
                    "reply accepted"
                );
                if let Some(callback) = &self.callback {
                    callback.notify_success(&reply);
                }
                self.last_reply = Some(reply);
                self.state = StageState::Shutdown;
                return StageOutcome::Succeeded;
            }

            debug!(
                stage = self.name.as_str(),
                step_id = entry.id,
                "reply window elapsed, advancing"
            );
        }

        self.state = StageState::Shutdown;
        info!(
            stage = self.name.as_str(),
            endpoint = %self.endpoint,
            "queue exhausted without an accepted reply"
        );
        StageOutcome::Exhausted
    }

    fn apply_start_hook(&mut self, previous: Option<&Reply>) {
        if !self.depends_on_previous {
            return;
        }
        let Some(callback) = self.callback.clone() else {
            return;
        };
        let Some(hook) = callback.start_hook() else {
            return;
        };
        match previous {
            Some(previous) => {
                debug!(
                    stage = self.name.as_str(),
                    "splicing previous reply into pending steps"
                );
                hook.on_start(previous, &mut self.queue);
            }
            None => {
                warn!(
                    stage = self.name.as_str(),
                    "no previous reply available, start hook skipped"
                );
            }
        }
    }

    /// Waits for a validated reply until `deadline`.
    ///
    /// Rejected replies are consumed and the wait continues. Returns `None`
    /// when the window elapses without an accepted reply.
    async fn await_reply(
        &self,
        replies: &mut mpsc::Receiver<Reply>,
        deadline: Instant,
        step_id: u32,
    ) -> Option<Reply> {
        loop {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(reply)) => {
                    if self.validator.as_ref().is_some_and(|v| v.accept(&reply)) {
                        return Some(reply);
                    }
                    debug!(
                        stage = self.name.as_str(),
                        step_id,
                        reply = reply.text(),
                        "reply rejected, still waiting"
                    );
                }
                Ok(None) => {
                    // No sender remains, so nothing further can arrive
                    // inside this window.
                    tokio::time::sleep_until(deadline).await;
                    return None;
                }
                Err(_) => return None,
            }
        }
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("pending_steps", &self.queue.len())
            .field("state", &self.state)
            .field("next", &self.next)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use std::sync::Mutex;
    use std::time::Duration;

    fn quick(text: &str) -> Step {
        Step::with_window(Duration::from_millis(20), text)
    }

    #[test]
    fn push_step_assigns_sequential_ids_per_stage() {
        let mut first = Stage::new("first", EndpointId::new(1));
        let mut second = Stage::new("second", EndpointId::new(2));

        assert_eq!(first.push_step(quick("a")), 1);
        assert_eq!(first.push_step(quick("b")), 2);
        assert_eq!(first.push_step(quick("c")), 3);
        // ids are per stage, not global
        assert_eq!(second.push_step(quick("x")), 1);
        assert_eq!(second.push_step(quick("y")), 2);
    }

    #[tokio::test]
    async fn accepted_reply_ends_stage_and_skips_queue() {
        let seen: Arc<Mutex<Vec<Reply>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let mut stage = Stage::new("greet", EndpointId::new(1))
            .with_validator(|_reply: &Reply| true)
            .with_callback(StageCallback::on_success(move |reply: &Reply| {
                seen_clone.lock().unwrap().push(reply.clone());
            }));
        stage.push_step(quick("Hello Ann!"));
        stage.push_step(quick("Anyone there?"));

        let transport = ScriptedTransport::new().reply_with(&["ok"]);
        let outcome = stage.run(&transport, None).await;

        assert_eq!(outcome, StageOutcome::Succeeded);
        assert_eq!(stage.state(), StageState::Shutdown);
        assert_eq!(stage.last_reply().map(Reply::text), Some("ok"));
        // the second step never dispatched
        assert_eq!(stage.pending_steps(), 1);
        assert_eq!(transport.sent(), vec![(EndpointId::new(1), "Hello Ann!".to_string())]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], Reply::new(EndpointId::new(1), "ok"));
    }

    #[tokio::test]
    async fn missing_validator_rejects_everything() {
        let called = Arc::new(Mutex::new(false));
        let called_clone = Arc::clone(&called);

        let mut stage = Stage::new("silent", EndpointId::new(3)).with_callback(
            StageCallback::on_success(move |_reply: &Reply| {
                *called_clone.lock().unwrap() = true;
            }),
        );
        stage.push_step(quick("first"));
        stage.push_step(quick("second"));

        // replies arrive but no validator is installed, so none qualify
        let transport = ScriptedTransport::new().reply_with(&["yes"]).reply_with(&["yes"]);
        let outcome = stage.run(&transport, None).await;

        assert_eq!(outcome, StageOutcome::Exhausted);
        assert_eq!(stage.state(), StageState::Shutdown);
        assert!(stage.last_reply().is_none());
        assert!(!*called.lock().unwrap());
        // both steps dispatched, in order
        let sent: Vec<String> = transport.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(sent, ["first", "second"]);
    }

    #[tokio::test]
    async fn rejected_reply_keeps_waiting_within_window() {
        let mut stage = Stage::new("gate", EndpointId::new(1))
            .with_validator(|reply: &Reply| reply.text() == "yes");
        stage.push_step(quick("say yes"));

        let transport = ScriptedTransport::new().reply_with(&["no", "maybe", "yes"]);
        let outcome = stage.run(&transport, None).await;

        assert_eq!(outcome, StageOutcome::Succeeded);
        assert_eq!(stage.last_reply().map(Reply::text), Some("yes"));
    }

    #[tokio::test]
    async fn timeouts_exhaust_queue_in_order() {
        let mut stage =
            Stage::new("retry", EndpointId::new(2)).with_validator(|_reply: &Reply| true);
        stage.push_step(Step::with_window(Duration::from_millis(10), "one"));
        stage.push_step(Step::with_window(Duration::from_millis(10), "two"));
        stage.push_step(Step::with_window(Duration::from_millis(10), "three"));

        let transport = ScriptedTransport::new();
        let outcome = stage.run(&transport, None).await;

        assert_eq!(outcome, StageOutcome::Exhausted);
        let sent: Vec<String> = transport.sent().into_iter().map(|(_, text)| text).collect();
        assert_eq!(sent, ["one", "two", "three"]);
        // nothing left bound after the run
        assert!(!transport.bound());
    }

    #[tokio::test]
    async fn zero_window_step_is_fire_and_forget() {
        let mut stage =
            Stage::new("notify", EndpointId::new(4)).with_validator(|_reply: &Reply| true);
        stage.push_step(Step::with_window(Duration::ZERO, "see you then"));

        let transport = ScriptedTransport::new();
        let started = Instant::now();
        let outcome = stage.run(&transport, None).await;

        // sent once, then the stage moves on without lingering
        assert_eq!(outcome, StageOutcome::Exhausted);
        assert_eq!(stage.state(), StageState::Shutdown);
        assert!(stage.last_reply().is_none());
        assert_eq!(
            transport.sent(),
            vec![(EndpointId::new(4), "see you then".to_string())]
        );
        assert!(!transport.bound());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn mock_reply_is_restamped_with_stage_endpoint() {
        let mut stage = Stage::new("dry-run", EndpointId::new(7))
            .with_validator(|_reply: &Reply| true);
        stage.push_step(
            Step::with_window(Duration::from_millis(50), "ping")
                .with_mock_reply(Reply::new(EndpointId::new(0), "pong")),
        );

        let transport = ScriptedTransport::new();
        let outcome = stage.run(&transport, None).await;

        assert_eq!(outcome, StageOutcome::Succeeded);
        assert_eq!(
            stage.last_reply(),
            Some(&Reply::new(EndpointId::new(7), "pong"))
        );
    }

    #[tokio::test]
    async fn start_hook_skipped_without_previous_reply() {
        let rewritten = Arc::new(Mutex::new(false));
        let rewritten_clone = Arc::clone(&rewritten);

        let mut stage = Stage::new("confirm", EndpointId::new(1))
            .depends_on_previous()
            .with_validator(|_reply: &Reply| true)
            .with_callback(StageCallback::with_start(
                move |_previous: &Reply, _pending: &mut StepQueue| {
                    *rewritten_clone.lock().unwrap() = true;
                },
                |_reply: &Reply| {},
            ));
        stage.push_step(quick("confirmed for {date}"));

        let transport = ScriptedTransport::new().reply_with(&["fine"]);
        stage.run(&transport, None).await;

        // no previous reply existed, so the splice never ran
        assert!(!*rewritten.lock().unwrap());
        assert_eq!(
            transport.sent()[0].1,
            "confirmed for {date}".to_string()
        );
    }

    #[tokio::test]
    async fn start_hook_rewrites_pending_text() {
        let mut stage = Stage::new("confirm", EndpointId::new(1))
            .depends_on_previous()
            .with_validator(|_reply: &Reply| true)
            .with_callback(StageCallback::with_start(
                |previous: &Reply, pending: &mut StepQueue| {
                    for entry in pending.iter_mut() {
                        let text = entry.step().text.replace("{date}", previous.text());
                        entry.step_mut().text = text;
                    }
                },
                |_reply: &Reply| {},
            ));
        stage.push_step(quick("confirmed for {date}"));

        let transport = ScriptedTransport::new().reply_with(&["done"]);
        let previous = Reply::new(EndpointId::new(1), "2026-09-01");
        let outcome = stage.run(&transport, Some(&previous)).await;

        assert_eq!(outcome, StageOutcome::Succeeded);
        assert_eq!(transport.sent()[0].1, "confirmed for 2026-09-01".to_string());
    }

    #[tokio::test]
    async fn dispatch_stamps_queued_entries() {
        let mut queue = StepQueue::new();
        queue.push(quick("a"));
        let entry = queue.iter().next().unwrap();
        assert_eq!(entry.id(), 1);
        assert!(entry.dispatched_at().is_none());
    }
}
