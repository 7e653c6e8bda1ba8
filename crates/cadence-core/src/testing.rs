//! In-memory scripted transport for engine tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use cadence_types::endpoint::EndpointId;
use cadence_types::reply::Reply;

use crate::transport::{BindOutcome, ReplySink, Transport};

/// Transport double that records sends and answers them from a script.
///
/// Each `send_line` consumes the next scripted batch (if one remains) and
/// delivers it through the currently bound sink, so replies land while the
/// stage is waiting on that step. Sends past the end of the script go
/// unanswered and the stage waits out its window.
pub(crate) struct ScriptedTransport {
    state: Mutex<State>,
}

struct State {
    sent: Vec<(EndpointId, String)>,
    batches: VecDeque<Vec<String>>,
    binding: Option<(EndpointId, ReplySink)>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                sent: Vec::new(),
                batches: VecDeque::new(),
                binding: None,
            }),
        }
    }

    /// Queues a batch of replies for the next unanswered send.
    pub(crate) fn reply_with(self, replies: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .batches
            .push_back(replies.iter().map(|r| r.to_string()).collect());
        self
    }

    /// Everything sent so far, in dispatch order.
    pub(crate) fn sent(&self) -> Vec<(EndpointId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Whether a reply listener is currently installed.
    pub(crate) fn bound(&self) -> bool {
        self.state.lock().unwrap().binding.is_some()
    }
}

impl Transport for ScriptedTransport {
    async fn send_line(&self, endpoint: EndpointId, text: &str) {
        let mut state = self.state.lock().unwrap();
        state.sent.push((endpoint, text.to_string()));
        if let Some(batch) = state.batches.pop_front() {
            if let Some((bound, sink)) = &state.binding {
                let bound = *bound;
                for reply_text in batch {
                    sink.deliver(Reply::new(bound, reply_text));
                }
            }
        }
    }

    fn bind(&self, endpoint: EndpointId, sink: ReplySink) -> BindOutcome {
        let mut state = self.state.lock().unwrap();
        let outcome = if state.binding.is_some() {
            BindOutcome::Replaced
        } else {
            BindOutcome::Fresh
        };
        state.binding = Some((endpoint, sink));
        outcome
    }

    fn release(&self, endpoint: EndpointId, sink: &ReplySink) {
        let mut state = self.state.lock().unwrap();
        if let Some((bound, current)) = &state.binding {
            if *bound == endpoint && current.same_channel(sink) {
                state.binding = None;
            }
        }
    }
}
