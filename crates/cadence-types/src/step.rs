//! Scheduled unit of work.

use std::time::Duration;

use crate::reply::Reply;

/// One scheduled message and the window to wait for a qualifying reply.
///
/// Steps carry no identity of their own; the stage queue assigns sequential
/// ids at insertion. The window starts counting from the moment the step is
/// dispatched, not from when it was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Outbound message text.
    pub text: String,
    /// How long to wait for a qualifying reply after dispatch.
    pub window: Duration,
    /// Canned reply delivered right after dispatch, for dry runs and tests.
    pub mock_reply: Option<Reply>,
}

impl Step {
    /// Creates a step with a reply window expressed in minutes.
    pub fn new(window_mins: u32, text: impl Into<String>) -> Self {
        Self::with_window(Duration::from_secs(u64::from(window_mins) * 60), text)
    }

    /// Creates a step with an arbitrary reply window.
    ///
    /// A zero window makes the step fire-and-forget: it is sent and the
    /// stage advances immediately.
    pub fn with_window(window: Duration, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            window,
            mock_reply: None,
        }
    }

    pub fn with_mock_reply(mut self, reply: Reply) -> Self {
        self.mock_reply = Some(reply);
        self
    }
}
