//! `MockNotifier`, a test double for `Notifier`.
//!
//! Records every notification it receives and replays a scripted sequence of
//! outcomes, falling back to success once the script runs out.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::{Channel, Notification, Notifier, NotifyError};

pub struct MockNotifier {
    pub channel: Channel,
    script: Mutex<VecDeque<Result<(), NotifyError>>>,
    /// Idempotency keys seen by this notifier (in call order).
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockNotifier {
    /// A notifier that always succeeds.
    pub fn succeeding(channel: Channel) -> Self {
        Self::scripted(channel, Vec::new())
    }

    /// A notifier that returns each scripted outcome once, in order.
    pub fn scripted(channel: Channel, outcomes: Vec<Result<(), NotifyError>>) -> Self {
        Self {
            channel,
            script: Mutex::new(outcomes.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A notifier that fails with a `Fatal` error on the first call.
    pub fn failing_fatal(channel: Channel, msg: impl Into<String>) -> Self {
        Self::scripted(channel, vec![Err(NotifyError::Fatal(msg.into()))])
    }

    /// Number of times `deliver` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.calls.lock().unwrap().push(notification.idempotency_key.clone());
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
