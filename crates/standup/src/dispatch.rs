//! Notification outbox dispatcher.
//!
//! Claims one pending job at a time, hands it to the notifier registered for
//! its channel, and records the outcome:
//!
//! 1. Success marks the job delivered.
//! 2. `NotifyError::Retryable` is retried in process with exponential
//!    back-off, up to `max_retries` times, before the attempt counts as
//!    failed.
//! 3. `NotifyError::Fatal` fails the job immediately and dead-letters it.
//! 4. A failed attempt requeues the job until `max_attempts` is reached.
//!
//! A job left `processing` longer than `claim_lease` (worker crash, or a
//! store error while recording the outcome) is claimed again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notify::{Channel, Notification, Notifier, NotifyError};

use crate::models::OutboxJob;
use crate::store::Store;
use crate::StandupError;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// In-process retries of a retryable failure within one attempt.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound on a single back-off delay.
    pub max_retry_delay: Duration,
    /// Sleep between polls when the outbox is empty.
    pub poll_interval: Duration,
    /// How long a claimed job may stay `processing` before another claim
    /// takes it over.
    pub claim_lease: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(200),
            max_retry_delay: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            claim_lease: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing was pending.
    Idle,
    Delivered(Uuid),
    /// Failed this attempt; will be picked up again.
    Requeued(Uuid),
    DeadLettered(Uuid),
}

pub struct OutboxDispatcher {
    store: Arc<dyn Store>,
    notifiers: HashMap<Channel, Arc<dyn Notifier>>,
    config: DispatchConfig,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn Store>, config: DispatchConfig) -> Self {
        Self { store, notifiers: HashMap::new(), config }
    }

    /// Register a notifier for the channel it reports.
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(notifier.channel(), notifier);
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.notifiers.keys().copied().collect()
    }

    /// Process at most one job.
    pub async fn run_once(&self) -> Result<DispatchOutcome, StandupError> {
        let Some(job) = self.store.claim_outbox_job(self.config.claim_lease).await? else {
            return Ok(DispatchOutcome::Idle);
        };
        debug!(job_id = %job.id, channel = %job.channel, attempt = job.attempts, "claimed outbox job");

        // Only reachable through reclaims of abandoned attempts.
        if job.attempts > job.max_attempts {
            let message = format!("abandoned after {} attempts", job.attempts - 1);
            error!(job_id = %job.id, "{message}");
            self.store.fail_outbox_job(job.id, &message, true).await?;
            return Ok(DispatchOutcome::DeadLettered(job.id));
        }

        let Some(notifier) = self.notifiers.get(&job.channel) else {
            let message = format!("no notifier registered for channel '{}'", job.channel);
            error!(job_id = %job.id, "{message}");
            self.store.fail_outbox_job(job.id, &message, true).await?;
            return Ok(DispatchOutcome::DeadLettered(job.id));
        };

        match self.deliver_with_retry(notifier.as_ref(), &job).await {
            Ok(()) => {
                self.store.complete_outbox_job(job.id).await?;
                info!(job_id = %job.id, update_id = %job.update_id, channel = %job.channel, "notification delivered");
                Ok(DispatchOutcome::Delivered(job.id))
            }
            Err(err) => {
                let terminal = !err.is_retryable() || job.attempts >= job.max_attempts;
                self.store.fail_outbox_job(job.id, &err.to_string(), terminal).await?;
                if terminal {
                    error!(job_id = %job.id, channel = %job.channel, error = %err, "notification dead-lettered");
                    Ok(DispatchOutcome::DeadLettered(job.id))
                } else {
                    warn!(
                        job_id = %job.id,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        error = %err,
                        "notification failed, requeued"
                    );
                    Ok(DispatchOutcome::Requeued(job.id))
                }
            }
        }
    }

    /// Drain the outbox, returning every non-idle outcome.
    pub async fn run_until_idle(&self) -> Result<Vec<DispatchOutcome>, StandupError> {
        let mut outcomes = Vec::new();
        loop {
            match self.run_once().await? {
                DispatchOutcome::Idle => return Ok(outcomes),
                outcome => outcomes.push(outcome),
            }
        }
    }

    /// Poll forever. Store errors are logged and retried after the poll
    /// interval.
    pub async fn run(&self) {
        info!(channels = ?self.channels(), "notification worker started");
        loop {
            match self.run_once().await {
                Ok(DispatchOutcome::Idle) => tokio::time::sleep(self.config.poll_interval).await,
                Ok(_) => {}
                Err(err) => {
                    error!(error = %err, "outbox poll failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// `retry_base_delay * 2^(retry - 1)`, capped at `max_retry_delay`.
    fn backoff(&self, retry: u32) -> Duration {
        let cap = self.config.max_retry_delay;
        2u32.checked_pow(retry.saturating_sub(1))
            .and_then(|factor| self.config.retry_base_delay.checked_mul(factor))
            .map_or(cap, |delay| delay.min(cap))
    }

    async fn deliver_with_retry(&self, notifier: &dyn Notifier, job: &OutboxJob) -> Result<(), NotifyError> {
        let notification = Notification {
            id: job.id,
            channel: job.channel,
            idempotency_key: job.idempotency_key.clone(),
            summary: job.summary.clone(),
        };
        let mut retries = 0u32;

        loop {
            match notifier.deliver(&notification).await {
                Ok(()) => return Ok(()),
                Err(err @ NotifyError::Fatal(_)) => return Err(err),
                Err(err @ NotifyError::Retryable(_)) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(err);
                    }

                    let delay = self.backoff(retries);
                    warn!(
                        job_id = %job.id,
                        retry = retries,
                        max_retries = self.config.max_retries,
                        ?delay,
                        error = %err,
                        "retryable delivery error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use notify::mock::MockNotifier;

    use super::*;
    use crate::store::memory::OutboxState;
    use crate::store::MemoryStore;
    use crate::submission::{SubmissionService, SubmitRequest};

    fn fast() -> DispatchConfig {
        DispatchConfig {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(5),
            poll_interval: Duration::from_millis(1),
            claim_lease: Duration::from_secs(60),
        }
    }

    async fn store_with_submission(channels: Vec<Channel>, max_attempts: i32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let team = store.seed_team("Platform", "lead@example.com");
        let request = SubmitRequest {
            employee_name: "Asha".into(),
            employee_id: "E-1".into(),
            email_address: "asha@example.com".into(),
            team_id: team.id.to_string(),
            tasks_completed: "Reviewed PRs".into(),
            status: "completed".into(),
            ..SubmitRequest::default()
        };
        SubmissionService::new(store.clone(), channels, max_attempts)
            .submit(&request)
            .await
            .unwrap();
        store
    }

    fn states(store: &MemoryStore) -> Vec<OutboxState> {
        store.outbox_jobs().into_iter().map(|j| j.state).collect()
    }

    #[tokio::test]
    async fn delivers_every_channel_once() {
        let store = store_with_submission(vec![Channel::Email, Channel::Sheet], 5).await;
        let email = Arc::new(MockNotifier::succeeding(Channel::Email));
        let sheet = Arc::new(MockNotifier::succeeding(Channel::Sheet));

        let mut dispatcher = OutboxDispatcher::new(store.clone(), fast());
        dispatcher.register(email.clone());
        dispatcher.register(sheet.clone());
        let outcomes = dispatcher.run_until_idle().await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(email.call_count(), 1);
        assert_eq!(sheet.call_count(), 1);
        assert!(states(&store).iter().all(|s| *s == OutboxState::Delivered));
    }

    #[tokio::test]
    async fn retryable_errors_are_retried_in_process() {
        let store = store_with_submission(vec![Channel::Email], 5).await;
        let email = Arc::new(MockNotifier::scripted(
            Channel::Email,
            vec![Err(NotifyError::Retryable("503".into())), Err(NotifyError::Retryable("503".into()))],
        ));

        let mut dispatcher = OutboxDispatcher::new(store.clone(), fast());
        dispatcher.register(email.clone());
        let outcome = dispatcher.run_once().await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
        assert_eq!(email.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_requeue_until_max_attempts() {
        let store = store_with_submission(vec![Channel::Sheet], 2).await;
        let always_down: Vec<_> = (0..6).map(|_| Err(NotifyError::Retryable("timeout".into()))).collect();
        let sheet = Arc::new(MockNotifier::scripted(Channel::Sheet, always_down));

        let mut dispatcher = OutboxDispatcher::new(store.clone(), fast());
        dispatcher.register(sheet.clone());

        assert!(matches!(dispatcher.run_once().await.unwrap(), DispatchOutcome::Requeued(_)));
        assert_eq!(states(&store), vec![OutboxState::Pending]);

        assert!(matches!(dispatcher.run_once().await.unwrap(), DispatchOutcome::DeadLettered(_)));
        assert_eq!(states(&store), vec![OutboxState::DeadLettered]);
        assert_eq!(dispatcher.run_once().await.unwrap(), DispatchOutcome::Idle);
        assert_eq!(sheet.call_count(), 6);
    }

    #[tokio::test]
    async fn fatal_error_dead_letters_immediately() {
        let store = store_with_submission(vec![Channel::Email], 5).await;
        let email = Arc::new(MockNotifier::failing_fatal(Channel::Email, "400 bad template"));

        let mut dispatcher = OutboxDispatcher::new(store.clone(), fast());
        dispatcher.register(email.clone());

        assert!(matches!(dispatcher.run_once().await.unwrap(), DispatchOutcome::DeadLettered(_)));
        assert_eq!(email.call_count(), 1);
        let job = &store.outbox_jobs()[0];
        assert_eq!(job.last_error.as_deref(), Some("fatal delivery error: 400 bad template"));
    }

    #[tokio::test]
    async fn unregistered_channel_is_dead_lettered() {
        let store = store_with_submission(vec![Channel::Sheet], 5).await;
        let dispatcher = OutboxDispatcher::new(store.clone(), fast());

        assert!(matches!(dispatcher.run_once().await.unwrap(), DispatchOutcome::DeadLettered(_)));
        assert_eq!(states(&store), vec![OutboxState::DeadLettered]);
    }

    #[tokio::test]
    async fn abandoned_claim_is_taken_over_after_the_lease() {
        let store = store_with_submission(vec![Channel::Email], 5).await;
        // A worker claims the job and dies before recording anything.
        let abandoned = store.claim_outbox_job(Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(states(&store), vec![OutboxState::Processing]);

        let email = Arc::new(MockNotifier::succeeding(Channel::Email));
        let mut dispatcher = OutboxDispatcher::new(store.clone(), fast());
        dispatcher.register(email.clone());
        assert_eq!(dispatcher.run_once().await.unwrap(), DispatchOutcome::Idle);

        let mut expired = fast();
        expired.claim_lease = Duration::ZERO;
        let mut dispatcher = OutboxDispatcher::new(store.clone(), expired);
        dispatcher.register(email.clone());
        assert_eq!(dispatcher.run_once().await.unwrap(), DispatchOutcome::Delivered(abandoned.id));
        assert_eq!(email.call_count(), 1);
        assert_eq!(store.outbox_jobs()[0].job.attempts, 2);
        assert_eq!(states(&store), vec![OutboxState::Delivered]);
    }

    #[tokio::test]
    async fn reclaimed_job_past_max_attempts_is_dead_lettered() {
        let store = store_with_submission(vec![Channel::Email], 1).await;
        store.claim_outbox_job(Duration::ZERO).await.unwrap().unwrap();

        let email = Arc::new(MockNotifier::succeeding(Channel::Email));
        let mut config = fast();
        config.claim_lease = Duration::ZERO;
        let mut dispatcher = OutboxDispatcher::new(store.clone(), config);
        dispatcher.register(email.clone());

        assert!(matches!(dispatcher.run_once().await.unwrap(), DispatchOutcome::DeadLettered(_)));
        assert_eq!(email.call_count(), 0);
        assert_eq!(store.outbox_jobs()[0].last_error.as_deref(), Some("abandoned after 1 attempts"));
    }

    #[test]
    fn backoff_doubles_and_saturates_at_the_cap() {
        let dispatcher = OutboxDispatcher::new(Arc::new(MemoryStore::new()), DispatchConfig::default());
        assert_eq!(dispatcher.backoff(1), Duration::from_millis(200));
        assert_eq!(dispatcher.backoff(3), Duration::from_millis(800));
        assert_eq!(dispatcher.backoff(10), Duration::from_secs(30));
        assert_eq!(dispatcher.backoff(33), Duration::from_secs(30));
        assert_eq!(dispatcher.backoff(u32::MAX), Duration::from_secs(30));
    }
}
