//! `notify` crate: the `Notifier` trait and the outbound integrations.
//!
//! Every delivery channel (transactional email, spreadsheet webhook, test
//! doubles) implements [`Notifier`]. The dispatcher in the `standup` crate
//! routes outbox entries to the notifier registered for their channel.

pub mod error;
pub mod traits;
pub mod summary;
pub mod email;
pub mod sheet;
pub mod mock;

pub use error::NotifyError;
pub use traits::{Channel, Notification, Notifier};
pub use summary::{BlockerLine, SubmissionSummary};
pub use email::{EmailConfig, EmailNotifier, DEFAULT_EMAIL_API_URL};
pub use sheet::SheetNotifier;
pub use mock::MockNotifier;
