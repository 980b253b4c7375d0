//! Build-on-push orchestration for commitci.
//!
//! The dispatcher decides whether a push should build and hands it to a
//! per-branch worker job. The worker checks the branch out, issues one scratch
//! build per target, waits for all of them, records who triggered each
//! successful build and renders a notification describing the outcome.

pub mod attempts;
pub mod committer;
pub mod dispatcher;
pub mod notification;
pub mod worker;

#[cfg(test)]
mod fakes;

pub use attempts::{BuildAttemptSet, PollPolicy};
pub use committer::CommitterMapping;
pub use dispatcher::CommitCi;
pub use notification::{Notification, NotificationBuilder};
pub use worker::{BuildOutcome, Worker};
