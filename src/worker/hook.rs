use async_trait::async_trait;

use crate::worker::pass::PassSummary;

/// Observer invoked by the worker after every pass, including empty and
/// aborted ones.
///
/// Implementations refresh presentation state (the Telegram panel). The
/// worker logs and swallows any error returned here; a broken hook can never
/// affect claim outcomes or the schedule.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PassHook: Send + Sync {
    async fn on_pass_complete(&self, summary: &PassSummary) -> anyhow::Result<()>;
}
