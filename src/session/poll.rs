//! Liveness poll for a freshly pushed report

use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

use crate::types::identifiers::ReportId;

/// Remaining `isActive` asks for one report
pub(super) struct ActivityPoll {
    pub report_id: ReportId,
    pub remaining: u32,
    interval: Duration,
    timer: Pin<Box<Sleep>>,
}

impl ActivityPoll {
    /// Poll that has already sent its first ask
    pub fn started(report_id: ReportId, attempts: u32, interval: Duration) -> Option<Self> {
        let remaining = attempts.checked_sub(1)?;
        if remaining == 0 {
            return None;
        }
        Some(Self {
            report_id,
            remaining,
            interval,
            timer: Box::pin(tokio::time::sleep(interval)),
        })
    }

    /// Count one ask; `false` once the budget is spent
    pub fn record_ask(&mut self) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            return false;
        }
        self.timer = Box::pin(tokio::time::sleep(self.interval));
        true
    }
}

/// Resolves when the next ask is due; never while no poll runs
pub(super) async fn ask_due(poll: &mut Option<ActivityPoll>) {
    match poll {
        Some(poll) => poll.timer.as_mut().await,
        None => std::future::pending().await,
    }
}
