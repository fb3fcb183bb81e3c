//! WaiterLoop - 完了待ちループ
//!
//! 本番ではワークフロー側が poller を呼び直す。ローカル実行ではこのループが
//! その役を担い、最初の終端判定で止まることで「通知は 1 回だけ」を保証する。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{ErrorKind, SetId, SetNotification, SetStatus, TallyError};

use super::poller::{CompletionPoller, PollDecision};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    /// `InProgress` when the loop stopped before a terminal decision.
    pub status: SetStatus,
    pub polls: u32,
    pub notification: Option<SetNotification>,
}

pub struct WaiterLoop {
    poller: Arc<CompletionPoller>,
    max_polls: Option<u32>,
}

impl WaiterLoop {
    pub fn new(poller: Arc<CompletionPoller>) -> Self {
        Self {
            poller,
            max_polls: None,
        }
    }

    /// Gives up (without notifying) after `max_polls` non-terminal polls.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Polls `set_id` until a terminal notification goes out, `max_polls` is
    /// reached, or `shutdown` flips to true.
    ///
    /// Infrastructure and transient errors are logged and retried on the next
    /// tick; permanent ones end the loop.
    pub async fn run(
        &self,
        set_id: &SetId,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<WaitOutcome, TallyError> {
        let mut polls = 0;
        loop {
            if *shutdown.borrow() {
                return Ok(Self::unfinished(polls));
            }

            polls += 1;
            let delay = match self.poller.poll(set_id).await {
                Ok(PollDecision::Stop {
                    status,
                    notification,
                }) => {
                    return Ok(WaitOutcome {
                        status,
                        polls,
                        notification: Some(notification),
                    });
                }
                Ok(PollDecision::Continue { next_poll, .. }) => next_poll,
                Err(e) if e.kind() != ErrorKind::Permanent => {
                    warn!(%set_id, polls, error = %e, "poll failed; will retry");
                    self.poller.poll_interval()
                }
                Err(e) => return Err(e),
            };

            if self.max_polls.is_some_and(|max| polls >= max) {
                debug!(%set_id, polls, "giving up waiting for set");
                return Ok(Self::unfinished(polls));
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    // sender gone: nobody can ask us to stop any more
                    if changed.is_err() {
                        tokio::time::sleep(delay).await;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn unfinished(polls: u32) -> WaitOutcome {
        WaitOutcome {
            status: SetStatus::InProgress,
            polls,
            notification: None,
        }
    }
}
