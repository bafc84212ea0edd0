//! Report distribution: latest-report cell, next-report signal and the
//! subscriber fan-out.
//!
//! The ingest side never blocks the reader task. The latest/next pair rides
//! a `watch` channel; subscribers each get a bounded `broadcast` queue whose
//! ring buffer implements the drop-oldest policy. All senders live in the
//! reader task, so the moment it exits every waiter observes the closure.

use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::error::{Error, Result};
use crate::report::Report;

/// Ingest half, owned by the reader task.
pub(crate) struct ReportSink {
    latest: watch::Sender<Option<Report>>,
    fanout: broadcast::Sender<Report>,
}

impl ReportSink {
    pub(crate) fn publish(&self, report: Report) {
        self.latest.send_replace(Some(report.clone()));
        // Err just means nobody is subscribed right now.
        let _ = self.fanout.send(report);
    }
}

/// Consumer half, kept by the session.
pub(crate) struct ReportTaps {
    latest: watch::Receiver<Option<Report>>,
    fanout: broadcast::Receiver<Report>,
}

impl ReportTaps {
    /// The most recent report, if any arrived yet. Still readable after the
    /// session has ended.
    pub(crate) fn last(&self) -> Option<Report> {
        self.latest.borrow().clone()
    }

    /// Whether the ingest side is gone.
    pub(crate) fn is_closed(&self) -> bool {
        self.latest.has_changed().is_err()
    }

    /// Wait for the next report published after this call.
    pub(crate) async fn next(&self) -> Result<Report> {
        let mut rx = self.latest.clone();
        // Whatever is in the cell now has been "seen"; only a fresh publish
        // may complete the wait.
        rx.borrow_and_update();
        rx.changed().await.map_err(|_| Error::Disconnected)?;
        let report = rx.borrow_and_update().clone();
        report.ok_or(Error::Disconnected)
    }

    pub(crate) fn subscribe(&self) -> ReportSubscription {
        ReportSubscription {
            rx: self.fanout.resubscribe(),
        }
    }
}

pub(crate) fn report_channel(queue_size: usize) -> (ReportSink, ReportTaps) {
    let (latest_tx, latest_rx) = watch::channel(None);
    let (fanout_tx, fanout_rx) = broadcast::channel(queue_size.max(1));
    (
        ReportSink {
            latest: latest_tx,
            fanout: fanout_tx,
        },
        ReportTaps {
            latest: latest_rx,
            fanout: fanout_rx,
        },
    )
}

/// A subscription handed out by [`LD2410::subscribe`](crate::LD2410::subscribe).
///
/// Delivery starts with the first report that arrives after the
/// subscription was created. The queue is bounded; when a consumer falls
/// behind, the oldest entries are dropped and `recv` resumes with the
/// oldest report still buffered. Dropping the subscription unsubscribes.
pub struct ReportSubscription {
    rx: broadcast::Receiver<Report>,
}

impl ReportSubscription {
    /// The next report, or `None` once the session has ended and the queue
    /// has drained.
    pub async fn recv(&mut self) -> Option<Report> {
        loop {
            match self.rx.recv().await {
                Ok(report) => return Some(report),
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    warn!(dropped, "report subscriber lagged, oldest reports dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
