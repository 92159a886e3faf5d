//! Background report worker
//!
//! The capture loop hands reports over with a non-blocking `try_send`; a
//! tokio task posts them one at a time. A full queue drops the new report.

use metrics::counter;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{CloudClient, FocusReport};

/// Destination for periodic reports, called from the synchronous loop
pub trait ReportSink: Send {
    /// Hand over a report without blocking. `false` when it was dropped.
    fn submit(&mut self, report: FocusReport) -> bool;
}

/// Producer side of the report queue
#[derive(Debug, Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<FocusReport>,
}

/// Bounded report queue
pub fn channel(capacity: usize) -> (ReportQueue, mpsc::Receiver<FocusReport>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ReportQueue { tx }, rx)
}

impl ReportSink for ReportQueue {
    fn submit(&mut self, report: FocusReport) -> bool {
        match self.tx.try_send(report) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(report)) => {
                warn!(status = %report.status, "Report queue full, dropping report");
                counter!("focus_reports_dropped_total").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Report worker stopped, dropping report");
                counter!("focus_reports_dropped_total").increment(1);
                false
            }
        }
    }
}

/// What the worker did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub sent: u64,
    pub failed: u64,
    pub stale: u64,
}

/// Consumer task posting queued reports
pub struct ReportWorker {
    handle: JoinHandle<WorkerStats>,
}

impl ReportWorker {
    /// Spawn onto the current tokio runtime
    pub fn spawn(
        client: CloudClient,
        rx: mpsc::Receiver<FocusReport>,
        max_age: Duration,
    ) -> Self {
        Self {
            handle: tokio::spawn(run(client, rx, max_age)),
        }
    }

    /// Wait for the queue to drain once every [`ReportQueue`] is dropped.
    /// Gives up (and aborts the task) after `grace`.
    pub async fn finish(self, grace: Duration) -> Option<WorkerStats> {
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(grace, self.handle).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                warn!("Report worker ended abnormally: {}", e);
                None
            }
            Err(_) => {
                warn!("Report worker did not flush within {:?}, abandoning", grace);
                abort.abort();
                None
            }
        }
    }
}

async fn run(
    client: CloudClient,
    mut rx: mpsc::Receiver<FocusReport>,
    max_age: Duration,
) -> WorkerStats {
    let mut stats = WorkerStats::default();

    while let Some(report) = rx.recv().await {
        let age = report.created.elapsed();
        if age > max_age {
            warn!(age_secs = age.as_secs(), "Discarding stale report");
            counter!("focus_reports_total", "outcome" => "stale").increment(1);
            stats.stale += 1;
            continue;
        }

        match client.send(&report).await {
            Ok(()) => {
                info!(
                    status = %report.status,
                    emotion = %report.emotion_detected,
                    "Report accepted"
                );
                counter!("focus_reports_total", "outcome" => "accepted").increment(1);
                stats.sent += 1;
            }
            Err(e) => {
                warn!(status = %report.status, error = %e, "Report failed");
                counter!("focus_reports_total", "outcome" => e.outcome()).increment(1);
                stats.failed += 1;
            }
        }
    }

    info!(
        sent = stats.sent,
        failed = stats.failed,
        stale = stats.stale,
        "Report worker stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub::serve;
    use crate::CloudConfig;
    use axum::http::StatusCode;
    use focus_monitor::{EmotionLabel, FocusStatus};
    use std::time::Instant;

    fn report(status: FocusStatus) -> FocusReport {
        FocusReport::new(status, EmotionLabel::NoRoi, None, None)
    }

    fn client(url: String) -> CloudClient {
        CloudClient::new(CloudConfig {
            api_url: url,
            timeout_ms: 500,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_worker_posts_and_flushes_on_close() {
        let (url, seen) = serve(StatusCode::CREATED, Duration::ZERO).await;
        let (mut queue, rx) = channel(4);
        let worker = ReportWorker::spawn(client(url), rx, Duration::from_secs(60));

        assert!(queue.submit(report(FocusStatus::Focused)));
        assert!(queue.submit(report(FocusStatus::Drowsy)));
        drop(queue);

        let stats = worker.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats, WorkerStats { sent: 2, failed: 0, stale: 0 });

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1["status"], "FOCUSED");
        assert_eq!(seen[1].1["status"], "DROWSY");
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let (url, _) = serve(StatusCode::FORBIDDEN, Duration::ZERO).await;
        let (mut queue, rx) = channel(4);
        let worker = ReportWorker::spawn(client(url), rx, Duration::from_secs(60));

        queue.submit(report(FocusStatus::Focused));
        queue.submit(report(FocusStatus::Focused));
        drop(queue);

        let stats = worker.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (mut queue, _rx) = channel(1);
        assert!(queue.submit(report(FocusStatus::Focused)));
        assert!(!queue.submit(report(FocusStatus::Distracted)));
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (mut queue, rx) = channel(1);
        drop(rx);
        assert!(!queue.submit(report(FocusStatus::Focused)));
    }

    #[tokio::test]
    async fn test_stale_reports_are_discarded() {
        let (url, seen) = serve(StatusCode::CREATED, Duration::ZERO).await;
        let (mut queue, rx) = channel(4);
        let worker = ReportWorker::spawn(client(url), rx, Duration::from_secs(30));

        let mut old = report(FocusStatus::Focused);
        old.created = Instant::now() - Duration::from_secs(60);
        queue.submit(old);
        queue.submit(report(FocusStatus::NoFace));
        drop(queue);

        let stats = worker.finish(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats, WorkerStats { sent: 1, failed: 0, stale: 1 });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_gives_up_after_grace() {
        let (url, _) = serve(StatusCode::CREATED, Duration::from_secs(5)).await;
        let config = CloudConfig {
            api_url: url,
            timeout_ms: 10_000,
            ..Default::default()
        };
        let (mut queue, rx) = channel(4);
        let worker = ReportWorker::spawn(CloudClient::new(config).unwrap(), rx, Duration::from_secs(60));
        queue.submit(report(FocusStatus::Focused));
        drop(queue);

        let started = Instant::now();
        assert_eq!(worker.finish(Duration::from_millis(200)).await, None);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
