//! Report loop - a tokio task that periodically builds feedback reports from a
//! shared [`Recorder`] and hands them to a [`ReportWriter`].

use crate::receiver::{DEFAULT_INTERVAL, MAX_INTERVAL, MIN_INTERVAL};
use crate::recorder::Recorder;
use crate::report::FeedbackReport;
use log::{debug, error, trace};
use shared::error::{Error, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Destination of the reports built by a [`ReportLoop`].
///
/// `write_report` is called from the loop task outside the recorder lock. It
/// should not block for long: ticks are skipped while it runs.
pub trait ReportWriter: Send + 'static {
    fn write_report(&mut self, report: FeedbackReport) -> Result<()>;
}

/// Adapts a closure into a [`ReportWriter`].
///
/// ```ignore
/// let writer = FnWriter(|report: FeedbackReport| {
///     println!("{} blocks", report.report_blocks.len());
///     Ok(())
/// });
/// ```
pub struct FnWriter<F>(pub F);

impl<F> ReportWriter for FnWriter<F>
where
    F: FnMut(FeedbackReport) -> Result<()> + Send + 'static,
{
    fn write_report(&mut self, report: FeedbackReport) -> Result<()> {
        (self.0)(report)
    }
}

impl ReportWriter for mpsc::Sender<FeedbackReport> {
    fn write_report(&mut self, report: FeedbackReport) -> Result<()> {
        self.try_send(report).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::ErrWriterFull,
            mpsc::error::TrySendError::Closed(_) => Error::ErrWriterClosed,
        })
    }
}

impl ReportWriter for mpsc::UnboundedSender<FeedbackReport> {
    fn write_report(&mut self, report: FeedbackReport) -> Result<()> {
        self.send(report).map_err(|_| Error::ErrWriterClosed)
    }
}

/// Builder for the [`ReportLoop`].
#[derive(Debug, Clone)]
pub struct ReportLoopBuilder {
    interval: Duration,
    empty_reports: bool,
}

impl Default for ReportLoopBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            empty_reports: false,
        }
    }
}

impl ReportLoopBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interval between feedback reports, clamped to between one
    /// millisecond and one hour.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        self
    }

    /// Also write reports that contain no media source.
    pub fn with_empty_reports(mut self, empty_reports: bool) -> Self {
        self.empty_reports = empty_reports;
        self
    }

    /// Start the loop on the current tokio runtime.
    ///
    /// The first report is built one interval from now. Arrivals keep being
    /// recorded through the same `recorder` handle while the loop runs.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn spawn<W>(self, recorder: Arc<Mutex<Recorder>>, writer: W) -> ReportLoop
    where
        W: ReportWriter,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            recorder,
            writer,
            self.interval,
            self.empty_reports,
            stop_rx,
        ));

        ReportLoop {
            stop_tx,
            task: Some(task),
        }
    }
}

/// Handle of a running report loop.
///
/// Dropping the handle asks the loop to stop without waiting for it; use
/// [`close`](ReportLoop::close) to know when the last report has been
/// written.
pub struct ReportLoop {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ReportLoop {
    /// Whether [`close`](ReportLoop::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop the loop and wait for a report that is being built or written to
    /// finish. No report is built after this returns. Closing a closed loop
    /// does nothing.
    pub async fn close(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.stop_tx.send_replace(true);
        task.await.map_err(|err| Error::ErrTaskJoin(err.to_string()))
    }
}

impl Drop for ReportLoop {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

async fn run<W: ReportWriter>(
    recorder: Arc<Mutex<Recorder>>,
    mut writer: W,
    interval: Duration,
    empty_reports: bool,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // also fires when the handle is gone
            _ = stop_rx.changed() => break,
            tick = ticker.tick() => {
                if *stop_rx.borrow() {
                    break;
                }

                let report = match recorder.lock() {
                    Ok(mut recorder) => recorder.build_report(tick.into_std()),
                    Err(err) => {
                        error!("ccfb report loop: recorder lock poisoned: {err}");
                        break;
                    }
                };

                if report.is_empty() && !empty_reports {
                    trace!("ccfb report loop: skipping empty report");
                    continue;
                }

                if let Err(err) = writer.write_report(report) {
                    error!("ccfb report loop: failed to write report: {err}");
                }
            }
        }
    }

    debug!("ccfb report loop: stopped");
}
