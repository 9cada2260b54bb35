//! CCFB Recorder - tracks packet arrivals per media source and builds feedback
//! reports.

mod sequence_unwrapper;
pub(crate) mod stream_log;

use crate::report::{FeedbackReport, ReportBlock};
use log::debug;
use shared::error::{Error, Result};
use shared::time::SystemInstant;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use stream_log::StreamLog;

/// Default time an arrival stays reportable before it may be retired.
pub(crate) const DEFAULT_RETIRE_AFTER: Duration = Duration::from_secs(1);

/// Default cap on the number of sequence numbers reported per media source,
/// the largest report block RFC 8888 allows.
pub(crate) const DEFAULT_MAX_WINDOW: usize = 1 << 14;

/// Builder for the [`Recorder`].
///
/// # Example
///
/// ```ignore
/// use rtc_ccfb::RecorderBuilder;
/// use std::time::Duration;
///
/// let recorder = RecorderBuilder::new()
///     .with_sender_ssrc(0x1234_5678)
///     .with_retire_after(Duration::from_millis(500))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RecorderBuilder {
    sender_ssrc: Option<u32>,
    retire_after: Duration,
    max_window: usize,
}

impl Default for RecorderBuilder {
    fn default() -> Self {
        Self {
            sender_ssrc: None,
            retire_after: DEFAULT_RETIRE_AFTER,
            max_window: DEFAULT_MAX_WINDOW,
        }
    }
}

impl RecorderBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SSRC reports are sent from. A random SSRC is used otherwise.
    pub fn with_sender_ssrc(mut self, sender_ssrc: u32) -> Self {
        self.sender_ssrc = Some(sender_ssrc);
        self
    }

    /// Set how long an arrival keeps being reported before it is retired.
    ///
    /// A missing sequence number is never retired, so this is also the minimum
    /// time a late packet has to show up before it would be reported lost.
    pub fn with_retire_after(mut self, retire_after: Duration) -> Self {
        self.retire_after = retire_after;
        self
    }

    /// Set the maximum number of sequence numbers reported per media source.
    ///
    /// `usize::MAX` leaves the window uncapped; zero is treated as one.
    pub fn with_max_window(mut self, max_window: usize) -> Self {
        self.max_window = max_window;
        self
    }

    pub fn build(self) -> Recorder {
        Recorder {
            sender_ssrc: self.sender_ssrc.unwrap_or_else(rand::random),
            retire_after: self.retire_after,
            max_window: self.max_window,
            clock: SystemInstant::now(),
            streams: Vec::new(),
            stream_index: HashMap::new(),
        }
    }
}

/// Records incoming RTP packets per media source and builds congestion
/// control feedback reports as specified in
/// <https://datatracker.ietf.org/doc/html/rfc8888>.
///
/// The recorder itself is not synchronized. When arrivals are recorded from
/// several threads while a [`ReportLoop`](crate::ReportLoop) builds reports,
/// share it behind one `Arc<Mutex<Recorder>>`.
pub struct Recorder {
    sender_ssrc: u32,
    retire_after: Duration,
    max_window: usize,
    /// Maps monotonic report times to NTP wall-clock time.
    clock: SystemInstant,
    /// Logs in the order their media source was first seen.
    streams: Vec<(u32, StreamLog)>,
    stream_index: HashMap<u32, usize>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    /// Create a new Recorder with default settings.
    pub fn new() -> Self {
        RecorderBuilder::new().build()
    }

    /// The SSRC reports are sent from.
    pub fn sender_ssrc(&self) -> u32 {
        self.sender_ssrc
    }

    /// Number of media sources seen so far.
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Record that a packet with `sequence_number` from `media_ssrc` arrived at
    /// `arrival_time` carrying the two-bit `ecn` marking.
    ///
    /// The first packet of an unknown media source starts tracking it. An
    /// `ecn` wider than two bits is rejected without touching any state.
    pub fn record_arrival(
        &mut self,
        media_ssrc: u32,
        sequence_number: u16,
        arrival_time: Instant,
        ecn: u8,
    ) -> Result<()> {
        if ecn > 0b11 {
            return Err(Error::ErrInvalidEcn(ecn));
        }

        let index = match self.stream_index.get(&media_ssrc) {
            Some(&index) => index,
            None => {
                debug!("ccfb recorder: tracking media ssrc {media_ssrc}");
                let index = self.streams.len();
                self.streams.push((media_ssrc, StreamLog::new(self.max_window)));
                self.stream_index.insert(media_ssrc, index);
                index
            }
        };

        self.streams[index]
            .1
            .record_arrival(sequence_number, arrival_time, ecn);
        Ok(())
    }

    /// Build a feedback report for every media source seen so far.
    ///
    /// Arrivals recorded more than the retirement delay before `now` are
    /// retired first. Arrival time offsets are measured against the moment the
    /// report is generated.
    pub fn build_report(&mut self, now: Instant) -> FeedbackReport {
        self.build_report_with_reference(now, Instant::now())
    }

    /// Like [`build_report`](Recorder::build_report), measuring every arrival
    /// time offset against `reference` instead of the current time.
    pub fn build_report_with_reference(
        &mut self,
        now: Instant,
        reference: Instant,
    ) -> FeedbackReport {
        // close to the monotonic clock origin nothing can be old enough yet
        let deadline = now.checked_sub(self.retire_after);

        let report_blocks = self
            .streams
            .iter_mut()
            .map(|(media_ssrc, log)| {
                let (begin_sequence, metric_blocks) = match deadline {
                    Some(deadline) => log.build_metrics(deadline, reference),
                    None => log.metrics(reference),
                };
                ReportBlock {
                    media_ssrc: *media_ssrc,
                    begin_sequence,
                    metric_blocks,
                }
            })
            .collect();

        FeedbackReport {
            sender_ssrc: self.sender_ssrc,
            report_blocks,
            report_timestamp: self.clock.ntp_short(reference),
        }
    }

    pub(crate) fn set_clock(&mut self, clock: SystemInstant) {
        self.clock = clock;
    }
}
