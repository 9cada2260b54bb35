//! CCFB Receiver - sans-IO driver that records arrivals and emits feedback
//! reports on a fixed interval.

use crate::recorder::{Recorder, RecorderBuilder};
use crate::{Arrival, TaggedArrival, TaggedReport};
use log::trace;
use shared::error::Error;
use shared::{EcnCodepoint, TransportContext};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default interval between feedback reports.
pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_millis(20);
/// Bounds every configured report interval is clamped to.
pub(crate) const MIN_INTERVAL: Duration = Duration::from_millis(1);
pub(crate) const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Builder for the [`CcfbReceiver`].
///
/// # Example
///
/// ```ignore
/// use rtc_ccfb::{CcfbReceiverBuilder, RecorderBuilder};
/// use std::time::Duration;
///
/// let receiver = CcfbReceiverBuilder::new()
///     .with_interval(Duration::from_millis(50))
///     .with_recorder(RecorderBuilder::new().with_sender_ssrc(0xCAFE))
///     .build();
/// ```
pub struct CcfbReceiverBuilder {
    /// Interval between feedback reports.
    interval: Duration,
    recorder: RecorderBuilder,
    empty_reports: bool,
}

impl Default for CcfbReceiverBuilder {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            recorder: RecorderBuilder::default(),
            empty_reports: false,
        }
    }
}

impl CcfbReceiverBuilder {
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

    /// Configure the recorder that tracks arrivals.
    pub fn with_recorder(mut self, recorder: RecorderBuilder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Also emit reports that contain no media source.
    ///
    /// The report timer then starts with the first timeout instead of waiting
    /// for the first arrival.
    pub fn with_empty_reports(mut self, empty_reports: bool) -> Self {
        self.empty_reports = empty_reports;
        self
    }

    pub fn build(self) -> CcfbReceiver {
        CcfbReceiver {
            interval: self.interval,
            empty_reports: self.empty_reports,
            recorder: self.recorder.build(),
            read_queue: VecDeque::new(),
            write_queue: VecDeque::new(),
            next_timeout: None,
            closed: false,
        }
    }
}

/// Records incoming RTP arrivals and periodically generates congestion control
/// feedback, without doing any I/O itself.
///
/// Arrivals are fed in through `handle_read` and passed on unchanged through
/// `poll_read`. The report timer starts with the first arrival; every
/// `handle_timeout` at or past `poll_timeout` builds one report, which is
/// queued for `poll_write`. Arrival time offsets are measured against the
/// `now` of that timeout. The ECN marking of an arrival is taken from its
/// transport context.
///
/// # Example
///
/// ```ignore
/// use rtc_ccfb::{Arrival, CcfbReceiverBuilder, TaggedArrival};
/// use sansio::Protocol;
/// use std::time::Instant;
///
/// let mut receiver = CcfbReceiverBuilder::new().build();
/// receiver.handle_read(TaggedArrival {
///     now: Instant::now(),
///     transport: Default::default(),
///     message: Arrival { ssrc: 0x1234, sequence_number: 1 },
/// })?;
///
/// if let Some(eto) = receiver.poll_timeout() {
///     receiver.handle_timeout(eto)?;
/// }
/// while let Some(report) = receiver.poll_write() {
///     // hand report.message to the RTCP writer
/// }
/// ```
pub struct CcfbReceiver {
    interval: Duration,
    empty_reports: bool,
    recorder: Recorder,

    read_queue: VecDeque<TaggedArrival>,
    write_queue: VecDeque<TaggedReport>,

    /// Next time a report is due.
    next_timeout: Option<Instant>,
    closed: bool,
}

impl CcfbReceiver {
    /// The recorder arrivals are recorded into.
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    fn generate_report(&mut self, now: Instant) {
        let report = self.recorder.build_report_with_reference(now, now);
        if report.is_empty() && !self.empty_reports {
            trace!("ccfb receiver: skipping empty report");
            return;
        }

        self.write_queue.push_back(TaggedReport {
            now,
            transport: TransportContext::default(),
            message: report,
        });
    }
}

impl sansio::Protocol<TaggedArrival, (), ()> for CcfbReceiver {
    type Rout = TaggedArrival;
    type Wout = TaggedReport;
    type Eout = ();
    type Error = Error;
    type Time = Instant;

    fn handle_read(&mut self, msg: TaggedArrival) -> Result<(), Self::Error> {
        if self.closed {
            return Err(Error::ErrAlreadyClosed);
        }

        let Arrival {
            ssrc,
            sequence_number,
        } = msg.message;
        self.recorder.record_arrival(
            ssrc,
            sequence_number,
            msg.now,
            EcnCodepoint::to_bits(msg.transport.ecn),
        )?;

        if self.next_timeout.is_none() {
            self.next_timeout = Some(msg.now + self.interval);
        }

        self.read_queue.push_back(msg);
        Ok(())
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_queue.pop_front()
    }

    fn handle_write(&mut self, _msg: ()) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_queue.pop_front()
    }

    fn handle_event(&mut self, _evt: ()) -> Result<(), Self::Error> {
        Ok(())
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        None
    }

    fn handle_timeout(&mut self, now: Self::Time) -> Result<(), Self::Error> {
        match self.next_timeout {
            Some(timeout) if now >= timeout => {
                self.generate_report(now);
                self.next_timeout = Some(now + self.interval);
            }
            None if self.empty_reports && !self.closed => {
                self.next_timeout = Some(now + self.interval);
            }
            _ => {}
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        self.next_timeout
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        self.closed = true;
        self.next_timeout = None;
        self.read_queue.clear();
        self.write_queue.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sansio::Protocol;

    fn arrival(now: Instant, ssrc: u32, sequence_number: u16) -> TaggedArrival {
        TaggedArrival {
            now,
            transport: TransportContext::default(),
            message: Arrival {
                ssrc,
                sequence_number,
            },
        }
    }

    #[test]
    fn test_ccfb_receiver_builder_defaults() {
        let receiver = CcfbReceiverBuilder::default().build();

        assert_eq!(receiver.interval, DEFAULT_INTERVAL);
        assert!(!receiver.empty_reports);
        assert!(receiver.next_timeout.is_none());
        assert_eq!(receiver.recorder().num_streams(), 0);
    }

    #[test]
    fn test_ccfb_receiver_builder_custom() {
        let receiver = CcfbReceiverBuilder::new()
            .with_interval(Duration::from_millis(50))
            .with_recorder(RecorderBuilder::new().with_sender_ssrc(77))
            .with_empty_reports(true)
            .build();

        assert_eq!(receiver.interval, Duration::from_millis(50));
        assert!(receiver.empty_reports);
        assert_eq!(receiver.recorder().sender_ssrc(), 77);
    }

    #[test]
    fn test_ccfb_receiver_interval_is_clamped() {
        let now = Instant::now();

        for (interval, want) in [
            (Duration::ZERO, MIN_INTERVAL),
            (Duration::MAX, MAX_INTERVAL),
            (Duration::from_millis(250), Duration::from_millis(250)),
        ] {
            let mut receiver = CcfbReceiverBuilder::new().with_interval(interval).build();
            assert_eq!(receiver.interval, want);

            receiver.handle_read(arrival(now, 1, 0)).unwrap();
            let eto = receiver.poll_timeout().unwrap();
            assert_eq!(eto, now + want);
            receiver.handle_timeout(eto).unwrap();
            assert!(receiver.poll_write().is_some());
            assert!(receiver.poll_timeout().unwrap() > eto);
        }
    }

    #[test]
    fn test_ccfb_receiver_records_and_forwards() {
        let mut receiver = CcfbReceiverBuilder::new().build();
        let now = Instant::now();

        receiver.handle_read(arrival(now, 12345, 1)).unwrap();

        assert_eq!(receiver.recorder().num_streams(), 1);
        assert_eq!(receiver.poll_timeout(), Some(now + DEFAULT_INTERVAL));

        let forwarded = receiver.poll_read().unwrap();
        assert_eq!(forwarded.message.ssrc, 12345);
        assert_eq!(forwarded.message.sequence_number, 1);
        assert!(receiver.poll_read().is_none());
    }

    #[test]
    fn test_ccfb_receiver_no_timeout_before_first_arrival() {
        let mut receiver = CcfbReceiverBuilder::new().build();

        assert!(receiver.poll_timeout().is_none());
        receiver.handle_timeout(Instant::now()).unwrap();
        assert!(receiver.poll_timeout().is_none());
        assert!(receiver.poll_write().is_none());
    }

    #[test]
    fn test_ccfb_receiver_empty_reports() {
        let mut receiver = CcfbReceiverBuilder::new().with_empty_reports(true).build();
        let now = Instant::now();

        receiver.handle_timeout(now).unwrap();
        assert_eq!(receiver.poll_timeout(), Some(now + DEFAULT_INTERVAL));
        assert!(receiver.poll_write().is_none());

        receiver.handle_timeout(now + DEFAULT_INTERVAL).unwrap();
        let tagged = receiver.poll_write().unwrap();
        assert!(tagged.message.is_empty());
        assert_eq!(
            tagged.message.sender_ssrc,
            receiver.recorder().sender_ssrc()
        );
    }

    #[test]
    fn test_ccfb_receiver_generates_report_on_timeout() {
        let mut receiver = CcfbReceiverBuilder::new()
            .with_interval(Duration::from_millis(100))
            .build();
        let start = Instant::now();

        for i in 0..5u16 {
            receiver
                .handle_read(arrival(start + Duration::from_millis(i as u64 * 10), 12345, i))
                .unwrap();
        }

        // not due yet
        receiver
            .handle_timeout(start + Duration::from_millis(50))
            .unwrap();
        assert!(receiver.poll_write().is_none());

        let timeout_time = start + Duration::from_millis(150);
        receiver.handle_timeout(timeout_time).unwrap();
        assert_eq!(
            receiver.poll_timeout(),
            Some(timeout_time + Duration::from_millis(100))
        );

        let tagged = receiver.poll_write().unwrap();
        assert_eq!(tagged.now, timeout_time);
        let report = tagged.message;
        assert_eq!(report.report_blocks.len(), 1);
        assert_eq!(report.report_blocks[0].media_ssrc, 12345);
        assert_eq!(report.report_blocks[0].begin_sequence, 0);
        assert_eq!(report.report_blocks[0].metric_blocks.len(), 5);
        assert!(report.report_blocks[0].metric_blocks.iter().all(|m| m.received));
        let offsets: Vec<u16> = report.report_blocks[0]
            .metric_blocks
            .iter()
            .map(|m| m.arrival_time_offset)
            .collect();
        assert_eq!(offsets, vec![153, 143, 133, 122, 112]);
        assert!(receiver.poll_write().is_none());
    }

    #[test]
    fn test_ccfb_receiver_ecn_from_transport() {
        let mut receiver = CcfbReceiverBuilder::new().build();
        let now = Instant::now();

        let mut pkt = arrival(now, 1, 0);
        pkt.transport.ecn = Some(EcnCodepoint::Ce);
        receiver.handle_read(pkt).unwrap();
        let mut pkt = arrival(now, 1, 1);
        pkt.transport.ecn = Some(EcnCodepoint::Ect1);
        receiver.handle_read(pkt).unwrap();
        receiver.handle_read(arrival(now, 1, 2)).unwrap();

        receiver.handle_timeout(now + DEFAULT_INTERVAL).unwrap();
        let report = receiver.poll_write().unwrap().message;
        let ecn: Vec<u8> = report.report_blocks[0]
            .metric_blocks
            .iter()
            .map(|m| m.ecn)
            .collect();
        assert_eq!(ecn, vec![0b11, 0b01, 0b00]);
    }

    #[test]
    fn test_ccfb_receiver_close() {
        let mut receiver = CcfbReceiverBuilder::new().build();
        let now = Instant::now();

        receiver.handle_read(arrival(now, 1, 0)).unwrap();
        receiver.close().unwrap();

        assert!(receiver.poll_timeout().is_none());
        assert!(receiver.poll_read().is_none());
        receiver.handle_timeout(now + Duration::from_secs(1)).unwrap();
        assert!(receiver.poll_write().is_none());
        assert!(receiver.poll_timeout().is_none());
        assert_eq!(
            receiver.handle_read(arrival(now, 1, 1)).err(),
            Some(Error::ErrAlreadyClosed)
        );

        // closing again is harmless
        receiver.close().unwrap();
    }
}
