//! RTC CCFB - RTP Congestion Control Feedback (RFC 8888) for the receive side.
//!
//! This crate tracks which RTP packets arrived from each media source, when,
//! and with which ECN marking, and periodically turns that state into
//! congestion control feedback reports for the sender's congestion controller.
//! Encoding a [`FeedbackReport`] into an RTCP packet is left to the RTCP layer.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Recorder`] | Per media source arrival logs, builds one [`FeedbackReport`] on demand |
//! | [`CcfbReceiver`] | Sans-IO driver: records [`TaggedArrival`]s and emits [`TaggedReport`]s on a timer |
//! | [`ReportLoop`] | Tokio task building reports from a shared recorder and handing them to a [`ReportWriter`] |
//!
//! # Reporting model
//!
//! Every report covers, per media source, the contiguous sequence range from
//! the oldest arrival not yet retired to the highest sequence number seen:
//!
//! ```text
//!   retired          reported window
//! ──────────┬───────────────────────────────┐
//!  0 1 2 3  │ 4 5 _ 7 8 _ _ 11              │
//! ──────────┴───────────────────────────────┘
//!           ^ begin_sequence         highest ^
//! ```
//!
//! An arrival is retired once it is older than the retirement delay (one
//! second by default) and every earlier sequence number is either retired or
//! was received. A gap is never retired, so a late packet still shows up as
//! received in a later report. Each received slot carries its arrival time as
//! an offset in 1/1024 second units before the report time; see
//! [`arrival_time_offset`].
//!
//! # Quick Start
//!
//! ```ignore
//! use rtc_ccfb::{FnWriter, Recorder, ReportLoopBuilder};
//! use std::sync::{Arc, Mutex};
//! use std::time::{Duration, Instant};
//!
//! let recorder = Arc::new(Mutex::new(Recorder::new()));
//! let mut report_loop = ReportLoopBuilder::new()
//!     .with_interval(Duration::from_millis(50))
//!     .spawn(recorder.clone(), FnWriter(|report| {
//!         // serialize and send the RTCP packet
//!         Ok(())
//!     }));
//!
//! // on every received RTP packet
//! recorder.lock()?.record_arrival(ssrc, sequence_number, Instant::now(), ecn)?;
//!
//! report_loop.close().await?;
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

use shared::TransportMessage;

mod receiver;
mod recorder;
mod report;
mod report_loop;

pub use receiver::{CcfbReceiver, CcfbReceiverBuilder};
pub use recorder::{Recorder, RecorderBuilder};
pub use report::{
    ATO_MAX, ATO_OVERRANGE, ATO_UNAVAILABLE, FeedbackReport, MetricBlock, ReportBlock,
    arrival_time_offset,
};
pub use report_loop::{FnWriter, ReportLoop, ReportLoopBuilder, ReportWriter};

/// An RTP packet as far as feedback is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// SSRC of the media source.
    pub ssrc: u32,
    pub sequence_number: u16,
}

/// An arrival with the time it was received and its transport metadata,
/// including the ECN marking.
pub type TaggedArrival = TransportMessage<Arrival>;

/// A feedback report ready to be sent.
pub type TaggedReport = TransportMessage<FeedbackReport>;
