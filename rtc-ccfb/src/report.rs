//! Congestion control feedback report model.
//!
//! These types mirror the fields of the RFC 8888 RTCP feedback packet
//! (<https://datatracker.ietf.org/doc/html/rfc8888#section-3.1>). Turning them
//! into bytes is left to the RTCP layer that transmits them.

use std::time::Instant;

/// Arrival time offsets count units of 1/1024 second.
const ATO_UNITS_PER_SECOND: u128 = 1024;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Largest arrival time offset that can be reported as a value.
pub const ATO_MAX: u16 = 0x1FFD;
/// Arrival time offset of a packet received too long before the report to be
/// represented.
pub const ATO_OVERRANGE: u16 = 0x1FFE;
/// Arrival time offset of a packet whose arrival time is not available, which
/// includes arrivals stamped after the report reference time.
pub const ATO_UNAVAILABLE: u16 = 0x1FFF;

/// Reception state of a single sequence number.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricBlock {
    /// Whether a packet with this sequence number was received.
    pub received: bool,
    /// Two-bit ECN marking of the received packet, `0` when not received.
    pub ecn: u8,
    /// 13-bit arrival time offset, `0` when not received.
    pub arrival_time_offset: u16,
}

/// Feedback for one media source, covering a contiguous run of sequence
/// numbers starting at `begin_sequence`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportBlock {
    pub media_ssrc: u32,
    pub begin_sequence: u16,
    /// One block per sequence number, ascending from `begin_sequence`.
    pub metric_blocks: Vec<MetricBlock>,
}

impl ReportBlock {
    /// Last sequence number covered by this block, `None` if it covers none.
    pub fn end_sequence(&self) -> Option<u16> {
        let len = self.metric_blocks.len();
        if len == 0 {
            return None;
        }
        Some(self.begin_sequence.wrapping_add((len - 1) as u16))
    }
}

/// One congestion control feedback report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedbackReport {
    /// SSRC of the endpoint sending the feedback.
    pub sender_ssrc: u32,
    /// One block per tracked media source.
    pub report_blocks: Vec<ReportBlock>,
    /// Time the report was generated, in NTP short format (16.16 fixed point,
    /// seconds since 1900 modulo 65536).
    pub report_timestamp: u32,
}

impl FeedbackReport {
    /// A report without any media source.
    pub fn is_empty(&self) -> bool {
        self.report_blocks.is_empty()
    }
}

/// Arrival time offset of a packet that arrived at `arrival`, relative to a
/// report generated at `reference`.
pub fn arrival_time_offset(reference: Instant, arrival: Instant) -> u16 {
    let Some(delta) = reference.checked_duration_since(arrival) else {
        return ATO_UNAVAILABLE;
    };

    let ato = delta.as_nanos() * ATO_UNITS_PER_SECOND / NANOS_PER_SECOND;
    if ato > ATO_MAX as u128 {
        ATO_OVERRANGE
    } else {
        ato as u16
    }
}
