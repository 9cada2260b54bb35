//! Per media source log of packet arrivals awaiting feedback.

use super::sequence_unwrapper::SequenceUnwrapper;
use crate::report::{MetricBlock, arrival_time_offset};
use log::{debug, trace};
use std::collections::BTreeMap;
use std::time::Instant;

/// Arrival record of a single received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PacketArrival {
    pub(crate) arrival_time: Instant,
    pub(crate) ecn: u8,
}

/// Tracks the sequence numbers of one media source that still have to be
/// reported.
///
/// The pending window spans `[next_pending_sequence, highest_sequence]` in
/// unwrapped sequence space. Entries leave the window from the front once they
/// are older than the retirement deadline, so every sequence number is reported
/// until it has been stable for the whole reordering tolerance. Missing
/// sequence numbers inside the window are reported as not received.
pub(crate) struct StreamLog {
    sequence: SequenceUnwrapper,
    started: bool,
    /// Set once the front of the window has moved forward; arrivals behind the
    /// window are dropped from then on.
    retired: bool,
    /// First sequence number still to be reported.
    next_pending_sequence: i64,
    /// Highest sequence number received.
    highest_sequence: i64,
    pending: BTreeMap<i64, PacketArrival>,
    max_window: i64,
}

impl StreamLog {
    pub(crate) fn new(max_window: usize) -> Self {
        Self {
            sequence: SequenceUnwrapper::new(),
            started: false,
            retired: false,
            next_pending_sequence: 0,
            highest_sequence: -1,
            pending: BTreeMap::new(),
            max_window: i64::try_from(max_window).unwrap_or(i64::MAX).max(1),
        }
    }

    /// Record the arrival of `sequence_number`. A repeated sequence number
    /// replaces the earlier record.
    pub(crate) fn record_arrival(&mut self, sequence_number: u16, arrival_time: Instant, ecn: u8) {
        let seq = self.sequence.nearest(sequence_number);

        if !self.started {
            self.started = true;
            self.next_pending_sequence = seq;
            self.highest_sequence = seq;
        } else if seq < self.next_pending_sequence {
            if self.retired || self.highest_sequence - seq >= self.max_window {
                trace!(
                    "dropping late arrival {} behind pending window [{}, {}]",
                    seq, self.next_pending_sequence, self.highest_sequence
                );
                return;
            }
            self.next_pending_sequence = seq;
        }

        self.sequence.update(seq);
        self.pending.insert(seq, PacketArrival { arrival_time, ecn });

        if seq > self.highest_sequence {
            self.highest_sequence = seq;
            self.limit_window();
        }
    }

    fn limit_window(&mut self) {
        let first_allowed = self.highest_sequence.saturating_sub(self.max_window) + 1;
        if self.next_pending_sequence >= first_allowed {
            return;
        }

        debug!(
            "pending window [{}, {}] exceeds {} sequence numbers, skipping to {}",
            self.next_pending_sequence, self.highest_sequence, self.max_window, first_allowed
        );
        self.pending = self.pending.split_off(&first_allowed);
        self.next_pending_sequence = first_allowed;
        self.retired = true;
    }

    /// Retire the entries at the front of the window that arrived before
    /// `deadline`, then describe what remains relative to `reference`.
    ///
    /// Retirement stops at the first missing sequence number, so a lost packet
    /// keeps being reported as not received.
    pub(crate) fn build_metrics(
        &mut self,
        deadline: Instant,
        reference: Instant,
    ) -> (u16, Vec<MetricBlock>) {
        self.retire(deadline);
        self.metrics(reference)
    }

    pub(crate) fn retire(&mut self, deadline: Instant) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.next_pending_sequence || entry.get().arrival_time >= deadline {
                break;
            }
            entry.remove();
            self.next_pending_sequence += 1;
            self.retired = true;
        }
    }

    /// Metric blocks for the whole pending window, without retiring anything.
    pub(crate) fn metrics(&self, reference: Instant) -> (u16, Vec<MetricBlock>) {
        let metric_blocks = (self.next_pending_sequence..=self.highest_sequence)
            .map(|seq| match self.pending.get(&seq) {
                Some(arrival) => MetricBlock {
                    received: true,
                    ecn: arrival.ecn,
                    arrival_time_offset: arrival_time_offset(reference, arrival.arrival_time),
                },
                None => MetricBlock::default(),
            })
            .collect();

        (self.next_pending_sequence as u16, metric_blocks)
    }

    pub(crate) fn next_pending_sequence(&self) -> i64 {
        self.next_pending_sequence
    }

    pub(crate) fn highest_sequence(&self) -> i64 {
        self.highest_sequence
    }

    pub(crate) fn pending(&self) -> &BTreeMap<i64, PacketArrival> {
        &self.pending
    }
}
