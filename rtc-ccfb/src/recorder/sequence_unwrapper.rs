/// Half of the 16-bit sequence number space.
const SEQUENCE_HALF_RANGE: u16 = 1 << 15;
const SEQUENCE_RANGE: i64 = 1 << 16;

/// Sequence number unwrapper to handle 16-bit wraparound.
///
/// Each 16-bit sequence number is mapped to the 64-bit value closest to the
/// last unwrapped one. Reordering of less than half the sequence space is
/// therefore resolved correctly across a wrap; larger jumps cannot be told
/// apart from reordering in the other direction and are approximated.
#[derive(Debug, Default)]
pub(crate) struct SequenceUnwrapper {
    last_unwrapped: Option<i64>,
}

impl SequenceUnwrapper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The unwrapped value of `seq`, without moving the reference point.
    pub(crate) fn nearest(&self, seq: u16) -> i64 {
        let Some(last) = self.last_unwrapped else {
            return seq as i64;
        };

        let forward = seq.wrapping_sub(last as u16);
        // exactly half the range away resolves forward
        if forward <= SEQUENCE_HALF_RANGE {
            last + forward as i64
        } else {
            last + forward as i64 - SEQUENCE_RANGE
        }
    }

    /// Move the reference point to a value that has been recorded.
    pub(crate) fn update(&mut self, unwrapped: i64) {
        self.last_unwrapped = Some(unwrapped);
    }

    pub(crate) fn unwrap(&mut self, seq: u16) -> i64 {
        let unwrapped = self.nearest(seq);
        self.update(unwrapped);
        unwrapped
    }
}
