use std::ops::Add;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Offset in seconds between the NTP epoch (1900) and the unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 0x83AA7E80;

/// Pairs a monotonic [`Instant`] with the wall-clock time it was taken at, so
/// monotonic timestamps recorded later can be expressed as NTP wall-clock time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemInstant {
    instant: Instant,
    duration_since_unix_epoch: Duration,
}

impl SystemInstant {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            duration_since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_secs(0)),
        }
    }

    /// Anchor `instant` at a known wall-clock time.
    pub fn new(instant: Instant, duration_since_unix_epoch: Duration) -> Self {
        Self {
            instant,
            duration_since_unix_epoch,
        }
    }

    pub fn duration_since_unix_epoch(&self) -> Duration {
        self.duration_since_unix_epoch
    }

    /// Wall-clock time of `now`. Instants before the anchor saturate to it.
    pub fn unix(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.instant)
            .add(self.duration_since_unix_epoch)
    }

    /// 64-bit NTP timestamp of `now`.
    pub fn ntp(&self, now: Instant) -> u64 {
        SystemInstant::unix2ntp(self.unix(now))
    }

    /// 32-bit NTP short format of `now`, see [`ntp_short`].
    pub fn ntp_short(&self, now: Instant) -> u32 {
        ntp_short(self.ntp(now))
    }

    pub fn unix2ntp(duration_since_unix_epoch: Duration) -> u64 {
        let u = duration_since_unix_epoch.as_nanos() as u64;

        let mut s = u / 1_000_000_000;
        s += NTP_UNIX_OFFSET_SECS;
        let mut f = u % 1_000_000_000;
        f <<= 32;
        f /= 1_000_000_000;
        s <<= 32;

        s | f
    }
}

/// Middle 32 bits of a 64-bit NTP timestamp: the low 16 bits of the integer
/// seconds followed by the high 16 bits of the fraction (units of 1/65536 s).
///
/// This is the "NTP short format" of RFC 5905 §6, used for the report
/// timestamp of RFC 8888 feedback and the LSR field of RFC 3550 reports.
pub fn ntp_short(ntp: u64) -> u32 {
    (ntp >> 16) as u32
}
