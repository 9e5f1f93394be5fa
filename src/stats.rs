// stats.rs - receive counters and per-meter transmission statistics

use crate::*;

/// Meters tracked at most; further strangers on the air are ignored.
pub const MAX_TRACKED_METERS: usize = 16;

/// Pipeline counters. Each [`FrameError`] kind bumps exactly one of them.
///
/// Every frame is seen exactly once and ends up accepted or in one
/// rejection bucket, so `frames_seen == accepted + rejected()` once nothing
/// is left in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverCounters {
    pub frames_seen: u32,
    pub accepted: u32,
    pub framing_errors: u32,
    pub queue_overflows: u32,
    pub id_mismatches: u32,
    pub crc_errors: u32,
    pub crypto_failures: u32,
    pub parse_failures: u32,
}

impl ReceiverCounters {
    pub fn record(&mut self, err: &FrameError) {
        let counter = match err {
            FrameError::CorruptLength { .. }
            | FrameError::BadLength(_)
            | FrameError::Truncated { .. } => &mut self.framing_errors,
            FrameError::QueueOverflow => &mut self.queue_overflows,
            FrameError::IdentityMismatch(_) => &mut self.id_mismatches,
            FrameError::CrcMismatch { .. } => &mut self.crc_errors,
            FrameError::NoCiphertext | FrameError::Crypto(_) => &mut self.crypto_failures,
            FrameError::PayloadTooShort(_) => &mut self.parse_failures,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn record_seen(&mut self) {
        self.frames_seen = self.frames_seen.saturating_add(1);
    }

    pub fn rejected(&self) -> u32 {
        [
            self.framing_errors,
            self.queue_overflows,
            self.id_mismatches,
            self.crc_errors,
            self.crypto_failures,
            self.parse_failures,
        ]
        .iter()
        .fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    pub fn record_accepted(&mut self) {
        self.accepted = self.accepted.saturating_add(1);
    }
}

/// How often, and in which format, one meter has been heard.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmissionStats {
    pub meter_id: MeterIdentity,
    pub packet_count: u32,
    pub total_interval: Duration,
    pub last_seen: Instant,
    pub compact_count: u32,
    pub long_count: u32,
    pub last_format: Option<FrameFormat>,
}

impl TransmissionStats {
    fn new(meter_id: MeterIdentity, now: Instant) -> Self {
        Self {
            meter_id,
            packet_count: 1,
            total_interval: Duration::ZERO,
            last_seen: now,
            compact_count: 0,
            long_count: 0,
            last_format: None,
        }
    }

    /// Needs at least two sightings.
    pub fn average_interval(&self) -> Option<Duration> {
        match self.packet_count {
            0 | 1 => None,
            n => Some(self.total_interval / (n - 1)),
        }
    }

    /// Share of compact frames among the decoded ones, 0.0..=1.0.
    pub fn compact_ratio(&self) -> Option<f32> {
        let decoded = self.compact_count.saturating_add(self.long_count);
        (decoded > 0).then(|| self.compact_count as f32 / decoded as f32)
    }

    /// Time left until the next transmission is due; `None` if overdue or
    /// unknown.
    pub fn next_expected_in(&self, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_seen);
        self.average_interval()?.checked_sub(elapsed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MeterStatsTable {
    entries: heapless::Vec<TransmissionStats, MAX_TRACKED_METERS>,
}

impl MeterStatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the meter is new and the table is already full.
    pub fn record_sighting(&mut self, meter_id: MeterIdentity, now: Instant) -> bool {
        if let Some(stats) = self.entry_mut(&meter_id) {
            let interval = now.saturating_duration_since(stats.last_seen);
            stats.total_interval += interval;
            stats.last_seen = now;
            stats.packet_count = stats.packet_count.saturating_add(1);
            debug!(
                "Stats: meter {} interval {:.1}s (count {})",
                meter_id,
                interval.as_secs_f32(),
                stats.packet_count
            );
            return true;
        }

        if self
            .entries
            .push(TransmissionStats::new(meter_id, now))
            .is_err()
        {
            trace!("Stats: table full, not tracking meter {}", meter_id);
            return false;
        }
        debug!("Stats: first sighting of meter {}", meter_id);
        true
    }

    pub fn record_format(&mut self, meter_id: &MeterIdentity, format: FrameFormat) {
        if let Some(stats) = self.entry_mut(meter_id) {
            let counter = match format {
                FrameFormat::Compact => &mut stats.compact_count,
                FrameFormat::Long => &mut stats.long_count,
            };
            *counter = counter.saturating_add(1);
            stats.last_format = Some(format);
        }
    }

    pub fn get(&self, meter_id: &MeterIdentity) -> Option<&TransmissionStats> {
        self.entries.iter().find(|s| &s.meter_id == meter_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransmissionStats> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Log what we know about our own meter.
    pub fn report(&self, ours: &MeterIdentity, now: Instant) {
        let Some(stats) = self.get(ours) else {
            info!("Stats: meter {} not heard yet ({} others seen)", ours, self.len());
            return;
        };

        let elapsed = now.saturating_duration_since(stats.last_seen).as_secs();
        info!(
            "Stats: meter {} packets={} last seen {}s ago",
            ours, stats.packet_count, elapsed
        );
        match stats.average_interval() {
            Some(avg) => {
                let next = stats
                    .next_expected_in(now)
                    .map_or_else(|| "overdue".to_string(), |d| format!("in {}s", d.as_secs()));
                info!("Stats: average interval {}s, next expected {}", avg.as_secs(), next);
            }
            None => info!("Stats: need at least 2 packets for an interval"),
        }
        if let Some(ratio) = stats.compact_ratio() {
            info!(
                "Stats: compact={} long={} ({:.0}% compact), last {:?}",
                stats.compact_count,
                stats.long_count,
                ratio * 100.0,
                stats.last_format
            );
        }
    }

    fn entry_mut(&mut self, meter_id: &MeterIdentity) -> Option<&mut TransmissionStats> {
        self.entries.iter_mut().find(|s| &s.meter_id == meter_id)
    }
}


// EOF
