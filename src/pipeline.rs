// pipeline.rs - validate, decrypt and parse one captured frame

use crate::*;

/// Everything between a drained [`RawFrame`] and a [`MeterReading`]:
/// structure guard, identity filter, CRC, AES-CTR and the Multical 21 parser.
pub struct FramePipeline {
    identity: MeterIdentity,
    key: [u8; AES_KEY_SIZE],
    counters: ReceiverCounters,
    stats: MeterStatsTable,
}

impl FramePipeline {
    pub fn new(identity: MeterIdentity, key: [u8; AES_KEY_SIZE]) -> Self {
        Self {
            identity,
            key,
            counters: ReceiverCounters::default(),
            stats: MeterStatsTable::new(),
        }
    }

    pub fn identity(&self) -> &MeterIdentity {
        &self.identity
    }

    pub fn counters(&self) -> &ReceiverCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut ReceiverCounters {
        &mut self.counters
    }

    pub fn stats(&self) -> &MeterStatsTable {
        &self.stats
    }

    /// Run one frame through all stages, counting it as seen and
    /// counting the outcome.
    pub fn process(&mut self, frame: &RawFrame) -> Result<MeterReading, FrameError> {
        self.counters.record_seen();
        match self.decode(frame) {
            Ok(reading) => {
                self.counters.record_accepted();
                Ok(reading)
            }
            Err(e) => {
                self.counters.record(&e);
                Err(e)
            }
        }
    }

    fn decode(&mut self, frame: &RawFrame) -> Result<MeterReading, FrameError> {
        let captured_at = frame.captured_at;
        let bytes = frame.as_bytes();
        let l_field = check_frame_structure(bytes)?;
        let frame = &bytes[..=l_field];

        // every structurally sound frame tells us something about the air
        let sender = frame_meter_id(frame).ok_or(FrameError::Truncated {
            have: frame.len(),
            need: OFFSET_METER_ID + 4,
        })?;
        self.stats.record_sighting(sender, captured_at);

        if !check_meter_id(frame, &self.identity) {
            trace!("Pipeline: ignoring meter {}", sender);
            return Err(FrameError::IdentityMismatch(sender));
        }

        let crc = verify_crc(frame, l_field).inspect_err(|e| warn!("Pipeline: {}", e))?;
        debug!("Pipeline: meter {} CRC {:04X} OK", sender, crc);

        let plain = decrypt_payload(frame, &self.key)?;
        let mut reading = parse_multical21(&plain)?;
        reading.meter_id = Some(sender);
        self.stats.record_format(&sender, reading.format);
        Ok(reading)
    }
}


// EOF
