// multical21.rs - Kamstrup Multical 21 water meter data parsing

use std::fmt;

use chrono::{DateTime, Utc};

use crate::*;

/// Shortest plaintext we try to parse at all.
pub const MIN_PAYLOAD_LEN: usize = 10;
// Plaintext byte 2: 0x78 marks a long frame, anything else is compact
const FORMAT_MARKER_OFFSET: usize = 2;
const LONG_FRAME_MARKER: u8 = 0x78;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Compact,
    Long,
}

impl FrameFormat {
    pub fn detect(plaintext: &[u8]) -> Self {
        match plaintext.get(FORMAT_MARKER_OFFSET) {
            Some(&LONG_FRAME_MARKER) => Self::Long,
            _ => Self::Compact,
        }
    }

    pub const fn layout(&self) -> &'static FieldLayout {
        match self {
            Self::Compact => &COMPACT_LAYOUT,
            Self::Long => &LONG_LAYOUT,
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Long => "long",
        })
    }
}

/// Plaintext offsets of the meter fields for one frame format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub status: usize,
    pub total: usize,
    pub target: usize,
    pub flow_temp: usize,
    pub ambient_temp: usize,
}

pub const COMPACT_LAYOUT: FieldLayout = FieldLayout {
    status: 7,
    total: 9,
    target: 13,
    flow_temp: 17,
    ambient_temp: 18,
};

pub const LONG_LAYOUT: FieldLayout = FieldLayout {
    status: 6,
    total: 10,
    target: 16,
    flow_temp: 22,
    ambient_temp: 25,
};

/// Meter info code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeterStatus {
    Normal,
    Dry,
    Reverse,
    Leak,
    Burst,
    Code(u8),
}

impl From<u8> for MeterStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Normal,
            0x01 => Self::Dry,
            0x02 => Self::Reverse,
            0x04 => Self::Leak,
            0x08 => Self::Burst,
            other => Self::Code(other),
        }
    }
}

impl fmt::Display for MeterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Dry => f.write_str("dry"),
            Self::Reverse => f.write_str("reverse"),
            Self::Leak => f.write_str("leak"),
            Self::Burst => f.write_str("burst"),
            Self::Code(code) => write!(f, "code_0x{code:02x}"),
        }
    }
}

impl Serialize for MeterStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One decoded telegram. Fields that did not fit in the plaintext are `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MeterReading {
    pub meter_id: Option<MeterIdentity>,
    pub total_m3: Option<f64>,
    pub target_m3: Option<f64>,
    pub flow_temp_c: Option<i8>,
    pub ambient_temp_c: Option<i8>,
    pub status: Option<MeterStatus>,
    pub format: FrameFormat,
    pub frame_marker: u8,
    pub plaintext_len: usize,
    pub valid: bool,
    pub timestamp: DateTime<Utc>,
}

fn volume_m3(data: &[u8], offset: usize) -> Option<f64> {
    let bytes: [u8; 4] = data.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes) as f64 / 1000.0)
}

fn temperature_c(data: &[u8], offset: usize) -> Option<i8> {
    data.get(offset).map(|&b| b as i8)
}

/// Parse decrypted Multical 21 payload into a MeterReading.
///
/// Below [`MIN_PAYLOAD_LEN`] bytes nothing is produced. Above it, every
/// field is read only if it fits, so a short plaintext still gives a valid
/// reading with the leading fields filled in.
pub fn parse_multical21(data: &[u8]) -> Result<MeterReading, FrameError> {
    if data.len() < MIN_PAYLOAD_LEN {
        warn!("Multical21: Plaintext too short ({} bytes)", data.len());
        return Err(FrameError::PayloadTooShort(data.len()));
    }

    let format = FrameFormat::detect(data);
    let frame_marker = data[FORMAT_MARKER_OFFSET];
    let layout = format.layout();
    debug!(
        "Multical21: {} frame (marker=0x{:02X}, {} bytes): {:02X?}",
        format,
        frame_marker,
        data.len(),
        data
    );

    let reading = MeterReading {
        meter_id: None,
        total_m3: volume_m3(data, layout.total),
        target_m3: volume_m3(data, layout.target),
        flow_temp_c: temperature_c(data, layout.flow_temp),
        ambient_temp_c: temperature_c(data, layout.ambient_temp),
        status: data.get(layout.status).map(|&code| MeterStatus::from(code)),
        format,
        frame_marker,
        plaintext_len: data.len(),
        valid: true,
        timestamp: Utc::now(),
    };

    info!(
        "Multical21 ({}): total={:?}m3 target={:?}m3 flow={:?}°C ambient={:?}°C status={}",
        reading.format,
        reading.total_m3,
        reading.target_m3,
        reading.flow_temp_c,
        reading.ambient_temp_c,
        reading
            .status
            .map_or_else(|| "unknown".to_string(), |s| s.to_string())
    );

    Ok(reading)
}


// EOF
