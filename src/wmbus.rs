// wmbus.rs - wMBus frame layout, meter identity filter, CRC-16 EN 13757-4

use std::{fmt, str::FromStr};

use crate::*;

/// Largest L-field we accept and the most payload bytes we store.
pub const MAX_PACKET_SIZE: usize = 64;
/// L-field byte plus payload.
pub const RAW_FRAME_CAPACITY: usize = MAX_PACKET_SIZE + 1;
pub const MIN_L_FIELD: usize = 10;
pub const CIPHER_OFFSET: usize = 17;
pub const CRC_SIZE: usize = 2;

// Wire offsets, L-field at 0
pub const OFFSET_C_FIELD: usize = 1;
pub const OFFSET_M_FIELD: usize = 2;
pub const OFFSET_METER_ID: usize = 4;
pub const OFFSET_CI_FIELD: usize = 11;
pub const OFFSET_ACCESS_NO: usize = 13;

const CRC_POLY: u16 = 0x3D65;

/// Meter serial as printed on the meter (big-endian).
///
/// The A-field carries it little-endian, so wire order is the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeterIdentity([u8; 4]);

impl MeterIdentity {
    pub const fn new(printed: [u8; 4]) -> Self {
        Self(printed)
    }

    /// From the four A-field bytes as they appear on the wire.
    pub fn from_wire(le: &[u8]) -> Option<Self> {
        match le {
            &[a, b, c, d] => Some(Self([d, c, b, a])),
            _ => None,
        }
    }

    pub fn printed(&self) -> [u8; 4] {
        self.0
    }

    pub fn wire_bytes(&self) -> [u8; 4] {
        let [a, b, c, d] = self.0;
        [d, c, b, a]
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn matches_wire(&self, le: &[u8]) -> bool {
        le == self.wire_bytes().as_slice()
    }
}

impl fmt::Display for MeterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02X}{b:02X}{c:02X}{d:02X}")
    }
}

impl FromStr for MeterIdentity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AppError::Config(format!("meter id must be 8 hex digits, got {s:?}"));
        if s.len() != 8 {
            return Err(bad());
        }
        let bytes = parse_hex(s).ok_or_else(bad)?;
        let printed: [u8; 4] = bytes.as_slice().try_into().map_err(|_| bad())?;
        Ok(Self(printed))
    }
}

impl Serialize for MeterIdentity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// CRC-16 EN 13757-4: polynomial 0x3D65, MSB first, final XOR 0xFFFF.
///
/// Augmented form: data bits are shifted into the bottom of the register
/// and 16 zero bits are pushed through at the end. With a zero start this
/// equals the table-driven CRC-16/EN-13757 (check value 0xC2B7).
pub fn crc16_en13757(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;

    // pre-conditioning rounds; a no-op for a zero register
    for _ in 0..16 {
        let bit = crc & 0x0001 != 0;
        if bit {
            crc ^= CRC_POLY;
        }
        crc >>= 1;
        if bit {
            crc |= 0x8000;
        }
    }

    for &byte in data {
        for j in (0..8).rev() {
            let top = crc & 0x8000 != 0;
            crc <<= 1;
            if byte & (1 << j) != 0 {
                crc |= 0x0001;
            }
            if top {
                crc ^= CRC_POLY;
            }
        }
    }

    for _ in 0..16 {
        let top = crc & 0x8000 != 0;
        crc <<= 1;
        if top {
            crc ^= CRC_POLY;
        }
    }

    crc ^ 0xFFFF
}

/// Check L-field bounds and that the buffer really holds `L + 1` bytes.
/// Returns the L-field.
pub fn check_frame_structure(frame: &[u8]) -> Result<usize, FrameError> {
    let l_field = *frame.first().ok_or(FrameError::Truncated { have: 0, need: 1 })?;
    let len = l_field as usize;
    if !(MIN_L_FIELD..=MAX_PACKET_SIZE).contains(&len) {
        return Err(FrameError::BadLength(l_field));
    }
    if frame.len() < len + 1 {
        return Err(FrameError::Truncated {
            have: frame.len(),
            need: len + 1,
        });
    }
    Ok(len)
}

/// Sender identity from the A-field.
pub fn frame_meter_id(frame: &[u8]) -> Option<MeterIdentity> {
    frame
        .get(OFFSET_METER_ID..OFFSET_METER_ID + 4)
        .and_then(MeterIdentity::from_wire)
}

pub fn check_meter_id(frame: &[u8], meter_id: &MeterIdentity) -> bool {
    frame
        .get(OFFSET_METER_ID..OFFSET_METER_ID + 4)
        .is_some_and(|le| meter_id.matches_wire(le))
}

/// CRC over everything up to the last ciphertext byte, compared with the
/// two trailing bytes (big-endian). `l_field` must have passed
/// [`check_frame_structure`].
pub fn verify_crc(frame: &[u8], l_field: usize) -> Result<u16, FrameError> {
    let calculated = crc16_en13757(&frame[..l_field - 1]);
    let received = u16::from_be_bytes([frame[l_field - 1], frame[l_field]]);
    if calculated != received {
        return Err(FrameError::CrcMismatch {
            calculated,
            received,
        });
    }
    Ok(calculated)
}


// EOF
