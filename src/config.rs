// config.rs

use crc::{Crc, CRC_32_ISCSI};

use crate::*;

pub const NVS_BUF_SIZE: usize = 256;
pub const CONFIG_NAME: &str = "cfg";

pub const DEFAULT_GDO0_PIN: u8 = 10;

static CONFIG_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyConfig {
    /// 8 hex digits, as printed on the meter.
    pub meter_id: String,
    /// 32 hex digits, AES-128 key from the utility.
    pub meter_key: String,
    pub gdo0_pin: u8,
}

impl Default for MyConfig {
    fn default() -> Self {
        Self {
            meter_id: option_env!("METER_ID").unwrap_or("").into(),
            meter_key: option_env!("METER_KEY").unwrap_or("").into(),
            gdo0_pin: DEFAULT_GDO0_PIN,
        }
    }
}

/// Hex string to bytes; `None` on odd length or a non-hex digit.
pub fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

impl MyConfig {
    /// Runtime override of the compiled-in defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(id) = std::env::var("METER_ID") {
            config.meter_id = id.trim().to_string();
        }
        if let Ok(key) = std::env::var("METER_KEY") {
            config.meter_key = key.trim().to_string();
        }
        if let Ok(pin) = std::env::var("GDO0_PIN") {
            match pin.trim().parse() {
                Ok(p) => config.gdo0_pin = p,
                Err(e) => warn!("Ignoring GDO0_PIN={pin:?}: {e}"),
            }
        }
        config
    }

    pub fn meter_identity(&self) -> Option<MeterIdentity> {
        self.meter_id.parse().ok()
    }

    /// Parse meter_key hex string (32 hex chars) to 16 bytes.
    pub fn meter_key_bytes(&self) -> Option<[u8; AES_KEY_SIZE]> {
        if self.meter_key.len() != 2 * AES_KEY_SIZE {
            return None;
        }
        parse_hex(&self.meter_key)?.try_into().ok()
    }

    /// Identity and key together, or the reason we cannot listen.
    pub fn credentials(&self) -> AppResult<(MeterIdentity, [u8; AES_KEY_SIZE])> {
        let id = self.meter_identity().ok_or_else(|| {
            AppError::Config(format!(
                "No valid meter_id configured (need 8 hex chars), got {:?}",
                self.meter_id
            ))
        })?;
        let key = self.meter_key_bytes().ok_or_else(|| {
            AppError::Config("No valid meter_key configured (need 32 hex chars)".into())
        })?;
        Ok((id, key))
    }

    /// Postcard with a CRC-32 trailer, the NVS blob format.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> AppResult<&'a mut [u8]> {
        let data = postcard::to_slice_crc32(self, buf, CONFIG_CRC.digest())?;
        debug!("Encoded config to {sz} bytes", sz = data.len());
        Ok(data)
    }

    pub fn decode(bytes: &[u8]) -> AppResult<Self> {
        Ok(postcard::from_bytes_crc32(bytes, CONFIG_CRC.digest())?)
    }
}


// EOF
