// esp.rs - ESP-IDF glue: SPI register bus, GDO0 interrupt, NVS config

use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{AnyInputPin, AnyOutputPin, Input, InterruptType, Output, PinDriver},
    spi::{SpiBusDriver, SpiDriver},
};
use esp_idf_svc::nvs;

use crate::*;

pub type EspRegisterBus<'d> =
    SpiRegisterBus<SpiBusDriver<'d, SpiDriver<'d>>, PinDriver<'d, AnyOutputPin, Output>, Ets>;
pub type EspRadio<'d> = RadioController<EspRegisterBus<'d>, FreeRtos>;

pub fn esp_register_bus<'d>(
    spi: SpiBusDriver<'d, SpiDriver<'d>>,
    cs: AnyOutputPin,
) -> AppResult<EspRegisterBus<'d>> {
    let cs = PinDriver::output(cs)?;
    SpiRegisterBus::new(spi, cs, Ets)
        .map_err(|e| AppError::Message(format!("Cannot set up CC1101 SPI: {e:?}")))
}

/// GDO0 falling edge: CC1101 has a complete frame in the RX FIFO.
///
/// ESP-IDF masks a GPIO interrupt after it fires, so [`InterruptLine::enable`]
/// after each capture also re-arms it.
pub struct Gdo0Interrupt<'d> {
    pin: PinDriver<'d, AnyInputPin, Input>,
}

impl<'d> Gdo0Interrupt<'d> {
    pub fn new(pin: AnyInputPin) -> AppResult<Self> {
        // push-pull output on the radio side, no pull resistor
        let mut pin = PinDriver::input(pin)?;
        pin.set_interrupt_type(InterruptType::NegEdge)?;
        // SAFETY: packet_isr only touches atomics
        unsafe { pin.subscribe(packet_isr)? };
        info!("GDO0 interrupt attached to GPIO{}", pin.pin());
        Ok(Self { pin })
    }
}

impl InterruptLine for Gdo0Interrupt<'_> {
    fn enable(&mut self) {
        if let Err(e) = self.pin.enable_interrupt() {
            error!("GDO0 enable_interrupt error: {e:?}");
        }
    }

    fn disable(&mut self) {
        if let Err(e) = self.pin.disable_interrupt() {
            error!("GDO0 disable_interrupt error: {e:?}");
        }
    }
}

impl MyConfig {
    pub fn from_nvs(nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> Option<Self> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
        let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
            Err(e) => {
                error!("Nvs read error {e:?}");
                return None;
            }
            Ok(Some(b)) => b,
            _ => {
                error!("Nvs key not found");
                return None;
            }
        };
        info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

        match Self::decode(b) {
            Ok(c) => {
                info!("Successfully parsed config from nvs.");
                Some(c)
            }
            Err(e) => {
                error!("Cannot parse config from nvs: {e:?}");
                None
            }
        }
    }

    pub fn to_nvs(&self, nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> AppResult<()> {
        let mut nvsbuf = [0u8; NVS_BUF_SIZE];
        let nvsdata = self.encode(&mut nvsbuf)?;
        info!("Saving {sz} bytes to nvs...", sz = nvsdata.len());

        nvs.set_raw(CONFIG_NAME, nvsdata)
            .map_err(|e| AppError::Message(format!("Cannot save to nvs: {e:?}")))?;
        info!("Config saved.");
        Ok(())
    }
}

// EOF
