// bus.rs - chip-select scoped byte transport to the transceiver

use embedded_hal::{delay::DelayNs, digital::OutputPin, spi::SpiBus};

// CC1101 needs SO low before the header byte; give it time after CS falls
const CHIP_READY_US: u32 = 10;

/// Byte-at-a-time full-duplex transport under a chip-select scope.
///
/// Every register access is `select`, one or more byte exchanges, `deselect`.
pub trait RegisterBus {
    type Error: core::fmt::Debug;

    fn select(&mut self) -> Result<(), Self::Error>;
    fn deselect(&mut self) -> Result<(), Self::Error>;
    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error>;
    fn read_byte(&mut self) -> Result<u8, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum SpiBusError<S: core::fmt::Debug, P: core::fmt::Debug> {
    #[error("SPI error: {0:?}")]
    Spi(S),
    #[error("CS pin error: {0:?}")]
    Pin(P),
}

/// [`RegisterBus`] over an `embedded-hal` SPI bus with a GPIO chip select.
pub struct SpiRegisterBus<SPI, CS, D> {
    spi: SPI,
    cs: CS,
    delay: D,
}

impl<SPI, CS, D> SpiRegisterBus<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, mut cs: CS, delay: D) -> Result<Self, SpiBusError<SPI::Error, CS::Error>> {
        cs.set_high().map_err(SpiBusError::Pin)?;
        Ok(Self { spi, cs, delay })
    }

    pub fn release(self) -> (SPI, CS, D) {
        (self.spi, self.cs, self.delay)
    }
}

impl<SPI, CS, D> RegisterBus for SpiRegisterBus<SPI, CS, D>
where
    SPI: SpiBus,
    CS: OutputPin,
    D: DelayNs,
{
    type Error = SpiBusError<SPI::Error, CS::Error>;

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(SpiBusError::Pin)?;
        self.delay.delay_us(CHIP_READY_US);
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.spi.flush().map_err(SpiBusError::Spi)?;
        self.cs.set_high().map_err(SpiBusError::Pin)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.spi.write(&[byte]).map_err(SpiBusError::Spi)
    }

    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut buf = [0u8];
        self.spi.transfer_in_place(&mut buf).map_err(SpiBusError::Spi)?;
        Ok(buf[0])
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    #[derive(Default)]
    struct FakeSpi {
        written: Vec<u8>,
        reply: u8,
        flushes: usize,
    }

    impl embedded_hal::spi::ErrorType for FakeSpi {
        type Error = Infallible;
    }

    impl SpiBus for FakeSpi {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            words.fill(self.reply);
            Ok(())
        }
        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.written.extend_from_slice(words);
            Ok(())
        }
        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
            self.written.extend_from_slice(write);
            read.fill(self.reply);
            Ok(())
        }
        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            self.written.extend_from_slice(words);
            words.fill(self.reply);
            Ok(())
        }
        fn flush(&mut self) -> Result<(), Infallible> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeCs {
        levels: Vec<bool>,
    }

    impl embedded_hal::digital::ErrorType for FakeCs {
        type Error = Infallible;
    }

    impl OutputPin for FakeCs {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.levels.push(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.levels.push(true);
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn chip_select_frames_each_transaction() {
        let spi = FakeSpi {
            reply: 0x0D,
            ..Default::default()
        };
        let mut bus = SpiRegisterBus::new(spi, FakeCs::default(), NoDelay).unwrap();

        bus.select().unwrap();
        bus.write_byte(0xF5).unwrap();
        let value = bus.read_byte().unwrap();
        bus.deselect().unwrap();

        assert_eq!(value, 0x0D);
        let (spi, cs, _) = bus.release();
        assert_eq!(spi.written, vec![0xF5, 0x00]);
        assert_eq!(spi.flushes, 1);
        assert_eq!(cs.levels, vec![true, false, true]);
    }
}

// EOF
