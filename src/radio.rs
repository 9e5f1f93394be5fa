// radio.rs - CC1101 receive state machine for wMBus mode C

use embedded_hal::delay::DelayNs;

use crate::*;

// SPI access mode bits
const READ_SINGLE: u8 = 0x80;
const READ_BURST: u8 = 0xC0;

// Strobe commands
const SRES: u8 = 0x30;
const SCAL: u8 = 0x33;
const SRX: u8 = 0x34;
const SIDLE: u8 = 0x36;
const SFRX: u8 = 0x3A;
const SFTX: u8 = 0x3B;

// Status registers (read with READ_BURST bit)
const PARTNUM: u8 = 0x30;
const VERSION: u8 = 0x31;
const RSSI: u8 = 0x34;
const MARCSTATE: u8 = 0x35;
const RXBYTES: u8 = 0x3B;

// FIFO
const FIFO: u8 = 0x3F;

// MARCSTATE values
const MARCSTATE_MASK: u8 = 0x1F;
pub const MARC_IDLE: u8 = 0x01;
pub const MARC_RX: u8 = 0x0D;
pub const MARC_RXFIFO_OVERFLOW: u8 = 0x11;

// RXBYTES layout
pub const RXBYTES_COUNT_MASK: u8 = 0x7F;
pub const RXBYTES_OVERFLOW: u8 = 0x80;

// Every wait is bounded; running out of polls means reset + reconfigure
pub const STATE_POLL_LIMIT: u32 = 100;
const STATE_POLL_INTERVAL_MS: u32 = 1;

const RESET_SETTLE_MS: u32 = 10;
const CALIBRATE_SETTLE_MS: u32 = 1;
const IDLE_SETTLE_MS: u32 = 2;
const FLUSH_SETTLE_MS: u32 = 5;
const RX_SETTLE_MS: u32 = 10;
const OVERFLOW_STEP_MS: u32 = 1;

// CC1101 config register addresses
#[allow(dead_code)]
pub mod reg {
    pub const IOCFG2: u8 = 0x00;
    pub const IOCFG1: u8 = 0x01;
    pub const IOCFG0: u8 = 0x02;
    pub const FIFOTHR: u8 = 0x03;
    pub const SYNC1: u8 = 0x04;
    pub const SYNC0: u8 = 0x05;
    pub const PKTLEN: u8 = 0x06;
    pub const PKTCTRL1: u8 = 0x07;
    pub const PKTCTRL0: u8 = 0x08;
    pub const ADDR: u8 = 0x09;
    pub const CHANNR: u8 = 0x0A;
    pub const FSCTRL1: u8 = 0x0B;
    pub const FSCTRL0: u8 = 0x0C;
    pub const FREQ2: u8 = 0x0D;
    pub const FREQ1: u8 = 0x0E;
    pub const FREQ0: u8 = 0x0F;
    pub const MDMCFG4: u8 = 0x10;
    pub const MDMCFG3: u8 = 0x11;
    pub const MDMCFG2: u8 = 0x12;
    pub const MDMCFG1: u8 = 0x13;
    pub const MDMCFG0: u8 = 0x14;
    pub const DEVIATN: u8 = 0x15;
    pub const MCSM2: u8 = 0x16;
    pub const MCSM1: u8 = 0x17;
    pub const MCSM0: u8 = 0x18;
    pub const FOCCFG: u8 = 0x19;
    pub const BSCFG: u8 = 0x1A;
    pub const AGCCTRL2: u8 = 0x1B;
    pub const AGCCTRL1: u8 = 0x1C;
    pub const AGCCTRL0: u8 = 0x1D;
    pub const FREND1: u8 = 0x21;
    pub const FREND0: u8 = 0x22;
    pub const FSCAL3: u8 = 0x23;
    pub const FSCAL2: u8 = 0x24;
    pub const FSCAL1: u8 = 0x25;
    pub const FSCAL0: u8 = 0x26;
    pub const FSTEST: u8 = 0x29;
    pub const TEST2: u8 = 0x2C;
    pub const TEST1: u8 = 0x2D;
    pub const TEST0: u8 = 0x2E;
}

// https://www.ti.com/lit/ds/symlink/cc1101.pdf
// 868.95 MHz, 2-FSK, ~100 kbps, sync word 0x543D, infinite packet length
pub const WMBUS_MODE_C_PROFILE: &[(u8, u8)] = &[
    (reg::IOCFG2, 0x2E),
    (reg::IOCFG0, 0x06), // GDO0: asserts on sync word, deasserts at end of packet
    (reg::FIFOTHR, 0x00),
    (reg::SYNC1, 0x54),
    (reg::SYNC0, 0x3D),
    (reg::PKTLEN, 0x30),
    (reg::PKTCTRL1, 0x00),
    (reg::PKTCTRL0, 0x02),
    (reg::ADDR, 0x00),
    (reg::CHANNR, 0x00),
    (reg::FSCTRL1, 0x08),
    (reg::FSCTRL0, 0x00),
    (reg::FREQ2, 0x21),
    (reg::FREQ1, 0x6B),
    (reg::FREQ0, 0xD0),
    (reg::MDMCFG4, 0x5C),
    (reg::MDMCFG3, 0x04),
    (reg::MDMCFG2, 0x06),
    (reg::MDMCFG1, 0x22),
    (reg::MDMCFG0, 0xF8),
    (reg::DEVIATN, 0x44),
    (reg::MCSM1, 0x00), // stay in IDLE after RX
    (reg::MCSM0, 0x18),
    (reg::FOCCFG, 0x2E),
    (reg::BSCFG, 0xBF),
    (reg::AGCCTRL2, 0x43),
    (reg::AGCCTRL1, 0x09),
    (reg::AGCCTRL0, 0xB5),
    (reg::FREND1, 0xB6),
    (reg::FREND0, 0x10),
    (reg::FSCAL3, 0xEA),
    (reg::FSCAL2, 0x2A),
    (reg::FSCAL1, 0x00),
    (reg::FSCAL0, 0x1F),
    (reg::FSTEST, 0x59),
    (reg::TEST2, 0x81),
    (reg::TEST1, 0x35),
    (reg::TEST0, 0x09),
];

// Read back after configure; a mismatch is only logged
const VERIFY_REGISTERS: [u8; 2] = [reg::FREQ2, reg::MDMCFG2];

fn profile_value(addr: u8) -> Option<u8> {
    WMBUS_MODE_C_PROFILE
        .iter()
        .find(|(reg, _)| *reg == addr)
        .map(|(_, value)| *value)
}

/// Operating state of the transceiver as tracked by [`RadioController`].
///
/// `Resetting` and `Configuring` are controller phases. The rest mirror
/// MARCSTATE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadioState {
    Resetting,
    Configuring,
    Idle,
    Calibrating,
    Receiving,
    FifoOverflow,
    Other(u8),
}

impl RadioState {
    pub fn from_marcstate(raw: u8) -> Self {
        match raw & MARCSTATE_MASK {
            MARC_IDLE => Self::Idle,
            0x03..=0x0C => Self::Calibrating,
            MARC_RX => Self::Receiving,
            MARC_RXFIFO_OVERFLOW => Self::FifoOverflow,
            other => Self::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadioStatus {
    pub state: RadioState,
    pub marcstate: u8,
    pub fifo_bytes: u8,
    pub overflow: bool,
    pub rssi_dbm: i16,
}

/// CC1101 RSSI register to dBm, 74 dB offset at 868 MHz.
pub fn rssi_to_dbm(raw: u8) -> i16 {
    (raw as i8 as i16) / 2 - 74
}

pub struct RadioController<B, D> {
    bus: B,
    delay: D,
    state: RadioState,
    recoveries: u32,
}

impl<B, D> RadioController<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            state: RadioState::Resetting,
            recoveries: 0,
        }
    }

    /// Last state the controller drove the chip into.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// How many times a wedged chip was brought back with reset + configure.
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn transaction<T>(
        &mut self,
        op: impl FnOnce(&mut B) -> Result<T, B::Error>,
    ) -> Result<T, B::Error> {
        self.bus.select()?;
        let result = op(&mut self.bus);
        let released = self.bus.deselect();
        let value = result?;
        released?;
        Ok(value)
    }

    fn strobe(&mut self, cmd: u8) {
        if let Err(e) = self.transaction(|bus| bus.write_byte(cmd)) {
            error!("CC1101 strobe 0x{:02X} error: {:?}", cmd, e);
        }
    }

    pub fn write_register(&mut self, addr: u8, value: u8) {
        if let Err(e) = self.transaction(|bus| {
            bus.write_byte(addr)?;
            bus.write_byte(value)
        }) {
            error!("CC1101 write_register 0x{:02X} error: {:?}", addr, e);
        }
    }

    pub fn read_register(&mut self, addr: u8) -> u8 {
        self.transaction(|bus| {
            bus.write_byte(addr | READ_SINGLE)?;
            bus.read_byte()
        })
        .unwrap_or_else(|e| {
            error!("CC1101 read_register 0x{:02X} error: {:?}", addr, e);
            0
        })
    }

    pub fn read_status(&mut self, addr: u8) -> u8 {
        self.transaction(|bus| {
            bus.write_byte(addr | READ_BURST)?;
            bus.read_byte()
        })
        .unwrap_or_else(|e| {
            error!("CC1101 read_status 0x{:02X} error: {:?}", addr, e);
            0
        })
    }

    pub fn marcstate(&mut self) -> u8 {
        self.read_status(MARCSTATE) & MARCSTATE_MASK
    }

    pub fn reset(&mut self) {
        debug!("CC1101: Resetting radio...");
        self.state = RadioState::Resetting;
        self.strobe(SRES);
        self.delay.delay_ms(RESET_SETTLE_MS);
        self.state = RadioState::Idle;
    }

    pub fn configure(&mut self) {
        self.state = RadioState::Configuring;
        let partnum = self.read_status(PARTNUM);
        let version = self.read_status(VERSION);
        info!("CC1101: PARTNUM=0x{:02X} VERSION=0x{:02X}", partnum, version);

        for &(addr, value) in WMBUS_MODE_C_PROFILE {
            self.write_register(addr, value);
        }

        for addr in VERIFY_REGISTERS {
            let got = self.read_register(addr);
            match profile_value(addr) {
                Some(expected) if got != expected => warn!(
                    "CC1101: register 0x{:02X} reads 0x{:02X}, expected 0x{:02X}",
                    addr, got, expected
                ),
                _ => debug!("CC1101: register 0x{:02X} = 0x{:02X}", addr, got),
            }
        }

        self.state = RadioState::Calibrating;
        self.strobe(SCAL);
        self.delay.delay_ms(CALIBRATE_SETTLE_MS);
        self.state = RadioState::Idle;
        debug!("CC1101: configuration complete");
    }

    /// Bring the chip into RX with an empty FIFO.
    ///
    /// Runs after every frame and from the health check, so the happy path
    /// does not log. Any timeout ends in reset + configure; the next health
    /// check then restarts reception.
    pub fn start_receive(&mut self) {
        let current = self.marcstate();

        if current == MARC_RXFIFO_OVERFLOW {
            warn!("CC1101: RX FIFO overflow, recovering via IDLE/flush/RX");
            self.strobe(SIDLE);
            self.delay.delay_ms(IDLE_SETTLE_MS);
            self.strobe(SFRX);
            self.delay.delay_ms(OVERFLOW_STEP_MS);
            self.strobe(SFTX);
            self.delay.delay_ms(OVERFLOW_STEP_MS);
            self.strobe(SRX);
            self.delay.delay_ms(RX_SETTLE_MS);

            let after = self.marcstate();
            if after == MARC_RX {
                self.state = RadioState::Receiving;
            } else {
                self.escalate(format_args!("overflow recovery left state 0x{:02X}", after));
            }
            return;
        }

        self.strobe(SIDLE);
        if let Err(stuck) = self.wait_for_state(MARC_IDLE) {
            self.escalate(format_args!(
                "stuck in 0x{:02X} entering IDLE (was 0x{:02X})",
                stuck, current
            ));
            return;
        }
        self.state = RadioState::Idle;

        self.strobe(SFRX);
        self.delay.delay_ms(FLUSH_SETTLE_MS);
        let left = self.rx_bytes() & RXBYTES_COUNT_MASK;
        if left != 0 {
            warn!("CC1101: {} bytes left after flush, flushing again", left);
            self.strobe(SFRX);
            self.delay.delay_ms(FLUSH_SETTLE_MS);
        }

        self.strobe(SRX);
        self.delay.delay_ms(RX_SETTLE_MS);
        match self.wait_for_state(MARC_RX) {
            Ok(()) => self.state = RadioState::Receiving,
            Err(MARC_RXFIFO_OVERFLOW) => {
                self.escalate(format_args!("RX FIFO overflow while entering RX"));
            }
            Err(stuck) => {
                self.escalate(format_args!("stuck in 0x{:02X} entering RX", stuck));
            }
        }
    }

    pub fn enter_idle(&mut self) {
        self.strobe(SIDLE);
        self.delay.delay_ms(IDLE_SETTLE_MS);
        self.state = RadioState::Idle;
    }

    pub fn flush_rx(&mut self) {
        self.strobe(SFRX);
    }

    pub fn status_snapshot(&mut self) -> RadioStatus {
        let marcstate = self.marcstate();
        let rxbytes = self.rx_bytes();
        let rssi = self.read_status(RSSI);
        RadioStatus {
            state: RadioState::from_marcstate(marcstate),
            marcstate,
            fifo_bytes: rxbytes & RXBYTES_COUNT_MASK,
            overflow: rxbytes & RXBYTES_OVERFLOW != 0,
            rssi_dbm: rssi_to_dbm(rssi),
        }
    }

    // Err carries the last state seen. Overflow aborts the RX wait early.
    fn wait_for_state(&mut self, target: u8) -> Result<(), u8> {
        let mut seen = self.marcstate();
        for _ in 0..STATE_POLL_LIMIT {
            if seen == target {
                return Ok(());
            }
            if target == MARC_RX && seen == MARC_RXFIFO_OVERFLOW {
                return Err(seen);
            }
            self.delay.delay_ms(STATE_POLL_INTERVAL_MS);
            seen = self.marcstate();
        }
        if seen == target {
            Ok(())
        } else {
            Err(seen)
        }
    }

    fn escalate(&mut self, reason: core::fmt::Arguments<'_>) {
        error!("CC1101: {}, resetting radio", reason);
        self.recoveries += 1;
        self.reset();
        self.configure();
    }
}

impl<B, D> FifoSource for RadioController<B, D>
where
    B: RegisterBus,
    D: DelayNs,
{
    fn read_fifo_byte(&mut self) -> u8 {
        self.transaction(|bus| {
            bus.write_byte(FIFO | READ_SINGLE)?;
            bus.read_byte()
        })
        .unwrap_or_else(|e| {
            error!("CC1101 read_fifo_byte error: {:?}", e);
            0
        })
    }

    fn rx_bytes(&mut self) -> u8 {
        self.read_status(RXBYTES)
    }
}


// EOF
