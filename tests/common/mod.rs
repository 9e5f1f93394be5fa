// Simulated CC1101 and friends for the integration tests
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, convert::Infallible, rc::Rc};

use embedded_hal::delay::DelayNs;
use multical21wmbus::*;

pub const KEY: [u8; 16] = [
    0xA1, 0xB2, 0xC3, 0xD4, 0xE5, 0xF6, 0x07, 0x18, 0x29, 0x3A, 0x4B, 0x5C, 0x6D, 0x7E, 0x8F, 0x90,
];
pub const METER_ID: &str = "12345678";
pub const COMPACT_FRAME: &str =
    "26442D2C785634121B168D20719A3B00007BC747729AB94C47B97FB3A983A0D7AADBC1D0F8C8CE";
pub const LONG_FRAME: &str =
    "2C442D2C785634121B168D20719A3B000059A146729AB94847B93FB9AB836003AB0BD5C5F882E19AC0874A7AC8";

pub const SRES: u8 = 0x30;
pub const SCAL: u8 = 0x33;
pub const SRX: u8 = 0x34;
pub const SIDLE: u8 = 0x36;
pub const SFRX: u8 = 0x3A;
pub const SFTX: u8 = 0x3B;

pub const PARTNUM: u8 = 0x30;
pub const VERSION: u8 = 0x31;
pub const RSSI: u8 = 0x34;
pub const MARCSTATE: u8 = 0x35;
pub const RXBYTES: u8 = 0x3B;
pub const FIFO: u8 = 0x3F;

const PREAMBLE: [u8; 2] = [0x54, 0x3D];

/// Chip state shared between the test and the bus handed to the controller.
#[derive(Debug)]
pub struct SimState {
    pub registers: [u8; 0x30],
    pub register_writes: Vec<(u8, u8)>,
    pub marcstate: u8,
    pub fifo: VecDeque<u8>,
    pub overflow_flag: bool,
    pub rssi: u8,
    pub strobes: Vec<u8>,
    pub selects: u32,
    pub deselects: u32,
    pub marcstate_reads: u32,

    /// SIDLE is ignored (chip wedged outside IDLE)
    pub ignore_idle: bool,
    /// SRX is ignored (chip never reaches RX)
    pub ignore_rx: bool,
    /// SRX lands in RXFIFO_OVERFLOW instead of RX
    pub overflow_on_rx: bool,
    /// this many SFRX strobes leave the FIFO untouched
    pub sticky_flushes: u32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            registers: [0; 0x30],
            register_writes: Vec::new(),
            marcstate: MARC_IDLE,
            fifo: VecDeque::new(),
            overflow_flag: false,
            rssi: 0xB0,
            strobes: Vec::new(),
            selects: 0,
            deselects: 0,
            marcstate_reads: 0,
            ignore_idle: false,
            ignore_rx: false,
            overflow_on_rx: false,
            sticky_flushes: 0,
        }
    }
}

impl SimState {
    fn strobe(&mut self, cmd: u8) {
        self.strobes.push(cmd);
        match cmd {
            SRES => {
                self.registers = [0; 0x30];
                self.marcstate = MARC_IDLE;
                self.fifo.clear();
                self.overflow_flag = false;
            }
            SIDLE if !self.ignore_idle => self.marcstate = MARC_IDLE,
            SRX if self.overflow_on_rx => {
                self.marcstate = MARC_RXFIFO_OVERFLOW;
                self.overflow_flag = true;
            }
            SRX if !self.ignore_rx => self.marcstate = MARC_RX,
            SFRX => {
                if self.sticky_flushes > 0 {
                    self.sticky_flushes -= 1;
                } else {
                    self.fifo.clear();
                    self.overflow_flag = false;
                    if self.marcstate == MARC_RXFIFO_OVERFLOW {
                        self.marcstate = MARC_IDLE;
                    }
                }
            }
            _ => {}
        }
    }

    fn status(&mut self, addr: u8) -> u8 {
        match addr {
            PARTNUM => 0x00,
            VERSION => 0x14,
            RSSI => self.rssi,
            MARCSTATE => {
                self.marcstate_reads += 1;
                self.marcstate
            }
            RXBYTES => {
                let count = self.fifo.len().min(0x7F) as u8;
                count | if self.overflow_flag { 0x80 } else { 0 }
            }
            _ => 0,
        }
    }

    /// Radio finished receiving a frame: preamble echo plus the frame bytes.
    pub fn receive(&mut self, frame: &[u8]) {
        self.fifo.extend(PREAMBLE);
        self.fifo.extend(frame.iter().copied());
    }

    pub fn strobe_count(&self, cmd: u8) -> usize {
        self.strobes.iter().filter(|&&c| c == cmd).count()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pending {
    Header,
    WriteReg(u8),
    ReadReg(u8),
    ReadStatus(u8),
    ReadFifo,
}

/// [`RegisterBus`] that decodes CC1101 header bytes against a [`SimState`].
pub struct SimChip {
    state: Rc<RefCell<SimState>>,
    pending: Pending,
}

impl SimChip {
    pub fn new() -> (Self, Rc<RefCell<SimState>>) {
        let state = Rc::new(RefCell::new(SimState::default()));
        let chip = Self {
            state: state.clone(),
            pending: Pending::Header,
        };
        (chip, state)
    }
}

impl RegisterBus for SimChip {
    type Error = Infallible;

    fn select(&mut self) -> Result<(), Infallible> {
        self.state.borrow_mut().selects += 1;
        self.pending = Pending::Header;
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), Infallible> {
        self.state.borrow_mut().deselects += 1;
        self.pending = Pending::Header;
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), Infallible> {
        let mut st = self.state.borrow_mut();
        self.pending = match self.pending {
            Pending::WriteReg(addr) => {
                st.registers[addr as usize] = byte;
                st.register_writes.push((addr, byte));
                Pending::Header
            }
            _ => {
                let addr = byte & 0x3F;
                let read = byte & 0x80 != 0;
                let burst = byte & 0x40 != 0;
                match (addr, read, burst) {
                    (FIFO, true, _) => Pending::ReadFifo,
                    (FIFO, false, _) => Pending::Header,
                    (a, true, true) if a >= 0x30 => Pending::ReadStatus(a),
                    (a, false, _) if a >= 0x30 => {
                        st.strobe(a);
                        Pending::Header
                    }
                    (a, true, _) => Pending::ReadReg(a),
                    (a, false, _) => Pending::WriteReg(a),
                }
            }
        };
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Infallible> {
        let mut st = self.state.borrow_mut();
        let value = match self.pending {
            Pending::ReadReg(addr) => st.registers.get(addr as usize).copied().unwrap_or(0),
            Pending::ReadStatus(addr) => st.status(addr),
            Pending::ReadFifo => st.fifo.pop_front().unwrap_or(0),
            _ => 0,
        };
        self.pending = Pending::Header;
        Ok(value)
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Interrupt line that only remembers what it was told.
#[derive(Clone, Default)]
pub struct SimIrq(pub Rc<RefCell<IrqLog>>);

#[derive(Debug, Default)]
pub struct IrqLog {
    pub enabled: bool,
    pub enables: u32,
    pub disables: u32,
}

impl InterruptLine for SimIrq {
    fn enable(&mut self) {
        let mut log = self.0.borrow_mut();
        log.enabled = true;
        log.enables += 1;
    }

    fn disable(&mut self) {
        let mut log = self.0.borrow_mut();
        log.enabled = false;
        log.disables += 1;
    }
}

pub fn sim_radio() -> (RadioController<SimChip, NoDelay>, Rc<RefCell<SimState>>) {
    let (chip, state) = SimChip::new();
    (RadioController::new(chip, NoDelay), state)
}

pub fn frame(hex_frame: &str) -> Vec<u8> {
    hex::decode(hex_frame).unwrap()
}

pub fn meter_id() -> MeterIdentity {
    METER_ID.parse().unwrap()
}

// EOF
