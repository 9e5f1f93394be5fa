// signal.rs - interrupt to main loop handoff

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// What the GDO0 interrupt is allowed to touch: one flag and one counter.
///
/// No register access and no allocation happen on the interrupt side. The
/// cooperative loop polls [`PacketSignal::take`] and does the real work.
#[derive(Debug)]
pub struct PacketSignal {
    pending: AtomicBool,
    raised: AtomicU32,
}

impl PacketSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            raised: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn raise(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }

    /// Consume a pending notification.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Interrupts seen since boot.
    pub fn raised(&self) -> u32 {
        self.raised.load(Ordering::Relaxed)
    }
}

impl Default for PacketSignal {
    fn default() -> Self {
        Self::new()
    }
}

pub static PACKET_SIGNAL: PacketSignal = PacketSignal::new();

/// GDO0 falling edge handler: the frame is complete in the FIFO.
pub fn packet_isr() {
    PACKET_SIGNAL.raise();
}


// EOF
