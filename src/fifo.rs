// fifo.rs - drain one frame from the RX FIFO with exact byte accounting

use crate::*;

// L-field values that can only come from noise
const CORRUPT_LENGTH: u8 = 0xFF;
// Most bytes we will blindly drain after a corrupt L-field
pub const CORRUPT_DRAIN_LIMIT: u8 = 64;
// Sync word echo in front of the L-field
const PREAMBLE_LEN: usize = 2;

/// Byte source for [`drain_frame`]: the transceiver RX FIFO.
pub trait FifoSource {
    fn read_fifo_byte(&mut self) -> u8;
    /// RXBYTES register: bits 6..0 byte count, bit 7 overflow.
    fn rx_bytes(&mut self) -> u8;
}

/// L-field plus payload as drained from the FIFO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawFrame {
    data: [u8; RAW_FRAME_CAPACITY],
    len: usize,
    pub captured_at: Instant,
    pub valid: bool,
}

impl RawFrame {
    /// Bytes beyond [`RAW_FRAME_CAPACITY`] are cut off.
    pub fn new(bytes: &[u8], captured_at: Instant) -> Self {
        let len = bytes.len().min(RAW_FRAME_CAPACITY);
        let mut data = [0u8; RAW_FRAME_CAPACITY];
        data[..len].copy_from_slice(&bytes[..len]);
        Self {
            data,
            len,
            captured_at,
            valid: true,
        }
    }

    pub fn invalid(captured_at: Instant) -> Self {
        Self {
            data: [0u8; RAW_FRAME_CAPACITY],
            len: 0,
            captured_at,
            valid: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn l_field(&self) -> Option<u8> {
        self.as_bytes().first().copied()
    }
}

/// Pull one frame out of the FIFO. The radio must already be in IDLE.
///
/// The number of bytes removed depends only on the L-field, never on
/// whether the frame is acceptable: `min(L, 64)` are stored, any excess is
/// read and thrown away, and only then is L checked. A corrupt L-field
/// (0 or 255) drains whatever RXBYTES reports, up to
/// [`CORRUPT_DRAIN_LIMIT`]. Leaving bytes behind would shift every later
/// frame.
pub fn drain_frame<F>(fifo: &mut F, captured_at: Instant) -> Result<RawFrame, FrameError>
where
    F: FifoSource + ?Sized,
{
    for _ in 0..PREAMBLE_LEN {
        fifo.read_fifo_byte();
    }

    let l_field = fifo.read_fifo_byte();
    debug!("FIFO: L-field={}", l_field);

    if l_field == 0 || l_field == CORRUPT_LENGTH {
        let remaining = fifo.rx_bytes() & RXBYTES_COUNT_MASK;
        let drained = remaining.min(CORRUPT_DRAIN_LIMIT);
        warn!(
            "FIFO: corrupt L-field {}, draining {} of {} remaining bytes",
            l_field, drained, remaining
        );
        for _ in 0..drained {
            fifo.read_fifo_byte();
        }
        return Err(FrameError::CorruptLength {
            l_field,
            drained: drained as usize,
        });
    }

    let declared = l_field as usize;
    let stored = declared.min(MAX_PACKET_SIZE);
    let mut buf = [0u8; RAW_FRAME_CAPACITY];
    buf[0] = l_field;
    for byte in buf[1..=stored].iter_mut() {
        *byte = fifo.read_fifo_byte();
    }

    if declared > MAX_PACKET_SIZE {
        let excess = declared - MAX_PACKET_SIZE;
        warn!(
            "FIFO: draining {} excess bytes (L-field={} exceeds {})",
            excess, l_field, MAX_PACKET_SIZE
        );
        for _ in 0..excess {
            fifo.read_fifo_byte();
        }
    }

    // only now is the length judged; the FIFO is already clean
    if !(MIN_L_FIELD..=MAX_PACKET_SIZE).contains(&declared) {
        return Err(FrameError::BadLength(l_field));
    }

    Ok(RawFrame::new(&buf[..=stored], captured_at))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use proptest::prelude::*;

    use super::*;

    /// FIFO that counts every byte taken out of it.
    struct LedgerFifo {
        bytes: VecDeque<u8>,
        removed: usize,
    }

    impl LedgerFifo {
        fn new(bytes: impl IntoIterator<Item = u8>) -> Self {
            Self {
                bytes: bytes.into_iter().collect(),
                removed: 0,
            }
        }
    }

    impl FifoSource for LedgerFifo {
        fn read_fifo_byte(&mut self) -> u8 {
            match self.bytes.pop_front() {
                Some(b) => {
                    self.removed += 1;
                    b
                }
                None => 0,
            }
        }

        fn rx_bytes(&mut self) -> u8 {
            self.bytes.len().min(RXBYTES_COUNT_MASK as usize) as u8
        }
    }

    // preamble, L-field, L payload bytes and a tail belonging to nobody
    fn fifo_for(l_field: u8, tail: usize) -> LedgerFifo {
        let payload = (0..l_field as usize).map(|i| i as u8);
        let tail = std::iter::repeat(0xEE).take(tail);
        LedgerFifo::new([0x54, 0x3D, l_field].into_iter().chain(payload).chain(tail))
    }

    fn expected_removed(l_field: u8, available_after_header: usize) -> usize {
        match l_field {
            0 | 0xFF => {
                3 + available_after_header
                    .min(RXBYTES_COUNT_MASK as usize)
                    .min(CORRUPT_DRAIN_LIMIT as usize)
            }
            l => 3 + l as usize,
        }
    }

    #[test]
    fn byte_ledger_balances_for_every_length() {
        for l_field in 0..=255u8 {
            let tail = 5;
            let mut fifo = fifo_for(l_field, tail);
            let result = drain_frame(&mut fifo, Instant::now());
            let available = l_field as usize + tail;
            assert_eq!(fifo.removed, expected_removed(l_field, available), "L={l_field}");

            let l = l_field as usize;
            match result {
                Ok(frame) => {
                    assert!((MIN_L_FIELD..=MAX_PACKET_SIZE).contains(&l));
                    assert_eq!(frame.len(), l + 1);
                    assert_eq!(frame.l_field(), Some(l_field));
                    // the tail was not touched
                    assert_eq!(fifo.bytes.len(), tail);
                }
                Err(FrameError::CorruptLength { .. }) => assert!(l_field == 0 || l_field == 0xFF),
                Err(FrameError::BadLength(bad)) => {
                    assert_eq!(bad, l_field);
                    assert!(!(MIN_L_FIELD..=MAX_PACKET_SIZE).contains(&l));
                    assert_eq!(fifo.bytes.len(), tail);
                }
                Err(other) => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn oversize_frame_is_drained_not_stored() {
        let mut fifo = fifo_for(100, 0);
        let result = drain_frame(&mut fifo, Instant::now());
        assert_eq!(result, Err(FrameError::BadLength(100)));
        assert_eq!(fifo.removed, 103);
        assert!(fifo.bytes.is_empty());
    }

    #[test]
    fn corrupt_length_drain_is_capped() {
        let mut fifo = LedgerFifo::new([0x54, 0x3D, 0xFF].into_iter().chain([0xAA; 120]));
        let result = drain_frame(&mut fifo, Instant::now());
        assert_eq!(
            result,
            Err(FrameError::CorruptLength {
                l_field: 0xFF,
                drained: 64
            })
        );
        assert_eq!(fifo.removed, 3 + 64);
    }

    #[test]
    fn good_frame_keeps_payload() {
        let mut fifo = fifo_for(12, 0);
        let frame = drain_frame(&mut fifo, Instant::now()).unwrap();
        assert!(frame.valid);
        assert_eq!(frame.as_bytes()[0], 12);
        assert_eq!(&frame.as_bytes()[1..], &(0..12).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn raw_frame_truncates_to_capacity() {
        let frame = RawFrame::new(&[0x11; 100], Instant::now());
        assert_eq!(frame.len(), RAW_FRAME_CAPACITY);
        assert!(RawFrame::invalid(Instant::now()).is_empty());
    }

    proptest! {
        #[test]
        fn ledger_holds_with_any_trailing_noise(l_field in any::<u8>(), tail in 0usize..80) {
            let mut fifo = fifo_for(l_field, tail);
            let _ = drain_frame(&mut fifo, Instant::now());
            let available = l_field as usize + tail;
            prop_assert_eq!(fifo.removed, expected_removed(l_field, available));
        }
    }
}

// EOF
