// queue.rs - single-producer single-consumer frame ring

use heapless::spsc;

use crate::*;

pub const FRAME_QUEUE_SLOTS: usize = 4;

/// Fixed ring of [`RawFrame`] slots between capture and decoding.
///
/// Backed by [`heapless::spsc::Queue`], so `N` slots hold at most `N - 1`
/// frames. Owners with `&mut` access can push and pop directly. To hand the
/// two ends to different execution contexts, [`FrameQueue::split`] gives one
/// [`FrameProducer`] and one [`FrameConsumer`].
#[derive(Default)]
pub struct FrameQueue<const N: usize = FRAME_QUEUE_SLOTS> {
    ring: spsc::Queue<RawFrame, N>,
}

impl<const N: usize> FrameQueue<N> {
    pub const fn new() -> Self {
        Self {
            ring: spsc::Queue::new(),
        }
    }

    pub fn split(&mut self) -> (FrameProducer<'_, N>, FrameConsumer<'_, N>) {
        let (tx, rx) = self.ring.split();
        (FrameProducer { tx }, FrameConsumer { rx })
    }

    /// Returns false and drops the frame when the ring is full.
    pub fn push(&mut self, frame: RawFrame) -> bool {
        self.ring.enqueue(frame).is_ok()
    }

    /// Oldest valid frame, skipping slots marked invalid.
    pub fn pop(&mut self) -> Option<RawFrame> {
        next_valid(|| self.ring.dequeue())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Frames it can hold, one less than the slot count.
    pub const fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn clear(&mut self) {
        while self.ring.dequeue().is_some() {}
    }
}

fn next_valid(mut dequeue: impl FnMut() -> Option<RawFrame>) -> Option<RawFrame> {
    while let Some(frame) = dequeue() {
        if frame.valid {
            return Some(frame);
        }
        trace!("FrameQueue: skipping invalid slot");
    }
    None
}

/// Write end of a split [`FrameQueue`].
pub struct FrameProducer<'q, const N: usize> {
    tx: spsc::Producer<'q, RawFrame, N>,
}

impl<const N: usize> FrameProducer<'_, N> {
    pub fn push(&mut self, frame: RawFrame) -> bool {
        self.tx.enqueue(frame).is_ok()
    }

    pub fn is_full(&self) -> bool {
        !self.tx.ready()
    }
}

/// Read end of a split [`FrameQueue`].
pub struct FrameConsumer<'q, const N: usize> {
    rx: spsc::Consumer<'q, RawFrame, N>,
}

impl<const N: usize> FrameConsumer<'_, N> {
    pub fn pop(&mut self) -> Option<RawFrame> {
        next_valid(|| self.rx.dequeue())
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.rx.ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> RawFrame {
        RawFrame::new(&[tag; 12], Instant::now())
    }

    #[test]
    fn fifo_order() {
        let mut queue = FrameQueue::<4>::new();
        assert!(queue.push(frame(1)));
        assert!(queue.push(frame(2)));
        assert!(queue.push(frame(3)));

        assert_eq!(queue.pop().unwrap().as_bytes()[0], 1);
        assert!(queue.push(frame(4)));
        assert_eq!(queue.pop().unwrap().as_bytes()[0], 2);
        assert_eq!(queue.pop().unwrap().as_bytes()[0], 3);
        assert_eq!(queue.pop().unwrap().as_bytes()[0], 4);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn full_queue_rejects_and_keeps_state() {
        let mut queue = FrameQueue::<4>::new();
        assert_eq!(queue.capacity(), 3);
        for tag in 1..=3 {
            assert!(queue.push(frame(tag)));
        }
        assert!(queue.is_full());
        assert_eq!(queue.len(), 3);

        // the capacity-th push without a pop is refused
        assert!(!queue.push(frame(9)));
        assert!(queue.is_full());
        assert_eq!(queue.len(), 3);
        let tags: Vec<u8> = std::iter::from_fn(|| queue.pop())
            .map(|f| f.as_bytes()[0])
            .collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[test]
    fn empty_iff_len_zero() {
        let mut queue = FrameQueue::<4>::new();
        for round in 0..10u8 {
            assert_eq!(queue.is_empty(), queue.len() == 0);
            queue.push(frame(round));
            assert_eq!(queue.is_empty(), queue.len() == 0);
            if round % 3 == 0 {
                queue.pop();
                queue.pop();
            }
        }
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn invalid_slots_are_skipped() {
        let mut queue = FrameQueue::<4>::new();
        queue.push(RawFrame::invalid(Instant::now()));
        queue.push(frame(7));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().as_bytes()[0], 7);
        assert!(queue.is_empty());

        queue.push(RawFrame::invalid(Instant::now()));
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn split_across_threads_keeps_order() {
        const FRAMES: u32 = 2000;
        let mut queue = FrameQueue::<4>::new();
        let (mut producer, mut consumer) = queue.split();

        std::thread::scope(|s| {
            s.spawn(move || {
                for n in 0..FRAMES {
                    let tag = n.to_le_bytes();
                    let mut bytes = [0u8; 12];
                    bytes[..4].copy_from_slice(&tag);
                    let f = RawFrame::new(&bytes, Instant::now());
                    while !producer.push(f.clone()) {
                        std::thread::yield_now();
                    }
                }
            });

            let mut expected = 0u32;
            while expected < FRAMES {
                match consumer.pop() {
                    Some(f) => {
                        let got = u32::from_le_bytes(f.as_bytes()[..4].try_into().unwrap());
                        assert_eq!(got, expected);
                        expected += 1;
                    }
                    None => std::thread::yield_now(),
                }
            }
        });
        assert!(queue.is_empty());
    }
}

// EOF
