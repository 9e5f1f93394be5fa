// receiver.rs - cooperative receive loop: capture, decode, watchdogs

use embedded_hal::delay::DelayNs;
use tokio::time::{self, MissedTickBehavior};

use crate::*;

pub const SIGNAL_POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const STALL_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const STATS_REPORT_INTERVAL: Duration = Duration::from_secs(60);
/// No accepted frame for this long means the link is declared stalled.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// The "frame received" edge interrupt. Masked while the FIFO is drained.
pub trait InterruptLine {
    fn enable(&mut self);
    fn disable(&mut self);
}

/// Owns the radio, the frame queue and the decode pipeline, and ties them
/// to the interrupt flag and the watchdog timers.
pub struct Receiver<'s, B, D, I> {
    radio: RadioController<B, D>,
    irq: I,
    signal: &'s PacketSignal,
    queue: FrameQueue,
    pipeline: FramePipeline,
    last_accepted: Instant,
}

impl<'s, B, D, I> Receiver<'s, B, D, I>
where
    B: RegisterBus,
    D: DelayNs,
    I: InterruptLine,
{
    pub fn new(
        radio: RadioController<B, D>,
        irq: I,
        signal: &'s PacketSignal,
        pipeline: FramePipeline,
    ) -> Self {
        Self {
            radio,
            irq,
            signal,
            queue: FrameQueue::new(),
            pipeline,
            last_accepted: Instant::now(),
        }
    }

    pub fn radio(&self) -> &RadioController<B, D> {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut RadioController<B, D> {
        &mut self.radio
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    pub fn counters(&self) -> &ReceiverCounters {
        self.pipeline.counters()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Reset, configure and start listening. Arms the stall timer.
    pub fn start(&mut self, now: Instant) {
        info!(
            "Receiver: starting for meter {}, radio init...",
            self.pipeline.identity()
        );
        self.irq.disable();
        self.signal.clear();
        self.radio.reset();
        self.radio.configure();
        self.radio.start_receive();
        self.last_accepted = now;
        self.irq.enable();
        info!("Receiver: waiting for wMBus packets...");
    }

    /// One pass of the cooperative loop: capture a signalled frame, then
    /// decode whatever is queued. Returns the number of readings published.
    pub fn service<P>(&mut self, now: Instant, publisher: &mut P) -> usize
    where
        P: Publish + ?Sized,
    {
        if self.signal.take() {
            self.capture(now);
        }
        self.drain_queue(publisher)
    }

    /// Move one frame from the radio FIFO into the queue and restart RX.
    /// Frames lost before the queue are counted here; queued ones are
    /// counted by the pipeline when decoded.
    pub fn capture(&mut self, now: Instant) {
        self.irq.disable();

        if self.queue.is_full() {
            warn!("Receiver: frame queue full, dropping packet");
            self.reject(&FrameError::QueueOverflow);
        } else {
            self.radio.enter_idle();
            match drain_frame(&mut self.radio, now) {
                Ok(frame) => {
                    debug!("Receiver: captured {} bytes", frame.len());
                    if !self.queue.push(frame) {
                        self.reject(&FrameError::QueueOverflow);
                    }
                }
                Err(e) => {
                    debug!("Receiver: {}", e);
                    self.reject(&e);
                }
            }
        }

        self.radio.start_receive();
        self.irq.enable();
    }

    fn reject(&mut self, err: &FrameError) {
        let counters = self.pipeline.counters_mut();
        counters.record_seen();
        counters.record(err);
    }

    pub fn drain_queue<P>(&mut self, publisher: &mut P) -> usize
    where
        P: Publish + ?Sized,
    {
        let mut published = 0;
        while let Some(frame) = self.queue.pop() {
            match self.pipeline.process(&frame) {
                Ok(reading) => {
                    self.last_accepted = frame.captured_at;
                    publisher.publish(&reading);
                    published += 1;
                }
                Err(FrameError::IdentityMismatch(_)) => {}
                Err(e) => debug!("Receiver: frame rejected: {}", e),
            }
        }
        published
    }

    /// Make sure the radio is still listening; recover it if not.
    pub fn health_check(&mut self) -> RadioStatus {
        let status = self.radio.status_snapshot();
        debug!(
            "Receiver: health MARCSTATE=0x{:02X} ({:?}) RXBYTES={} overflow={} RSSI={}dBm",
            status.marcstate, status.state, status.fifo_bytes, status.overflow, status.rssi_dbm
        );

        if status.overflow || status.state == RadioState::FifoOverflow {
            warn!("Receiver: RX FIFO overflow detected, flushing");
            self.radio.enter_idle();
            self.radio.flush_rx();
            self.radio.start_receive();
        } else if status.state != RadioState::Receiving {
            warn!(
                "Receiver: radio not in RX (MARCSTATE=0x{:02X}), restarting RX",
                status.marcstate
            );
            self.radio.start_receive();
        }
        status
    }

    /// Full radio restart if our meter has been silent too long.
    pub fn check_stall(&mut self, now: Instant) -> bool {
        let silent = now.saturating_duration_since(self.last_accepted);
        if silent <= RECEIVE_TIMEOUT {
            return false;
        }
        warn!(
            "Receiver: no packets for {}s, restarting radio",
            silent.as_secs()
        );
        self.radio.reset();
        self.radio.configure();
        self.radio.start_receive();
        self.last_accepted = now;
        true
    }

    pub fn report_stats(&self, now: Instant) {
        let c = self.counters();
        info!(
            "Receiver: seen={} accepted={} framing={} overflow={} other_meters={} crc={} crypto={} parse={} recoveries={}",
            c.frames_seen,
            c.accepted,
            c.framing_errors,
            c.queue_overflows,
            c.id_mismatches,
            c.crc_errors,
            c.crypto_failures,
            c.parse_failures,
            self.radio.recoveries()
        );
        self.pipeline
            .stats()
            .report(self.pipeline.identity(), now);
    }

    /// Drive the receiver forever on the current tokio runtime.
    pub async fn run<P>(&mut self, publisher: &mut P) -> anyhow::Result<()>
    where
        P: Publish + ?Sized,
    {
        let mut poll = time::interval(SIGNAL_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = time::interval(HEALTH_CHECK_INTERVAL);
        let mut stall = time::interval(STALL_CHECK_INTERVAL);
        let mut report = time::interval(STATS_REPORT_INTERVAL);

        // the first tick of an interval is immediate
        health.tick().await;
        stall.tick().await;
        report.tick().await;

        self.start(now());
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.service(now(), publisher);
                }
                _ = health.tick() => {
                    self.health_check();
                }
                _ = stall.tick() => {
                    self.check_stall(now());
                }
                _ = report.tick() => {
                    self.report_stats(now());
                }
            }
        }
    }
}

// tokio's clock, so paused test time moves it too
fn now() -> Instant {
    time::Instant::now().into_std()
}

// EOF
