// publish.rs - hand decoded readings to whoever consumes them

use std::io::Write;

use crate::*;

/// Consumer of accepted readings: sensors, MQTT, a log line, a test vector.
pub trait Publish {
    fn publish(&mut self, reading: &MeterReading);
}

/// Logs every reading as one JSON line at info level.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publish for LogPublisher {
    fn publish(&mut self, reading: &MeterReading) {
        match serde_json::to_string(reading) {
            Ok(json) => info!("Reading: {}", json),
            Err(e) => error!("Reading: JSON encode failed: {}", e),
        }
    }
}

/// Writes JSON lines to any `io::Write`, e.g. stdout.
pub struct WriterPublisher<W: Write> {
    out: W,
}

impl<W: Write> WriterPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publish for WriterPublisher<W> {
    fn publish(&mut self, reading: &MeterReading) {
        let res = serde_json::to_writer(&mut self.out, reading)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(e) = res {
            error!("Reading: write failed: {}", e);
        }
    }
}

impl Publish for Vec<MeterReading> {
    fn publish(&mut self, reading: &MeterReading) {
        self.push(reading.clone());
    }
}


// EOF
