// lib.rs
#![warn(clippy::large_futures)]

pub use std::time::{Duration, Instant};

pub use log::*;
pub use serde::{Deserialize, Serialize};

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

mod error;
pub use error::*;

mod bus;
pub use bus::*;

mod radio;
pub use radio::*;

mod signal;
pub use signal::*;

mod wmbus;
pub use wmbus::*;

mod fifo;
pub use fifo::*;

mod queue;
pub use queue::*;

mod crypto;
pub use crypto::*;

mod multical21;
pub use multical21::*;

mod stats;
pub use stats::*;

mod pipeline;
pub use pipeline::*;

mod publish;
pub use publish::*;

mod receiver;
pub use receiver::*;

mod config;
pub use config::*;

#[cfg(target_os = "espidf")]
mod esp;
#[cfg(target_os = "espidf")]
pub use esp::*;

// EOF
