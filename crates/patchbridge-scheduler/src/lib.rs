//! Scheduler side of the patchbridge audio bridge
//!
//! Runs inside the scheduler process the host bridge launches. A
//! [`SchedulerBridge`] attaches to the host's transfer region and named
//! primitives, ticks a [`SchedulerEngine`] once per quantum, and shuttles
//! parameters, MIDI, transport and state between the engine and the host.
//!
//! ## Usage
//!
//! ```ignore
//! use patchbridge_scheduler::{PassThrough, SchedulerArgs, SchedulerBridge};
//!
//! let args = SchedulerArgs::from_env()?;
//! let mut bridge = SchedulerBridge::open(&args.names, PassThrough::new())?;
//! bridge.run();
//! ```

mod args;
pub use args::{tokenize, SchedulerArgs};

mod bridge;
pub use bridge::{ExitReason, SchedulerBridge, Step};

mod engine;
pub use engine::{PassThrough, SchedulerEngine};

mod liveness;
pub use liveness::HostProbe;

pub mod outbox;
pub use outbox::{FlushReport, Outbox, OutboxReader};

pub use patchbridge_core::{BridgeError, Result};
