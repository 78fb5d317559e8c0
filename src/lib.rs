//! # patchbridge - plugin ↔ scheduler audio bridge
//!
//! Connects a VST3 plugin instance to an external scheduler process through
//! one shared-memory transfer region and three named primitives.
//!
//! ## Architecture
//!
//! patchbridge is an umbrella crate over:
//! - **patchbridge-core** - Region layout, mailboxes, MIDI queues, named sync, setup file, state codec
//! - **patchbridge-host** - Host-side bridge driven by the audio callback (`Processor`)
//! - **patchbridge-scheduler** - Scheduler-side bridge and engine trait (`SchedulerBridge`)
//!
//! ## Quick Start
//!
//! ```ignore
//! use patchbridge::prelude::*;
//!
//! // Plugin side
//! let mut processor = Processor::new(BridgeConfig::load(bundle_dir)?)?;
//! processor.set_active(true);
//!
//! // Scheduler process
//! let args = SchedulerArgs::from_env()?;
//! SchedulerBridge::open(&args.names, PassThrough::new())?.run();
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Both sides
//! - `host` - Plugin-side bridge
//! - `scheduler` - Scheduler-side bridge

/// Re-export of patchbridge-core for direct access
pub use patchbridge_core as core;

pub use patchbridge_core::{
    BridgeConfig, BridgeError, Direction, IpcNames, Mailbox, MidiKind, MidiMessage, PluginState,
    Program, Result, TimeInfo, TransferMap, TransferRegion, TransferSync, TransportField,
    SCHEDULER_BLOCK_SIZE,
};

#[cfg(feature = "host")]
pub use patchbridge_host as host;

#[cfg(feature = "host")]
pub use patchbridge_host::{
    AudioBuffer, BridgeStatus, HostEvent, HostEventKind, ParameterChanges, ProcessContext,
    ProcessOutput, Processor, SchedulerCommand, TransportInfo,
};

#[cfg(feature = "scheduler")]
pub use patchbridge_scheduler as scheduler;

#[cfg(feature = "scheduler")]
pub use patchbridge_scheduler::{
    ExitReason, Outbox, PassThrough, SchedulerArgs, SchedulerBridge, SchedulerEngine, Step,
};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{BridgeConfig, BridgeError, Result};

    #[cfg(feature = "host")]
    pub use crate::{AudioBuffer, ProcessContext, Processor};

    #[cfg(feature = "scheduler")]
    pub use crate::{PassThrough, SchedulerArgs, SchedulerBridge, SchedulerEngine};
}
