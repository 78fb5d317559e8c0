//! Shared building blocks of the patchbridge host/scheduler audio bridge
//!
//! Both processes link this crate: it defines the `#[repr(C)]` transfer
//! region they map, the mailbox and MIDI queue types inside it, the named
//! mutex and handoff events that gate access, and the plugin setup file
//! and state formats.
//!
//! ## Usage
//!
//! ```ignore
//! use patchbridge_core::{IpcNames, SessionParams, TransferMap, TransferSync};
//!
//! // Host side: create everything, then launch the scheduler with `names`.
//! let names = IpcNames::generate();
//! let map = TransferMap::create(&names.region, &SessionParams::default())?;
//! let sync = TransferSync::create(&names)?;
//!
//! // Scheduler side: open the same objects by name.
//! let map = TransferMap::open(&names.region)?;
//! let sync = TransferSync::open(&names)?;
//! ```

pub mod error;
pub use error::{BridgeError, PrimitiveKind, Result};

pub mod config;
pub use config::{BridgeConfig, Program};

pub mod layout;
pub use layout::{
    DataChunk, FixedString, NameString, ParameterKind, ParameterValue, SessionParams,
    TransferRegion, CHUNK_CAPACITY, DEFAULT_SAMPLE_RATE, MAX_BLOCK_SIZE, MAX_CHANNELS,
    MAX_PARAMETERS, SCHEDULER_BLOCK_SIZE,
};

mod mailbox;
pub use mailbox::{Direction, Mailbox};

pub mod midi;
pub use midi::{MidiKind, MidiMessage, MidiQueue, MAX_MIDI_QUEUE};

mod names;
pub use names::{next_instance_id, IpcNames};

mod shared_memory;
pub use shared_memory::TransferMap;

mod state;
pub use state::PluginState;

pub mod sync;
pub use sync::{timeouts, NamedEvent, NamedMutex, TransferGuard, TransferSync};

mod time_info;
pub use time_info::{state_flags, TimeInfo, TransportField};
