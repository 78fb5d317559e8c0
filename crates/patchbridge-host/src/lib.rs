//! Host side of the patchbridge audio bridge
//!
//! Lives inside the VST3 plugin. A [`Processor`] owns the shared transfer
//! region and the sync primitives, launches the scheduler process and,
//! from the audio callback, hands fixed 64-frame quanta back and forth
//! while forwarding parameters, MIDI and transport.
//!
//! ## Usage
//!
//! ```ignore
//! use patchbridge_core::BridgeConfig;
//! use patchbridge_host::{AudioBuffer, ProcessContext, Processor};
//!
//! let config = BridgeConfig::load(bundle_dir)?;
//! let mut processor = Processor::new(config)?;
//! processor.setup_processing(48000.0);
//! processor.set_active(true);
//!
//! // In the audio callback:
//! let mut audio = AudioBuffer::new(&inputs, &mut outputs, frames);
//! let output = processor.process(&mut audio, &ProcessContext::new().events(&events));
//! ```

mod bus;
pub use bus::{channels_through_bus, BusLayout};

mod launcher;
pub use launcher::{ipc_flags, SchedulerCommand, SchedulerProcess, SCHEDULER_LIBRARY};

pub mod midi_map;

mod processor;
pub use processor::Processor;

#[doc(hidden)]
pub mod protocol;

pub use protocol::{
    legacy_cc, AudioBuffer, HostEvent, HostEventKind, HostEventVec, ParameterChanges,
    ParameterPoint, ParameterQueue, ProcessContext, ProcessOutput, TransportInfo,
};

mod quantum_buffer;
pub use quantum_buffer::QuantumBuffer;

mod status;
pub use status::{BridgeStatus, DESYNC_THRESHOLD};

pub use patchbridge_core::{BridgeConfig, BridgeError, Result};
