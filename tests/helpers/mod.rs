//! Fixtures for the bridge integration tests.
//!
//! Both bridges run in this one test process: the host side on the test
//! thread (acting as the audio callback), the scheduler side on a spawned
//! thread, talking over real named primitives and a real mapping.

#![allow(dead_code)]

use patchbridge::core::{IpcNames, ParameterValue};
use patchbridge::scheduler::outbox::Outbox;
use patchbridge::{
    AudioBuffer, BridgeConfig, ExitReason, ProcessContext, ProcessOutput, Processor,
    SchedulerBridge, SchedulerEngine,
};
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Host callback size used by the scenarios (two scheduler quanta).
pub const HOST_BLOCK: usize = 128;

pub const CHANNELS: usize = 2;

/// Upper bound for conditions that depend on the scheduler thread.
pub const SETTLE: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn test_config() -> BridgeConfig {
    let mut config = BridgeConfig::for_bundle(Path::new("/plugins/Bridge Test.vst3"));
    config.parameter_count = 8;
    config
}

/// Scheduler running on its own thread. Reports its exit reason on `exited`
/// and hands the engine back on join.
pub struct SchedulerThread<E: SchedulerEngine + 'static> {
    pub exited: Receiver<ExitReason>,
    handle: JoinHandle<E>,
}

impl<E: SchedulerEngine + 'static> SchedulerThread<E> {
    pub fn spawn(names: &IpcNames, engine: E) -> Self {
        let mut bridge = SchedulerBridge::open(names, engine).unwrap();
        let (tx, exited) = mpsc::channel();
        let handle = thread::spawn(move || {
            let reason = bridge.run();
            let _ = tx.send(reason);
            bridge.into_engine()
        });
        Self { exited, handle }
    }

    pub fn join(self) -> E {
        self.handle.join().unwrap()
    }
}

/// Host audio buffers for one callback.
pub struct HostBuffers {
    pub inputs: Vec<Vec<f32>>,
    pub outputs: Vec<Vec<f32>>,
}

impl HostBuffers {
    pub fn new(frames: usize) -> Self {
        Self {
            inputs: vec![vec![0.0; frames]; CHANNELS],
            outputs: vec![vec![0.0; frames]; CHANNELS],
        }
    }

    pub fn fill_input(&mut self, value: f32) {
        for channel in &mut self.inputs {
            channel.fill(value);
        }
    }

    pub fn process(&mut self, processor: &mut Processor, ctx: &ProcessContext<'_>) -> ProcessOutput {
        let frames = self.inputs[0].len();
        let inputs: Vec<&[f32]> = self.inputs.iter().map(|c| c.as_slice()).collect();
        let mut outputs: Vec<&mut [f32]> = self.outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
        let mut audio = AudioBuffer::new(&inputs, &mut outputs, frames);
        processor.process(&mut audio, ctx)
    }
}

/// Run host callbacks until `done` holds or [`SETTLE`] passes. Returns whether it held.
pub fn run_until(
    processor: &mut Processor,
    buffers: &mut HostBuffers,
    mut done: impl FnMut(&mut Processor, &ProcessOutput) -> bool,
) -> bool {
    let deadline = Instant::now() + SETTLE;
    while Instant::now() < deadline {
        let output = buffers.process(processor, &ProcessContext::new());
        if done(processor, &output) {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// Engine that passes audio through and records what the host sent it.
#[derive(Default)]
pub struct Recorder {
    pub parameters: Vec<(usize, f32)>,
    pub chunk: Option<Vec<u8>>,
    pub plug_name: String,
    pub notes: Vec<(u8, u8, u8)>,
    /// Parameter sends to emit on the next tick.
    pub send_parameters: Vec<(usize, f32)>,
    /// Chunk to emit on the next tick.
    pub send_chunk: Option<Vec<u8>>,
}

impl SchedulerEngine for Recorder {
    fn configure(&mut self, _sample_rate: u32, _channels_in: usize, _channels_out: usize) {}

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], outbox: &mut Outbox) {
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            output.copy_from_slice(input);
        }
        for (index, value) in self.send_parameters.drain(..) {
            outbox.send_float(index, value);
        }
        if let Some(chunk) = self.send_chunk.take() {
            outbox.send_chunk(&chunk);
        }
    }

    fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        self.notes.push((channel, pitch, velocity));
    }

    fn parameter(&mut self, index: usize, value: &ParameterValue) -> bool {
        match value.as_float() {
            Some(v) => {
                self.parameters.push((index, v));
                true
            }
            None => false,
        }
    }

    fn chunk(&mut self, data: &[u8]) -> bool {
        self.chunk = Some(data.to_vec());
        true
    }

    fn plug_name(&mut self, name: &str) {
        self.plug_name = name.to_string();
    }
}
