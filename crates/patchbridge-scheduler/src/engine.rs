//! Interface the scripting engine implements to be driven by the bridge.

use crate::outbox::Outbox;
use patchbridge_core::{ParameterValue, TransportField, SCHEDULER_BLOCK_SIZE};

/// A scheduler engine, ticked once per quantum by [`SchedulerBridge`](crate::SchedulerBridge).
///
/// Event hooks default to no-ops. Hooks returning `bool` report whether the
/// engine has a receiver for the value. Parameters and chunks are consumed
/// either way; only a refused transport field is offered again.
pub trait SchedulerEngine: Send {
    /// Frames per tick. Audio is only exchanged when this matches the region's quantum.
    fn block_size(&self) -> usize {
        SCHEDULER_BLOCK_SIZE
    }

    fn configure(&mut self, sample_rate: u32, channels_in: usize, channels_out: usize);

    fn sample_rate_changed(&mut self, _sample_rate: u32) {}

    /// Run one tick. `inputs`/`outputs` hold `block_size()` frames per channel.
    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], outbox: &mut Outbox);

    /// Velocity 0 means note off.
    fn note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {}

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) {}

    fn program_change(&mut self, _channel: u8, _program: u8) {}

    /// 14-bit value, 8192 is centered.
    fn pitch_bend(&mut self, _channel: u8, _value: u16) {}

    fn aftertouch(&mut self, _channel: u8, _pressure: u8) {}

    fn poly_aftertouch(&mut self, _channel: u8, _pitch: u8, _pressure: u8) {}

    fn parameter(&mut self, _index: usize, _value: &ParameterValue) -> bool {
        false
    }

    fn chunk(&mut self, _data: &[u8]) -> bool {
        false
    }

    fn transport(&mut self, _field: TransportField, _value: f64) -> bool {
        false
    }

    fn plug_name(&mut self, _name: &str) {}

    fn program_name(&mut self, _name: &str) {}

    fn program_number(&mut self, _number: f32) {}
}

/// Copies inputs to outputs; extra output channels are silent.
#[derive(Debug, Default)]
pub struct PassThrough {
    sample_rate: u32,
}

impl PassThrough {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl SchedulerEngine for PassThrough {
    fn configure(&mut self, sample_rate: u32, channels_in: usize, channels_out: usize) {
        self.sample_rate = sample_rate;
        tracing::debug!(sample_rate, channels_in, channels_out, "Pass-through engine configured");
    }

    fn sample_rate_changed(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], _outbox: &mut Outbox) {
        for (ch, output) in outputs.iter_mut().enumerate() {
            match inputs.get(ch) {
                Some(input) => {
                    let frames = input.len().min(output.len());
                    output[..frames].copy_from_slice(&input[..frames]);
                    output[frames..].fill(0.0);
                }
                None => output.fill(0.0),
            }
        }
    }
}
