//! Host-facing processing types: the plugin framework hands these in and
//! takes these back on every `process()` call.

use patchbridge_core::{state_flags, TimeInfo};
use smallvec::SmallVec;

const EVENT_STACK_CAPACITY: usize = 128;

/// Pseudo controller numbers carried by legacy CC events.
pub mod legacy_cc {
    pub const CHANNEL_PRESSURE: u8 = 128;
    pub const PITCH_BEND: u8 = 129;
    pub const PROGRAM_CHANGE: u8 = 130;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEventKind {
    NoteOn { channel: u8, pitch: u8, velocity: f32 },
    NoteOff { channel: u8, pitch: u8, velocity: f32 },
    PolyPressure { channel: u8, pitch: u8, pressure: f32 },
    /// Controller numbers above 127 are the pseudo controllers in [`legacy_cc`];
    /// for pitch bend `value` is the LSB and `value2` the MSB.
    LegacyCc { channel: u8, controller: u8, value: u8, value2: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostEvent {
    pub sample_offset: i32,
    pub kind: HostEventKind,
}

impl HostEvent {
    pub fn new(sample_offset: i32, kind: HostEventKind) -> Self {
        Self {
            sample_offset,
            kind,
        }
    }
}

pub type HostEventVec = SmallVec<[HostEvent; EVENT_STACK_CAPACITY]>;

#[derive(Debug, Clone, Copy)]
pub struct ParameterPoint {
    pub sample_offset: i32,
    pub value: f64,
}

/// Automation points for one parameter slot within one callback.
#[derive(Debug, Clone)]
pub struct ParameterQueue {
    pub param_id: u32,
    pub points: Vec<ParameterPoint>,
}

impl ParameterQueue {
    pub fn new(param_id: u32) -> Self {
        Self {
            param_id,
            points: Vec::new(),
        }
    }

    pub fn add_point(&mut self, sample_offset: i32, value: f64) {
        self.points.push(ParameterPoint {
            sample_offset,
            value,
        });
    }

    /// Only the last point of a callback reaches the scheduler.
    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterChanges {
    pub queues: Vec<ParameterQueue>,
}

impl ParameterChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_queue(&mut self, queue: ParameterQueue) {
        self.queues.push(queue);
    }

    /// Shorthand for a single-point queue.
    pub fn set(&mut self, param_id: u32, value: f64) {
        let mut queue = ParameterQueue::new(param_id);
        queue.add_point(0, value);
        self.add_queue(queue);
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn value_of(&self, param_id: u32) -> Option<f64> {
        self.queues
            .iter()
            .rev()
            .find(|q| q.param_id == param_id)
            .and_then(ParameterQueue::last_value)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransportInfo {
    pub playing: bool,
    pub recording: bool,
    pub cycle_active: bool,
    pub tempo: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    pub position_samples: i64,
    pub position_quarters: f64,
    pub bar_position_quarters: f64,
    pub cycle_start_quarters: f64,
    pub cycle_end_quarters: f64,
}

impl Default for TransportInfo {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            cycle_active: false,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            position_samples: 0,
            position_quarters: 0.0,
            bar_position_quarters: 0.0,
            cycle_start_quarters: 0.0,
            cycle_end_quarters: 0.0,
        }
    }
}

impl TransportInfo {
    pub fn to_time_info(&self, sample_rate: f64) -> TimeInfo {
        let mut state = state_flags::TEMPO_VALID
            | state_flags::TIME_SIG_VALID
            | state_flags::PROJECT_TIME_MUSIC_VALID
            | state_flags::BAR_POSITION_VALID
            | state_flags::CYCLE_VALID;
        if self.playing {
            state |= state_flags::PLAYING;
        }
        if self.recording {
            state |= state_flags::RECORDING;
        }
        if self.cycle_active {
            state |= state_flags::CYCLE_ACTIVE;
        }

        let mut info = TimeInfo::new(sample_rate);
        info.state = state;
        info.tempo = self.tempo;
        info.time_sig_numerator = self.time_sig_numerator;
        info.time_sig_denominator = self.time_sig_denominator;
        info.project_time_samples = self.position_samples;
        info.project_time_music = self.position_quarters;
        info.bar_position_music = self.bar_position_quarters;
        info.cycle_start_music = self.cycle_start_quarters;
        info.cycle_end_music = self.cycle_end_quarters;
        info
    }
}

/// Per-channel host audio. Inputs and outputs may have different channel counts.
pub struct AudioBuffer<'a, 'b> {
    pub inputs: &'a [&'b [f32]],
    pub outputs: &'a mut [&'b mut [f32]],
    pub num_samples: usize,
}

impl<'a, 'b> AudioBuffer<'a, 'b> {
    pub fn new(inputs: &'a [&'b [f32]], outputs: &'a mut [&'b mut [f32]], num_samples: usize) -> Self {
        Self {
            inputs,
            outputs,
            num_samples,
        }
    }
}

#[derive(Default)]
pub struct ProcessContext<'a> {
    pub events: &'a [HostEvent],
    pub param_changes: Option<&'a ParameterChanges>,
    pub transport: Option<&'a TransportInfo>,
}

impl<'a> ProcessContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(mut self, events: &'a [HostEvent]) -> Self {
        self.events = events;
        self
    }

    pub fn params(mut self, changes: &'a ParameterChanges) -> Self {
        self.param_changes = Some(changes);
        self
    }

    pub fn transport(mut self, info: &'a TransportInfo) -> Self {
        self.transport = Some(info);
        self
    }
}

/// What the scheduler sent back during one callback.
#[derive(Default)]
pub struct ProcessOutput {
    pub events: HostEventVec,
    pub param_changes: ParameterChanges,
}
