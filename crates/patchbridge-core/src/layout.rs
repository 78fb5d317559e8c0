//! Binary layout of the transfer region shared by the host and scheduler bridges.
//!
//! Everything here is `#[repr(C)]` and valid when zero-filled, because the
//! region is a freshly truncated memory-mapped file when the host creates it.
//! Counts read back from the region are always clamped to the static
//! capacities, since the other process is not trusted to keep them in range.

use crate::mailbox::{Direction, Mailbox};
use crate::midi::MidiQueue;
use crate::time_info::TimeInfo;

pub const MAX_CHANNELS: usize = 16;
pub const MAX_BLOCK_SIZE: usize = 256;
pub const MAX_PARAMETERS: usize = 128;
/// Fixed quantum of the scheduler engine, in frames.
pub const SCHEDULER_BLOCK_SIZE: usize = 64;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const PARAMETER_STRING_CAPACITY: usize = 256;
pub const NAME_CAPACITY: usize = 256;
pub const CHUNK_CAPACITY: usize = 64 * 1024;

pub const LAYOUT_MAGIC: u32 = u32::from_be_bytes(*b"PBRG");
pub const LAYOUT_VERSION: u32 = 1;

/// Length-prefixed UTF-8 text with a fixed capacity.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FixedString<const N: usize> {
    len: u32,
    bytes: [u8; N],
}

impl<const N: usize> FixedString<N> {
    pub const fn new() -> Self {
        Self {
            len: 0,
            bytes: [0; N],
        }
    }

    pub fn from_str_truncated(text: &str) -> Self {
        let mut s = Self::new();
        s.set(text);
        s
    }

    /// Store `text`, truncated on a char boundary. Returns false if it was truncated.
    pub fn set(&mut self, text: &str) -> bool {
        let mut end = text.len().min(N);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.bytes[..end].copy_from_slice(&text.as_bytes()[..end]);
        self.len = end as u32;
        end == text.len()
    }

    /// Invalid UTF-8 written by the other side reads as its longest valid prefix.
    pub fn as_str(&self) -> &str {
        let bytes = &self.bytes[..(self.len as usize).min(N)];
        match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

pub type NameString = FixedString<NAME_CAPACITY>;

/// Opaque preset/state blob.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DataChunk {
    len: u32,
    bytes: [u8; CHUNK_CAPACITY],
}

impl DataChunk {
    /// Replace the contents; returns how many bytes were cut off at capacity.
    pub fn set(&mut self, data: &[u8]) -> usize {
        let len = data.len().min(CHUNK_CAPACITY);
        self.bytes[..len].copy_from_slice(&data[..len]);
        self.len = len as u32;
        data.len() - len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..(self.len as usize).min(CHUNK_CAPACITY)]
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Float = 0,
    String = 1,
}

/// Value carried by a parameter mailbox: a normalized float or a short string.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ParameterValue {
    kind: u32,
    float: f32,
    text: FixedString<PARAMETER_STRING_CAPACITY>,
}

impl ParameterValue {
    pub fn float(value: f32) -> Self {
        Self {
            kind: ParameterKind::Float as u32,
            float: value,
            text: FixedString::new(),
        }
    }

    pub fn string(value: &str) -> Self {
        Self {
            kind: ParameterKind::String as u32,
            float: 0.0,
            text: FixedString::from_str_truncated(value),
        }
    }

    pub fn kind(&self) -> ParameterKind {
        match self.kind {
            1 => ParameterKind::String,
            _ => ParameterKind::Float,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.kind() {
            ParameterKind::Float => Some(self.float),
            ParameterKind::String => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            ParameterKind::String => Some(self.text.as_str()),
            ParameterKind::Float => None,
        }
    }
}

impl Default for ParameterValue {
    fn default() -> Self {
        Self::float(0.0)
    }
}

impl std::fmt::Debug for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            ParameterKind::Float => write!(f, "Float({})", self.float),
            ParameterKind::String => write!(f, "String({:?})", self.text.as_str()),
        }
    }
}

/// Values negotiated when the host creates a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub channels_in: usize,
    pub channels_out: usize,
    pub sample_rate: u32,
    pub block_size: usize,
    pub parameter_count: usize,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            channels_in: 2,
            channels_out: 2,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: SCHEDULER_BLOCK_SIZE,
            parameter_count: 0,
        }
    }
}

#[repr(C)]
pub struct TransferRegion {
    magic: u32,
    version: u32,
    active: u32,
    sync_to_host: u32,
    channels_in: u32,
    channels_out: u32,
    sample_rate: u32,
    block_size: u32,
    parameter_count: u32,
    _reserved: u32,
    pub samples_in: [[f32; MAX_BLOCK_SIZE]; MAX_CHANNELS],
    pub samples_out: [[f32; MAX_BLOCK_SIZE]; MAX_CHANNELS],
    pub parameters: [Mailbox<ParameterValue>; MAX_PARAMETERS],
    pub midi_in: MidiQueue,
    pub midi_out: MidiQueue,
    pub time_info: Mailbox<TimeInfo>,
    pub plug_name: Mailbox<NameString>,
    pub program_name: Mailbox<NameString>,
    pub program_number: Mailbox<f32>,
    pub data_chunk: Mailbox<DataChunk>,
}

impl TransferRegion {
    pub const SIZE: usize = std::mem::size_of::<TransferRegion>();

    /// Stamp a zero-filled region with the session values and mark it active.
    pub fn initialize(&mut self, session: &SessionParams) {
        self.magic = LAYOUT_MAGIC;
        self.version = LAYOUT_VERSION;
        self.channels_in = session.channels_in.min(MAX_CHANNELS) as u32;
        self.channels_out = session.channels_out.min(MAX_CHANNELS) as u32;
        self.sample_rate = session.sample_rate;
        self.block_size = session.block_size.min(MAX_BLOCK_SIZE) as u32;
        self.parameter_count = session.parameter_count.min(MAX_PARAMETERS) as u32;
        self.sync_to_host = 0;
        for slot in self.parameters.iter_mut() {
            slot.reset(Direction::ToScheduler);
        }
        self.midi_in.clear();
        self.midi_out.clear();
        self.active = 1;
    }

    pub fn is_valid_layout(&self) -> bool {
        self.magic == LAYOUT_MAGIC && self.version == LAYOUT_VERSION
    }

    pub fn is_active(&self) -> bool {
        self.active != 0
    }

    /// Flip `active` to false. There is no way back to true short of [`initialize`](Self::initialize).
    pub fn request_shutdown(&mut self) {
        self.active = 0;
    }

    pub fn sync_to_host(&self) -> bool {
        self.sync_to_host != 0
    }

    pub fn set_sync_to_host(&mut self, sync: bool) {
        self.sync_to_host = sync as u32;
    }

    pub fn channels_in(&self) -> usize {
        (self.channels_in as usize).min(MAX_CHANNELS)
    }

    pub fn channels_out(&self) -> usize {
        (self.channels_out as usize).min(MAX_CHANNELS)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
    }

    pub fn block_size(&self) -> usize {
        (self.block_size as usize).min(MAX_BLOCK_SIZE)
    }

    pub fn parameter_count(&self) -> usize {
        (self.parameter_count as usize).min(MAX_PARAMETERS)
    }
}
