//! MIDI records and the bounded queues that carry them through the region.

use smallvec::SmallVec;

pub const MAX_MIDI_QUEUE: usize = 1024;

/// Channel-voice message kinds, plus a catch-all that no side acts on.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MidiKind {
    NoteOff = 0,
    NoteOn = 1,
    KeyPressure = 2,
    ControllerChange = 3,
    ProgramChange = 4,
    ChannelPressure = 5,
    PitchBend = 6,
    #[default]
    Other = 7,
}

impl MidiKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::NoteOff,
            1 => Self::NoteOn,
            2 => Self::KeyPressure,
            3 => Self::ControllerChange,
            4 => Self::ProgramChange,
            5 => Self::ChannelPressure,
            6 => Self::PitchBend,
            _ => Self::Other,
        }
    }

    /// Kind from the high nibble of a status byte.
    pub fn from_status(status: u8) -> Self {
        match status & 0xF0 {
            0x80 => Self::NoteOff,
            0x90 => Self::NoteOn,
            0xA0 => Self::KeyPressure,
            0xB0 => Self::ControllerChange,
            0xC0 => Self::ProgramChange,
            0xD0 => Self::ChannelPressure,
            0xE0 => Self::PitchBend,
            _ => Self::Other,
        }
    }

    pub fn status_nibble(self) -> u8 {
        match self {
            Self::NoteOff => 0x80,
            Self::NoteOn => 0x90,
            Self::KeyPressure => 0xA0,
            Self::ControllerChange => 0xB0,
            Self::ProgramChange => 0xC0,
            Self::ChannelPressure => 0xD0,
            Self::PitchBend => 0xE0,
            Self::Other => 0xF0,
        }
    }
}

/// One MIDI record as laid out in shared memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MidiMessage {
    kind: u32,
    channel: u32,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    _reserved: u8,
}

impl MidiMessage {
    pub fn new(kind: MidiKind, channel: u8, data1: u8, data2: u8) -> Self {
        let channel = channel & 0x0F;
        Self {
            kind: kind as u32,
            channel: channel as u32,
            status: kind.status_nibble() | channel,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
            _reserved: 0,
        }
    }

    /// Build from raw bytes: status nibble + channel nibble, two data bytes.
    pub fn from_bytes(status: u8, data1: u8, data2: u8) -> Self {
        let kind = MidiKind::from_status(status);
        Self {
            kind: kind as u32,
            channel: (status & 0x0F) as u32,
            status,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
            _reserved: 0,
        }
    }

    pub fn kind(&self) -> MidiKind {
        MidiKind::from_raw(self.kind)
    }

    pub fn channel(&self) -> u8 {
        (self.channel & 0x0F) as u8
    }

    /// 14-bit pitch bend value, `data2` being the most significant seven bits.
    pub fn pitch_bend(&self) -> u16 {
        ((self.data2 as u16 & 0x7F) << 7) | (self.data1 as u16 & 0x7F)
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.status, self.data1, self.data2]
    }
}

/// Map a normalized velocity/pressure in `[0, 1]` to a MIDI data byte.
///
/// Truncates, so `0.999` maps to 126.
pub fn unit_to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 127.0) as u8
}

/// Map a MIDI data byte to a normalized value in `[0, 1]`.
pub fn byte_to_unit(value: u8) -> f32 {
    (value & 0x7F) as f32 / 127.0
}

/// Single-shot mailbox of MIDI records: appended by one side, flushed and
/// reset by the other on every successful drain.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct MidiQueue {
    updated: u32,
    size: u32,
    messages: [MidiMessage; MAX_MIDI_QUEUE],
}

impl MidiQueue {
    pub const fn new() -> Self {
        Self {
            updated: 0,
            size: 0,
            messages: [MidiMessage {
                kind: MidiKind::Other as u32,
                channel: 0,
                status: 0,
                data1: 0,
                data2: 0,
                _reserved: 0,
            }; MAX_MIDI_QUEUE],
        }
    }

    /// Append a record. Returns false (and drops the record) when the queue is full.
    pub fn push(&mut self, message: MidiMessage) -> bool {
        let len = self.len();
        if len >= MAX_MIDI_QUEUE {
            return false;
        }
        self.messages[len] = message;
        self.size = (len + 1) as u32;
        self.updated = 1;
        true
    }

    /// Append as many records as fit; returns how many were dropped.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = MidiMessage>) -> usize {
        let mut dropped = 0;
        for message in messages {
            if !self.push(message) {
                dropped += 1;
            }
        }
        dropped
    }

    pub fn is_updated(&self) -> bool {
        self.updated != 0
    }

    /// Number of records, clamped to capacity whatever the other side wrote.
    pub fn len(&self) -> usize {
        (self.size as usize).min(MAX_MIDI_QUEUE)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn messages(&self) -> &[MidiMessage] {
        &self.messages[..self.len()]
    }

    /// Take every pending record and reset the queue.
    pub fn drain(&mut self) -> SmallVec<[MidiMessage; 64]> {
        if !self.is_updated() {
            return SmallVec::new();
        }
        let drained = SmallVec::from_slice(self.messages());
        self.clear();
        drained
    }

    pub fn clear(&mut self) {
        self.size = 0;
        self.updated = 0;
    }
}

impl Default for MidiQueue {
    fn default() -> Self {
        Self::new()
    }
}
