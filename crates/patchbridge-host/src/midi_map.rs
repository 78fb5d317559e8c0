//! Conversion between host events and region MIDI records.

use crate::protocol::{legacy_cc, HostEvent, HostEventKind};
use patchbridge_core::midi::{byte_to_unit, unit_to_byte};
use patchbridge_core::{MidiKind, MidiMessage};

/// Host event to region record. Unknown pseudo controllers yield `None`.
pub fn to_region(event: &HostEvent) -> Option<MidiMessage> {
    let message = match event.kind {
        HostEventKind::NoteOn {
            channel,
            pitch,
            velocity,
        } => MidiMessage::new(MidiKind::NoteOn, channel, pitch, unit_to_byte(velocity)),
        HostEventKind::NoteOff {
            channel,
            pitch,
            velocity,
        } => MidiMessage::new(MidiKind::NoteOff, channel, pitch, unit_to_byte(velocity)),
        HostEventKind::PolyPressure {
            channel,
            pitch,
            pressure,
        } => MidiMessage::new(MidiKind::KeyPressure, channel, pitch, unit_to_byte(pressure)),
        HostEventKind::LegacyCc {
            channel,
            controller,
            value,
            value2,
        } => match controller {
            0..=127 => MidiMessage::new(MidiKind::ControllerChange, channel, controller, value),
            legacy_cc::CHANNEL_PRESSURE => {
                MidiMessage::new(MidiKind::ChannelPressure, channel, value, 0)
            }
            legacy_cc::PITCH_BEND => MidiMessage::new(MidiKind::PitchBend, channel, value, value2),
            legacy_cc::PROGRAM_CHANGE => {
                MidiMessage::new(MidiKind::ProgramChange, channel, value, 0)
            }
            _ => return None,
        },
    };
    Some(message)
}

/// Region record to host event. Note-offs always carry velocity 0.
pub fn from_region(message: &MidiMessage) -> Option<HostEvent> {
    let channel = message.channel();
    let kind = match message.kind() {
        MidiKind::NoteOff => HostEventKind::NoteOff {
            channel,
            pitch: message.data1,
            velocity: 0.0,
        },
        MidiKind::NoteOn => HostEventKind::NoteOn {
            channel,
            pitch: message.data1,
            velocity: byte_to_unit(message.data2),
        },
        MidiKind::KeyPressure => HostEventKind::PolyPressure {
            channel,
            pitch: message.data1,
            pressure: byte_to_unit(message.data2),
        },
        MidiKind::ControllerChange => legacy(channel, message.data1, message.data2, 0),
        MidiKind::ChannelPressure => legacy(channel, legacy_cc::CHANNEL_PRESSURE, message.data1, 0),
        MidiKind::PitchBend => legacy(channel, legacy_cc::PITCH_BEND, message.data1, message.data2),
        MidiKind::ProgramChange => legacy(channel, legacy_cc::PROGRAM_CHANGE, message.data1, 0),
        MidiKind::Other => return None,
    };
    Some(HostEvent::new(0, kind))
}

fn legacy(channel: u8, controller: u8, value: u8, value2: u8) -> HostEventKind {
    HostEventKind::LegacyCc {
        channel,
        controller,
        value,
        value2,
    }
}
