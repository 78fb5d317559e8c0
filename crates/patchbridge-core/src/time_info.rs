//! Transport snapshot copied from the host every callback.

use serde::{Deserialize, Serialize};

/// Bit flags of [`TimeInfo::state`].
pub mod state_flags {
    pub const PLAYING: u32 = 1 << 1;
    pub const CYCLE_ACTIVE: u32 = 1 << 2;
    pub const RECORDING: u32 = 1 << 3;
    pub const SYSTEM_TIME_VALID: u32 = 1 << 8;
    pub const PROJECT_TIME_MUSIC_VALID: u32 = 1 << 9;
    pub const TEMPO_VALID: u32 = 1 << 10;
    pub const BAR_POSITION_VALID: u32 = 1 << 11;
    pub const CYCLE_VALID: u32 = 1 << 12;
    pub const TIME_SIG_VALID: u32 = 1 << 13;
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeInfo {
    pub sample_rate: f64,
    pub project_time_samples: i64,
    pub project_time_music: f64,
    pub bar_position_music: f64,
    pub cycle_start_music: f64,
    pub cycle_end_music: f64,
    pub tempo: f64,
    pub state: u32,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    _reserved: u32,
}

impl TimeInfo {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            ..Default::default()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state & state_flags::PLAYING != 0
    }

    pub fn is_recording(&self) -> bool {
        self.state & state_flags::RECORDING != 0
    }

    pub fn is_cycle_active(&self) -> bool {
        self.state & state_flags::CYCLE_ACTIVE != 0
    }
}

/// The transport fields the scheduler forwards to its engine individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportField {
    State,
    Tempo,
    ProjectTimeMusic,
    BarPositionMusic,
    TimeSigNumerator,
    TimeSigDenominator,
}

impl TransportField {
    pub const ALL: [TransportField; 6] = [
        TransportField::State,
        TransportField::Tempo,
        TransportField::ProjectTimeMusic,
        TransportField::BarPositionMusic,
        TransportField::TimeSigNumerator,
        TransportField::TimeSigDenominator,
    ];

    pub fn get(self, info: &TimeInfo) -> f64 {
        match self {
            TransportField::State => info.state as f64,
            TransportField::Tempo => info.tempo,
            TransportField::ProjectTimeMusic => info.project_time_music,
            TransportField::BarPositionMusic => info.bar_position_music,
            TransportField::TimeSigNumerator => info.time_sig_numerator as f64,
            TransportField::TimeSigDenominator => info.time_sig_denominator as f64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TransportField::State => "state",
            TransportField::Tempo => "tempo",
            TransportField::ProjectTimeMusic => "projectTimeMusic",
            TransportField::BarPositionMusic => "barPositionMusic",
            TransportField::TimeSigNumerator => "timeSigNumerator",
            TransportField::TimeSigDenominator => "timeSigDenominator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_flags() {
        let mut info = TimeInfo::new(48000.0);
        assert!(!info.is_playing());

        info.state = state_flags::PLAYING | state_flags::TEMPO_VALID;
        assert!(info.is_playing());
        assert!(!info.is_recording());
        assert!(!info.is_cycle_active());
    }

    #[test]
    fn test_transport_field_get() {
        let mut info = TimeInfo::new(44100.0);
        info.tempo = 93.5;
        info.time_sig_numerator = 7;
        info.time_sig_denominator = 8;

        assert_eq!(TransportField::Tempo.get(&info), 93.5);
        assert_eq!(TransportField::TimeSigNumerator.get(&info), 7.0);
        assert_eq!(TransportField::TimeSigDenominator.get(&info), 8.0);
        assert_eq!(TransportField::ALL.len(), 6);
    }
}
