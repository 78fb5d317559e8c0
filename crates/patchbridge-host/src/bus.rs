//! Stereo bus topology.
//!
//! Channels are grouped into stereo pairs; an odd trailing channel is dropped.

/// Channel count exposed by bus `index`: buses are stereo pairs, so bus `i`
/// ends at channel `2 * (i + 1)`.
pub fn channels_through_bus(index: usize) -> usize {
    2 * (index + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusLayout {
    stereo_buses: usize,
}

impl BusLayout {
    pub fn new(stereo_buses: usize) -> Self {
        Self { stereo_buses }
    }

    /// Largest stereo-bus layout that fits `channels`. Odd remainders are truncated.
    pub fn from_channels(channels: usize) -> Self {
        Self::new(channels / 2)
    }

    pub fn stereo_buses(&self) -> usize {
        self.stereo_buses
    }

    pub fn channels(&self) -> usize {
        match self.stereo_buses {
            0 => 0,
            n => channels_through_bus(n - 1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stereo_buses == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_mapping() {
        assert_eq!(channels_through_bus(0), 2);
        assert_eq!(channels_through_bus(2), 6);

        let layout = BusLayout::new(3);
        assert_eq!(layout.channels(), 6);
        assert!(!layout.is_empty());
    }

    #[test]
    fn test_zero_buses() {
        let layout = BusLayout::new(0);
        assert_eq!(layout.channels(), 0);
        assert!(layout.is_empty());
    }

    #[test]
    fn test_odd_channels_truncate() {
        assert_eq!(BusLayout::from_channels(5).channels(), 4);
        assert_eq!(BusLayout::from_channels(1).channels(), 0);
        assert_eq!(BusLayout::from_channels(6), BusLayout::new(3));
    }
}
