//! Engine-originated output, staged during a tick and flushed into the
//! region at the next locked phase.
//!
//! The engine writes through [`Outbox`] (the producer half of an SPSC ring);
//! the bridge drains it with [`OutboxReader::flush`]. Parameter slots still
//! holding an unread host value are not overwritten; those sends are held
//! back and retried on the next flush.

use patchbridge_core::{Direction, MidiMessage, ParameterValue, TransferRegion, MAX_MIDI_QUEUE};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use smallvec::SmallVec;

const DEFAULT_CAPACITY: usize = 2 * MAX_MIDI_QUEUE;

enum Outgoing {
    Midi(MidiMessage),
    Parameter { index: usize, value: ParameterValue },
    Chunk(Vec<u8>),
}

/// Producer half, handed to the engine on every tick.
pub struct Outbox {
    producer: HeapProd<Outgoing>,
    dropped: usize,
}

impl Outbox {
    /// Returns false if the ring is full.
    pub fn send_midi(&mut self, message: MidiMessage) -> bool {
        self.push(Outgoing::Midi(message))
    }

    pub fn send_parameter(&mut self, index: usize, value: ParameterValue) -> bool {
        self.push(Outgoing::Parameter { index, value })
    }

    pub fn send_float(&mut self, index: usize, value: f32) -> bool {
        self.send_parameter(index, ParameterValue::float(value))
    }

    /// Replace the opaque state chunk the host saves with the plugin state.
    pub fn send_chunk(&mut self, data: &[u8]) -> bool {
        self.push(Outgoing::Chunk(data.to_vec()))
    }

    /// Sends refused because the ring was full, since creation.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn push(&mut self, item: Outgoing) -> bool {
        let pushed = self.producer.try_push(item).is_ok();
        if !pushed {
            self.dropped += 1;
        }
        pushed
    }
}

/// Consumer half, owned by the bridge.
pub struct OutboxReader {
    consumer: HeapCons<Outgoing>,
    held_parameters: SmallVec<[(usize, ParameterValue); 8]>,
    held_chunk: Option<Vec<u8>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub midi: usize,
    pub parameters: usize,
    pub held: usize,
    pub dropped_midi: usize,
}

impl OutboxReader {
    /// Move everything staged into the region. Caller holds the transfer mutex.
    pub fn flush(&mut self, region: &mut TransferRegion) -> FlushReport {
        let mut report = FlushReport::default();

        let held = std::mem::take(&mut self.held_parameters);
        for (index, value) in held {
            self.post_parameter(region, index, value, &mut report);
        }
        if let Some(chunk) = self.held_chunk.take() {
            self.post_chunk(region, chunk);
        }

        while let Some(item) = self.consumer.try_pop() {
            match item {
                Outgoing::Midi(message) => {
                    if region.midi_out.push(message) {
                        report.midi += 1;
                    } else {
                        report.dropped_midi += 1;
                    }
                }
                Outgoing::Parameter { index, value } => {
                    self.post_parameter(region, index, value, &mut report)
                }
                Outgoing::Chunk(chunk) => self.post_chunk(region, chunk),
            }
        }

        if report.dropped_midi > 0 {
            tracing::warn!(dropped = report.dropped_midi, "MIDI output queue full, events dropped");
        }
        report.held = self.held_parameters.len();
        report
    }

    fn post_parameter(
        &mut self,
        region: &mut TransferRegion,
        index: usize,
        value: ParameterValue,
        report: &mut FlushReport,
    ) {
        if index >= region.parameter_count() {
            tracing::trace!(index, "Parameter index out of range, send dropped");
            return;
        }
        let mailbox = &mut region.parameters[index];
        if mailbox.is_pending(Direction::ToScheduler) {
            // Newest send for a slot wins.
            match self.held_parameters.iter_mut().find(|(i, _)| *i == index) {
                Some(slot) => slot.1 = value,
                None => self.held_parameters.push((index, value)),
            }
            return;
        }
        mailbox.post(Direction::ToHost, value);
        report.parameters += 1;
    }

    fn post_chunk(&mut self, region: &mut TransferRegion, chunk: Vec<u8>) {
        if region.data_chunk.is_pending(Direction::ToScheduler) {
            self.held_chunk = Some(chunk);
            return;
        }
        region.data_chunk.post_with(Direction::ToHost, |slot| {
            let cut = slot.set(&chunk);
            if cut > 0 {
                tracing::warn!(cut, "Engine chunk larger than the region, truncated");
            }
        });
    }

    pub fn pending(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn held(&self) -> usize {
        self.held_parameters.len() + usize::from(self.held_chunk.is_some())
    }
}

pub fn channel() -> (Outbox, OutboxReader) {
    channel_with_capacity(DEFAULT_CAPACITY)
}

pub fn channel_with_capacity(capacity: usize) -> (Outbox, OutboxReader) {
    let rb = HeapRb::new(capacity);
    let (producer, consumer) = rb.split();
    (
        Outbox {
            producer,
            dropped: 0,
        },
        OutboxReader {
            consumer,
            held_parameters: SmallVec::new(),
            held_chunk: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbridge_core::{MidiKind, SessionParams, TransferMap};
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn map() -> TransferMap {
        let name = format!(
            "test_outbox_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let session = SessionParams {
            parameter_count: 8,
            ..Default::default()
        };
        TransferMap::create(&name, &session).unwrap()
    }

    #[test]
    fn test_flush_posts_to_host() {
        let (mut outbox, mut reader) = channel();
        let map = map();
        let region = unsafe { map.region_mut() };

        assert!(outbox.send_float(3, 0.25));
        assert!(outbox.send_midi(MidiMessage::new(MidiKind::NoteOn, 1, 60, 100)));
        assert!(outbox.send_chunk(b"patch"));
        assert_eq!(reader.pending(), 3);

        let report = reader.flush(region);
        assert_eq!(report.parameters, 1);
        assert_eq!(report.midi, 1);

        assert_eq!(
            region.parameters[3].take(Direction::ToHost).and_then(|v| v.as_float()),
            Some(0.25)
        );
        assert_eq!(region.midi_out.len(), 1);
        assert_eq!(region.data_chunk.take(Direction::ToHost).map(|c| c.len()), Some(5));
    }

    #[test]
    fn test_unread_host_value_holds_send() {
        let (mut outbox, mut reader) = channel();
        let map = map();
        let region = unsafe { map.region_mut() };
        region.parameters[2].post(Direction::ToScheduler, ParameterValue::float(0.9));

        outbox.send_float(2, 0.1);
        outbox.send_float(2, 0.2);
        let report = reader.flush(region);
        assert_eq!(report.parameters, 0);
        assert_eq!(report.held, 1);
        assert_eq!(
            region.parameters[2].take(Direction::ToScheduler).and_then(|v| v.as_float()),
            Some(0.9)
        );

        let report = reader.flush(region);
        assert_eq!(report.parameters, 1);
        assert_eq!(reader.held(), 0);
        assert_eq!(
            region.parameters[2].take(Direction::ToHost).and_then(|v| v.as_float()),
            Some(0.2)
        );
    }

    #[test]
    fn test_out_of_range_parameter_dropped() {
        let (mut outbox, mut reader) = channel();
        let map = map();
        let region = unsafe { map.region_mut() };
        outbox.send_float(100, 1.0);
        let report = reader.flush(region);
        assert_eq!(report.parameters, 0);
        assert_eq!(reader.held(), 0);
    }

    #[test]
    fn test_full_ring_refuses() {
        let (mut outbox, _reader) = channel_with_capacity(2);
        let message = MidiMessage::new(MidiKind::NoteOff, 0, 60, 0);
        assert!(outbox.send_midi(message));
        assert!(outbox.send_midi(message));
        assert!(!outbox.send_midi(message));
        assert_eq!(outbox.dropped(), 1);
    }
}
