//! The scheduler-side bridge.
//!
//! Each iteration of [`SchedulerBridge::step`]:
//! 1. Probe the host process; exit if it is gone.
//! 2. Under the transfer mutex: check `active`, apply a sample-rate change,
//!    hand host mailboxes (names, chunk, transport, MIDI, parameters) to
//!    the engine, then flush the engine's outbox into the region.
//! 3. When synced to the host, wait for the host's quantum, tick the engine
//!    on it and signal back. Otherwise tick at wall-clock pace.
//!
//! Audio samples are exchanged without the mutex: the two handoff events
//! keep host and scheduler off the sample arrays at the same time. While
//! free-running nothing orders the two sides, and a tick may read a
//! quantum the host is still writing.

use crate::engine::SchedulerEngine;
use crate::liveness::HostProbe;
use crate::outbox::{self, Outbox, OutboxReader};
use patchbridge_core::{
    timeouts, Direction, IpcNames, MidiKind, MidiMessage, Result, TransferMap, TransferRegion,
    TransferSync, TransportField, MAX_CHANNELS,
};
use smallvec::SmallVec;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The host cleared `active`.
    Shutdown,
    /// The host process died without shutting down.
    HostGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Exit(ExitReason),
}

pub struct SchedulerBridge<E: SchedulerEngine> {
    engine: E,
    names: IpcNames,
    map: TransferMap,
    sync: TransferSync,
    probe: HostProbe,
    outbox: Outbox,
    reader: OutboxReader,
    sample_rate: u32,
    /// Last transport value the engine accepted, per field.
    transport: [Option<f64>; TransportField::ALL.len()],
    inputs: Vec<Vec<f32>>,
    outputs: Vec<Vec<f32>>,
    ticks: u64,
    desynced: bool,
    mismatch_logged: bool,
}

impl<E: SchedulerEngine> SchedulerBridge<E> {
    /// Attach to the region and primitives the host created under `names`.
    pub fn open(names: &IpcNames, mut engine: E) -> Result<Self> {
        let map = TransferMap::open(&names.region)?;
        let sync = TransferSync::open(names)?;

        let region = map.region();
        let sample_rate = region.sample_rate();
        let channels_in = region.channels_in();
        let channels_out = region.channels_out();
        engine.configure(sample_rate, channels_in, channels_out);

        let block_size = engine.block_size();
        let mismatch = block_size != region.block_size();
        if mismatch {
            tracing::warn!(
                engine = block_size,
                region = region.block_size(),
                "Engine block size differs from the transfer quantum, audio will not be exchanged"
            );
        }

        tracing::info!(
            region = %names.region,
            host_pid = names.host_pid,
            sample_rate,
            channels_in,
            channels_out,
            "Attached to host bridge"
        );

        let (outbox, reader) = outbox::channel();
        Ok(Self {
            engine,
            names: names.clone(),
            probe: HostProbe::new(names.host_pid),
            outbox,
            reader,
            sample_rate,
            transport: [None; TransportField::ALL.len()],
            inputs: vec![vec![0.0; block_size]; channels_in],
            outputs: vec![vec![0.0; block_size]; channels_out],
            ticks: 0,
            desynced: false,
            mismatch_logged: mismatch,
            map,
            sync,
        })
    }

    /// Run until the host shuts down or disappears.
    pub fn run(&mut self) -> ExitReason {
        loop {
            let Step::Exit(reason) = self.step() else {
                continue;
            };
            match reason {
                ExitReason::Shutdown => {
                    tracing::info!(ticks = self.ticks, "Host requested shutdown");
                }
                ExitReason::HostGone => {
                    tracing::warn!(
                        pid = self.names.host_pid,
                        "Host process gone, removing its IPC objects"
                    );
                    TransferSync::unlink(&self.names);
                    TransferMap::unlink(&self.names.region);
                }
            }
            return reason;
        }
    }

    /// One loop iteration: locked mailbox exchange, then one engine tick.
    pub fn step(&mut self) -> Step {
        if !self.probe.is_alive() {
            return Step::Exit(ExitReason::HostGone);
        }

        let synced = {
            let Some(_guard) = self.sync.mutex.lock(timeouts::INFINITE) else {
                tracing::warn!("Transfer mutex not acquired, skipping iteration");
                return Step::Continue;
            };
            // SAFETY: guarded by the transfer mutex.
            let region = unsafe { self.map.region_mut() };
            if !region.is_active() {
                // Acknowledge, so the host can tear down.
                self.sync.scheduler_ready.signal();
                return Step::Exit(ExitReason::Shutdown);
            }

            if region.sample_rate() != self.sample_rate && region.sample_rate() > 0 {
                self.sample_rate = region.sample_rate();
                tracing::debug!(sample_rate = self.sample_rate, "Sample rate changed");
                self.engine.sample_rate_changed(self.sample_rate);
            }

            consume_host_mailboxes(&mut self.engine, &mut self.transport, region);
            self.reader.flush(region);
            region.sync_to_host()
        };

        if synced {
            if self.sync.host_ready.wait(timeouts::SCHEDULER_HANDOFF) {
                if self.desynced {
                    tracing::info!("Host handoffs resumed");
                    self.desynced = false;
                }
            } else {
                self.desync();
            }
            self.sync.host_ready.clear();
            self.tick();
            self.sync.scheduler_ready.signal();
        } else {
            self.tick();
            std::thread::sleep(self.pace());
        }
        Step::Continue
    }

    /// Leave synced mode after a missed handoff. The host turns it back on
    /// with its next callback.
    fn desync(&mut self) {
        if let Some(_guard) = self.sync.mutex.lock(timeouts::SCHEDULER_DESYNC_LOCK) {
            // SAFETY: guarded by the transfer mutex.
            unsafe { self.map.region_mut() }.set_sync_to_host(false);
        }
        if !self.desynced {
            tracing::warn!("Host handoff timed out, free-running");
            self.desynced = true;
        }
    }

    fn tick(&mut self) {
        // SAFETY: the host leaves the sample arrays alone between its
        // handoff signal and ours.
        let region = unsafe { self.map.region_mut() };
        let block = self.engine.block_size();
        let exchange = block == region.block_size();

        for (ch, input) in self.inputs.iter_mut().enumerate() {
            if exchange {
                input.copy_from_slice(&region.samples_in[ch][..block]);
            } else {
                input.fill(0.0);
            }
        }

        {
            let inputs: SmallVec<[&[f32]; MAX_CHANNELS]> =
                self.inputs.iter().map(|b| b.as_slice()).collect();
            let mut outputs: SmallVec<[&mut [f32]; MAX_CHANNELS]> =
                self.outputs.iter_mut().map(|b| b.as_mut_slice()).collect();
            self.engine.process(&inputs, &mut outputs, &mut self.outbox);
        }

        if exchange {
            for (ch, output) in self.outputs.iter().enumerate() {
                region.samples_out[ch][..block].copy_from_slice(output);
            }
        } else if !self.mismatch_logged {
            tracing::warn!(block, "Block size mismatch, audio exchange skipped");
            self.mismatch_logged = true;
        }

        self.ticks += 1;
        tracing::trace!(ticks = self.ticks, "Tick");
    }

    /// Free-running interval: one block's duration, at least 1ms.
    fn pace(&self) -> Duration {
        let block = self.engine.block_size() as f64;
        let millis = block / self.sample_rate.max(1) as f64 * 1000.0;
        Duration::from_millis((millis as u64).max(1))
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    pub fn names(&self) -> &IpcNames {
        &self.names
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_desynced(&self) -> bool {
        self.desynced
    }
}

fn consume_host_mailboxes<E: SchedulerEngine>(
    engine: &mut E,
    accepted: &mut [Option<f64>; TransportField::ALL.len()],
    region: &mut TransferRegion,
) {
    if let Some(name) = region.plug_name.take(Direction::ToScheduler) {
        engine.plug_name(name.as_str());
    }
    if let Some(name) = region.program_name.take(Direction::ToScheduler) {
        engine.program_name(name.as_str());
    }
    if let Some(number) = region.program_number.take(Direction::ToScheduler) {
        engine.program_number(number);
    }
    region.data_chunk.consume(Direction::ToScheduler, |chunk| {
        if !engine.chunk(chunk.as_bytes()) {
            tracing::trace!(len = chunk.len(), "No receiver for state chunk");
        }
        true
    });

    if let Some(info) = region.time_info.take(Direction::ToScheduler) {
        let mut refused = false;
        for (field, last) in TransportField::ALL.iter().zip(accepted.iter_mut()) {
            let value = field.get(&info);
            if *last == Some(value) {
                continue;
            }
            if engine.transport(*field, value) {
                *last = Some(value);
            } else {
                refused = true;
            }
        }
        if refused {
            region.time_info.rearm();
        }
    }

    for message in region.midi_in.drain() {
        dispatch_midi(engine, &message);
    }

    for slot in 0..region.parameter_count() {
        if let Some(value) = region.parameters[slot].take(Direction::ToScheduler) {
            if !engine.parameter(slot, &value) {
                tracing::trace!(slot, "No receiver for parameter");
            }
        }
    }
}

fn dispatch_midi<E: SchedulerEngine>(engine: &mut E, message: &MidiMessage) {
    let channel = message.channel();
    match message.kind() {
        MidiKind::NoteOff => engine.note_on(channel, message.data1, 0),
        MidiKind::NoteOn => engine.note_on(channel, message.data1, message.data2),
        MidiKind::KeyPressure => engine.poly_aftertouch(channel, message.data1, message.data2),
        MidiKind::ControllerChange => engine.control_change(channel, message.data1, message.data2),
        MidiKind::ProgramChange => engine.program_change(channel, message.data1),
        MidiKind::ChannelPressure => engine.aftertouch(channel, message.data1),
        MidiKind::PitchBend => engine.pitch_bend(channel, message.pitch_bend()),
        MidiKind::Other => tracing::trace!(status = message.status, "Ignoring MIDI message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbridge_core::{NameString, ParameterValue, SessionParams, TimeInfo};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    #[derive(Default)]
    struct Recorder {
        block_size: Option<usize>,
        sample_rate: u32,
        accept_parameters: bool,
        parameters: Vec<(usize, f32)>,
        notes: Vec<(u8, u8, u8)>,
        bends: Vec<u16>,
        tempo_calls: usize,
        tempo: Option<f64>,
        plug_name: String,
        pending_send: Option<(usize, f32)>,
    }

    impl SchedulerEngine for Recorder {
        fn block_size(&self) -> usize {
            self.block_size.unwrap_or(patchbridge_core::SCHEDULER_BLOCK_SIZE)
        }

        fn configure(&mut self, sample_rate: u32, _channels_in: usize, _channels_out: usize) {
            self.sample_rate = sample_rate;
        }

        fn sample_rate_changed(&mut self, sample_rate: u32) {
            self.sample_rate = sample_rate;
        }

        fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], outbox: &mut Outbox) {
            for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
                output.copy_from_slice(input);
            }
            if let Some((index, value)) = self.pending_send.take() {
                outbox.send_float(index, value);
            }
        }

        fn note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
            self.notes.push((channel, pitch, velocity));
        }

        fn pitch_bend(&mut self, _channel: u8, value: u16) {
            self.bends.push(value);
        }

        fn parameter(&mut self, index: usize, value: &ParameterValue) -> bool {
            if self.accept_parameters {
                self.parameters.push((index, value.as_float().unwrap_or(f32::NAN)));
            }
            self.accept_parameters
        }

        fn transport(&mut self, field: TransportField, value: f64) -> bool {
            if field != TransportField::Tempo {
                return false;
            }
            self.tempo_calls += 1;
            self.tempo = Some(value);
            true
        }

        fn plug_name(&mut self, name: &str) {
            self.plug_name = name.to_string();
        }
    }

    /// Host-side objects plus a scheduler bridge attached to them.
    struct Fixture {
        names: IpcNames,
        host_map: TransferMap,
        host_sync: TransferSync,
        bridge: SchedulerBridge<Recorder>,
    }

    impl Fixture {
        fn new(engine: Recorder) -> Self {
            let names = IpcNames::for_instance(
                std::process::id(),
                0x5000 + COUNTER.fetch_add(1, Ordering::Relaxed),
            );
            let host_sync = TransferSync::create(&names).unwrap();
            let session = SessionParams {
                parameter_count: 4,
                ..Default::default()
            };
            let host_map = TransferMap::create(&names.region, &session).unwrap();
            let bridge = SchedulerBridge::open(&names, engine).unwrap();
            Self {
                names,
                host_map,
                host_sync,
                bridge,
            }
        }

        fn region(&self) -> &mut TransferRegion {
            unsafe { self.host_map.region_mut() }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            TransferSync::unlink(&self.names);
        }
    }

    #[test]
    fn test_parameter_delivered_once() {
        let mut f = Fixture::new(Recorder {
            accept_parameters: true,
            ..Default::default()
        });
        f.region().parameters[1].post(Direction::ToScheduler, ParameterValue::float(0.5));

        assert_eq!(f.bridge.step(), Step::Continue);
        f.bridge.step();
        assert_eq!(f.bridge.engine().parameters, vec![(1, 0.5)]);
        assert!(!f.region().parameters[1].is_pending(Direction::ToScheduler));
    }

    #[test]
    fn test_refused_parameter_is_consumed() {
        let mut f = Fixture::new(Recorder {
            pending_send: Some((1, 0.25)),
            ..Default::default()
        });
        f.region().parameters[1].post(Direction::ToScheduler, ParameterValue::float(0.5));

        f.bridge.step();
        assert!(!f.region().parameters[1].is_pending(Direction::ToScheduler));
        assert!(f.bridge.engine().parameters.is_empty());

        // The slot is free again, so the engine's own send gets through.
        f.bridge.step();
        assert_eq!(
            f.region().parameters[1].take(Direction::ToHost).and_then(|v| v.as_float()),
            Some(0.25)
        );
    }

    #[test]
    fn test_refused_chunk_is_consumed() {
        let mut f = Fixture::new(Recorder::default());
        f.region().data_chunk.post_with(Direction::ToScheduler, |chunk| {
            chunk.set(b"scene");
        });

        f.bridge.step();
        assert!(!f.region().data_chunk.is_pending(Direction::ToScheduler));
    }

    #[test]
    fn test_midi_dispatch() {
        let mut f = Fixture::new(Recorder::default());
        let region = f.region();
        region.midi_in.push(MidiMessage::new(MidiKind::NoteOff, 2, 60, 64));
        region.midi_in.push(MidiMessage::from_bytes(0xE0, 0x00, 0x40));
        region.midi_in.push(MidiMessage::from_bytes(0xF8, 0, 0));

        f.bridge.step();
        assert_eq!(f.bridge.engine().notes, vec![(2, 60, 0)]);
        assert_eq!(f.bridge.engine().bends, vec![8192]);
        assert!(!f.region().midi_in.is_updated());
    }

    #[test]
    fn test_transport_forwards_changed_fields() {
        let mut f = Fixture::new(Recorder::default());
        let mut info = TimeInfo::new(48000.0);
        info.tempo = 133.0;
        f.region().time_info.post(Direction::ToScheduler, info);

        f.bridge.step();
        assert_eq!(f.bridge.engine().tempo, Some(133.0));
        // Other fields have no receiver, so the snapshot stays armed.
        assert!(f.region().time_info.is_pending(Direction::ToScheduler));

        f.bridge.step();
        assert_eq!(f.bridge.engine().tempo_calls, 1);
    }

    #[test]
    fn test_engine_output_reaches_host() {
        let mut f = Fixture::new(Recorder {
            pending_send: Some((2, 0.75)),
            ..Default::default()
        });
        f.region()
            .plug_name
            .post(Direction::ToScheduler, NameString::from_str_truncated("Demo"));

        // Sent during the first tick, flushed at the second locked phase.
        f.bridge.step();
        assert_eq!(f.bridge.engine().plug_name, "Demo");
        f.bridge.step();
        assert_eq!(
            f.region().parameters[2].take(Direction::ToHost).and_then(|v| v.as_float()),
            Some(0.75)
        );
    }

    #[test]
    fn test_free_running_exchanges_audio() {
        let mut f = Fixture::new(Recorder::default());
        f.region().samples_in[0][..64].fill(0.25);

        f.bridge.step();
        assert_eq!(f.bridge.ticks(), 1);
        assert!(f.region().samples_out[0][..64].iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_block_size_mismatch_skips_exchange() {
        let mut f = Fixture::new(Recorder {
            block_size: Some(32),
            ..Default::default()
        });
        f.region().samples_in[0][..64].fill(0.25);

        f.bridge.step();
        assert_eq!(f.bridge.ticks(), 1);
        assert!(f.region().samples_out[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sample_rate_change_reaches_engine() {
        let mut f = Fixture::new(Recorder::default());
        assert_eq!(f.bridge.engine().sample_rate, 48000);
        f.region().set_sample_rate(96000);
        f.bridge.step();
        assert_eq!(f.bridge.engine().sample_rate, 96000);
    }

    #[test]
    fn test_synced_handoff_signals_host() {
        let mut f = Fixture::new(Recorder::default());
        f.region().set_sync_to_host(true);
        // host_ready starts signaled.
        f.bridge.step();
        assert!(f.host_sync.scheduler_ready.wait(Duration::from_millis(10)));
        assert!(f.region().sync_to_host());
        assert!(!f.bridge.is_desynced());
    }

    #[test]
    fn test_missed_handoff_desyncs() {
        let mut f = Fixture::new(Recorder::default());
        f.region().set_sync_to_host(true);
        f.host_sync.host_ready.clear();

        f.bridge.step();
        assert!(!f.region().sync_to_host());
        assert!(f.bridge.is_desynced());
        assert_eq!(f.bridge.ticks(), 1);
    }

    #[test]
    fn test_inactive_region_exits() {
        let mut f = Fixture::new(Recorder::default());
        f.region().request_shutdown();
        f.host_sync.scheduler_ready.clear();
        assert_eq!(f.bridge.step(), Step::Exit(ExitReason::Shutdown));
        assert!(f.host_sync.scheduler_ready.wait(Duration::ZERO));
        assert_eq!(f.bridge.run(), ExitReason::Shutdown);
        assert_eq!(f.bridge.ticks(), 0);
    }
}
