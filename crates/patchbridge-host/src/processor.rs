//! The host-side bridge, driven by the plugin's audio callback.
//!
//! Per callback:
//! 1. Under the transfer mutex (short bound), post parameter changes, MIDI
//!    and the transport snapshot. If the mutex is busy they stay staged
//!    and go out with the next callback.
//! 2. Accumulate host input into the quantum FIFO. For every full quantum,
//!    wait (short bound) for the scheduler's previous quantum, queue it as
//!    output, write the new input quantum into the region and signal the
//!    scheduler.
//! 3. Drain queued output into the host buffers, zero-filling any shortfall.
//! 4. Under the mutex again, collect parameters and MIDI the scheduler sent.
//!
//! The audio path never fails: timeouts degrade to silence or a late update.

use crate::bus::BusLayout;
use crate::launcher::{SchedulerCommand, SchedulerProcess};
use crate::midi_map;
use crate::protocol::{AudioBuffer, ProcessContext, ProcessOutput};
use crate::quantum_buffer::QuantumBuffer;
use crate::status::{BridgeStatus, DESYNC_THRESHOLD};
use patchbridge_core::{
    timeouts, BridgeConfig, BridgeError, Direction, IpcNames, MidiMessage, NameString,
    ParameterValue, PluginState, Result, SessionParams, TimeInfo, TransferMap, TransferRegion,
    TransferSync, MAX_MIDI_QUEUE, MAX_PARAMETERS, SCHEDULER_BLOCK_SIZE,
};
use std::sync::Arc;
use std::time::Duration;

/// How long the scheduler gets to exit on its own before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Host input that could not be posted yet because the mutex was busy.
struct StagedInput {
    parameters: Vec<Option<f32>>,
    midi: Vec<MidiMessage>,
    transport: Option<TimeInfo>,
}

impl StagedInput {
    fn new() -> Self {
        Self {
            parameters: vec![None; MAX_PARAMETERS],
            midi: Vec::with_capacity(MAX_MIDI_QUEUE),
            transport: None,
        }
    }
}

pub struct Processor {
    config: BridgeConfig,
    names: IpcNames,
    sync: TransferSync,
    map: TransferMap,
    buffer: QuantumBuffer,
    input_buses: BusLayout,
    output_buses: BusLayout,
    sample_rate: u32,
    dsp_active: bool,
    launch_failed: bool,
    scheduler: Option<SchedulerProcess>,
    status: Arc<BridgeStatus>,
    staged: StagedInput,
}

impl Processor {
    /// Create the region and primitives, then launch the scheduler process.
    ///
    /// Failing to create OS objects is an error. A missing or unlaunchable
    /// scheduler is not: the processor comes up silent and reports the
    /// problem through [`error_message`](Self::error_message).
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let mut processor = Self::detached(config)?;
        processor.launch();
        Ok(processor)
    }

    /// Like [`new`](Self::new) but without launching anything; the caller
    /// attaches a scheduler to [`ipc_names`](Self::ipc_names) itself.
    pub fn detached(config: BridgeConfig) -> Result<Self> {
        config.validate()?;

        let names = IpcNames::generate();
        let input_buses = BusLayout::from_channels(config.channels_in);
        let output_buses = BusLayout::from_channels(config.channels_out);
        let session = SessionParams {
            channels_in: input_buses.channels(),
            channels_out: output_buses.channels(),
            sample_rate: config.sample_rate,
            block_size: SCHEDULER_BLOCK_SIZE,
            parameter_count: config.parameter_count,
        };

        let sync = TransferSync::create(&names)?;
        let map = TransferMap::create(&names.region, &session)
            .inspect_err(|_| TransferSync::unlink(&names))?;

        // SAFETY: no scheduler can be attached yet.
        unsafe { map.region_mut() }
            .plug_name
            .post(Direction::ToScheduler, NameString::from_str_truncated(&config.plugin_name));

        tracing::info!(
            plugin = %config.plugin_name,
            region = %names.region,
            channels_in = session.channels_in,
            channels_out = session.channels_out,
            "Created host bridge"
        );

        let mut processor = Self {
            buffer: QuantumBuffer::new(session.channels_in, session.channels_out, SCHEDULER_BLOCK_SIZE),
            sample_rate: config.sample_rate,
            config,
            names,
            sync,
            map,
            input_buses,
            output_buses,
            dsp_active: false,
            launch_failed: false,
            scheduler: None,
            status: Arc::new(BridgeStatus::new()),
            staged: StagedInput::new(),
        };
        processor.suspend();
        Ok(processor)
    }

    /// Command line that launches a scheduler for this instance.
    pub fn scheduler_command(&self) -> SchedulerCommand {
        SchedulerCommand::new(
            &self.config,
            &self.names,
            self.input_buses.channels(),
            self.output_buses.channels(),
            self.sample_rate,
        )
    }

    fn launch(&mut self) {
        match self.scheduler_command().spawn() {
            Ok(process) => {
                tracing::info!(pid = process.id(), "Scheduler launched");
                self.scheduler = Some(process);
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.status.set_error(e.to_string());
                self.launch_failed = true;
            }
        }
    }

    pub fn setup_processing(&mut self, sample_rate: f64) {
        let sample_rate = sample_rate.round() as u32;
        if sample_rate != self.sample_rate {
            tracing::debug!(sample_rate, "Sample rate changed");
            self.sample_rate = sample_rate;
        }
    }

    pub fn set_active(&mut self, active: bool) {
        if active {
            self.resume();
        } else {
            self.suspend();
        }
    }

    /// Leave tight sync and release a scheduler that may be waiting on us.
    pub fn suspend(&mut self) {
        self.set_sync_to_host(false);
        self.sync.host_ready.signal();
        self.buffer.reset();
        self.dsp_active = false;
        self.status.set_active(false);
        tracing::debug!("Host bridge suspended");
    }

    pub fn resume(&mut self) {
        self.set_sync_to_host(true);
        self.sync.host_ready.signal();
        self.buffer.reset();
        self.dsp_active = true;
        self.status.set_active(true);
        tracing::debug!("Host bridge resumed");
    }

    fn set_sync_to_host(&self, sync: bool) {
        if let Some(_guard) = self.sync.mutex.lock(timeouts::HOST_LOCK) {
            // SAFETY: guarded by the transfer mutex.
            unsafe { self.map.region_mut() }.set_sync_to_host(sync);
        } else {
            tracing::trace!(sync, "Transfer mutex busy, sync flag not updated");
        }
    }

    pub fn process(&mut self, audio: &mut AudioBuffer<'_, '_>, ctx: &ProcessContext<'_>) -> ProcessOutput {
        let mut output = ProcessOutput::default();

        self.stage_input(ctx);
        self.flush_staged();

        if audio.outputs.is_empty() || self.output_buses.is_empty() {
            return output;
        }

        if self.launch_failed {
            for channel in audio.outputs.iter_mut() {
                let frames = audio.num_samples.min(channel.len());
                channel[..frames].fill(0.0);
            }
            return output;
        }

        if !self.dsp_active {
            self.resume();
        }

        let frames = audio.num_samples;
        let mut offset = 0;
        while offset < frames {
            offset += self.buffer.push_input(audio.inputs, offset, frames);
            if self.buffer.is_quantum_ready() {
                self.hand_off();
            }
        }

        self.buffer.pop_output(audio.outputs, frames);
        self.collect_scheduler_output(&mut output);
        output
    }

    fn stage_input(&mut self, ctx: &ProcessContext<'_>) {
        if let Some(changes) = ctx.param_changes {
            for queue in &changes.queues {
                let slot = queue.param_id as usize;
                match (self.staged.parameters.get_mut(slot), queue.last_value()) {
                    (Some(staged), Some(value)) => *staged = Some(value as f32),
                    (None, _) => tracing::trace!(slot, "Parameter id out of range"),
                    _ => {}
                }
            }
        }

        let mut dropped = 0;
        for message in ctx.events.iter().filter_map(midi_map::to_region) {
            if self.staged.midi.len() < MAX_MIDI_QUEUE {
                self.staged.midi.push(message);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(dropped, "MIDI input backlog full, events dropped");
        }

        if let Some(transport) = ctx.transport {
            self.staged.transport = Some(transport.to_time_info(self.sample_rate as f64));
        }
    }

    fn flush_staged(&mut self) {
        let Some(_guard) = self.sync.mutex.lock(timeouts::HOST_LOCK) else {
            tracing::trace!("Transfer mutex busy, input staged for next callback");
            return;
        };
        // SAFETY: guarded by the transfer mutex.
        let region = unsafe { self.map.region_mut() };

        for (slot, staged) in self.staged.parameters.iter_mut().enumerate() {
            let mailbox = &mut region.parameters[slot];
            // A value the scheduler sent is ours to read first; post after collecting it.
            if staged.is_some() && !mailbox.is_pending(Direction::ToHost) {
                if let Some(value) = staged.take() {
                    mailbox.post(Direction::ToScheduler, ParameterValue::float(value));
                }
            }
        }

        let dropped = region.midi_in.extend(self.staged.midi.drain(..));
        if dropped > 0 {
            tracing::warn!(dropped, "Scheduler MIDI input queue full, events dropped");
        }

        if let Some(info) = self.staged.transport.take() {
            region.time_info.post(Direction::ToScheduler, info);
        }

        region.set_sample_rate(self.sample_rate);
        if self.dsp_active {
            region.set_sync_to_host(true);
        }
    }

    /// Exchange one quantum with the scheduler.
    fn hand_off(&mut self) {
        let quantum = self.buffer.quantum();

        if self.sync.scheduler_ready.wait(timeouts::HOST_HANDOFF) {
            self.sync.scheduler_ready.clear();
            let streak = self.status.record_hit();
            if streak >= DESYNC_THRESHOLD {
                tracing::info!(missed = streak, "Scheduler back in sync");
            }

            // SAFETY: the scheduler is between ticks until we signal `host_ready`.
            let region = unsafe { self.map.region_mut() };
            exchange_quantum(region, &mut self.buffer, quantum);
        } else {
            let streak = self.status.record_miss();
            if streak == DESYNC_THRESHOLD {
                tracing::warn!(
                    missed = streak,
                    "Scheduler missed {} consecutive quanta, continuing degraded",
                    streak
                );
            }
            self.buffer.push_silence();
        }

        self.buffer.consume_input();
        tracing::trace!(handoffs = self.status.handoffs(), "Quantum handed off");
        self.sync.host_ready.signal();
    }

    fn collect_scheduler_output(&mut self, output: &mut ProcessOutput) {
        let Some(_guard) = self.sync.mutex.lock(timeouts::HOST_LOCK) else {
            return;
        };
        // SAFETY: guarded by the transfer mutex.
        let region = unsafe { self.map.region_mut() };

        for slot in 0..region.parameter_count() {
            if let Some(value) = region.parameters[slot].take(Direction::ToHost) {
                if let Some(value) = value.as_float() {
                    output.param_changes.set(slot as u32, value as f64);
                }
            }
        }

        if region.data_chunk.consume(Direction::ToHost, |_| true) {
            tracing::trace!("Scheduler updated the state chunk");
        }

        if region.midi_out.is_updated() {
            output
                .events
                .extend(region.midi_out.messages().iter().filter_map(midi_map::from_region));
            region.midi_out.clear();
        }
    }

    /// Serialize every parameter value and the data chunk.
    pub fn get_state(&self) -> Result<Vec<u8>> {
        let _guard = self.sync.mutex.lock(timeouts::CONTROL).ok_or_else(|| {
            BridgeError::StateSave("transfer mutex busy".to_string())
        })?;
        let region = self.map.region();

        let parameters = region.parameters[..region.parameter_count()]
            .iter()
            .map(|slot| slot.value().as_float().unwrap_or(0.0) as f64)
            .collect();
        let chunk = region.data_chunk.value().as_bytes().to_vec();

        PluginState::new(parameters, chunk).to_bytes()
    }

    /// Restore state written by [`get_state`](Self::get_state); values go to the scheduler.
    pub fn set_state(&mut self, bytes: &[u8]) -> Result<()> {
        let state = PluginState::from_bytes(bytes)?;
        let _guard = self.sync.mutex.lock(timeouts::CONTROL).ok_or_else(|| {
            BridgeError::StateRestore("transfer mutex busy".to_string())
        })?;
        // SAFETY: guarded by the transfer mutex.
        let region = unsafe { self.map.region_mut() };

        let count = region.parameter_count();
        for (slot, value) in state.parameters.iter().take(count).enumerate() {
            post_or_stage(region, &mut self.staged.parameters, slot, *value as f32);
        }

        // The restored chunk supersedes one the scheduler sent.
        region.data_chunk.consume(Direction::ToHost, |_| true);
        region.data_chunk.post_with(Direction::ToScheduler, |chunk| {
            let cut = chunk.set(&state.chunk);
            if cut > 0 {
                tracing::warn!(cut, "State chunk larger than the region, truncated");
            }
        });
        tracing::debug!(parameters = count, chunk = state.chunk.len(), "State restored");
        Ok(())
    }

    /// Send preset `index` from the setup file to the scheduler.
    pub fn select_program(&mut self, index: usize) -> Result<()> {
        let program = self.config.programs.get(index).ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "program {} out of range ({} programs)",
                index,
                self.config.programs.len()
            ))
        })?;

        let _guard = self.sync.mutex.lock(timeouts::CONTROL).ok_or_else(|| BridgeError::Timeout {
            operation: "select program".to_string(),
            duration_ms: timeouts::CONTROL.as_millis() as u64,
        })?;
        // SAFETY: guarded by the transfer mutex.
        let region = unsafe { self.map.region_mut() };

        for slot in 0..region.parameter_count() {
            let value = program.values.get(slot).copied().unwrap_or(0.0);
            post_or_stage(region, &mut self.staged.parameters, slot, value);
        }
        region
            .program_name
            .post(Direction::ToScheduler, NameString::from_str_truncated(&program.name));
        region.program_number.post(Direction::ToScheduler, index as f32);

        tracing::debug!(index, name = %program.name, "Program selected");
        Ok(())
    }

    /// Latency reported to the host: at least one scheduler quantum.
    pub fn latency_samples(&self) -> u32 {
        self.config.latency.max(SCHEDULER_BLOCK_SIZE as u32)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn ipc_names(&self) -> &IpcNames {
        &self.names
    }

    pub fn input_buses(&self) -> BusLayout {
        self.input_buses
    }

    pub fn output_buses(&self) -> BusLayout {
        self.output_buses
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_active(&self) -> bool {
        self.dsp_active
    }

    pub fn status(&self) -> Arc<BridgeStatus> {
        Arc::clone(&self.status)
    }

    pub fn desync_count(&self) -> u32 {
        self.status.desync_count()
    }

    pub fn is_desynced(&self) -> bool {
        self.status.is_desynced()
    }

    pub fn error_message(&self) -> Option<String> {
        self.status.error_message()
    }

    /// Quanta handed to the scheduler so far, whether or not it answered in time.
    pub fn handoff_count(&self) -> u64 {
        self.status.handoffs()
    }

    /// Output frames queued but not yet delivered to the host.
    pub fn backlog(&self) -> usize {
        self.buffer.available()
    }
}

/// Post a parameter, or stage it behind an unread scheduler value for the slot.
fn post_or_stage(region: &mut TransferRegion, staged: &mut [Option<f32>], slot: usize, value: f32) {
    if !region.parameters[slot].post(Direction::ToScheduler, ParameterValue::float(value)) {
        staged[slot] = Some(value);
    }
}

fn exchange_quantum(region: &mut TransferRegion, buffer: &mut QuantumBuffer, quantum: usize) {
    let channels_out = region.channels_out();
    buffer.push_output_with(|ch, dest| {
        if ch < channels_out {
            dest.copy_from_slice(&region.samples_out[ch][..quantum]);
        } else {
            dest.fill(0.0);
        }
    });

    let channels_in = region.channels_in();
    for (ch, src) in buffer.input_quantum().take(channels_in).enumerate() {
        region.samples_in[ch][..quantum].copy_from_slice(src);
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        // The scheduler takes the plug name on its first locked phase.
        let attached = match self.sync.mutex.lock(timeouts::CONTROL) {
            Some(_guard) => {
                // SAFETY: guarded by the transfer mutex.
                let region = unsafe { self.map.region_mut() };
                region.set_sync_to_host(false);
                region.request_shutdown();
                self.sync.scheduler_ready.clear();
                !region.plug_name.is_pending(Direction::ToScheduler)
            }
            None => {
                tracing::warn!("Transfer mutex busy at shutdown, clearing active flag anyway");
                // SAFETY: a single word store; the scheduler only reads it.
                unsafe { self.map.region_mut() }.request_shutdown();
                true
            }
        };
        self.sync.host_ready.signal();

        if attached && !self.sync.scheduler_ready.wait(timeouts::CONTROL) {
            tracing::warn!("Scheduler did not acknowledge shutdown");
        }

        if let Some(process) = self.scheduler.take() {
            process.shutdown(SHUTDOWN_GRACE);
        }

        TransferSync::unlink(&self.names);
        tracing::debug!(region = %self.names.region, "Host bridge shut down");
    }
}
