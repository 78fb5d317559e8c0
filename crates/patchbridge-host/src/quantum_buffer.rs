//! FIFO that adapts the host's callback size to the scheduler's fixed quantum.
//!
//! Input frames accumulate until one quantum is complete. Output arrives one
//! quantum at a time and is drained by the host at its own pace; whatever
//! the host does not take stays queued, shifted to the front.

/// Initial output capacity per channel, in frames.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct QuantumBuffer {
    quantum: usize,
    input: Vec<Vec<f32>>,
    in_frames: usize,
    output: Vec<Vec<f32>>,
    out_frames: usize,
    capacity: usize,
}

impl QuantumBuffer {
    pub fn new(channels_in: usize, channels_out: usize, quantum: usize) -> Self {
        let capacity = DEFAULT_CAPACITY.max(quantum * 2);
        Self {
            quantum,
            input: vec![vec![0.0; quantum]; channels_in],
            in_frames: 0,
            output: vec![vec![0.0; capacity]; channels_out],
            out_frames: 0,
            capacity,
        }
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Copy frames from `inputs[..][offset..]` until the quantum is full or
    /// the input runs out. Missing channels read as silence. Returns the
    /// number of frames consumed.
    pub fn push_input(&mut self, inputs: &[&[f32]], offset: usize, frames: usize) -> usize {
        let take = (self.quantum - self.in_frames).min(frames.saturating_sub(offset));
        for (ch, dest) in self.input.iter_mut().enumerate() {
            let dest = &mut dest[self.in_frames..self.in_frames + take];
            match inputs.get(ch).and_then(|src| src.get(offset..offset + take)) {
                Some(src) => dest.copy_from_slice(src),
                None => dest.fill(0.0),
            }
        }
        self.in_frames += take;
        take
    }

    /// True once exactly one quantum of input has accumulated.
    pub fn is_quantum_ready(&self) -> bool {
        self.in_frames >= self.quantum
    }

    pub fn pending_input(&self) -> usize {
        self.in_frames
    }

    /// The accumulated input quantum, one slice per channel. Call [`consume_input`](Self::consume_input) after reading it.
    pub fn input_quantum(&self) -> impl Iterator<Item = &[f32]> {
        self.input.iter().map(|ch| ch.as_slice())
    }

    pub fn consume_input(&mut self) {
        self.in_frames = 0;
    }

    /// Append one output quantum; `fill` writes channel `ch` into the slice it gets.
    pub fn push_output_with(&mut self, mut fill: impl FnMut(usize, &mut [f32])) {
        while self.out_frames + self.quantum > self.capacity {
            self.grow();
        }
        let (start, end) = (self.out_frames, self.out_frames + self.quantum);
        for (ch, buf) in self.output.iter_mut().enumerate() {
            fill(ch, &mut buf[start..end]);
        }
        self.out_frames = end;
    }

    pub fn push_silence(&mut self) {
        self.push_output_with(|_, buf| buf.fill(0.0));
    }

    /// Deliver up to `frames` queued output frames, zero-filling the rest,
    /// then shift the remainder to the front. Returns the frames delivered.
    pub fn pop_output(&mut self, outputs: &mut [&mut [f32]], frames: usize) -> usize {
        let delivered = frames.min(self.out_frames);
        for (ch, dest) in outputs.iter_mut().enumerate() {
            let frames = frames.min(dest.len());
            let delivered = delivered.min(frames);
            match self.output.get(ch) {
                Some(src) => dest[..delivered].copy_from_slice(&src[..delivered]),
                None => dest[..delivered].fill(0.0),
            }
            dest[delivered..frames].fill(0.0);
        }

        let remaining = self.out_frames - delivered;
        if remaining > 0 && delivered > 0 {
            for buf in self.output.iter_mut() {
                buf.copy_within(delivered..delivered + remaining, 0);
            }
        }
        self.out_frames = remaining;
        delivered
    }

    /// Output frames queued but not yet delivered.
    pub fn available(&self) -> usize {
        self.out_frames
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        for buf in self.input.iter_mut().chain(self.output.iter_mut()) {
            buf.fill(0.0);
        }
        self.in_frames = 0;
        self.out_frames = 0;
    }

    fn grow(&mut self) {
        self.capacity *= 2;
        tracing::debug!(capacity = self.capacity, "Growing output FIFO");
        for buf in self.output.iter_mut() {
            buf.resize(self.capacity, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantum_boundary() {
        let mut buffer = QuantumBuffer::new(2, 2, 64);
        let data = vec![1.0f32; 63];
        let inputs: [&[f32]; 2] = [&data, &data];

        assert_eq!(buffer.push_input(&inputs, 0, 63), 63);
        assert!(!buffer.is_quantum_ready());

        let one = [2.0f32];
        let inputs: [&[f32]; 2] = [&one, &one];
        assert_eq!(buffer.push_input(&inputs, 0, 1), 1);
        assert!(buffer.is_quantum_ready());

        // Full: nothing more is taken until the quantum is consumed.
        assert_eq!(buffer.push_input(&inputs, 0, 1), 0);
        let first: Vec<&[f32]> = buffer.input_quantum().collect();
        assert_eq!(first[0][63], 2.0);
        buffer.consume_input();
        assert!(!buffer.is_quantum_ready());
    }

    #[test]
    fn test_push_input_with_offset_spans_quanta() {
        let mut buffer = QuantumBuffer::new(1, 1, 4);
        let data: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let inputs: [&[f32]; 1] = [&data];

        let mut offset = 0;
        let mut quanta = Vec::new();
        while offset < data.len() {
            offset += buffer.push_input(&inputs, offset, data.len());
            if buffer.is_quantum_ready() {
                quanta.push(buffer.input_quantum().next().unwrap().to_vec());
                buffer.consume_input();
            }
        }

        assert_eq!(quanta, vec![vec![0.0, 1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0, 7.0]]);
        assert_eq!(buffer.pending_input(), 2);
    }

    #[test]
    fn test_pop_zero_fills_when_empty() {
        let mut buffer = QuantumBuffer::new(1, 2, 64);
        let mut left = vec![9.0f32; 32];
        let mut right = vec![9.0f32; 32];
        let mut outputs: [&mut [f32]; 2] = [&mut left, &mut right];

        assert_eq!(buffer.pop_output(&mut outputs, 32), 0);
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn test_pop_shifts_remainder() {
        let mut buffer = QuantumBuffer::new(1, 1, 4);
        let mut counter = 0.0;
        for _ in 0..2 {
            buffer.push_output_with(|_, buf| {
                for s in buf.iter_mut() {
                    *s = counter;
                    counter += 1.0;
                }
            });
        }
        assert_eq!(buffer.available(), 8);

        let mut out = vec![0.0f32; 3];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        assert_eq!(buffer.pop_output(&mut outputs, 3), 3);
        assert_eq!(out, vec![0.0, 1.0, 2.0]);
        assert_eq!(buffer.available(), 5);

        let mut out = vec![0.0f32; 6];
        let mut outputs: [&mut [f32]; 1] = [&mut out];
        assert_eq!(buffer.pop_output(&mut outputs, 6), 5);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0, 7.0, 0.0]);
        assert_eq!(buffer.available(), 0);
    }

    #[test]
    fn test_output_grows_by_doubling() {
        let mut buffer = QuantumBuffer::new(1, 1, 256);
        let initial = buffer.capacity();
        let quanta = initial / 256 + 1;
        for _ in 0..quanta {
            buffer.push_silence();
        }
        assert_eq!(buffer.capacity(), initial * 2);
        assert_eq!(buffer.available(), quanta * 256);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut buffer = QuantumBuffer::new(2, 2, 8);
        let data = [0.5f32; 8];
        let inputs: [&[f32]; 2] = [&data, &data];
        buffer.push_input(&inputs, 0, 8);
        buffer.push_silence();

        buffer.reset();
        assert_eq!(buffer.pending_input(), 0);
        assert_eq!(buffer.available(), 0);
    }
}
