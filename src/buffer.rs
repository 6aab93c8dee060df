// Fixed-capacity rolling history of motion samples
//
// Stores the last N samples in three parallel axis arrays with a write
// cursor. Writes overwrite the oldest slot; exports always come out
// oldest-to-newest regardless of where the cursor sits. The buffer itself
// is not synchronized: the pipeline keeps it behind its state lock so that
// `push` and `export` never interleave.

use crate::types::Sample;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct CircularHistoryBuffer {
    xs: Vec<f64>,
    ys: Vec<f64>,
    zs: Vec<f64>,
    /// Slot that the next push overwrites
    head: usize,
    total_pushed: u64,
}

impl CircularHistoryBuffer {
    /// Create a zero-filled buffer holding `capacity` samples.
    ///
    /// A capacity of zero is clamped to one; configuration validation
    /// rejects it before it gets here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            xs: vec![0.0; capacity],
            ys: vec![0.0; capacity],
            zs: vec![0.0; capacity],
            head: 0,
            total_pushed: 0,
        }
    }

    /// Overwrite the oldest slot with `sample`
    pub fn push(&mut self, sample: Sample) {
        self.xs[self.head] = sample.x;
        self.ys[self.head] = sample.y;
        self.zs[self.head] = sample.z;
        self.head = (self.head + 1) % self.capacity();
        self.total_pushed += 1;
    }

    /// Flattened `[x0, y0, z0, x1, ...]` from oldest to newest.
    ///
    /// Always `3 * capacity` values long; slots never written read as zero.
    pub fn export(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.capacity() * 3);
        for idx in self.ordered_indices() {
            out.push(self.xs[idx]);
            out.push(self.ys[idx]);
            out.push(self.zs[idx]);
        }
        out
    }

    /// Samples from oldest to newest
    pub fn samples(&self) -> Vec<Sample> {
        self.ordered_indices()
            .map(|idx| Sample::new(self.xs[idx], self.ys[idx], self.zs[idx]))
            .collect()
    }

    /// Most recently pushed sample, if any
    pub fn latest(&self) -> Option<Sample> {
        if self.total_pushed == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        Some(Sample::new(self.xs[idx], self.ys[idx], self.zs[idx]))
    }

    pub fn capacity(&self) -> usize {
        self.xs.len()
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    // The slot at `head` is the oldest one still retained.
    fn ordered_indices(&self) -> impl Iterator<Item = usize> + '_ {
        let capacity = self.capacity();
        (0..capacity).map(move |offset| (self.head + offset) % capacity)
    }
}

impl Default for CircularHistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
