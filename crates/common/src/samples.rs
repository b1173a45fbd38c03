use std::time::Instant;

/// Number of values kept by a [`FrameSamples`] ring.
pub const SAMPLE_COUNT: usize = 100;

/// Rolling window of timing samples in milliseconds.
///
/// Keeps the last [`SAMPLE_COUNT`] values. `min`, `max` and `avg` only
/// consider slots that have been written, so a fresh ring reports zeros.
#[derive(Debug, Clone)]
pub struct FrameSamples {
    values: [f32; SAMPLE_COUNT],
    offset: usize,
    filled: usize,
    started: Option<Instant>,
}

impl Default for FrameSamples {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSamples {
    pub fn new() -> Self {
        Self {
            values: [0.0; SAMPLE_COUNT],
            offset: 0,
            filled: 0,
            started: None,
        }
    }

    /// Start timing a section.
    pub fn begin(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop timing and push the elapsed milliseconds. No-op without `begin`.
    pub fn end(&mut self) {
        if let Some(started) = self.started.take() {
            self.push(started.elapsed().as_secs_f32() * 1000.0);
        }
    }

    pub fn push(&mut self, value: f32) {
        self.values[self.offset] = value;
        self.offset = (self.offset + 1) % SAMPLE_COUNT;
        self.filled = (self.filled + 1).min(SAMPLE_COUNT);
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Most recently pushed value.
    pub fn last(&self) -> Option<f32> {
        if self.filled == 0 {
            return None;
        }
        Some(self.values[(self.offset + SAMPLE_COUNT - 1) % SAMPLE_COUNT])
    }

    pub fn min(&self) -> f32 {
        self.filled_values().fold(None, |acc: Option<f32>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        })
        .unwrap_or(0.0)
    }

    pub fn max(&self) -> f32 {
        self.filled_values().fold(None, |acc: Option<f32>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        })
        .unwrap_or(0.0)
    }

    pub fn avg(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.filled_values().sum::<f32>() / self.filled as f32
    }

    /// Values in the order they were pushed, oldest first.
    pub fn values(&self) -> Vec<f32> {
        let start = (self.offset + SAMPLE_COUNT - self.filled) % SAMPLE_COUNT;
        (0..self.filled)
            .map(|i| self.values[(start + i) % SAMPLE_COUNT])
            .collect()
    }

    fn filled_values(&self) -> impl Iterator<Item = f32> + '_ {
        self.values.iter().copied().take(self.filled)
    }
}
