// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Ring-buffer accumulators used by the DSP engine.

/// Running average over the last `length` magnitude rows.
///
/// The average is maintained incrementally: putting a row replaces the oldest
/// row's contribution instead of re-summing the whole ring.
pub struct Averager {
    length: usize,
    buffer: Vec<Vec<f64>>,
    index: usize,
    current: Vec<f64>,
}

impl Averager {
    pub fn new(length: usize, block_size: usize) -> Self {
        assert!(length > 0, "averager length must be positive");
        Self {
            length,
            buffer: vec![vec![0.0; block_size]; length],
            index: 0,
            current: vec![0.0; block_size],
        }
    }

    pub fn block_size(&self) -> usize {
        self.current.len()
    }

    /// Feed a row, returning the running average. The row length must match
    /// the block size the averager was built for.
    pub fn put(&mut self, row: Vec<f64>) -> Vec<f64> {
        assert_eq!(row.len(), self.current.len(), "row length mismatch");
        for (i, value) in row.iter().enumerate() {
            self.current[i] += (value - self.buffer[self.index][i]) / self.length as f64;
        }
        self.buffer[self.index] = row;
        self.index = (self.index + 1) % self.length;
        self.current.clone()
    }
}

/// Running mean over the last `length` scalar values.
pub struct SlidingWindow {
    length: usize,
    buffer: Vec<f64>,
    index: usize,
    current: f64,
}

impl SlidingWindow {
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "sliding window length must be positive");
        Self {
            length,
            buffer: vec![0.0; length],
            index: 0,
            current: 0.0,
        }
    }

    /// Feed a value, returning the running mean of the window.
    pub fn put(&mut self, value: f64) -> f64 {
        self.current += (value - self.buffer[self.index]) / self.length as f64;
        self.buffer[self.index] = value;
        self.index = (self.index + 1) % self.length;
        self.current
    }
}

/// Index of the maximum over a sliding window of the last `length` values.
pub struct SlidingMax {
    length: usize,
    buffer: Vec<f64>,
    buffer_index: usize,
    max_index: usize,
    index: usize,
}

impl SlidingMax {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            buffer: vec![0.0; length],
            buffer_index: 0,
            max_index: 0,
            index: 0,
        }
    }

    /// Feed a value, returning the running index of the window maximum.
    pub fn put(&mut self, value: f64) -> usize {
        let current_max =
            ((self.length + self.buffer_index) - (self.index - self.max_index)) % self.length;
        if value >= self.buffer[current_max] {
            self.max_index = self.index;
        }
        self.buffer[self.buffer_index] = value;

        self.buffer_index = (self.buffer_index + 1) % self.length;
        self.index += 1;
        self.max_index
    }
}
