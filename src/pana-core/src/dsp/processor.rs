// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The FFT processor: produces the dB spectrum of a frequency-of-interest
//! range from a block of raw IQ samples.
//!
//! The heavy lifting happens in the frequency domain: one forward FFT of the
//! whole block, a circular bin shift combined with a pre-computed lowpass
//! mask, an inverse FFT, and decimation down to the output block size.  The
//! mask and the analysis window are cached and only rebuilt when the block
//! size, the VFO dial or the frequency of interest changes.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::avg::Averager;
use super::{FftFrame, PeakIndexRange};
use crate::radio::freq::{Frequency, FrequencyRange, Vfo};

/// Depth of the temporal smoother ring.
const SMOOTHING_DEPTH: usize = 5;

/// Width of the centered sliding window for the σ envelope. Odd.
const SIGMA_WINDOW: usize = 9;

/// Slope hysteresis for entering and leaving a peak, in dB per bin.
const PEAK_DELTA_DB: f64 = 3.0;

pub struct FftProcessor {
    sample_rate: f64,
    if_center: Frequency,
    rx_center: Frequency,

    planner: FftPlanner<f64>,
    geometry: Option<Geometry>,
    smoother: Option<Averager>,
}

/// Cached per-configuration state, keyed by (block size, VFO dial, FOI).
struct Geometry {
    block_size: usize,
    out_size: usize,
    decimation: usize,
    vfo_dial: Frequency,
    foi: FrequencyRange,

    shift_offset: i64,
    lowpass_mask: Vec<Complex<f64>>,
    window: Vec<f64>,
    fft_in: Arc<dyn Fft<f64>>,
    ifft_in: Arc<dyn Fft<f64>>,
    fft_out: Arc<dyn Fft<f64>>,
}

impl FftProcessor {
    pub fn new(sample_rate: f64, if_center: Frequency, rx_center: Frequency) -> Self {
        Self {
            sample_rate,
            if_center,
            rx_center,
            planner: FftPlanner::new(),
            geometry: None,
            smoother: None,
        }
    }

    /// Produce the spectrum of `foi` from one block of samples.
    ///
    /// Returns `None` for an empty block or a zero-width range. The engine
    /// itself never fails; a changed block size or viewport only triggers a
    /// lazy reconfiguration.
    pub fn process(
        &mut self,
        samples: &[Complex<f64>],
        foi: FrequencyRange,
        vfo: &Vfo,
    ) -> Option<FftFrame> {
        if samples.is_empty() || foi.width() <= 0.0 {
            return None;
        }
        self.ensure_geometry(samples.len(), vfo.frequency, foi);
        let geometry = self.geometry.as_ref().expect("geometry built above");
        let n = geometry.block_size;
        let m = geometry.out_size;

        let mut spectrum = samples.to_vec();
        geometry.fft_in.process(&mut spectrum);

        // Move the FOI center to DC and cut everything the decimated rate
        // cannot carry.
        let mut shifted = rotate_bins(&spectrum, geometry.shift_offset);
        for (bin, mask) in shifted.iter_mut().zip(&geometry.lowpass_mask) {
            *bin *= *mask;
        }

        geometry.ifft_in.process(&mut shifted);
        let scale = 1.0 / n as f64;

        let decimated = decimate(&shifted, geometry.decimation, &[Complex::new(1.0, 0.0)]);
        let mut out: Vec<Complex<f64>> = decimated
            .iter()
            .take(m)
            .zip(&geometry.window)
            .map(|(&sample, &window)| sample * scale * window)
            .collect();
        geometry.fft_out.process(&mut out);

        // fft-shift: output index 0 carries the most negative frequency.
        let half = m / 2;
        let mut magnitudes = vec![0.0; m];
        for (i, value) in magnitudes.iter_mut().enumerate() {
            *value = magnitude_db(out[(i + half) % m], m);
        }

        let smoother = self.smoother.as_mut().expect("smoother built above");
        let smoothed = smoother.put(magnitudes);
        let envelope = sigma_envelope(&smoothed, SIGMA_WINDOW);

        let mean = smoothed.iter().sum::<f64>() / m as f64;
        let sigma =
            (smoothed.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / m as f64).sqrt();
        let threshold = mean + sigma;
        let peaks = detect_peaks(&smoothed, &envelope, threshold, PEAK_DELTA_DB);

        let half_width = self.sample_rate / (2.0 * geometry.decimation as f64);
        let center = foi.center();
        Some(FftFrame {
            magnitudes: smoothed,
            range: FrequencyRange::new(center - half_width, center + half_width),
            mean,
            peak_threshold: threshold,
            sigma_envelope: envelope,
            peaks,
        })
    }

    fn ensure_geometry(&mut self, block_size: usize, vfo_dial: Frequency, foi: FrequencyRange) {
        if let Some(geometry) = &self.geometry {
            if geometry.block_size == block_size
                && geometry.vfo_dial == vfo_dial
                && geometry.foi == foi
            {
                return;
            }
        }

        // The output size depends on all three inputs, so derive it first and
        // rebuild the window and the smoother only when it actually changed.
        let needed = (2.0 * foi.width() / self.sample_rate * block_size as f64).ceil() as usize;
        let out_size = find_blocksize(needed.max(1), block_size);
        let decimation = (block_size / out_size).max(1);

        let rebuild_out = self
            .smoother
            .as_ref()
            .map(|s| s.block_size() != out_size)
            .unwrap_or(true);
        if rebuild_out {
            self.smoother = Some(Averager::new(SMOOTHING_DEPTH, out_size));
        }
        let window = if rebuild_out {
            hamming(out_size)
        } else {
            self.geometry
                .as_ref()
                .map(|g| g.window.clone())
                .unwrap_or_else(|| hamming(out_size))
        };

        let shift_rate =
            (vfo_dial - foi.center() - (self.if_center - self.rx_center)) / self.sample_rate;
        let shift_offset = (shift_rate * block_size as f64).round() as i64;

        self.geometry = Some(Geometry {
            block_size,
            out_size,
            decimation,
            vfo_dial,
            foi,
            shift_offset,
            lowpass_mask: lowpass_mask(&mut self.planner, block_size, decimation),
            window,
            fft_in: self.planner.plan_fft_forward(block_size),
            ifft_in: self.planner.plan_fft_inverse(block_size),
            fft_out: self.planner.plan_fft_forward(out_size),
        });
    }
}

/// The smallest power of two ≥ `value`, capped at `max`.
pub fn find_blocksize(value: usize, max: usize) -> usize {
    if value == 0 {
        return 0;
    }
    let mut block = 1;
    while block < value {
        block <<= 1;
    }
    block.min(max)
}

/// Keep every `factor`-th sample, evaluating the FIR `coeffs` only at the
/// samples that are kept.
pub fn decimate(
    samples: &[Complex<f64>],
    factor: usize,
    coeffs: &[Complex<f64>],
) -> Vec<Complex<f64>> {
    let factor = factor.max(1);
    let mut result = Vec::with_capacity(samples.len().div_ceil(factor));
    let mut i = 0;
    while i < samples.len() {
        let mut acc = Complex::new(0.0, 0.0);
        for (j, c) in coeffs.iter().enumerate() {
            if j > i {
                break;
            }
            acc += samples[i - j] * c;
        }
        result.push(acc);
        i += factor;
    }
    result
}

/// Circularly move every bin by `offset` positions.
pub(crate) fn rotate_bins(spectrum: &[Complex<f64>], offset: i64) -> Vec<Complex<f64>> {
    let n = spectrum.len() as i64;
    let mut result = vec![Complex::new(0.0, 0.0); spectrum.len()];
    for (i, value) in spectrum.iter().enumerate() {
        let dest = (i as i64 + offset).rem_euclid(n) as usize;
        result[dest] = *value;
    }
    result
}

/// FFT-domain lowpass mask: the transform of a Blackman-windowed sinc with
/// cutoff `1/(2·decimation)`, normalized to unity DC gain.
fn lowpass_mask(
    planner: &mut FftPlanner<f64>,
    block_size: usize,
    decimation: usize,
) -> Vec<Complex<f64>> {
    if block_size < 2 {
        return vec![Complex::new(1.0, 0.0); block_size];
    }
    let cutoff = 1.0 / (2.0 * decimation as f64);
    let order = (block_size - 1) as f64;
    let mut kernel: Vec<Complex<f64>> = (0..block_size)
        .map(|i| {
            let x = i as f64 - order / 2.0;
            let sinc = if x == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * PI * cutoff * x).sin() / (PI * x)
            };
            let t = i as f64 / order;
            let blackman = 0.42 - 0.5 * (2.0 * PI * t).cos() + 0.08 * (4.0 * PI * t).cos();
            Complex::new(sinc * blackman, 0.0)
        })
        .collect();

    let sum: f64 = kernel.iter().map(|c| c.re).sum();
    if sum.abs() > 1e-12 {
        for c in &mut kernel {
            c.re /= sum;
        }
    }

    let fft = planner.plan_fft_forward(block_size);
    fft.process(&mut kernel);
    kernel
}

fn hamming(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    let order = (size - 1) as f64;
    (0..size)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / order).cos())
        .collect()
}

/// Convert one complex bin of a `block_size`-point FFT to dB.
fn magnitude_db(c: Complex<f64>, block_size: usize) -> f64 {
    let size = block_size as f64;
    let power = 20.0 * (c.re * c.re + c.im * c.im) / (size * size);
    10.0 * power.max(1e-20).log10()
}

/// Centered sliding mean plus one standard deviation. The window is clamped
/// at the edges.
fn sigma_envelope(data: &[f64], window: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let half = window / 2;
    let mut result = vec![0.0; data.len()];
    for (i, out) in result.iter_mut().enumerate() {
        let lo = i.saturating_sub(half);
        let hi = (i + half).min(data.len() - 1);
        let count = (hi - lo + 1) as f64;
        let mean = data[lo..=hi].iter().sum::<f64>() / count;
        let variance = data[lo..=hi].iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count;
        *out = mean + variance.sqrt();
    }
    result
}

/// Walk the envelope left to right and extract the ranges where it rises
/// steeply above the threshold.
pub(crate) fn detect_peaks(
    magnitudes: &[f64],
    envelope: &[f64],
    threshold: f64,
    delta_threshold: f64,
) -> Vec<PeakIndexRange> {
    struct Open {
        from: usize,
        max: usize,
        value: f64,
        descending: bool,
    }

    let mut peaks = Vec::new();
    let mut open: Option<Open> = None;
    for i in 1..envelope.len() {
        let delta = envelope[i] - envelope[i - 1];
        match open.as_mut() {
            None => {
                if envelope[i] > threshold && delta > delta_threshold {
                    open = Some(Open {
                        from: i,
                        max: i,
                        value: magnitudes[i],
                        descending: false,
                    });
                }
            }
            Some(peak) => {
                let leave = (peak.descending && delta > 0.0) || envelope[i] < threshold;
                if leave {
                    peaks.push(PeakIndexRange {
                        from: peak.from,
                        to: (i - 1).max(peak.from),
                        max: peak.max,
                        value: peak.value,
                    });
                    open = None;
                    continue;
                }
                if magnitudes[i] > peak.value {
                    peak.value = magnitudes[i];
                    peak.max = i;
                }
                if delta < -delta_threshold {
                    peak.descending = true;
                }
            }
        }
    }
    if let Some(peak) = open {
        peaks.push(PeakIndexRange {
            from: peak.from,
            to: envelope.len() - 1,
            max: peak.max,
            value: peak.value,
        });
    }
    peaks
}
