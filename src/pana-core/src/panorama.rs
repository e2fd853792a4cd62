// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The panorama state engine: viewport state, mapping of FFT bins onto
//! normalized screen fractions, peak tracking across frames, and the
//! per-tick rendering snapshot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::dsp::FftFrame;
use crate::radio::bandplan::{self, Band};
use crate::radio::freq::{Db, DbRange, Frct, Frequency, FrequencyRange, HzPerPx, Px, Vfo};

const DEFAULT_FIXED_RESOLUTION: HzPerPx = 100.0;
const DEFAULT_CENTERED_RESOLUTION: HzPerPx = 25.0;
const DEFAULT_DB_RANGE: DbRange = DbRange {
    from: -105.0,
    to: 15.0,
};

/// How the viewport follows the VFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// The viewport keeps the VFO visible at its relative position.
    Fixed,
    /// The viewport recenters on the VFO with every update.
    Centered,
}

/// Zoom level per view mode. Two modes, two resolutions.
#[derive(Debug, Clone, Copy)]
struct ResolutionTable {
    fixed: HzPerPx,
    centered: HzPerPx,
}

impl ResolutionTable {
    fn get(&self, mode: ViewMode) -> HzPerPx {
        match mode {
            ViewMode::Fixed => self.fixed,
            ViewMode::Centered => self.centered,
        }
    }

    fn get_mut(&mut self, mode: ViewMode) -> &mut HzPerPx {
        match mode {
            ViewMode::Fixed => &mut self.fixed,
            ViewMode::Centered => &mut self.centered,
        }
    }
}

/// A point of the spectrum polyline, both axes normalized.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FPoint {
    pub x: Frct,
    pub y: Frct,
}

/// A tick of the frequency scale.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyMark {
    pub x: Frct,
    pub frequency: Frequency,
}

/// A tick of the dB scale.
#[derive(Debug, Clone, PartialEq)]
pub struct DbMark {
    pub y: Frct,
    pub db: Db,
}

/// A detected signal, projected onto the viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakMark {
    pub from_x: Frct,
    pub to_x: Frct,
    pub max_x: Frct,
    pub max_frequency: Frequency,
    pub value_y: Frct,
    pub value_db: Db,
}

/// One rendering snapshot.
#[derive(Debug, Clone, Default)]
pub struct PanoramaFrame {
    pub frequency_range: FrequencyRange,
    pub vfo: Vfo,
    pub band: Band,
    pub resolution: HzPerPx,

    pub vfo_line: Frct,
    pub vfo_filter_from: Frct,
    pub vfo_filter_to: Frct,
    pub vfo_signal_level: Db,

    pub frequency_scale: Vec<FrequencyMark>,
    pub db_scale: Vec<DbMark>,
    pub spectrum: Vec<FPoint>,
    pub sigma_envelope: Vec<FPoint>,
    pub peak_threshold_level: Frct,
    pub peaks: Vec<PeakMark>,
    pub waterline: Vec<Frct>,
}

impl PanoramaFrame {
    pub fn is_empty(&self) -> bool {
        self.spectrum.is_empty()
    }
}

#[derive(Debug, Clone)]
struct TrackedPeak {
    range: FrequencyRange,
    max_frequency: Frequency,
    value_db: Db,
    last_seen: Instant,
}

/// Peaks are tracked in 100 Hz buckets.
fn peak_key(f: Frequency) -> i64 {
    (f / 100.0) as i64
}

/// Panorama controller. Owned by the event loop; every operation mutates
/// state, only `data()` produces output.
pub struct Panorama {
    width: Px,
    height: Px,
    frequency_range: FrequencyRange,
    db_range: DbRange,
    vfo: Vfo,
    band: Band,

    resolution: ResolutionTable,
    view_mode: ViewMode,
    margin: f64,
    signal_detection_active: bool,

    fft: FftFrame,
    peak_buffer: HashMap<i64, TrackedPeak>,
    peak_timeout: Duration,
    db_range_adjusted: bool,
}

fn calc_resolution(frequency_range: FrequencyRange, width: Px) -> HzPerPx {
    frequency_range.width() / width.max(1) as f64
}

impl Panorama {
    pub fn new(width: Px, frequency_range: FrequencyRange, vfo_frequency: Frequency) -> Self {
        Self {
            width,
            height: 0,
            frequency_range,
            db_range: DEFAULT_DB_RANGE,
            vfo: Vfo {
                frequency: vfo_frequency,
                ..Vfo::default()
            },
            band: Band::UNKNOWN,
            resolution: ResolutionTable {
                fixed: calc_resolution(frequency_range, width),
                centered: DEFAULT_CENTERED_RESOLUTION,
            },
            view_mode: ViewMode::Fixed,
            margin: 0.02,
            signal_detection_active: true,
            fft: FftFrame::default(),
            peak_buffer: HashMap::new(),
            peak_timeout: Duration::from_secs(10),
            db_range_adjusted: true,
        }
    }

    pub fn frequency_range(&self) -> FrequencyRange {
        self.frequency_range
    }

    pub fn vfo(&self) -> (&Vfo, &Band) {
        (&self.vfo, &self.band)
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn signal_detection_active(&self) -> bool {
        self.signal_detection_active
    }

    fn update_frequency_range(&mut self) {
        let resolution = self.resolution.get(self.view_mode);

        let lower_ratio = if self.view_mode == ViewMode::Fixed
            && self.frequency_range.width() > 0.0
            && self.frequency_range.contains(self.vfo.frequency)
        {
            let ratio = (self.vfo.frequency - self.frequency_range.from)
                / self.frequency_range.width();
            ratio.clamp(self.margin, 1.0 - self.margin)
        } else {
            0.5
        };
        let upper_ratio = 1.0 - lower_ratio;

        let width = self.width as f64 * resolution;
        self.frequency_range.from = self.vfo.frequency - lower_ratio * width;
        self.frequency_range.to = self.vfo.frequency + upper_ratio * width;

        trace!(
            "frequency range {:?} width {} resolution {}",
            self.frequency_range,
            self.frequency_range.width(),
            resolution
        );
    }

    /// Update the viewport dimensions in pixels.
    pub fn set_size(&mut self, width: Px, height: Px) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.update_frequency_range();
    }

    /// Take over a new VFO state. A band change re-anchors the dB range on
    /// the next FFT.
    pub fn set_vfo(&mut self, vfo: Vfo) {
        self.vfo = vfo;

        if !self.band.contains(self.vfo.frequency) {
            let band = bandplan::by_frequency(self.vfo.frequency);
            if band.width() > 0.0 {
                if self.band.width() > 0.0 {
                    self.db_range_adjusted = false;
                }
                self.band = band;
            }
        }

        self.update_frequency_range();
    }

    /// Store the latest FFT frame.
    pub fn set_fft(&mut self, fft: FftFrame) {
        self.fft = fft;
        self.adjust_db_range();
    }

    fn adjust_db_range(&mut self) {
        if self.db_range_adjusted {
            return;
        }
        let width = self.db_range.width();
        self.db_range.from = self.fft.peak_threshold - 0.1 * width;
        self.db_range.to = self.db_range.from + width;
        self.db_range_adjusted = true;
    }

    pub fn toggle_signal_detection(&mut self) {
        self.signal_detection_active = !self.signal_detection_active;
    }

    pub fn toggle_view_mode(&mut self) {
        self.view_mode = match self.view_mode {
            ViewMode::Fixed => ViewMode::Centered,
            ViewMode::Centered => ViewMode::Fixed,
        };
        self.update_frequency_range();
    }

    pub fn zoom_in(&mut self) {
        *self.resolution.get_mut(self.view_mode) /= 1.25;
        self.update_frequency_range();
    }

    pub fn zoom_out(&mut self) {
        *self.resolution.get_mut(self.view_mode) *= 1.25;
        self.update_frequency_range();
    }

    /// Zoom to the current band (plus 1 kHz on both sides) in fixed mode.
    pub fn zoom_to_band(&mut self) {
        if self.band.width() == 0.0 {
            return;
        }
        self.zoom_to(self.band.range.expanded(1000.0));
    }

    fn zoom_to(&mut self, frequency_range: FrequencyRange) {
        self.view_mode = ViewMode::Fixed;
        self.frequency_range = frequency_range;
        self.resolution.fixed = calc_resolution(frequency_range, self.width);
    }

    pub fn reset_zoom(&mut self) {
        *self.resolution.get_mut(self.view_mode) = match self.view_mode {
            ViewMode::Fixed => DEFAULT_FIXED_RESOLUTION,
            ViewMode::Centered => DEFAULT_CENTERED_RESOLUTION,
        };
        self.update_frequency_range();
    }

    pub fn finer_dynamic_range(&mut self) {
        let delta = self.db_range.width() * 0.05;
        self.db_range.from += delta;
        self.db_range.to -= delta;
    }

    pub fn coarser_dynamic_range(&mut self) {
        let delta = self.db_range.width() * 0.05;
        self.db_range.from -= delta;
        self.db_range.to += delta;
    }

    pub fn shift_dynamic_range(&mut self, ratio: Frct) {
        let delta = self.db_range.width() * ratio;
        self.db_range.from += delta;
        self.db_range.to += delta;
    }

    pub fn set_dynamic_range(&mut self, db_range: DbRange) {
        self.db_range = db_range.normalized();
    }

    /// Shift the viewport horizontally by a fraction of its width. Only
    /// meaningful in fixed mode; the centered view is pinned to the VFO.
    pub fn shift_frequency_range(&mut self, ratio: Frct) {
        if self.view_mode != ViewMode::Fixed {
            return;
        }
        let delta = self.frequency_range.width() * ratio;
        self.frequency_range.shift(delta);
    }

    fn data_valid(&self) -> bool {
        !self.fft.is_empty() && self.fft.range.overlaps(&self.frequency_range)
    }

    /// Build the rendering snapshot for the current state.
    pub fn data(&mut self) -> PanoramaFrame {
        self.data_at(Instant::now())
    }

    fn data_at(&mut self, now: Instant) -> PanoramaFrame {
        if !self.data_valid() {
            return PanoramaFrame::default();
        }

        self.update_peaks(now);

        let (spectrum, sigma_envelope) = self.spectrum();
        let waterline = self.waterline(&spectrum);
        let peaks = if self.signal_detection_active {
            self.peak_marks(now)
        } else {
            Vec::new()
        };

        PanoramaFrame {
            frequency_range: self.frequency_range,
            vfo: self.vfo.clone(),
            band: self.band,
            resolution: self.resolution.get(self.view_mode),

            vfo_line: self.frequency_range.fraction_of(self.vfo.frequency),
            vfo_filter_from: self
                .frequency_range
                .fraction_of(self.vfo.frequency - self.vfo.filter_width / 2.0),
            vfo_filter_to: self
                .frequency_range
                .fraction_of(self.vfo.frequency + self.vfo.filter_width / 2.0),
            vfo_signal_level: self.signal_level(),

            frequency_scale: self.frequency_scale(),
            db_scale: self.db_scale(),
            spectrum,
            sigma_envelope,
            peak_threshold_level: self.db_range.fraction_of(self.fft.peak_threshold),
            peaks,
            waterline,
        }
    }

    fn signal_level(&self) -> Db {
        self.fft
            .index_of(self.vfo.frequency)
            .map(|i| self.fft.magnitudes[i])
            .unwrap_or(0.0)
    }

    /// Scale marks at decade-derived steps, spaced between 200 and 300 px.
    fn frequency_scale(&self) -> Vec<FrequencyMark> {
        let width_hz = self.frequency_range.width();
        if width_hz <= 0.0 || self.width == 0 {
            return Vec::new();
        }
        let zeros = width_hz.log10() as i32 - 1;
        let mut factor = 10f64.powi(zeros) as i64;
        if factor < 1 {
            return Vec::new();
        }

        let spacing_px = |factor: i64| factor as f64 / width_hz * self.width as f64;
        while spacing_px(factor) < 200.0 {
            if factor % 10 == 0 {
                factor *= 5;
            } else {
                factor *= 10;
            }
        }
        while spacing_px(factor) > 300.0 {
            if factor % 10 == 0 {
                factor /= 5;
            } else {
                factor /= 10;
            }
        }
        if factor < 1 {
            return Vec::new();
        }

        let mut marks = Vec::new();
        let mut f = ((self.frequency_range.from as i64) / factor * factor) as Frequency;
        while f < self.frequency_range.to {
            marks.push(FrequencyMark {
                x: self.frequency_range.fraction_of(f),
                frequency: f,
            });
            f += factor as Frequency;
        }
        marks
    }

    /// One mark every 10 dB across the dynamic range.
    fn db_scale(&self) -> Vec<DbMark> {
        let from = self.db_range.from as i64;
        let to = self.db_range.to as i64;
        let start = from - from % 10;
        let mut count = ((to - start) / 10) as usize;
        if (to - start) % 10 != 0 {
            count += 1;
        }

        (0..count)
            .map(|i| {
                let db = (start + i as i64 * 10) as Db;
                DbMark {
                    db,
                    y: self.db_range.fraction_of(db),
                }
            })
            .collect()
    }

    /// Decimate the FFT to at most `width` points, keeping the maximum of
    /// both the magnitudes and the envelope within each step.
    fn spectrum(&self) -> (Vec<FPoint>, Vec<FPoint>) {
        let fft = &self.fft;
        let resolution = fft.resolution();
        let len = fft.magnitudes.len();

        let step = (len as f64 / self.width.max(1) as f64).ceil().max(1.0) as usize;
        let start = ((self.frequency_range.from - fft.range.from) / resolution)
            .floor()
            .max(0.0) as usize;
        let end = (((self.frequency_range.to - fft.range.from) / resolution).ceil())
            .min((len - 1) as f64) as usize;
        if start > end {
            return (Vec::new(), Vec::new());
        }

        let mut spectrum = Vec::with_capacity((end - start + 1).div_ceil(step));
        let mut envelope = Vec::with_capacity(spectrum.capacity());
        let mut i = start;
        while i <= end {
            let mut magnitude = f64::NEG_INFINITY;
            let mut sigma = f64::NEG_INFINITY;
            for j in i..(i + step).min(len) {
                magnitude = magnitude.max(fft.magnitudes[j]);
                sigma = sigma.max(fft.sigma_envelope[j]);
            }

            let x = self.frequency_range.fraction_of(fft.frequency(i));
            spectrum.push(FPoint {
                x,
                y: self.db_range.fraction_of(magnitude),
            });
            envelope.push(FPoint {
                x,
                y: self.db_range.fraction_of(sigma),
            });
            i += step;
        }

        (spectrum, envelope)
    }

    /// Sub-bin interpolation of a peak maximum, in Hz relative to the bin
    /// center.
    fn peak_correction(&self, index: usize) -> Frequency {
        let data = &self.fft.magnitudes;
        if index == 0 || index + 1 >= data.len() {
            return 0.0;
        }
        let denominator = 4.0 * data[index] - 2.0 * data[index - 1] - 2.0 * data[index + 1];
        if denominator.abs() < 1e-12 {
            return 0.0;
        }
        (data[index + 1] - data[index - 1]) / denominator * self.fft.resolution()
    }

    fn update_peaks(&mut self, now: Instant) {
        for index in 0..self.fft.peaks.len() {
            let peak = self.fft.peaks[index];
            let max_frequency = self.fft.frequency(peak.max) + self.peak_correction(peak.max);
            self.peak_buffer.insert(
                peak_key(max_frequency),
                TrackedPeak {
                    range: FrequencyRange::new(
                        self.fft.frequency(peak.from),
                        self.fft.frequency(peak.to),
                    ),
                    max_frequency,
                    value_db: peak.value,
                    last_seen: now,
                },
            );
        }

        // collect first, evict after: the map must not change mid-iteration
        let mut evicted = Vec::new();
        for (key, peak) in &self.peak_buffer {
            let expired = now.duration_since(peak.last_seen) >= self.peak_timeout;
            if expired || !self.frequency_range.contains(peak.max_frequency) {
                evicted.push(*key);
            }
        }
        for key in evicted {
            self.peak_buffer.remove(&key);
        }
    }

    fn peak_marks(&self, now: Instant) -> Vec<PeakMark> {
        self.peak_buffer
            .values()
            .filter(|peak| {
                now.duration_since(peak.last_seen) < self.peak_timeout
                    && self.frequency_range.contains(peak.max_frequency)
            })
            .map(|peak| PeakMark {
                from_x: self.frequency_range.fraction_of(peak.range.from),
                to_x: self.frequency_range.fraction_of(peak.range.to),
                max_x: self.frequency_range.fraction_of(peak.max_frequency),
                max_frequency: peak.max_frequency,
                value_y: self.db_range.fraction_of(peak.value_db),
                value_db: peak.value_db,
            })
            .collect()
    }

    /// Rasterize the spectrum into one waterfall row of `width` amplitudes.
    fn waterline(&self, spectrum: &[FPoint]) -> Vec<Frct> {
        let length = self.width as usize;
        let mut result = vec![0.0; length];
        if spectrum.is_empty() || length == 0 {
            return result;
        }
        let bin_width = length as f64 / spectrum.len() as f64;
        for point in spectrum {
            let center = (length - 1) as f64 * point.x;
            let bin_from = (center - bin_width / 2.0) as i64;
            let bin_to = (center + bin_width / 2.0 + 1.0) as i64;
            for i in bin_from..=bin_to {
                if i < 0 || i >= length as i64 {
                    continue;
                }
                let i = i as usize;
                result[i] = result[i].max(point.y);
            }
        }
        result
    }
}
