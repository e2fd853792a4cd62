// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IARU Region 1 HF bandplan as pure data.

use super::freq::{Frequency, FrequencyRange};

/// Preferred operating mode of a band portion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cw,
    Phone,
    Digital,
    Beacon,
    Contest,
}

/// A part of a band with a preferred mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portion {
    pub mode: Mode,
    pub range: FrequencyRange,
}

/// A named amateur-radio band with its mode portions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub range: FrequencyRange,
    pub portions: &'static [Portion],
}

impl Band {
    /// The unknown band: contains no frequency.
    pub const UNKNOWN: Band = Band {
        name: "Unknown",
        range: FrequencyRange { from: 0.0, to: 0.0 },
        portions: &[],
    };

    pub fn contains(&self, f: Frequency) -> bool {
        self.width() > 0.0 && self.range.contains(f)
    }

    pub fn width(&self) -> Frequency {
        self.range.width()
    }
}

impl Default for Band {
    fn default() -> Self {
        Band::UNKNOWN
    }
}

const fn range(from: f64, to: f64) -> FrequencyRange {
    FrequencyRange { from, to }
}

const fn portion(mode: Mode, from: f64, to: f64) -> Portion {
    Portion {
        mode,
        range: range(from, to),
    }
}

/// The IARU Region 1 HF bands.
pub static IARU_REGION_1: &[Band] = &[
    Band {
        name: "160m",
        range: range(1_810_000.0, 2_000_000.0),
        portions: &[
            portion(Mode::Cw, 1_810_000.0, 1_838_000.0),
            portion(Mode::Digital, 1_838_000.0, 1_843_000.0),
            portion(Mode::Phone, 1_843_000.0, 2_000_000.0),
        ],
    },
    Band {
        name: "80m",
        range: range(3_500_000.0, 3_800_000.0),
        portions: &[
            portion(Mode::Cw, 3_500_000.0, 3_570_000.0),
            portion(Mode::Digital, 3_570_000.0, 3_620_000.0),
            portion(Mode::Phone, 3_620_000.0, 3_800_000.0),
            portion(Mode::Contest, 3_510_000.0, 3_569_000.0),
            portion(Mode::Contest, 3_600_000.0, 3_650_000.0),
            portion(Mode::Contest, 3_700_000.0, 3_800_000.0),
        ],
    },
    Band {
        name: "60m",
        range: range(5_351_500.0, 5_366_500.0),
        portions: &[
            portion(Mode::Cw, 5_351_500.0, 5_354_000.0),
            portion(Mode::Phone, 5_354_000.0, 5_366_000.0),
            portion(Mode::Digital, 5_366_000.0, 5_366_500.0),
        ],
    },
    Band {
        name: "40m",
        range: range(7_000_000.0, 7_200_000.0),
        portions: &[
            portion(Mode::Cw, 7_000_000.0, 7_040_000.0),
            portion(Mode::Digital, 7_040_000.0, 7_053_000.0),
            portion(Mode::Phone, 7_053_000.0, 7_200_000.0),
            portion(Mode::Contest, 7_000_000.0, 7_040_000.0),
            portion(Mode::Contest, 7_130_000.0, 7_200_000.0),
        ],
    },
    Band {
        name: "30m",
        range: range(10_100_000.0, 10_150_000.0),
        portions: &[
            portion(Mode::Cw, 10_100_000.0, 10_130_000.0),
            portion(Mode::Digital, 10_130_000.0, 10_150_000.0),
        ],
    },
    Band {
        name: "20m",
        range: range(14_000_000.0, 14_350_000.0),
        portions: &[
            portion(Mode::Cw, 14_000_000.0, 14_070_000.0),
            portion(Mode::Digital, 14_070_000.0, 14_099_000.0),
            portion(Mode::Beacon, 14_099_000.0, 14_101_000.0),
            portion(Mode::Digital, 14_101_000.0, 14_112_000.0),
            portion(Mode::Phone, 14_112_000.0, 14_350_000.0),
            portion(Mode::Contest, 14_000_000.0, 14_060_000.0),
            portion(Mode::Contest, 14_125_000.0, 14_300_000.0),
        ],
    },
    Band {
        name: "17m",
        range: range(18_068_000.0, 18_168_000.0),
        portions: &[
            portion(Mode::Cw, 18_068_000.0, 18_095_000.0),
            portion(Mode::Digital, 18_095_000.0, 18_109_000.0),
            portion(Mode::Beacon, 18_109_000.0, 18_111_000.0),
            portion(Mode::Digital, 18_111_000.0, 18_120_000.0),
            portion(Mode::Phone, 18_120_000.0, 18_168_000.0),
        ],
    },
    Band {
        name: "15m",
        range: range(21_000_000.0, 21_450_000.0),
        portions: &[
            portion(Mode::Cw, 21_000_000.0, 21_070_000.0),
            portion(Mode::Digital, 21_070_000.0, 21_149_000.0),
            portion(Mode::Beacon, 21_149_000.0, 21_151_000.0),
            portion(Mode::Phone, 21_151_000.0, 21_450_000.0),
            portion(Mode::Contest, 21_000_000.0, 21_070_000.0),
            portion(Mode::Contest, 21_151_000.0, 21_450_000.0),
        ],
    },
    Band {
        name: "12m",
        range: range(24_890_000.0, 24_990_000.0),
        portions: &[
            portion(Mode::Cw, 24_890_000.0, 24_915_000.0),
            portion(Mode::Digital, 24_915_000.0, 24_929_000.0),
            portion(Mode::Beacon, 24_929_000.0, 24_931_000.0),
            portion(Mode::Digital, 24_931_000.0, 24_940_000.0),
            portion(Mode::Phone, 24_940_000.0, 24_990_000.0),
        ],
    },
    Band {
        name: "10m",
        range: range(28_000_000.0, 29_700_000.0),
        portions: &[],
    },
];

/// Find the band containing the given frequency.
pub fn by_frequency(f: Frequency) -> Band {
    IARU_REGION_1
        .iter()
        .find(|b| b.contains(f))
        .copied()
        .unwrap_or(Band::UNKNOWN)
}
