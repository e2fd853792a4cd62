// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod bandplan;
pub mod freq;

use freq::Frequency;

/// First IF center of the FT-450D; the tuner taps the receiver here, so the
/// rig's dial frequency always appears at this point of the captured band.
pub const IF_CENTER: Frequency = 67_899_000.0;

/// Capture sample rate of the tuner front-end in Hz.
pub const SAMPLE_RATE: f64 = 1_800_000.0;

/// Number of complex samples per input block (≈ 18 ms at 1.8 MS/s).
pub const BLOCK_SIZE: usize = 32_768;

/// Center frequency the tuner is actually parked on. Offset by a quarter of
/// the sample rate so the IF lands away from the tuner's DC spike.
pub fn rx_center() -> Frequency {
    IF_CENTER - SAMPLE_RATE / 4.0
}
