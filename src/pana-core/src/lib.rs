// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod dsp;
pub mod mainloop;
pub mod panorama;
pub mod radio;
pub mod source;
pub mod vfo;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use dsp::{FftFrame, FftProcessor, PeakIndexRange};
pub use mainloop::{Command, MainLoop, MainLoopHandle};
pub use panorama::{Panorama, PanoramaFrame};
pub use radio::freq::{Db, DbRange, Frct, Frequency, FrequencyRange, HzPerPx, Px, Vfo};
pub use source::SampleBlock;
