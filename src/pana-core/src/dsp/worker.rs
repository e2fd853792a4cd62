// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The DSP task. Work arrives on a capacity-1 channel, completed frames
//! leave on a capacity-1 channel with drop-on-full semantics; the event loop
//! guarantees at most one request is in flight.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{FftFrame, FftProcessor};
use crate::radio::freq::{FrequencyRange, Vfo};
use crate::source::SampleBlock;

/// One DSP request: a sample block with the viewport it should cover.
#[derive(Debug)]
pub struct DspWork {
    pub samples: SampleBlock,
    pub foi: FrequencyRange,
    pub vfo: Vfo,
}

/// Spawn the DSP task. The task ends when the work channel closes.
pub fn spawn_worker(
    mut processor: FftProcessor,
) -> (
    mpsc::Sender<DspWork>,
    mpsc::Receiver<FftFrame>,
    JoinHandle<()>,
) {
    let (work_tx, mut work_rx) = mpsc::channel::<DspWork>(1);
    let (fft_tx, fft_rx) = mpsc::channel::<FftFrame>(1);

    let handle = tokio::spawn(async move {
        while let Some(work) = work_rx.recv().await {
            let Some(frame) = processor.process(&work.samples, work.foi, &work.vfo) else {
                continue;
            };
            if fft_tx.try_send(frame).is_err() {
                debug!("FFT consumer not ready, dropping frame");
            }
        }
        debug!("DSP worker shutdown");
    });

    (work_tx, fft_rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::freq::FrequencyRange;
    use num_complex::Complex;
    use std::f64::consts::PI;

    fn tone(block_size: usize, rate: f64) -> SampleBlock {
        let omega = 2.0 * PI * rate;
        (0..block_size)
            .map(|i| {
                let t = i as f64;
                Complex::new((omega * t).cos(), (omega * t).sin())
            })
            .collect()
    }

    #[tokio::test]
    async fn worker_produces_a_frame_per_request() {
        let processor = FftProcessor::new(2048.0, 70_000.0, 69_488.0);
        let (work_tx, mut fft_rx, handle) = spawn_worker(processor);

        let vfo = Vfo {
            frequency: 70_000.0,
            ..Vfo::default()
        };
        work_tx
            .send(DspWork {
                samples: tone(2048, 0.25),
                foi: FrequencyRange::new(69_744.0, 70_256.0),
                vfo,
            })
            .await
            .unwrap();

        let frame = fft_rx.recv().await.unwrap();
        assert_eq!(frame.magnitudes.len(), 1024);

        drop(work_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn worker_skips_zero_width_requests() {
        let processor = FftProcessor::new(2048.0, 70_000.0, 69_488.0);
        let (work_tx, mut fft_rx, handle) = spawn_worker(processor);

        work_tx
            .send(DspWork {
                samples: tone(256, 0.1),
                foi: FrequencyRange::new(70_000.0, 70_000.0),
                vfo: Vfo::default(),
            })
            .await
            .unwrap();

        drop(work_tx);
        handle.await.unwrap();
        assert!(fft_rx.recv().await.is_none());
    }
}
