// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Sample sources. Every source emits blocks of exactly `block_size` complex
//! samples into a capacity-1 channel and paces itself at
//! `block_size / sample_rate` seconds per block. When the consumer is not
//! ready the block is dropped; the spectrum has no use for stale input.

use std::f64::consts::PI;
use std::time::Duration;

use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

/// One block of complex IQ baseband samples.
pub type SampleBlock = Vec<Complex<f64>>;

fn block_duration(block_size: usize, sample_rate: f64) -> Duration {
    Duration::from_secs_f64(block_size as f64 / sample_rate)
}

fn emit(tx: &mpsc::Sender<SampleBlock>, block: SampleBlock) {
    if tx.try_send(block).is_err() {
        debug!("sample consumer not ready, dropping block");
    }
}

async fn pace_blocks<F>(
    block_size: usize,
    sample_rate: f64,
    tx: mpsc::Sender<SampleBlock>,
    mut shutdown: watch::Receiver<bool>,
    mut next_block: F,
) where
    F: FnMut() -> SampleBlock,
{
    let mut tick = time::interval(block_duration(block_size, sample_rate));
    tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = tick.tick() => emit(&tx, next_block()),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("sample source shutdown");
                    return;
                }
            }
        }
    }
}

fn tone_block(block_size: usize, rate: f64) -> SampleBlock {
    let omega = 2.0 * PI * rate;
    (0..block_size)
        .map(|i| {
            let t = i as f64;
            Complex::new((omega * t).cos(), (omega * t).sin())
        })
        .collect()
}

/// Uniform random noise on both components.
pub fn spawn_noise_source(
    block_size: usize,
    sample_rate: f64,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<SampleBlock>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        pace_blocks(block_size, sample_rate, tx, shutdown, move || {
            (0..block_size)
                .map(|_| Complex::new(rng.gen::<f64>(), rng.gen::<f64>()))
                .collect()
        })
        .await;
    });
    (rx, handle)
}

/// A single complex tone at `frequency` Hz of baseband.
pub fn spawn_tone_source(
    block_size: usize,
    sample_rate: f64,
    frequency: f64,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<SampleBlock>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let rate = frequency / sample_rate;
    let handle = tokio::spawn(async move {
        pace_blocks(block_size, sample_rate, tx, shutdown, move || {
            tone_block(block_size, rate)
        })
        .await;
    });
    (rx, handle)
}

/// A tone sweeping linearly from `from` to `to` Hz, advancing by `step` Hz
/// per block and wrapping around.
pub fn spawn_sweep_source(
    block_size: usize,
    sample_rate: f64,
    from: f64,
    to: f64,
    step: f64,
    shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<SampleBlock>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        let mut frequency = from;
        pace_blocks(block_size, sample_rate, tx, shutdown, move || {
            let block = tone_block(block_size, frequency / sample_rate);
            frequency += step;
            if frequency > to {
                frequency = from;
            }
            block
        })
        .await;
    });
    (rx, handle)
}

fn normalize_sample_u8(s: u8) -> f64 {
    (s as f64 - 127.0) / 127.0
}

/// Read interleaved unsigned 8-bit Q/I pairs from a byte stream, e.g. a
/// tuner pipe. A read error or EOF ends the stream: the channel closes and
/// downstream treats the source as empty.
pub fn spawn_reader_source<R>(
    mut reader: R,
    block_size: usize,
    sample_rate: f64,
    mut shutdown: watch::Receiver<bool>,
) -> (mpsc::Receiver<SampleBlock>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; block_size * 2];
        loop {
            tokio::select! {
                result = reader.read_exact(&mut buf) => {
                    if let Err(e) = result {
                        warn!("reading incoming samples failed: {e}");
                        return;
                    }
                    let block: SampleBlock = buf
                        .chunks_exact(2)
                        .map(|pair| {
                            let q = normalize_sample_u8(pair[0]);
                            let i = normalize_sample_u8(pair[1]);
                            Complex::new(i, q)
                        })
                        .collect();
                    emit(&tx, block);
                    time::sleep(block_duration(block_size, sample_rate)).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("reader source shutdown");
                        return;
                    }
                }
            }
        }
    });
    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn tone_source_emits_full_blocks() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut rx, handle) = spawn_tone_source(64, 1024.0, 256.0, shutdown_rx);

        let block = rx.recv().await.unwrap();
        assert_eq!(block.len(), 64);
        // |tone| = 1 everywhere
        for s in &block {
            assert!((s.norm() - 1.0).abs() < 1e-12);
        }
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn noise_source_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut rx, handle) = spawn_noise_source(32, 1024.0, shutdown_rx);

        assert_eq!(rx.recv().await.unwrap().len(), 32);
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        // channel closes once the source task is gone
        while rx.recv().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_source_advances_and_wraps() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (mut rx, handle) = spawn_sweep_source(64, 1024.0, 100.0, 200.0, 60.0, shutdown_rx);
        // three blocks: 100 Hz, 160 Hz, then wrapped back to 100 Hz
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_ne!(first[1], second[1]);
        assert_eq!(first[1], third[1]);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reader_source_decodes_and_closes_on_eof() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        // one block of 4 samples: Q first, then I
        let bytes: Vec<u8> = vec![127, 254, 0, 127, 127, 127, 254, 0];
        let (mut rx, handle) =
            spawn_reader_source(std::io::Cursor::new(bytes), 4, 1024.0, shutdown_rx);

        let block = rx.recv().await.unwrap();
        assert_eq!(block.len(), 4);
        assert!((block[0].re - 1.0).abs() < 1e-9); // i = 254
        assert!((block[0].im - 0.0).abs() < 1e-9); // q = 127
        assert!((block[1].re - 0.0).abs() < 1e-9);
        assert!((block[1].im + 1.0).abs() < 1e-9); // q = 0

        // EOF on the second read ends the stream
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }
}
