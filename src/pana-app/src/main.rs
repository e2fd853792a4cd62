// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use pana_core::radio::{self, BLOCK_SIZE, IF_CENTER, SAMPLE_RATE};
use pana_core::{
    dsp, source, vfo, DynResult, FftProcessor, FrequencyRange, MainLoop, Panorama, Vfo,
};

use config::AppConfig;
use logging::init_logging;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - panadapter daemon");

/// Dial to park on when the rig has not reported a frequency yet.
const FALLBACK_DIAL: f64 = 7_050_000.0;

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Run with a synthetic signal source instead of a tuner stream
    #[arg(long = "testmode", short = 't')]
    testmode: bool,
    /// Address of the rig control daemon (host:port)
    #[arg(long = "vfo-host", short = 'H')]
    vfo_host: Option<String>,
    /// Snapshot frames per second
    #[arg(long = "fft-per-second")]
    fft_per_second: Option<u32>,
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", AppConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        (AppConfig::load_from_file(path)?, Some(path.clone()))
    } else {
        AppConfig::load_from_default_paths()?
    };
    if cli.testmode {
        cfg.testmode = true;
    }
    if let Some(ref host) = cli.vfo_host {
        cfg.vfo_host = host.clone();
    }
    if let Some(fft_per_second) = cli.fft_per_second {
        cfg.fft_per_second = fft_per_second;
    }

    init_logging(cfg.log_level.as_deref());
    if let Some(ref path) = config_path {
        info!("loaded configuration from {}", path.display());
    }

    // The tuner's crystal error shifts the whole captured band; fold the
    // configured ppm correction into the rx mapping.
    let rx_center = radio::rx_center() * (1.0 + cfg.frequency_correction as f64 * 1e-6);
    info!(
        "tuner geometry: IF {:.0} Hz, rx center {:.0} Hz, sample rate {:.0} Hz ({} ppm)",
        IF_CENTER, rx_center, SAMPLE_RATE, cfg.frequency_correction
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task_handles: Vec<JoinHandle<()>> = Vec::new();

    let (samples_rx, source_handle) = if cfg.testmode {
        // a tone a quarter of the sample rate into the band sits exactly on
        // the rig's dial
        info!("testmode: synthetic tone source");
        source::spawn_tone_source(
            BLOCK_SIZE,
            SAMPLE_RATE,
            SAMPLE_RATE / 4.0,
            shutdown_rx.clone(),
        )
    } else {
        info!("reading 8-bit IQ samples from stdin");
        source::spawn_reader_source(
            tokio::io::stdin(),
            BLOCK_SIZE,
            SAMPLE_RATE,
            shutdown_rx.clone(),
        )
    };
    task_handles.push(source_handle);

    let (vfo_handle, vfo_rx, vfo_task) = if cfg.testmode && cfg.vfo_host.is_empty() {
        let initial = Vfo {
            name: "A".to_string(),
            frequency: FALLBACK_DIAL,
            filter_width: 2_400.0,
            mode: "USB".to_string(),
        };
        vfo::spawn_simulated(initial, shutdown_rx.clone())
    } else {
        vfo::VfoClient::new(&cfg.vfo_host).spawn(shutdown_rx.clone())
    };
    task_handles.push(vfo_task);

    let processor = FftProcessor::new(SAMPLE_RATE, IF_CENTER, rx_center);
    let (work_tx, fft_rx, dsp_task) = dsp::spawn_worker(processor);
    task_handles.push(dsp_task);

    let dial = {
        let frequency = vfo_rx.borrow().frequency;
        if frequency > 0.0 {
            frequency
        } else {
            FALLBACK_DIAL
        }
    };
    let initial_range = FrequencyRange::new(dial - 50_000.0, dial + 50_000.0);
    let mut panorama = Panorama::new(1000, initial_range, dial);
    panorama.set_dynamic_range(cfg.db_range());

    let (main_loop, ui, mut frames_rx) = MainLoop::new(
        panorama,
        cfg.fft_per_second,
        samples_rx,
        work_tx,
        fft_rx,
        vfo_rx,
        vfo_handle.clone(),
        shutdown_rx.clone(),
    );
    task_handles.push(tokio::spawn(main_loop.run()));

    // The frontend owns the handle and the frame stream; headless we only
    // size the viewport and account for the frames.
    ui.set_panorama_size(1280, 720);
    task_handles.push(tokio::spawn(async move {
        let mut frames: u64 = 0;
        while let Some(frame) = frames_rx.recv().await {
            frames += 1;
            debug!(
                "frame {}: {} points, {} peaks, {:.0}..{:.0} Hz",
                frames,
                frame.spectrum.len(),
                frame.peaks.len(),
                frame.frequency_range.from,
                frame.frequency_range.to
            );
        }
    }));

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    let _ = shutdown_tx.send(true);
    drop(ui);
    tokio::time::sleep(Duration::from_millis(400)).await;

    for handle in &task_handles {
        if !handle.is_finished() {
            handle.abort();
        }
    }
    for handle in task_handles {
        let _ = handle.await;
    }
    Ok(())
}
