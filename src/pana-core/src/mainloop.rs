// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The event loop: sole owner of the panorama state, multiplexing sample
//! blocks, completed FFT frames, VFO telemetry, UI commands and the render
//! tick.
//!
//! Back-pressure discipline: every channel has capacity 1. At most one DSP
//! request is in flight (`need_fft_data`), and a new request is only armed
//! after a snapshot was actually handed to the UI. Blocks and frames that
//! find a busy consumer are dropped, never queued.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::dsp::{DspWork, FftFrame};
use crate::panorama::{Panorama, PanoramaFrame};
use crate::radio::freq::{Frct, Frequency, Px, Vfo};
use crate::source::SampleBlock;
use crate::vfo::VfoHandle;

/// A user command, applied between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetSize(Px, Px),
    TuneTo(Frequency),
    TuneBy(Frequency),
    TuneUp,
    TuneDown,
    ToggleViewMode,
    ZoomIn,
    ZoomOut,
    ZoomToBand,
    ResetZoom,
    FinerDynamicRange,
    CoarserDynamicRange,
    ShiftFrequencyRange(Frct),
    ToggleSignalDetection,
}

/// Posts commands into the event loop without blocking.
#[derive(Clone)]
pub struct MainLoopHandle {
    command_tx: mpsc::Sender<Command>,
}

impl MainLoopHandle {
    fn post(&self, command: Command) {
        if self.command_tx.try_send(command).is_err() {
            warn!("main loop busy, dropping command");
        }
    }

    pub fn set_panorama_size(&self, width: Px, height: Px) {
        self.post(Command::SetSize(width, height));
    }

    pub fn tune_to(&self, f: Frequency) {
        self.post(Command::TuneTo(f));
    }

    pub fn tune_by(&self, delta: Frequency) {
        self.post(Command::TuneBy(delta));
    }

    pub fn tune_up(&self) {
        self.post(Command::TuneUp);
    }

    pub fn tune_down(&self) {
        self.post(Command::TuneDown);
    }

    pub fn toggle_view_mode(&self) {
        self.post(Command::ToggleViewMode);
    }

    pub fn zoom_in(&self) {
        self.post(Command::ZoomIn);
    }

    pub fn zoom_out(&self) {
        self.post(Command::ZoomOut);
    }

    pub fn zoom_to_band(&self) {
        self.post(Command::ZoomToBand);
    }

    pub fn reset_zoom(&self) {
        self.post(Command::ResetZoom);
    }

    pub fn finer_dynamic_range(&self) {
        self.post(Command::FinerDynamicRange);
    }

    pub fn coarser_dynamic_range(&self) {
        self.post(Command::CoarserDynamicRange);
    }

    pub fn shift_frequency_range(&self, ratio: Frct) {
        self.post(Command::ShiftFrequencyRange(ratio));
    }

    pub fn toggle_signal_detection(&self) {
        self.post(Command::ToggleSignalDetection);
    }
}

pub struct MainLoop {
    panorama: Panorama,
    tick_interval: Duration,
    need_fft_data: bool,
    dial: Dial,

    samples_rx: mpsc::Receiver<SampleBlock>,
    work_tx: mpsc::Sender<DspWork>,
    fft_rx: mpsc::Receiver<FftFrame>,
    vfo_rx: watch::Receiver<Vfo>,
    vfo_handle: VfoHandle,
    command_rx: mpsc::Receiver<Command>,
    frames_tx: mpsc::Sender<PanoramaFrame>,
    shutdown: watch::Receiver<bool>,
}

impl MainLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        panorama: Panorama,
        fft_per_second: u32,
        samples_rx: mpsc::Receiver<SampleBlock>,
        work_tx: mpsc::Sender<DspWork>,
        fft_rx: mpsc::Receiver<FftFrame>,
        vfo_rx: watch::Receiver<Vfo>,
        vfo_handle: VfoHandle,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, MainLoopHandle, mpsc::Receiver<PanoramaFrame>) {
        let (command_tx, command_rx) = mpsc::channel(1);
        let (frames_tx, frames_rx) = mpsc::channel(1);

        let main_loop = Self {
            panorama,
            tick_interval: Duration::from_secs(1) / fft_per_second.max(1),
            need_fft_data: true,
            dial: Dial::default(),
            samples_rx,
            work_tx,
            fft_rx,
            vfo_rx,
            vfo_handle,
            command_rx,
            frames_tx,
            shutdown,
        };
        (main_loop, MainLoopHandle { command_tx }, frames_rx)
    }

    pub async fn run(mut self) {
        let mut tick = time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut samples_open = true;
        let mut fft_open = true;
        let mut commands_open = true;
        let mut vfo_open = true;

        loop {
            tokio::select! {
                samples = self.samples_rx.recv(), if samples_open => match samples {
                    Some(block) => self.dispatch_samples(block),
                    None => {
                        warn!("sample stream ended");
                        samples_open = false;
                    }
                },
                fft = self.fft_rx.recv(), if fft_open => match fft {
                    Some(frame) => self.panorama.set_fft(frame),
                    None => fft_open = false,
                },
                _ = tick.tick() => self.publish_frame(),
                changed = self.vfo_rx.changed(), if vfo_open => match changed {
                    Ok(()) => {
                        let vfo = self.vfo_rx.borrow_and_update().clone();
                        self.panorama.set_vfo(vfo);
                    }
                    Err(_) => vfo_open = false,
                },
                command = self.command_rx.recv(), if commands_open => match command {
                    Some(command) => self.apply(command),
                    None => commands_open = false,
                },
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("main loop shutdown");
    }

    /// Hand a sample block to the DSP, unless a request is already pending.
    fn dispatch_samples(&mut self, samples: SampleBlock) {
        if !self.need_fft_data {
            return;
        }
        let (vfo, _) = self.panorama.vfo();
        let work = DspWork {
            samples,
            foi: self.panorama.frequency_range(),
            vfo: vfo.clone(),
        };
        if self.work_tx.try_send(work).is_err() {
            debug!("DSP worker busy, dropping sample block");
            return;
        }
        self.need_fft_data = false;
    }

    /// Publish the current snapshot; arm the next FFT only when the UI
    /// actually took it.
    fn publish_frame(&mut self) {
        let frame = self.panorama.data();
        if frame.is_empty() {
            trace!("no spectrum data yet, skipping frame");
            return;
        }
        match self.frames_tx.try_send(frame) {
            Ok(()) => self.need_fft_data = true,
            Err(_) => debug!("snapshot consumer not ready, dropping frame"),
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetSize(width, height) => self.panorama.set_size(width, height),
            Command::TuneTo(f) => self.vfo_handle.tune_to(f),
            Command::TuneBy(delta) => self.vfo_handle.tune_by(delta),
            Command::TuneUp => {
                let step = self.dial.step();
                self.vfo_handle.tune_by(step);
            }
            Command::TuneDown => {
                let step = self.dial.step();
                self.vfo_handle.tune_by(-step);
            }
            Command::ToggleViewMode => self.panorama.toggle_view_mode(),
            Command::ZoomIn => self.panorama.zoom_in(),
            Command::ZoomOut => self.panorama.zoom_out(),
            Command::ZoomToBand => self.panorama.zoom_to_band(),
            Command::ResetZoom => self.panorama.reset_zoom(),
            Command::FinerDynamicRange => self.panorama.finer_dynamic_range(),
            Command::CoarserDynamicRange => self.panorama.coarser_dynamic_range(),
            Command::ShiftFrequencyRange(ratio) => self.panorama.shift_frequency_range(ratio),
            Command::ToggleSignalDetection => self.panorama.toggle_signal_detection(),
        }
    }
}

/// Rotary-knob acceleration: the faster tune-up/down is pressed, the larger
/// the step, rounded up to the next multiple of 10 Hz.
#[derive(Default)]
struct Dial {
    last: Option<Instant>,
}

impl Dial {
    fn step(&mut self) -> Frequency {
        self.step_at(Instant::now())
    }

    fn step_at(&mut self, now: Instant) -> Frequency {
        let rate = match self.last {
            Some(last) => {
                let dt = now.duration_since(last).as_secs_f64();
                if dt > 0.0 {
                    1.0 / dt
                } else {
                    f64::INFINITY
                }
            }
            None => 0.0,
        };
        self.last = Some(now);

        let step = (0.3 * rate).powi(2).min(500.0);
        ((step as u64 / 10) + 1) as f64 * 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::freq::FrequencyRange;
    use crate::vfo::VfoCommand;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Harness {
        samples_tx: mpsc::Sender<SampleBlock>,
        work_rx: Option<mpsc::Receiver<DspWork>>,
        fft_tx: Option<mpsc::Sender<FftFrame>>,
        vfo_tx: watch::Sender<Vfo>,
        vfo_command_rx: mpsc::Receiver<VfoCommand>,
        handle: MainLoopHandle,
        frames_rx: mpsc::Receiver<PanoramaFrame>,
        shutdown_tx: watch::Sender<bool>,
        task: tokio::task::JoinHandle<()>,
    }

    fn harness() -> Harness {
        let (samples_tx, samples_rx) = mpsc::channel(1);
        let (work_tx, work_rx) = mpsc::channel(1);
        let (fft_tx, fft_rx) = mpsc::channel(1);
        let (vfo_tx, vfo_rx) = watch::channel(Vfo::default());
        let (vfo_handle, vfo_command_rx) = VfoHandle::for_tests();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let panorama = Panorama::new(100, FrequencyRange::new(1000.0, 2000.0), 1500.0);
        let (main_loop, handle, frames_rx) = MainLoop::new(
            panorama,
            25,
            samples_rx,
            work_tx,
            fft_rx,
            vfo_rx,
            vfo_handle,
            shutdown_rx,
        );
        let task = tokio::spawn(main_loop.run());

        Harness {
            samples_tx,
            work_rx: Some(work_rx),
            fft_tx: Some(fft_tx),
            vfo_tx,
            vfo_command_rx,
            handle,
            frames_rx,
            shutdown_tx,
            task,
        }
    }

    fn flat_frame() -> FftFrame {
        FftFrame {
            magnitudes: vec![-80.0; 64],
            sigma_envelope: vec![-80.0; 64],
            range: FrequencyRange::new(1000.0, 2000.0),
            mean: -80.0,
            peak_threshold: -75.0,
            peaks: Vec::new(),
        }
    }

    /// Mock DSP worker answering every request with a flat frame.
    fn spawn_mock_dsp(
        mut work_rx: mpsc::Receiver<DspWork>,
        fft_tx: mpsc::Sender<FftFrame>,
    ) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        tokio::spawn(async move {
            while work_rx.recv().await.is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = fft_tx.try_send(flat_frame());
            }
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let mut h = harness();
        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
        assert!(h.frames_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_source_produces_no_snapshots() {
        let mut h = harness();
        let work_rx = h.work_rx.as_mut().unwrap();

        time::sleep(Duration::from_secs(2)).await;
        assert!(h.frames_rx.try_recv().is_err(), "snapshot without samples");
        assert!(work_rx.try_recv().is_err(), "FFT request without samples");

        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_consumer_gates_the_dsp() {
        let mut h = harness();
        let dsp_calls = spawn_mock_dsp(h.work_rx.take().unwrap(), h.fft_tx.take().unwrap());

        let feeder_samples = h.samples_tx.clone();
        tokio::spawn(async move {
            loop {
                let _ = feeder_samples.try_send(vec![Default::default(); 16]);
                time::sleep(Duration::from_millis(5)).await;
            }
        });

        // nobody consumes frames: one request for the initial arm, one for
        // the single frame that fits the capacity-1 output channel
        time::sleep(Duration::from_secs(2)).await;
        let stalled = dsp_calls.load(Ordering::SeqCst);
        assert!(stalled <= 2, "dsp ran {stalled} times against a full output");

        // consuming a frame re-arms the gate
        let frame = h.frames_rx.recv().await.unwrap();
        assert!(!frame.is_empty());
        time::sleep(Duration::from_secs(1)).await;
        assert!(dsp_calls.load(Ordering::SeqCst) > stalled);

        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn vfo_updates_reach_the_panorama() {
        let mut h = harness();
        let dsp_calls = spawn_mock_dsp(h.work_rx.take().unwrap(), h.fft_tx.take().unwrap());

        h.vfo_tx
            .send(Vfo {
                name: "A".into(),
                frequency: 1600.0,
                filter_width: 100.0,
                mode: "USB".into(),
            })
            .unwrap();

        h.samples_tx.send(vec![Default::default(); 16]).await.unwrap();
        let frame = h.frames_rx.recv().await.unwrap();
        assert_eq!(frame.vfo.frequency, 1600.0);
        assert!(dsp_calls.load(Ordering::SeqCst) >= 1);

        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn tune_commands_are_forwarded_to_the_vfo() {
        let mut h = harness();

        h.handle.tune_to(7_010_000.0);
        assert_eq!(
            h.vfo_command_rx.recv().await,
            Some(VfoCommand::TuneTo(7_010_000.0))
        );

        h.handle.tune_by(-500.0);
        assert_eq!(
            h.vfo_command_rx.recv().await,
            Some(VfoCommand::TuneBy(-500.0))
        );

        h.handle.tune_up();
        match h.vfo_command_rx.recv().await {
            Some(VfoCommand::TuneBy(step)) => assert!(step >= 10.0),
            other => panic!("unexpected command {other:?}"),
        }

        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn view_commands_shape_the_snapshot() {
        let mut h = harness();
        let _dsp = spawn_mock_dsp(h.work_rx.take().unwrap(), h.fft_tx.take().unwrap());

        h.handle.set_panorama_size(200, 100);
        h.samples_tx.send(vec![Default::default(); 16]).await.unwrap();
        let frame = h.frames_rx.recv().await.unwrap();
        assert_eq!(frame.frequency_range.width(), 2000.0);

        h.shutdown_tx.send(true).unwrap();
        h.task.await.unwrap();
    }

    #[test]
    fn dial_accelerates_with_the_call_rate() {
        let mut dial = Dial::default();
        let t0 = Instant::now();

        // first press: no rate yet
        assert_eq!(dial.step_at(t0), 10.0);

        // slow turning keeps the minimum step
        assert_eq!(dial.step_at(t0 + Duration::from_secs(1)), 10.0);

        // 50 presses per second: (0.3·50)² = 225 → 230
        assert_eq!(
            dial.step_at(t0 + Duration::from_secs(1) + Duration::from_millis(20)),
            230.0
        );

        // implausibly fast turning clamps at 500 → 510
        assert_eq!(
            dial.step_at(t0 + Duration::from_secs(1) + Duration::from_micros(20100)),
            510.0
        );
    }

    #[test]
    fn dial_rounds_up_to_the_next_10_hz() {
        let mut dial = Dial::default();
        let t0 = Instant::now();
        dial.step_at(t0);
        // 10 presses per second: (0.3·10)² = 9 → 10
        assert_eq!(dial.step_at(t0 + Duration::from_millis(100)), 10.0);

        let mut dial = Dial::default();
        dial.step_at(t0);
        // 20 presses per second: (0.3·20)² = 36 → 40
        assert_eq!(dial.step_at(t0 + Duration::from_millis(50)), 40.0);
    }
}
