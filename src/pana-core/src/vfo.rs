// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Polling client for a rigctld-compatible rig control daemon.
//!
//! The client task owns the connection and the local VFO state; everyone
//! else observes changes through a watch channel and tunes through the
//! command handle. The protocol is line-oriented ASCII: `v` (VFO name),
//! `f` (frequency in Hz), `m` (mode and passband), `F <hz>` (set
//! frequency, acknowledged with `RPRT 0`).

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::radio::freq::{Frequency, Vfo};

const DEFAULT_ADDRESS: &str = "localhost:4532";
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(100);
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(15);

/// Tuning request for the client task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VfoCommand {
    TuneTo(Frequency),
    TuneBy(Frequency),
}

/// Posts tuning requests to the VFO task without blocking.
#[derive(Clone)]
pub struct VfoHandle {
    command_tx: mpsc::Sender<VfoCommand>,
}

impl VfoHandle {
    fn post(&self, command: VfoCommand) {
        if self.command_tx.try_send(command).is_err() {
            warn!("VFO busy, dropping tune command");
        }
    }

    pub fn tune_to(&self, f: Frequency) {
        self.post(VfoCommand::TuneTo(f));
    }

    pub fn tune_by(&self, delta: Frequency) {
        self.post(VfoCommand::TuneBy(delta));
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> (Self, mpsc::Receiver<VfoCommand>) {
        let (command_tx, command_rx) = mpsc::channel(1);
        (Self { command_tx }, command_rx)
    }
}

#[derive(Debug, Error)]
enum RequestError {
    #[error("VFO connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Protocol(String),
}

/// Polling client against a rigctld endpoint.
pub struct VfoClient {
    address: String,
    polling_interval: Duration,
    request_timeout: Duration,
}

impl VfoClient {
    /// An empty address falls back to `localhost:4532`.
    pub fn new(address: &str) -> Self {
        let address = if address.is_empty() {
            DEFAULT_ADDRESS.to_string()
        } else {
            address.to_string()
        };
        Self {
            address,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_polling(mut self, interval: Duration, request_timeout: Duration) -> Self {
        self.polling_interval = interval;
        self.request_timeout = request_timeout;
        self
    }

    /// Spawn the client task. Telemetry arrives on the returned watch
    /// channel; the handle posts tune commands.
    pub fn spawn(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> (VfoHandle, watch::Receiver<Vfo>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(1);
        let (vfo_tx, vfo_rx) = watch::channel(Vfo::default());
        let handle = tokio::spawn(self.run(vfo_tx, command_rx, shutdown));
        (VfoHandle { command_tx }, vfo_rx, handle)
    }

    async fn run(
        self,
        vfo_tx: watch::Sender<Vfo>,
        mut command_rx: mpsc::Receiver<VfoCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut reconnect_delay = RECONNECT_BASE_DELAY;
        let mut state = Vfo::default();

        'reconnect: while !*shutdown.borrow() {
            info!("connecting to rig control at {}", self.address);
            let stream = tokio::select! {
                result = TcpStream::connect(&self.address) => result,
                _ = shutdown.changed() => continue 'reconnect,
            };
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("cannot open VFO connection: {e}");
                    tokio::select! {
                        _ = time::sleep(reconnect_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                    reconnect_delay = (reconnect_delay * 2).min(RECONNECT_MAX_DELAY);
                    continue 'reconnect;
                }
            };
            reconnect_delay = RECONNECT_BASE_DELAY;
            info!("rig control connected");

            let (reader, writer) = stream.into_split();
            let mut connection = Connection {
                reader: BufReader::new(reader),
                writer,
                request_timeout: self.request_timeout,
            };

            let mut poll = time::interval(self.polling_interval);
            poll.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = poll.tick() => match connection.poll(&mut state).await {
                        Ok(true) => {
                            let _ = vfo_tx.send(state.clone());
                        }
                        Ok(false) => {}
                        Err(RequestError::Protocol(e)) => warn!("VFO poll: {e}"),
                        Err(RequestError::Io(e)) => {
                            warn!("VFO connection lost: {e}");
                            continue 'reconnect;
                        }
                    },
                    Some(command) = command_rx.recv() => {
                        let target = match command {
                            VfoCommand::TuneTo(f) => f,
                            VfoCommand::TuneBy(delta) => state.frequency + delta,
                        };
                        match connection.set_frequency(target).await {
                            Ok(rounded) => {
                                // optimistic update on ack
                                state.frequency = rounded;
                                let _ = vfo_tx.send(state.clone());
                            }
                            Err(RequestError::Protocol(e)) => warn!("VFO tune: {e}"),
                            Err(RequestError::Io(e)) => {
                                warn!("VFO connection lost: {e}");
                                continue 'reconnect;
                            }
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break 'reconnect;
                        }
                    }
                }
            }
        }
        info!("VFO client shutdown");
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    request_timeout: Duration,
}

impl Connection {
    /// Send one command and read `expected_lines` response lines within the
    /// request deadline.
    async fn request(
        &mut self,
        command: &str,
        expected_lines: usize,
    ) -> Result<Vec<String>, RequestError> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let reader = &mut self.reader;
        let read_lines = async move {
            let mut lines = Vec::with_capacity(expected_lines);
            for _ in 0..expected_lines {
                let mut line = String::new();
                if reader.read_line(&mut line).await? == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed",
                    ));
                }
                lines.push(line.trim().to_string());
            }
            Ok(lines)
        };
        match time::timeout(self.request_timeout, read_lines).await {
            Ok(Ok(lines)) => Ok(lines),
            Ok(Err(e)) => Err(RequestError::Io(e)),
            Err(_) => Err(RequestError::Protocol(format!(
                "request '{command}' timed out"
            ))),
        }
    }

    /// Poll name, frequency and mode; returns whether the state changed.
    async fn poll(&mut self, state: &mut Vfo) -> Result<bool, RequestError> {
        let mut changed = false;

        let name = {
            let response = self.request("v", 1).await?;
            let name = response[0].as_str();
            // rigctld reports "VFOA"; keep the bare label
            name.strip_prefix("VFO").unwrap_or(name).to_string()
        };
        if name != state.name {
            state.name = name;
            changed = true;
        }

        let frequency = {
            let response = self.request("f", 1).await?;
            response[0].parse::<i64>().map_err(|e| {
                RequestError::Protocol(format!("wrong frequency format '{}': {e}", response[0]))
            })? as Frequency
        };
        if frequency != state.frequency {
            state.frequency = frequency;
            changed = true;
        }

        let response = self.request("m", 2).await?;
        let mode = response[0].clone();
        let filter_width = response[1].parse::<i64>().map_err(|e| {
            RequestError::Protocol(format!("wrong passband format '{}': {e}", response[1]))
        })? as Frequency;
        if mode != state.mode || filter_width != state.filter_width {
            state.mode = mode;
            state.filter_width = filter_width;
            changed = true;
        }

        if changed {
            debug!("VFO state {state:?}");
        }
        Ok(changed)
    }

    /// Tune the rig, rounding to 10 Hz. Returns the frequency actually sent.
    async fn set_frequency(&mut self, f: Frequency) -> Result<Frequency, RequestError> {
        let rounded = (f / 10.0) as i64 * 10;
        let response = self.request(&format!("F {rounded}"), 1).await?;
        if response[0] != "RPRT 0" {
            return Err(RequestError::Protocol(format!(
                "set frequency failed: {}",
                response[0]
            )));
        }
        Ok(rounded as Frequency)
    }
}

/// A stand-in rig for test mode: tune commands are applied locally and the
/// resulting state is broadcast like real telemetry.
pub fn spawn_simulated(
    initial: Vfo,
    mut shutdown: watch::Receiver<bool>,
) -> (VfoHandle, watch::Receiver<Vfo>, JoinHandle<()>) {
    let (command_tx, mut command_rx) = mpsc::channel(1);
    let (vfo_tx, vfo_rx) = watch::channel(initial.clone());

    let handle = tokio::spawn(async move {
        let mut state = initial;
        let _ = vfo_tx.send(state.clone());
        loop {
            tokio::select! {
                Some(command) = command_rx.recv() => {
                    match command {
                        VfoCommand::TuneTo(f) => state.frequency = (f / 10.0) as i64 as f64 * 10.0,
                        VfoCommand::TuneBy(delta) => state.frequency += delta,
                    }
                    let _ = vfo_tx.send(state.clone());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("simulated VFO shutdown");
                        return;
                    }
                }
            }
        }
    });

    (VfoHandle { command_tx }, vfo_rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn serve_rigctld(listener: TcpListener, mut frequency: i64) {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let response = match line.trim() {
                "v" => "VFOA\n".to_string(),
                "f" => format!("{frequency}\n"),
                "m" => "USB\n2400\n".to_string(),
                cmd if cmd.starts_with("F ") => {
                    frequency = cmd[2..].trim().parse().unwrap_or(frequency);
                    "RPRT 0\n".to_string()
                }
                _ => "RPRT -1\n".to_string(),
            };
            if writer.write_all(response.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn client_polls_and_broadcasts_state_changes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(serve_rigctld(listener, 7_075_000));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = VfoClient::new(&address)
            .with_polling(Duration::from_millis(10), Duration::from_millis(500));
        let (_handle, mut vfo_rx, task) = client.spawn(shutdown_rx);

        vfo_rx.changed().await.unwrap();
        let state = vfo_rx.borrow_and_update().clone();
        assert_eq!(state.name, "A");
        assert_eq!(state.frequency, 7_075_000.0);
        assert_eq!(state.mode, "USB");
        assert_eq!(state.filter_width, 2400.0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn tune_updates_the_state_optimistically() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(serve_rigctld(listener, 7_075_000));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = VfoClient::new(&address)
            .with_polling(Duration::from_millis(10), Duration::from_millis(500));
        let (handle, mut vfo_rx, task) = client.spawn(shutdown_rx);

        vfo_rx.changed().await.unwrap();
        vfo_rx.borrow_and_update();

        handle.tune_to(7_010_003.0);
        // rounded down to a 10 Hz boundary
        loop {
            vfo_rx.changed().await.unwrap();
            let frequency = vfo_rx.borrow_and_update().frequency;
            if frequency == 7_010_000.0 {
                break;
            }
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn default_address_is_rigctld() {
        let client = VfoClient::new("");
        assert_eq!(client.address, "localhost:4532");
        let client = VfoClient::new("radio.local:4532");
        assert_eq!(client.address, "radio.local:4532");
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_vfo_applies_tune_commands() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let initial = Vfo {
            frequency: 7_050_000.0,
            ..Vfo::default()
        };
        let (handle, mut vfo_rx, task) = spawn_simulated(initial, shutdown_rx);

        vfo_rx.changed().await.unwrap();
        assert_eq!(vfo_rx.borrow_and_update().frequency, 7_050_000.0);

        handle.tune_by(250.0);
        vfo_rx.changed().await.unwrap();
        assert_eq!(vfo_rx.borrow_and_update().frequency, 7_050_250.0);

        handle.tune_to(14_100_007.0);
        vfo_rx.changed().await.unwrap();
        assert_eq!(vfo_rx.borrow_and_update().frequency, 14_100_000.0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}
