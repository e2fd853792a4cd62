// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Logging bootstrap for the panadapter daemon.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging from the `log_level` configuration key.
///
/// An unknown level falls back to INFO and is reported once the subscriber
/// is up, so a typo in the config file does not silence the daemon.
pub fn init_logging(log_level: Option<&str>) {
    let requested = log_level.map(|raw| (raw, raw.parse::<Level>().ok()));
    let level = requested
        .as_ref()
        .and_then(|(_, parsed)| *parsed)
        .unwrap_or(Level::INFO);

    // single binary, single target: the level and message carry everything
    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .compact()
        .init();

    if let Some((raw, None)) = requested {
        tracing::warn!("unknown log level '{raw}' in configuration, using info");
    }
}
