//! Live rendering of transfer progress.

use std::time::Duration;

use console::style;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use crate::api::{TransferState, TransferStatus};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;
const NANOS_PER_SEC: f64 = 1e9;

/// Throughput in MiB/s, or `None` when no time has elapsed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn throughput_mib_per_sec(sent: u64, elapsed_ns: u64) -> Option<f64> {
    if elapsed_ns == 0 {
        return None;
    }
    Some(sent as f64 / BYTES_PER_MIB / (elapsed_ns as f64 / NANOS_PER_SEC))
}

/// Render a throughput value, `?` when unknown.
#[must_use]
pub fn format_throughput(throughput: Option<f64>) -> String {
    throughput.map_or_else(|| "? MiB/s".to_string(), |t| format!("{t:.2} MiB/s"))
}

/// One-line summary: status, throughput and segment progress.
#[must_use]
pub fn status_line(status: &TransferStatus) -> String {
    format!(
        "{} {} ({}/{})",
        status.status,
        format_throughput(throughput_mib_per_sec(status.sent, status.nanoseconds_elapsed)),
        status.index,
        status.total
    )
}

/// Progress bar fed by transfer status snapshots.
pub struct TransferProgress {
    bar: ProgressBar,
    announced: bool,
}

impl TransferProgress {
    /// Progress drawn on standard error.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let template = ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(template);
        bar.enable_steady_tick(Duration::from_millis(120));
        Self::with_bar(bar)
    }

    /// Progress that draws nothing.
    #[must_use]
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    const fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            announced: false,
        }
    }

    /// Whether the total size has been announced.
    #[must_use]
    pub const fn announced(&self) -> bool {
        self.announced
    }

    /// Reflect a fresh snapshot.
    pub fn update(&mut self, status: &TransferStatus) {
        if !self.announced {
            self.announced = true;
            tracing::info!(size = status.size, "Transfer size known");
            self.bar
                .println(format!("Transferring {}", HumanBytes(status.size)));
        }

        let line = status_line(status);
        tracing::debug!(transfer = %status.transfer_request_id, %line, "Transfer progress");
        self.bar.set_length(status.size);
        self.bar.set_position(status.sent.min(status.size));
        self.bar.set_message(styled(status.status, &line));
    }

    /// Stop drawing after a terminal snapshot.
    pub fn finish(&self, status: &TransferStatus) {
        let line = styled(status.status, &status_line(status));
        if status.status == TransferState::Error {
            self.bar.abandon_with_message(line);
        } else {
            self.bar.finish_with_message(line);
        }
    }
}

fn styled(state: TransferState, line: &str) -> String {
    match state {
        TransferState::Finished => style(line).green().to_string(),
        TransferState::Error => style(line).red().to_string(),
        _ => line.to_string(),
    }
}
